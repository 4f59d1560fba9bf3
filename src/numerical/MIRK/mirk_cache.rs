//! Solve-lifetime cache of the MIRK solver.
//!
//! One [`MirkCache`] is built per solve invocation and owns every buffer the
//! loop mutates: the mesh and its spacings, the per-point solution states, the
//! per-subinterval stage buffers and the defect scratch. All buffers are
//! resized together, only through [`MirkCache::expand_cache`] or
//! [`MirkCache::half_mesh`]; nothing changes length partially. The method
//! constants (tableau, interpolation weights) are fixed for the cache's life.

use crate::numerical::MIRK::mirk_interp::LagrangeWeights;
use crate::numerical::MIRK::mirk_tableau::{MIRKMethod, MirkTableau};
use crate::numerical::problem::{BVPError, BVProblem, BoundaryConditions, MIRKConfig};
use itertools::Itertools;
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Spacings of an ordered mesh.
pub fn mesh_spacings(mesh: &DVector<f64>) -> DVector<f64> {
    let dts: Vec<f64> = mesh
        .as_slice()
        .iter()
        .tuple_windows()
        .map(|(a, b)| b - a)
        .collect();
    DVector::from_vec(dts)
}

pub struct MirkCache<'a> {
    pub problem: &'a BVProblem,
    pub tableau: MirkTableau,
    pub config: MIRKConfig,
    /// State dimension M.
    pub dim: usize,
    /// n+1 strictly increasing time points.
    pub mesh: DVector<f64>,
    /// n positive spacings, kept in lockstep with `mesh`.
    pub mesh_dt: DVector<f64>,
    /// One state per mesh point.
    pub y: Vec<DVector<f64>>,
    /// Per subinterval: dim x s discrete stage derivatives.
    pub k_discrete: Vec<DMatrix<f64>>,
    /// Per subinterval: dim x (s_star - s) interpolation-only stage
    /// derivatives; zero columns when adaptivity is disabled.
    pub k_interp: Vec<DMatrix<f64>>,
    /// Per-subinterval componentwise defect; zero-length entries when
    /// adaptivity is disabled.
    pub defect: Vec<DVector<f64>>,
    /// Scratch for the bootstrapped stage states, same allocation policy.
    pub new_stages: Vec<DVector<f64>>,
    /// Lagrange weights over the discrete abscissae.
    pub weights_disc: LagrangeWeights,
    /// Lagrange weights over all abscissae (equals `weights_disc` when
    /// adaptivity is disabled).
    pub weights_full: LagrangeWeights,
}

impl<'a> MirkCache<'a> {
    /// Builds the cache for one solve: initial mesh and guess from the
    /// problem, method constants from the tableau, buffers allocated to match.
    /// Probes the user functions once to catch shape mistakes before any solve
    /// attempt.
    pub fn new(
        problem: &'a BVProblem,
        method: MIRKMethod,
        config: MIRKConfig,
    ) -> Result<Self, BVPError> {
        if !(config.abstol > 0.0) {
            return Err(BVPError::Configuration(format!(
                "abstol = {} must be positive",
                config.abstol
            )));
        }
        let tableau = method.tableau();
        let mesh = problem.initial_mesh();
        let n = mesh.len() - 1;
        if n > config.max_subintervals {
            return Err(BVPError::Configuration(format!(
                "initial mesh has {} subintervals, bound is {}",
                n, config.max_subintervals
            )));
        }
        let mesh_dt = mesh_spacings(&mesh);
        if mesh_dt.iter().any(|&h| !(h > 0.0)) {
            return Err(BVPError::Configuration(
                "initial mesh is not strictly increasing".to_string(),
            ));
        }
        let y = problem.initial_guess();
        let dim = problem.dim;

        let f_probe = (problem.f)(mesh[0], &y[0], &problem.params);
        if f_probe.len() != dim {
            return Err(BVPError::Configuration(format!(
                "rhs returned dimension {}, expected {}",
                f_probe.len(),
                dim
            )));
        }
        let bc_len = match &problem.bc {
            BoundaryConditions::TwoPoint { left, right } => {
                left(&y[0], &problem.params).len() + right(&y[n], &problem.params).len()
            }
            BoundaryConditions::General(bc) => bc(&y, &mesh, &problem.params).len(),
        };
        if bc_len != dim {
            return Err(BVPError::Configuration(format!(
                "boundary residual dimension {} does not match state dimension {}",
                bc_len, dim
            )));
        }

        let weights_disc = LagrangeWeights::new(&tableau.c);
        let full_nodes = if config.adaptive {
            tableau.full_abscissae()
        } else {
            tableau.discrete_abscissae()
        };
        let weights_full = LagrangeWeights::new(&full_nodes);

        let mut cache = MirkCache {
            problem,
            tableau,
            config,
            dim,
            mesh,
            mesh_dt,
            y,
            k_discrete: Vec::new(),
            k_interp: Vec::new(),
            defect: Vec::new(),
            new_stages: Vec::new(),
            weights_disc,
            weights_full,
        };
        cache.realloc_stage_buffers();
        Ok(cache)
    }

    pub fn n_subintervals(&self) -> usize {
        self.mesh.len() - 1
    }

    /// Flattens the per-point states into the nonlinear solver's unknown
    /// vector, one state after another.
    pub fn flatten(&self) -> DVector<f64> {
        let mut flat = DVector::zeros(self.y.len() * self.dim);
        for (i, yi) in self.y.iter().enumerate() {
            flat.rows_mut(i * self.dim, self.dim).copy_from(yi);
        }
        flat
    }

    /// Writes a flat unknown vector back into the per-point states.
    pub fn unflatten(&mut self, flat: &DVector<f64>) {
        for (i, yi) in self.y.iter_mut().enumerate() {
            yi.copy_from(&flat.rows(i * self.dim, self.dim));
        }
    }

    /// Replaces the mesh and solution with a refined pair and resizes every
    /// dependent buffer to the new length.
    pub fn expand_cache(&mut self, new_mesh: DVector<f64>, new_y: Vec<DVector<f64>>) {
        debug_assert_eq!(new_mesh.len(), new_y.len());
        debug!(
            "expand_cache: {} -> {} subintervals",
            self.n_subintervals(),
            new_mesh.len() - 1
        );
        self.mesh_dt = mesh_spacings(&new_mesh);
        self.mesh = new_mesh;
        self.y = new_y;
        self.realloc_stage_buffers();
    }

    /// Inserts the midpoint of every subinterval, exactly doubling the count.
    /// Original mesh points are preserved; midpoint states are seeded with the
    /// neighbor average (the solve loop overwrites the guess on restart).
    pub fn half_mesh(&mut self) {
        let n = self.n_subintervals();
        let mut new_mesh = DVector::zeros(2 * n + 1);
        let mut new_y = Vec::with_capacity(2 * n + 1);
        for i in 0..n {
            new_mesh[2 * i] = self.mesh[i];
            new_mesh[2 * i + 1] = 0.5 * (self.mesh[i] + self.mesh[i + 1]);
            new_y.push(self.y[i].clone());
            new_y.push(0.5 * (&self.y[i] + &self.y[i + 1]));
        }
        new_mesh[2 * n] = self.mesh[n];
        new_y.push(self.y[n].clone());
        debug!("half_mesh: {} -> {} subintervals", n, 2 * n);
        self.mesh_dt = mesh_spacings(&new_mesh);
        self.mesh = new_mesh;
        self.y = new_y;
        self.realloc_stage_buffers();
    }

    /// Reallocates the per-subinterval buffers to the current mesh length.
    /// Interpolation stages, defect and stage scratch are zero-sized when
    /// adaptivity is disabled.
    fn realloc_stage_buffers(&mut self) {
        let n = self.n_subintervals();
        let s = self.tableau.s;
        let extra = if self.config.adaptive {
            self.tableau.c_extra.len()
        } else {
            0
        };
        let scratch_dim = if self.config.adaptive { self.dim } else { 0 };
        self.k_discrete = (0..n).map(|_| DMatrix::zeros(self.dim, s)).collect();
        self.k_interp = (0..n).map(|_| DMatrix::zeros(self.dim, extra)).collect();
        self.defect = (0..n).map(|_| DVector::zeros(scratch_dim)).collect();
        self.new_stages = (0..n).map(|_| DVector::zeros(scratch_dim)).collect();
    }
}

/////////////////////////////////////////////////////////////////////////
//          tests
//////////////////////////////////////////////////////////////////////////
