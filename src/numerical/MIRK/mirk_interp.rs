//! Continuous extension, interpolation and defect estimation for MIRK solves.
//!
//! The local interpolant on a subinterval [t_i, t_i + h] is
//!
//!   u(tau) = y_i + h * sum_j w_j(tau) * k_j,      u'(tau) = sum_j l_j(tau) * k_j
//!
//! where l_j are the Lagrange basis polynomials over the stage abscissae and
//! w_j their integrals from 0 to tau. The derivative therefore collocates the
//! stage values exactly, and w_j(1) reproduces the method's quadrature weights,
//! so u(1) lands on y_{i+1} at a converged solve. Interpolation-only stages are
//! bootstrapped: the state at an extra abscissa is read off the discrete-stage
//! interpolant, then the right-hand side is sampled there. For MIRK4 this
//! reproduces the published star-stage coefficients identically.
//!
//! The defect of a subinterval is max |u' - f(u)| / (1 + |f(u)|), sampled at
//! tau_star and its mirror point.

use crate::numerical::MIRK::mirk_cache::MirkCache;
use nalgebra::{DMatrix, DVector};

/// Lagrange basis over a fixed node set, expanded to monomial coefficients so
/// both the basis and its exact integral can be evaluated at any point.
#[derive(Debug, Clone)]
pub struct LagrangeWeights {
    nodes: Vec<f64>,
    /// coeffs[i][k] is the coefficient of tau^k in the i-th basis polynomial.
    coeffs: Vec<Vec<f64>>,
}

impl LagrangeWeights {
    pub fn new(nodes: &[f64]) -> Self {
        let n = nodes.len();
        let mut coeffs = Vec::with_capacity(n);
        for i in 0..n {
            let mut poly = vec![1.0];
            let mut denom = 1.0;
            for j in 0..n {
                if j == i {
                    continue;
                }
                // Multiply the running polynomial by (tau - nodes[j]).
                let mut next = vec![0.0; poly.len() + 1];
                for (k, &a) in poly.iter().enumerate() {
                    next[k] -= nodes[j] * a;
                    next[k + 1] += a;
                }
                poly = next;
                denom *= nodes[i] - nodes[j];
            }
            for a in &mut poly {
                *a /= denom;
            }
            coeffs.push(poly);
        }
        LagrangeWeights {
            nodes: nodes.to_vec(),
            coeffs,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Basis values l_j(tau).
    pub fn basis(&self, tau: f64) -> Vec<f64> {
        self.coeffs
            .iter()
            .map(|poly| poly.iter().rev().fold(0.0, |acc, &a| acc * tau + a))
            .collect()
    }

    /// Integrated basis values w_j(tau) = integral of l_j from 0 to tau.
    pub fn integrated(&self, tau: f64) -> Vec<f64> {
        self.coeffs
            .iter()
            .map(|poly| {
                let mut acc = 0.0;
                let mut power = tau;
                for (k, &a) in poly.iter().enumerate() {
                    acc += a * power / (k + 1) as f64;
                    power *= tau;
                }
                acc
            })
            .collect()
    }
}

/// u(tau) on one subinterval given the left state, the spacing, stage columns
/// and the integrated weights.
fn local_state(
    y_left: &DVector<f64>,
    h: f64,
    k_discrete: &DMatrix<f64>,
    k_interp: &DMatrix<f64>,
    w: &[f64],
) -> DVector<f64> {
    let s = k_discrete.ncols();
    let mut z = y_left.clone();
    for j in 0..s {
        z.axpy(h * w[j], &k_discrete.column(j), 1.0);
    }
    for e in 0..k_interp.ncols() {
        z.axpy(h * w[s + e], &k_interp.column(e), 1.0);
    }
    z
}

/// u'(tau) on one subinterval from the basis values.
fn local_derivative(
    dim: usize,
    k_discrete: &DMatrix<f64>,
    k_interp: &DMatrix<f64>,
    l: &[f64],
) -> DVector<f64> {
    let s = k_discrete.ncols();
    let mut zp = DVector::zeros(dim);
    for j in 0..s {
        zp.axpy(l[j], &k_discrete.column(j), 1.0);
    }
    for e in 0..k_interp.ncols() {
        zp.axpy(l[s + e], &k_interp.column(e), 1.0);
    }
    zp
}

/// Populates the interpolation-only stage buffers from the converged discrete
/// stages. No-op when adaptivity is disabled (the buffers have zero width).
pub fn fill_interp_stages(cache: &mut MirkCache) {
    let n = cache.mesh_dt.len();
    let c_extra = cache.tableau.c_extra.clone();
    for i in 0..n {
        if cache.k_interp[i].ncols() == 0 {
            continue;
        }
        let h = cache.mesh_dt[i];
        let t = cache.mesh[i];
        for (e, &ce) in c_extra.iter().enumerate() {
            let w = cache.weights_disc.integrated(ce);
            let zero = DMatrix::zeros(cache.dim, 0);
            let z = local_state(&cache.y[i], h, &cache.k_discrete[i], &zero, &w);
            cache.new_stages[i].copy_from(&z);
            let kc = (cache.problem.f)(t + ce * h, &cache.new_stages[i], &cache.problem.params);
            cache.k_interp[i].set_column(e, &kc);
        }
    }
}

/// Estimates the defect of every subinterval and returns the global maximum.
///
/// Requires the discrete stage buffers to hold values at the converged
/// solution and the interpolation stages to be filled.
pub fn defect_estimate(cache: &mut MirkCache) -> f64 {
    let n = cache.mesh_dt.len();
    let dim = cache.dim;
    let tau_star = cache.tableau.tau_star;
    let mut global_max = 0.0f64;

    for i in 0..n {
        let h = cache.mesh_dt[i];
        let t = cache.mesh[i];
        cache.defect[i].fill(0.0);
        for tau in [tau_star, 1.0 - tau_star] {
            let w = cache.weights_full.integrated(tau);
            let l = cache.weights_full.basis(tau);
            let z = local_state(&cache.y[i], h, &cache.k_discrete[i], &cache.k_interp[i], &w);
            let zp = local_derivative(dim, &cache.k_discrete[i], &cache.k_interp[i], &l);
            let fz = (cache.problem.f)(t + tau * h, &z, &cache.problem.params);
            for comp in 0..dim {
                let d = ((zp[comp] - fz[comp]) / (1.0 + fz[comp].abs())).abs();
                if d > cache.defect[i][comp] {
                    cache.defect[i][comp] = d;
                }
            }
        }
        let interval_max = cache.defect[i].max();
        if interval_max > global_max {
            global_max = interval_max;
        }
    }
    global_max
}

/// Evaluates the current trajectory at an arbitrary time using the same local
/// interpolant construction as the defect estimator. Used to move the solution
/// onto a refined mesh.
pub fn interp_eval(cache: &MirkCache, t: f64) -> DVector<f64> {
    let (i, tau) = locate(&cache.mesh, &cache.mesh_dt, t);
    let use_full = cache.k_interp[i].ncols() > 0;
    let weights = if use_full {
        &cache.weights_full
    } else {
        &cache.weights_disc
    };
    let w = weights.integrated(tau);
    if use_full {
        local_state(
            &cache.y[i],
            cache.mesh_dt[i],
            &cache.k_discrete[i],
            &cache.k_interp[i],
            &w,
        )
    } else {
        let zero = DMatrix::zeros(cache.dim, 0);
        local_state(&cache.y[i], cache.mesh_dt[i], &cache.k_discrete[i], &zero, &w)
    }
}

/// Locates the subinterval containing `t` and the local coordinate within it;
/// out-of-range queries clamp to the boundary subintervals.
fn locate(mesh: &DVector<f64>, mesh_dt: &DVector<f64>, t: f64) -> (usize, f64) {
    let n = mesh_dt.len();
    let mut i = mesh.as_slice().partition_point(|&m| m <= t);
    i = i.saturating_sub(1).min(n - 1);
    let tau = ((t - mesh[i]) / mesh_dt[i]).clamp(0.0, 1.0);
    (i, tau)
}

/// Continuous trajectory returned to the caller: mesh states plus the stage
/// data needed to evaluate between mesh points.
#[derive(Debug, Clone)]
pub struct MirkInterpolant {
    pub mesh: DVector<f64>,
    pub mesh_dt: DVector<f64>,
    pub y: Vec<DVector<f64>>,
    k_discrete: Vec<DMatrix<f64>>,
    k_interp: Vec<DMatrix<f64>>,
    weights_disc: LagrangeWeights,
    weights_full: LagrangeWeights,
    dim: usize,
}

impl MirkInterpolant {
    pub(crate) fn from_cache(cache: &MirkCache) -> Self {
        MirkInterpolant {
            mesh: cache.mesh.clone(),
            mesh_dt: cache.mesh_dt.clone(),
            y: cache.y.clone(),
            k_discrete: cache.k_discrete.clone(),
            k_interp: cache.k_interp.clone(),
            weights_disc: cache.weights_disc.clone(),
            weights_full: cache.weights_full.clone(),
            dim: cache.dim,
        }
    }

    /// State at an arbitrary query time.
    pub fn eval(&self, t: f64) -> DVector<f64> {
        let (i, tau) = locate(&self.mesh, &self.mesh_dt, t);
        let (weights, k_interp) = self.select(i);
        let w = weights.integrated(tau);
        local_state(&self.y[i], self.mesh_dt[i], &self.k_discrete[i], k_interp, &w)
    }

    /// Time derivative of the interpolant at an arbitrary query time.
    pub fn eval_derivative(&self, t: f64) -> DVector<f64> {
        let (i, tau) = locate(&self.mesh, &self.mesh_dt, t);
        let (weights, k_interp) = self.select(i);
        let l = weights.basis(tau);
        local_derivative(self.dim, &self.k_discrete[i], k_interp, &l)
    }

    fn select(&self, i: usize) -> (&LagrangeWeights, &DMatrix<f64>) {
        if self.k_interp[i].ncols() > 0 {
            (&self.weights_full, &self.k_interp[i])
        } else {
            (&self.weights_disc, &self.k_interp[i])
        }
    }
}

/////////////////////////////////////////////////////////////////////////
//          tests
//////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;
    use crate::numerical::MIRK::mirk_tableau::MIRKMethod;
    use approx::assert_abs_diff_eq;

    #[test]
    fn basis_partitions_unity() {
        let nodes = MIRKMethod::MIRK4.tableau().full_abscissae();
        let weights = LagrangeWeights::new(&nodes);
        for &tau in &[0.0, 0.1, 0.226, 0.5, 0.9, 1.0] {
            let sum: f64 = weights.basis(tau).iter().sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn integrated_weights_reproduce_quadrature() {
        // At tau = 1 the integrated Lagrange basis over the discrete abscissae
        // is the interpolatory quadrature rule, i.e. the tableau weights b.
        for method in [
            MIRKMethod::MIRK2,
            MIRKMethod::MIRK3,
            MIRKMethod::MIRK4,
            MIRKMethod::MIRK5,
            MIRKMethod::MIRK6,
        ] {
            let tab = method.tableau();
            let weights = LagrangeWeights::new(&tab.c);
            let w1 = weights.integrated(1.0);
            for (computed, expected) in w1.iter().zip(&tab.b) {
                assert_abs_diff_eq!(computed, expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn basis_is_cardinal_at_nodes() {
        let nodes = [0.0, 1.0, 0.5, 0.75];
        let weights = LagrangeWeights::new(&nodes);
        for (i, &ni) in nodes.iter().enumerate() {
            let values = weights.basis(ni);
            for (j, &vj) in values.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(vj, expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn mirk4_bootstrapped_stage_matches_published_coefficients() {
        // With a converged residual, u(3/4) from the discrete-stage interpolant
        // equals y0 + h*(3/16 k1 + 0 k2 + 9/16 k3), the published star stage.
        let tab = MIRKMethod::MIRK4.tableau();
        let weights = LagrangeWeights::new(&tab.c);
        let w = weights.integrated(0.75);
        assert_abs_diff_eq!(w[0], 3.0 / 16.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(w[2], 9.0 / 16.0, epsilon = 1e-12);
    }
}
