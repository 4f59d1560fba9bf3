//! Problem descriptors and solver configuration for the BVP solvers.
//!
//! A boundary value problem is defined by the ODE right-hand side
//! y'(t) = f(t, y, p) on [t0, t1] together with boundary conditions. Boundary
//! conditions come in two forms:
//! - `TwoPoint`: independent residual functions at the left and right endpoint,
//!   evaluated as two separate calls (the partial residual dimensions must sum
//!   to the state dimension);
//! - `General`: one combined residual over the whole trajectory sampled at the
//!   mesh points, which also covers multi-point conditions.
//!
//! The initial mesh is built either from a uniform step size `dt` or inferred
//! from a supplied sequence of initial-guess states. Invalid configuration
//! (non-positive step, empty guess, inconsistent dimensions) fails here at
//! setup, before any solve attempt.

use nalgebra::{DMatrix, DVector};
use std::fmt;

/// Hard rejection bound for the defect norm of a converged collocation solve.
/// A solve whose defect exceeds this fraction of the solution scale is treated
/// as a failure on the current mesh even though Newton converged.
pub const DEFECT_THRESHOLD: f64 = 0.1;

/// Default cap on the number of mesh subintervals.
pub const DEFAULT_MAX_SUBINTERVALS: usize = 3000;

/// ODE right-hand side: f(t, y, p) -> dy/dt
pub type RhsFunction = Box<dyn Fn(f64, &DVector<f64>, &DVector<f64>) -> DVector<f64>>;

/// Combined boundary condition over the trajectory: bc(y_at_mesh, mesh, p) -> residual
pub type BcFunction = Box<dyn Fn(&[DVector<f64>], &DVector<f64>, &DVector<f64>) -> DVector<f64>>;

/// Endpoint boundary condition for two-point problems: bc(y_endpoint, p) -> partial residual
pub type PointBcFunction = Box<dyn Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64>>;

/// Boundary condition forms accepted by the solvers.
pub enum BoundaryConditions {
    /// One residual function over the whole trajectory (multi-point capable).
    General(BcFunction),
    /// Split two-point form: left and right residuals evaluated independently.
    TwoPoint {
        left: PointBcFunction,
        right: PointBcFunction,
    },
}

/// How the initial mesh and initial solution guess are built.
pub enum MeshInit {
    /// Uniform initial mesh with the given step size; zero initial guess.
    Dt(f64),
    /// Initial-guess states, one per mesh point; the mesh is uniform with
    /// `len - 1` subintervals.
    Guess(Vec<DVector<f64>>),
}

/// Terminal outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Success,
    Failure,
}

/// Error taxonomy of the BVP solvers.
///
/// Recoverable conditions (nonlinear-solve failure, defect rejection) are
/// retried inside the solve loop via mesh halving and never surface here; only
/// setup problems and bound violations do.
#[derive(Debug, Clone, PartialEq)]
pub enum BVPError {
    /// Invalid configuration detected at setup, before any solve attempt.
    Configuration(String),
    /// Equidistribution would require more subintervals than the bound allows.
    MeshSelection {
        required: usize,
        max_subintervals: usize,
    },
    /// Halving the mesh would exceed the subinterval bound.
    SubintervalBound {
        current: usize,
        max_subintervals: usize,
    },
}

impl fmt::Display for BVPError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BVPError::Configuration(msg) => write!(f, "invalid configuration: {}", msg),
            BVPError::MeshSelection {
                required,
                max_subintervals,
            } => write!(
                f,
                "mesh equidistribution requires {} subintervals, bound is {}",
                required, max_subintervals
            ),
            BVPError::SubintervalBound {
                current,
                max_subintervals,
            } => write!(
                f,
                "halving {} subintervals would exceed the bound of {}",
                current, max_subintervals
            ),
        }
    }
}

impl std::error::Error for BVPError {}

/// Finite-difference strategy handed to the nonlinear-solve collaborator.
///
/// The strategy is chosen here, by the caller, and passed down explicitly;
/// collaborators do not inherit differentiation defaults from one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JacStrategy {
    /// Forward differences, increment sqrt(eps) * (1 + |x|).
    Forward,
    /// Central differences, increment cbrt(eps) * (1 + |x|).
    Central,
}

/// Configuration of the collocation solve loop.
///
/// All fields have documented defaults; the rejection threshold and the
/// subinterval bound default to the named crate constants.
#[derive(Debug, Clone)]
pub struct MIRKConfig {
    /// Target defect norm; solve loop runs until the defect drops below it.
    pub abstol: f64,
    /// When false the loop performs exactly one nonlinear solve and returns
    /// whatever status that solve produced.
    pub adaptive: bool,
    /// Hard cap on mesh subintervals; refinement and halving both respect it.
    pub max_subintervals: usize,
    /// Rejection bound for converged-but-garbage solves, see [`DEFECT_THRESHOLD`].
    pub defect_threshold: f64,
    /// Differentiation strategy forwarded to the nonlinear collaborator.
    pub jac_strategy: JacStrategy,
}

impl Default for MIRKConfig {
    fn default() -> Self {
        MIRKConfig {
            abstol: 1e-4,
            adaptive: true,
            max_subintervals: DEFAULT_MAX_SUBINTERVALS,
            defect_threshold: DEFECT_THRESHOLD,
            jac_strategy: JacStrategy::Forward,
        }
    }
}

/// Boundary value problem descriptor consumed by both solver families.
pub struct BVProblem {
    pub f: RhsFunction,
    pub bc: BoundaryConditions,
    pub t_span: (f64, f64),
    /// State dimension M.
    pub dim: usize,
    /// Pass-through parameter vector handed to `f` and the boundary conditions.
    pub params: DVector<f64>,
    pub mesh_init: MeshInit,
}

impl BVProblem {
    /// Validates and builds the problem descriptor. Fails with
    /// [`BVPError::Configuration`] on non-positive `dt`, degenerate time span,
    /// empty or mis-shaped initial guess.
    pub fn new(
        f: RhsFunction,
        bc: BoundaryConditions,
        t_span: (f64, f64),
        dim: usize,
        params: DVector<f64>,
        mesh_init: MeshInit,
    ) -> Result<Self, BVPError> {
        if dim == 0 {
            return Err(BVPError::Configuration(
                "state dimension must be positive".to_string(),
            ));
        }
        if !(t_span.1 > t_span.0) {
            return Err(BVPError::Configuration(format!(
                "time span [{}, {}] is not increasing",
                t_span.0, t_span.1
            )));
        }
        match &mesh_init {
            MeshInit::Dt(dt) => {
                if !(*dt > 0.0) {
                    return Err(BVPError::Configuration(format!(
                        "step size dt = {} must be positive",
                        dt
                    )));
                }
            }
            MeshInit::Guess(states) => {
                if states.len() < 2 {
                    return Err(BVPError::Configuration(
                        "initial guess must contain at least two states".to_string(),
                    ));
                }
                if states.iter().any(|s| s.len() != dim) {
                    return Err(BVPError::Configuration(format!(
                        "initial guess states must have dimension {}",
                        dim
                    )));
                }
            }
        }
        Ok(BVProblem {
            f,
            bc,
            t_span,
            dim,
            params,
            mesh_init,
        })
    }

    /// Number of subintervals of the initial mesh.
    pub fn initial_subintervals(&self) -> usize {
        match &self.mesh_init {
            MeshInit::Dt(dt) => {
                let span = self.t_span.1 - self.t_span.0;
                ((span / dt).round() as usize).max(1)
            }
            MeshInit::Guess(states) => states.len() - 1,
        }
    }

    /// Uniform initial mesh over the time span.
    pub fn initial_mesh(&self) -> DVector<f64> {
        let n = self.initial_subintervals();
        let (t0, t1) = self.t_span;
        let h = (t1 - t0) / n as f64;
        let mut mesh = DVector::zeros(n + 1);
        for i in 0..=n {
            mesh[i] = t0 + h * i as f64;
        }
        mesh[n] = t1;
        mesh
    }

    /// Initial per-point solution guess matching the initial mesh.
    pub fn initial_guess(&self) -> Vec<DVector<f64>> {
        match &self.mesh_init {
            MeshInit::Dt(_) => {
                let n = self.initial_subintervals();
                (0..=n).map(|_| DVector::zeros(self.dim)).collect()
            }
            MeshInit::Guess(states) => states.clone(),
        }
    }
}

/// Wraps a right-hand side written against a matrix-shaped native state into
/// the flat-vector form the solvers work with. The adapter reshapes the flat
/// state into `nrows x ncols` column-major, calls the user function, and
/// flattens the returned derivative the same way.
pub fn wrap_matrix_rhs(
    nrows: usize,
    ncols: usize,
    f: impl Fn(f64, &DMatrix<f64>, &DVector<f64>) -> DMatrix<f64> + 'static,
) -> RhsFunction {
    Box::new(move |t, y, p| {
        let y_mat = DMatrix::from_column_slice(nrows, ncols, y.as_slice());
        let dy = f(t, &y_mat, p);
        DVector::from_column_slice(dy.as_slice())
    })
}

/////////////////////////////////////////////////////////////////////////
//          tests
//////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn dummy_bc() -> BoundaryConditions {
        BoundaryConditions::TwoPoint {
            left: Box::new(|ya, _p| DVector::from_vec(vec![ya[0]])),
            right: Box::new(|yb, _p| DVector::from_vec(vec![yb[0] - 1.0])),
        }
    }

    fn dummy_rhs() -> RhsFunction {
        Box::new(|_t, y, _p| DVector::from_vec(vec![y[1], 0.0]))
    }

    #[test]
    fn nonpositive_dt_fails_at_setup() {
        let res = BVProblem::new(
            dummy_rhs(),
            dummy_bc(),
            (0.0, 1.0),
            2,
            DVector::zeros(0),
            MeshInit::Dt(0.0),
        );
        assert!(matches!(res, Err(BVPError::Configuration(_))));

        let res = BVProblem::new(
            dummy_rhs(),
            dummy_bc(),
            (0.0, 1.0),
            2,
            DVector::zeros(0),
            MeshInit::Dt(-0.1),
        );
        assert!(matches!(res, Err(BVPError::Configuration(_))));
    }

    #[test]
    fn degenerate_span_fails() {
        let res = BVProblem::new(
            dummy_rhs(),
            dummy_bc(),
            (1.0, 1.0),
            2,
            DVector::zeros(0),
            MeshInit::Dt(0.1),
        );
        assert!(matches!(res, Err(BVPError::Configuration(_))));
    }

    #[test]
    fn mesh_inferred_from_guess_length() {
        let guess: Vec<DVector<f64>> = (0..5).map(|_| DVector::zeros(2)).collect();
        let problem = BVProblem::new(
            dummy_rhs(),
            dummy_bc(),
            (0.0, 2.0),
            2,
            DVector::zeros(0),
            MeshInit::Guess(guess),
        )
        .unwrap();
        let mesh = problem.initial_mesh();
        assert_eq!(mesh.len(), 5);
        assert_abs_diff_eq!(mesh[0], 0.0);
        assert_abs_diff_eq!(mesh[4], 2.0);
        assert_abs_diff_eq!(mesh[1] - mesh[0], 0.5, epsilon = 1e-14);
    }

    #[test]
    fn uniform_mesh_from_dt() {
        let problem = BVProblem::new(
            dummy_rhs(),
            dummy_bc(),
            (0.0, 1.0),
            2,
            DVector::zeros(0),
            MeshInit::Dt(0.25),
        )
        .unwrap();
        let mesh = problem.initial_mesh();
        assert_eq!(mesh.len(), 5);
        assert_abs_diff_eq!(mesh[4], 1.0);
        assert_eq!(problem.initial_guess().len(), 5);
    }

    #[test]
    fn single_state_guess_rejected() {
        let res = BVProblem::new(
            dummy_rhs(),
            dummy_bc(),
            (0.0, 1.0),
            2,
            DVector::zeros(0),
            MeshInit::Guess(vec![DVector::zeros(2)]),
        );
        assert!(matches!(res, Err(BVPError::Configuration(_))));
    }

    #[test]
    fn matrix_rhs_adapter_round_trips_shapes() {
        // Native 2x2 state, derivative doubles every entry.
        let f = wrap_matrix_rhs(2, 2, |_t, y, _p| y * 2.0);
        let y = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let dy = f(0.0, &y, &DVector::zeros(0));
        assert_eq!(dy.len(), 4);
        for i in 0..4 {
            assert_abs_diff_eq!(dy[i], y[i] * 2.0);
        }
    }

    #[test]
    fn config_defaults_use_named_constants() {
        let config = MIRKConfig::default();
        assert_eq!(config.max_subintervals, DEFAULT_MAX_SUBINTERVALS);
        assert_abs_diff_eq!(config.defect_threshold, DEFECT_THRESHOLD);
        assert!(config.adaptive);
    }
}
