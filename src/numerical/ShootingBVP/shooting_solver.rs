//! Single shooting for boundary value problems.
//!
//! The BVP is reduced to root finding over the initial state: the loss of a
//! candidate initial state is the boundary residual of the trajectory obtained
//! by integrating the ODE forward from it. The nonlinear-solve collaborator
//! drives the initial state to a root of that loss; one final forward
//! integration from the root yields the returned trajectory. Non-convergence
//! is never raised: the attempted trajectory is returned tagged with a
//! Failure status.

use crate::numerical::NR_api::NonlinearSolver;
use crate::numerical::ivp_api::{IvpSolution, IvpSolver};
use crate::numerical::problem::{BVPError, BVProblem, BoundaryConditions, MeshInit, SolverStatus};
use log::{info, warn};
use nalgebra::{DMatrix, DVector};

/// One-shot shooting solver built from the two external collaborators.
pub struct ShootingSolver<'a> {
    pub nonlinear: &'a dyn NonlinearSolver,
    pub ivp: &'a dyn IvpSolver,
}

/// Outcome of a shooting solve.
pub struct ShootingResult {
    /// Integration nodes of the final forward solve.
    pub x_mesh: DVector<f64>,
    /// Trajectory states, one column per node.
    pub y: DMatrix<f64>,
    /// Initial state found by the root search (or the last attempt on
    /// failure).
    pub initial_state: DVector<f64>,
    pub status: SolverStatus,
    pub message: String,
    /// Continuous trajectory of the final forward solve.
    pub sol: IvpSolution,
}

impl<'a> ShootingSolver<'a> {
    pub fn new(nonlinear: &'a dyn NonlinearSolver, ivp: &'a dyn IvpSolver) -> Self {
        ShootingSolver { nonlinear, ivp }
    }

    pub fn solve(&self, problem: &BVProblem) -> Result<ShootingResult, BVPError> {
        let (t0, t1) = problem.t_span;
        let s0 = self.starting_state(problem);
        info!(
            "shooting solve on [{}, {}], dim = {}",
            t0, t1, problem.dim
        );

        let mut loss = |s: &DVector<f64>| {
            let traj = self.ivp.solve(
                &|t, y| (problem.f)(t, y, &problem.params),
                s.clone(),
                t0,
                t1,
            );
            boundary_loss(problem, &traj)
        };
        let nl = self.nonlinear.solve(&mut loss, s0);

        let (status, message) = if nl.converged {
            info!(
                "shooting converged in {} iterations, |bc| = {:.3e}",
                nl.iterations, nl.residual_norm
            );
            (
                SolverStatus::Success,
                format!("converged, |bc| = {:.3e}", nl.residual_norm),
            )
        } else {
            let msg = format!(
                "root search did not converge, |bc| = {:.3e}",
                nl.residual_norm
            );
            warn!("{}", msg);
            (SolverStatus::Failure, msg)
        };

        // Final forward solve from the (possibly unconverged) initial state
        // produces the reported trajectory either way.
        let sol = self.ivp.solve(
            &|t, y| (problem.f)(t, y, &problem.params),
            nl.x.clone(),
            t0,
            t1,
        );
        Ok(ShootingResult {
            x_mesh: sol.t.clone(),
            y: sol.y.clone(),
            initial_state: nl.x,
            status,
            message,
            sol,
        })
    }

    /// Starting state for the root search. A supplied guess trajectory
    /// contributes only its first state; extra points are ignored.
    fn starting_state(&self, problem: &BVProblem) -> DVector<f64> {
        match &problem.mesh_init {
            MeshInit::Guess(states) => {
                if states.len() > 1 {
                    info!(
                        "shooting uses only the first of {} guess states",
                        states.len()
                    );
                }
                states[0].clone()
            }
            MeshInit::Dt(_) => DVector::zeros(problem.dim),
        }
    }
}

/// Boundary residual of a forward trajectory.
fn boundary_loss(problem: &BVProblem, traj: &IvpSolution) -> DVector<f64> {
    match &problem.bc {
        BoundaryConditions::TwoPoint { left, right } => {
            let ya = traj.y.column(0).into_owned();
            let yb = traj.last();
            let ra = left(&ya, &problem.params);
            let rb = right(&yb, &problem.params);
            let mut out = DVector::zeros(ra.len() + rb.len());
            out.rows_mut(0, ra.len()).copy_from(&ra);
            out.rows_mut(ra.len(), rb.len()).copy_from(&rb);
            out
        }
        BoundaryConditions::General(bc) => {
            let states: Vec<DVector<f64>> = (0..traj.y.ncols())
                .map(|i| traj.y.column(i).into_owned())
                .collect();
            bc(&states, &traj.t, &problem.params)
        }
    }
}

/////////////////////////////////////////////////////////////////////////
//          tests
//////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;
    use crate::numerical::NR_api::DampedNewton;
    use crate::numerical::ivp_api::Rk4Ivp;
    use crate::numerical::problem::RhsFunction;
    use approx::assert_abs_diff_eq;
    use simplelog::{Config, LevelFilter, SimpleLogger};

    fn init_logger() {
        let _ = SimpleLogger::init(LevelFilter::Debug, Config::default());
    }

    #[test]
    fn trivial_problem_converges_without_iterating() {
        init_logger();
        // Zero right-hand side and a boundary residual that already vanishes
        // at the supplied initial state: the root search accepts the guess.
        let f: RhsFunction = Box::new(|_t, y, _p| DVector::zeros(y.len()));
        let bc = BoundaryConditions::TwoPoint {
            left: Box::new(|ya, _p| DVector::from_vec(vec![ya[0] - 2.0])),
            right: Box::new(|yb, _p| DVector::from_vec(vec![yb[1] + 1.0])),
        };
        let guess = vec![
            DVector::from_vec(vec![2.0, -1.0]),
            DVector::from_vec(vec![9.0, 9.0]),
        ];
        let problem = BVProblem::new(
            f,
            bc,
            (0.0, 1.0),
            2,
            DVector::zeros(0),
            MeshInit::Guess(guess),
        )
        .unwrap();
        let newton = DampedNewton::default();
        let ivp = Rk4Ivp::default();
        let solver = ShootingSolver::new(&newton, &ivp);
        let res = solver.solve(&problem).unwrap();
        assert_eq!(res.status, SolverStatus::Success);
        // Exact guess: no Newton step was needed, and the trajectory starts
        // at the supplied initial state.
        assert_abs_diff_eq!(res.y[(0, 0)], 2.0, epsilon = 1e-14);
        assert_abs_diff_eq!(res.y[(1, 0)], -1.0, epsilon = 1e-14);
        assert_abs_diff_eq!(res.initial_state[0], 2.0, epsilon = 1e-14);
    }

    #[test]
    fn linear_bvp_by_shooting_matches_sinh() {
        init_logger();
        // u'' = u, u(0) = 0, u(1) = 1: the search finds u'(0) = 1/sinh(1).
        let f: RhsFunction = Box::new(|_t, y, _p| DVector::from_vec(vec![y[1], y[0]]));
        let bc = BoundaryConditions::TwoPoint {
            left: Box::new(|ya, _p| DVector::from_vec(vec![ya[0]])),
            right: Box::new(|yb, _p| DVector::from_vec(vec![yb[0] - 1.0])),
        };
        let problem =
            BVProblem::new(f, bc, (0.0, 1.0), 2, DVector::zeros(0), MeshInit::Dt(0.1)).unwrap();
        let newton = DampedNewton::default();
        let ivp = Rk4Ivp::new(1e-3);
        let solver = ShootingSolver::new(&newton, &ivp);
        let res = solver.solve(&problem).unwrap();
        assert_eq!(res.status, SolverStatus::Success);
        let scale = 1.0_f64.sinh();
        assert_abs_diff_eq!(res.initial_state[1], 1.0 / scale, epsilon = 1e-6);
        assert_abs_diff_eq!(res.sol.eval(0.5)[0], 0.5_f64.sinh() / scale, epsilon = 1e-6);
        let end = res.sol.last();
        assert_abs_diff_eq!(end[0], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn nonconvergence_is_tagged_not_raised() {
        init_logger();
        // Unsatisfiable boundary residual: constant 1 regardless of state.
        let f: RhsFunction = Box::new(|_t, y, _p| DVector::zeros(y.len()));
        let bc = BoundaryConditions::General(Box::new(|_ys, _mesh, _p| {
            DVector::from_element(1, 1.0)
        }));
        let problem =
            BVProblem::new(f, bc, (0.0, 1.0), 1, DVector::zeros(0), MeshInit::Dt(0.5)).unwrap();
        let newton = DampedNewton {
            max_iterations: 5,
            ..DampedNewton::default()
        };
        let ivp = Rk4Ivp::default();
        let solver = ShootingSolver::new(&newton, &ivp);
        let res = solver.solve(&problem).unwrap();
        assert_eq!(res.status, SolverStatus::Failure);
        // The attempted trajectory is still returned.
        assert_eq!(res.y.nrows(), 1);
        assert!(res.y.ncols() > 1);
    }
}
