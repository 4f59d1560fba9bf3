//! Nonlinear-solve collaborator interface and a damped Newton default.
//!
//! The collocation and shooting solvers hand their residual functions to a
//! [`NonlinearSolver`] and consume whatever solution and convergence status it
//! returns; nothing in the BVP core differentiates anything itself. The shipped
//! [`DampedNewton`] builds a dense finite-difference Jacobian with an explicit,
//! caller-chosen [`JacStrategy`], solves Newton steps by LU decomposition and
//! applies Armijo-style backtracking when the full step does not decrease the
//! residual.

use crate::numerical::problem::JacStrategy;
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

const EPS: f64 = f64::EPSILON;

/// Outcome of a nonlinear solve. Non-convergence is reported through
/// `converged`, never by panicking; `x` then holds the last iterate.
#[derive(Debug, Clone)]
pub struct NonlinearResult {
    pub x: DVector<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub residual_norm: f64,
}

/// Black-box interface of the external nonlinear equation solver.
pub trait NonlinearSolver {
    /// Finds a root of `residual` starting from `x0`.
    fn solve(
        &self,
        residual: &mut dyn FnMut(&DVector<f64>) -> DVector<f64>,
        x0: DVector<f64>,
    ) -> NonlinearResult;
}

/// Damped Newton iteration with finite-difference Jacobian.
#[derive(Debug, Clone)]
pub struct DampedNewton {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub jac_strategy: JacStrategy,
}

impl DampedNewton {
    pub fn new(tolerance: f64, max_iterations: usize, jac_strategy: JacStrategy) -> Self {
        DampedNewton {
            tolerance,
            max_iterations,
            jac_strategy,
        }
    }
}

impl Default for DampedNewton {
    fn default() -> Self {
        DampedNewton {
            tolerance: 1e-8,
            max_iterations: 100,
            jac_strategy: JacStrategy::Forward,
        }
    }
}

/// Dense finite-difference Jacobian of `residual` at `x`, with the increment
/// scaled by the iterate magnitude as in the classic forward-difference rule.
fn fd_jacobian(
    residual: &mut dyn FnMut(&DVector<f64>) -> DVector<f64>,
    x: &DVector<f64>,
    f0: &DVector<f64>,
    strategy: JacStrategy,
) -> DMatrix<f64> {
    let n = x.len();
    let m = f0.len();
    let mut jac = DMatrix::zeros(m, n);
    match strategy {
        JacStrategy::Forward => {
            for j in 0..n {
                let h = EPS.sqrt() * (1.0 + x[j].abs());
                let mut x_pert = x.clone();
                x_pert[j] += h;
                let f_new = residual(&x_pert);
                for i in 0..m {
                    jac[(i, j)] = (f_new[i] - f0[i]) / h;
                }
            }
        }
        JacStrategy::Central => {
            for j in 0..n {
                let h = EPS.cbrt() * (1.0 + x[j].abs());
                let mut x_plus = x.clone();
                let mut x_minus = x.clone();
                x_plus[j] += h;
                x_minus[j] -= h;
                let f_plus = residual(&x_plus);
                let f_minus = residual(&x_minus);
                for i in 0..m {
                    jac[(i, j)] = (f_plus[i] - f_minus[i]) / (2.0 * h);
                }
            }
        }
    }
    jac
}

impl NonlinearSolver for DampedNewton {
    fn solve(
        &self,
        residual: &mut dyn FnMut(&DVector<f64>) -> DVector<f64>,
        x0: DVector<f64>,
    ) -> NonlinearResult {
        let tau = 0.5; // step size decrease factor
        let n_trial = 4; // max backtracking steps

        let mut x = x0;
        let mut res = residual(&x);
        let mut res_norm = res.norm();
        let mut iterations = 0;
        debug!(
            "Newton start: {} unknowns, initial residual norm {:.3e}",
            x.len(),
            res_norm
        );

        while iterations < self.max_iterations {
            if res_norm < self.tolerance || !res_norm.is_finite() {
                break;
            }
            iterations += 1;

            let jac = fd_jacobian(residual, &x, &res, self.jac_strategy);
            let lu = jac.lu();
            let step = match lu.solve(&res) {
                Some(step) => step,
                None => {
                    warn!("Newton: singular Jacobian at iteration {}", iterations);
                    return NonlinearResult {
                        x,
                        converged: false,
                        iterations,
                        residual_norm: res_norm,
                    };
                }
            };

            // Backtracking: accept the first damped step that decreases the
            // residual norm; after n_trial halvings take the step regardless.
            let mut alpha = 1.0;
            let mut x_new = &x - &step;
            let mut res_new = residual(&x_new);
            let mut new_norm = res_new.norm();
            for _trial in 0..n_trial {
                if new_norm.is_finite() && new_norm < res_norm {
                    break;
                }
                alpha *= tau;
                x_new = &x - alpha * &step;
                res_new = residual(&x_new);
                new_norm = res_new.norm();
            }

            debug!(
                "Newton iteration {}: residual {:.3e} -> {:.3e}, alpha {}",
                iterations, res_norm, new_norm, alpha
            );
            x = x_new;
            res = res_new;
            res_norm = new_norm;
        }

        let converged = res_norm.is_finite() && res_norm < self.tolerance;
        if converged {
            info!(
                "Newton converged in {} iterations with residual norm {:.3e}",
                iterations, res_norm
            );
        } else {
            warn!(
                "Newton did not converge after {} iterations, residual norm {:.3e}",
                iterations, res_norm
            );
        }
        NonlinearResult {
            x,
            converged,
            iterations,
            residual_norm: res_norm,
        }
    }
}

/////////////////////////////////////////////////////////////////////////
//          tests
//////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn scalar_root() {
        let solver = DampedNewton::default();
        let mut residual =
            |x: &DVector<f64>| -> DVector<f64> { DVector::from_vec(vec![x[0] * x[0] - 4.0]) };
        let result = solver.solve(&mut residual, DVector::from_vec(vec![1.0]));
        assert!(result.converged);
        assert_abs_diff_eq!(result.x[0], 2.0, epsilon = 1e-7);
    }

    #[test]
    fn linear_system_both_strategies() {
        for strategy in [JacStrategy::Forward, JacStrategy::Central] {
            let solver = DampedNewton::new(1e-10, 50, strategy);
            // 2x + y = 5, x - y = 1  =>  x = 2, y = 1
            let mut residual = |x: &DVector<f64>| -> DVector<f64> {
                DVector::from_vec(vec![2.0 * x[0] + x[1] - 5.0, x[0] - x[1] - 1.0])
            };
            let result = solver.solve(&mut residual, DVector::zeros(2));
            assert!(result.converged);
            assert_abs_diff_eq!(result.x[0], 2.0, epsilon = 1e-8);
            assert_abs_diff_eq!(result.x[1], 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn exact_guess_converges_without_stepping() {
        let solver = DampedNewton::default();
        let mut calls = 0usize;
        let mut residual = |x: &DVector<f64>| -> DVector<f64> {
            calls += 1;
            DVector::from_vec(vec![x[0] - 3.0])
        };
        let result = solver.solve(&mut residual, DVector::from_vec(vec![3.0]));
        assert!(result.converged);
        // One evaluation to see the residual is already zero, no Jacobian work.
        assert_eq!(calls, 1);
    }

    #[test]
    fn reports_non_convergence() {
        let solver = DampedNewton::new(1e-30, 3, JacStrategy::Forward);
        // No real root: x^2 + 1 = 0
        let mut residual =
            |x: &DVector<f64>| -> DVector<f64> { DVector::from_vec(vec![x[0] * x[0] + 1.0]) };
        let result = solver.solve(&mut residual, DVector::from_vec(vec![1.0]));
        assert!(!result.converged);
        assert!(result.residual_norm >= 1e-30 || !result.residual_norm.is_finite());
    }
}
