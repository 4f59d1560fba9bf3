//! Adaptive MIRK collocation driver.
//!
//! One call to [`solve_mirk`] runs the full convergence loop: solve the
//! collocation system on the current mesh, estimate the defect of the implied
//! continuous solution, then either accept, refine the mesh by
//! equidistribution, or restart on a halved mesh after a failure. The loop
//! terminates with Success when the defect norm drops below `abstol`, and with
//! Failure when halving would exceed the subinterval bound. Recoverable
//! conditions never surface as errors; only setup problems do.

use crate::numerical::MIRK::mirk_cache::MirkCache;
use crate::numerical::MIRK::mirk_colloc::assemble_residual_flat;
use crate::numerical::MIRK::mirk_interp::{
    MirkInterpolant, defect_estimate, fill_interp_stages, interp_eval,
};
use crate::numerical::MIRK::mirk_mesh::mesh_selector;
use crate::numerical::MIRK::mirk_tableau::MIRKMethod;
use crate::numerical::NR_api::{DampedNewton, NonlinearSolver};
use crate::numerical::problem::{BVPError, BVProblem, MIRKConfig, SolverStatus};
use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector};

/// Outcome of a collocation solve.
pub struct BVPResult {
    /// Final mesh.
    pub x: DVector<f64>,
    /// Solution states, one column per mesh point.
    pub y: DMatrix<f64>,
    /// Right-hand side sampled at the mesh points, one column per point.
    pub yp: DMatrix<f64>,
    /// Final defect norm; NaN when adaptivity was disabled and no defect was
    /// estimated.
    pub defect_norm: f64,
    /// Number of nonlinear solves performed.
    pub niter: usize,
    pub status: SolverStatus,
    pub message: String,
    /// Continuous trajectory over the final mesh.
    pub sol: MirkInterpolant,
}

/// Solves the BVP with the default damped-Newton collaborator, tightened two
/// orders below the defect tolerance.
pub fn solve_mirk(
    problem: &BVProblem,
    method: MIRKMethod,
    config: MIRKConfig,
) -> Result<BVPResult, BVPError> {
    let newton = DampedNewton::new((config.abstol * 1e-2).max(1e-12), 100, config.jac_strategy);
    solve_mirk_with(problem, method, config, &newton)
}

/// Solves the BVP with a caller-supplied nonlinear-solve collaborator.
pub fn solve_mirk_with(
    problem: &BVProblem,
    method: MIRKMethod,
    config: MIRKConfig,
    solver: &dyn NonlinearSolver,
) -> Result<BVPResult, BVPError> {
    let mut cache = MirkCache::new(problem, method, config)?;
    let abstol = cache.config.abstol;
    let mut defect_norm = 2.0 * abstol;
    let mut status = SolverStatus::Success;
    let mut message = String::new();
    let mut niter = 0;

    info!(
        "MIRK{} solve on [{}, {}], {} subintervals, abstol = {:.1e}",
        cache.tableau.order,
        cache.mesh[0],
        cache.mesh[cache.mesh.len() - 1],
        cache.n_subintervals(),
        abstol
    );

    while status == SolverStatus::Success && defect_norm > abstol {
        niter += 1;
        let x0 = cache.flatten();
        let nl = {
            // Disjoint field borrows: the residual closure mutates the stage
            // buffers while reading the mesh and method constants.
            let problem = cache.problem;
            let MirkCache {
                tableau,
                mesh,
                mesh_dt,
                k_discrete,
                ..
            } = &mut cache;
            let mut residual = |x: &DVector<f64>| {
                assemble_residual_flat(problem, tableau, mesh, mesh_dt, x, k_discrete)
            };
            solver.solve(&mut residual, x0)
        };
        debug!(
            "solve {}: n = {}, newton iterations = {}, converged = {}, |F| = {:.3e}",
            niter,
            cache.n_subintervals(),
            nl.iterations,
            nl.converged,
            nl.residual_norm
        );
        cache.unflatten(&nl.x);
        {
            // One more evaluation at the accepted point so the stage buffers
            // hold the converged stages, not the last trial step's.
            let problem = cache.problem;
            let MirkCache {
                tableau,
                mesh,
                mesh_dt,
                k_discrete,
                ..
            } = &mut cache;
            assemble_residual_flat(problem, tableau, mesh, mesh_dt, &nl.x, k_discrete);
        }

        if !cache.config.adaptive {
            // Exactly one solve; report whatever it produced.
            defect_norm = f64::NAN;
            if nl.converged {
                message = format!("converged, |F| = {:.3e}", nl.residual_norm);
            } else {
                status = SolverStatus::Failure;
                message = format!("nonlinear solve failed, |F| = {:.3e}", nl.residual_norm);
            }
            break;
        }

        if nl.converged {
            fill_interp_stages(&mut cache);
            defect_norm = defect_estimate(&mut cache);
            debug!("defect norm {:.3e} on {} subintervals", defect_norm, cache.n_subintervals());
            if defect_norm > cache.config.defect_threshold {
                status = SolverStatus::Failure;
                message = format!(
                    "defect {:.3e} above rejection threshold {:.1e}",
                    defect_norm, cache.config.defect_threshold
                );
            } else if defect_norm > abstol {
                match mesh_selector(
                    &cache.mesh,
                    &cache.mesh_dt,
                    &cache.defect,
                    abstol,
                    cache.tableau.order,
                    cache.config.max_subintervals,
                ) {
                    Ok(new_mesh) => {
                        let new_y: Vec<DVector<f64>> =
                            new_mesh.iter().map(|&t| interp_eval(&cache, t)).collect();
                        cache.expand_cache(new_mesh, new_y);
                    }
                    Err(e) => {
                        status = SolverStatus::Failure;
                        message = e.to_string();
                    }
                }
            } else {
                message = format!("converged, defect norm {:.3e}", defect_norm);
            }
        } else {
            status = SolverStatus::Failure;
            message = format!("nonlinear solve failed, |F| = {:.3e}", nl.residual_norm);
        }

        // Recovery branch: restart from scratch on a uniformly halved mesh
        // with a neutral guess, up to the subinterval bound.
        if status == SolverStatus::Failure {
            let n = cache.n_subintervals();
            if 2 * n > cache.config.max_subintervals {
                let bound = BVPError::SubintervalBound {
                    current: n,
                    max_subintervals: cache.config.max_subintervals,
                };
                warn!("{}; giving up: {}", message, bound);
                message = format!("{}; {}", message, bound);
                break;
            }
            info!("{}; retrying on halved mesh ({} -> {} subintervals)", message, n, 2 * n);
            cache.half_mesh();
            for yi in &mut cache.y {
                yi.fill(0.0);
            }
            defect_norm = 2.0 * abstol;
            status = SolverStatus::Success;
        }
    }

    if status == SolverStatus::Success {
        info!(
            "solved in {} nonlinear solves, {} final subintervals",
            niter,
            cache.n_subintervals()
        );
    } else {
        warn!("solve failed: {}", message);
    }

    let n_points = cache.mesh.len();
    let dim = cache.dim;
    let mut y = DMatrix::zeros(dim, n_points);
    let mut yp = DMatrix::zeros(dim, n_points);
    for i in 0..n_points {
        y.set_column(i, &cache.y[i]);
        let f = (cache.problem.f)(cache.mesh[i], &cache.y[i], &cache.problem.params);
        yp.set_column(i, &f);
    }
    let sol = MirkInterpolant::from_cache(&cache);

    Ok(BVPResult {
        x: cache.mesh.clone(),
        y,
        yp,
        defect_norm,
        niter,
        status,
        message,
        sol,
    })
}
