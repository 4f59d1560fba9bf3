//! Numerical solvers for boundary value problems.
//!
//! Two independent solution paths share one problem descriptor:
//! - `MIRK`: adaptive mono-implicit Runge-Kutta collocation with defect-based
//!   error control and mesh refinement, the robust default;
//! - `ShootingBVP`: single shooting via repeated forward IVP solves, simpler
//!   and cheaper on non-stiff problems.
//!
//! The nonlinear root finder and the IVP integrator are external
//! collaborators behind the traits in `NR_api` and `ivp_api`; default
//! implementations (damped Newton, fixed-step RK4) are provided.
//!
/// Example
/// ```
/// use RustedMIRK::numerical::MIRK::MIRK_main::solve_mirk;
/// use RustedMIRK::numerical::MIRK::mirk_tableau::MIRKMethod;
/// use RustedMIRK::numerical::problem::{
///     BVProblem, BoundaryConditions, MIRKConfig, MeshInit,
/// };
/// use nalgebra::DVector;
///
/// // u'' = -u, u(0) = 0, u(pi/2) = 1, solved as a first-order system.
/// let problem = BVProblem::new(
///     Box::new(|_t, y, _p| DVector::from_vec(vec![y[1], -y[0]])),
///     BoundaryConditions::TwoPoint {
///         left: Box::new(|ya, _p| DVector::from_vec(vec![ya[0]])),
///         right: Box::new(|yb, _p| DVector::from_vec(vec![yb[0] - 1.0])),
///     },
///     (0.0, std::f64::consts::FRAC_PI_2),
///     2,
///     DVector::zeros(0),
///     MeshInit::Dt(0.1),
/// )
/// .unwrap();
/// let res = solve_mirk(&problem, MIRKMethod::MIRK4, MIRKConfig::default()).unwrap();
/// // res.sol is a continuous interpolant over the final mesh.
/// assert!((res.sol.eval(0.5)[0] - 0.5_f64.sin()).abs() < 1e-3);
/// ```
pub mod MIRK;
/// Single shooting solver
pub mod ShootingBVP;
/// Nonlinear-solve collaborator interface and the default damped Newton
pub mod NR_api;
/// IVP collaborator interface and the default fixed-step RK4
pub mod ivp_api;
/// Problem descriptors, configuration and the error taxonomy
pub mod problem;
