//!
//! # MIRK - Adaptive Collocation Solver for Boundary Value Problems
//!
//! Mono-implicit Runge-Kutta collocation of orders 2 through 6 with
//! defect-based error control and adaptive mesh refinement.
//!
//! ## Module Structure
//! - `mirk_tableau`: coefficient tables of the MIRK2..MIRK6 methods
//! - `mirk_cache`: solve-lifetime buffers (mesh, states, stages, defect)
//! - `mirk_colloc`: collocation residual and its structural Jacobian pattern
//! - `mirk_interp`: continuous extension, interpolation and defect estimation
//! - `mirk_mesh`: defect-equidistributing mesh selection
//! - `MIRK_main`: the solve loop with mesh-halving recovery
//!
/// Coefficient tables of the method family
pub mod mirk_tableau;
/// Mesh, solution and stage buffers of one solve
pub mod mirk_cache;
/// Collocation residual assembly
pub mod mirk_colloc;
/// Interpolant and defect estimator
pub mod mirk_interp;
/// Mesh refinement by error equidistribution
pub mod mirk_mesh;
/// Solve loop and result types
pub mod MIRK_main;
