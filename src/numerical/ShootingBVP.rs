//!
//! # ShootingBVP - Single Shooting Method for Boundary Value Problems
//!
//! Reduces the BVP to root finding over the initial state using repeated
//! forward IVP solves. A simpler control path than the MIRK collocation
//! family; suited to non-stiff problems over short intervals.
//!
pub mod shooting_solver;
