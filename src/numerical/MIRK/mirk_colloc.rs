//! Collocation residual of the MIRK discretization.
//!
//! For a mesh with n subintervals and state dimension M the unknown vector
//! stacks the mesh-point states, x_flat[i*M + j] = y_i[j], length (n+1)*M.
//! The residual stacks one collocation block per subinterval followed by the
//! boundary residual:
//!
//!   Phi_i = y_{i+1} - y_i - h_i * sum_r b_r k_r,   i = 0..n-1
//!
//! with the mono-implicit stages
//!
//!   k_r = f(t_i + c_r h_i, (1 - v_r) y_i + v_r y_{i+1} + h_i sum_{j<r} x_rj k_j).
//!
//! The x coefficient matrix is strictly lower triangular, so the stages are
//! computed by forward substitution with no inner iteration. Stage derivatives
//! are written into the caller's per-subinterval buffers as a side effect; at
//! a converged unknown vector those buffers therefore hold the converged
//! stages the interpolant needs.

use crate::numerical::MIRK::mirk_tableau::MirkTableau;
use crate::numerical::problem::{BVProblem, BoundaryConditions};
use nalgebra::{DMatrix, DVector};

/// Evaluates the full collocation residual at a flat unknown vector.
///
/// Layout of the returned vector: n blocks of dimension M (one per
/// subinterval, in mesh order), then the boundary residual of dimension M.
pub fn assemble_residual_flat(
    problem: &BVProblem,
    tableau: &MirkTableau,
    mesh: &DVector<f64>,
    mesh_dt: &DVector<f64>,
    x_flat: &DVector<f64>,
    k_discrete: &mut [DMatrix<f64>],
) -> DVector<f64> {
    let dim = problem.dim;
    let n = mesh_dt.len();
    let s = tableau.s;
    let mut residual = DVector::zeros((n + 1) * dim);

    for i in 0..n {
        let h = mesh_dt[i];
        let t = mesh[i];
        let ya = x_flat.rows(i * dim, dim);
        let yb = x_flat.rows((i + 1) * dim, dim);

        for r in 0..s {
            let mut yr = DVector::zeros(dim);
            yr.axpy(1.0 - tableau.v[r], &ya, 1.0);
            yr.axpy(tableau.v[r], &yb, 1.0);
            for j in 0..r {
                let xrj = tableau.x[r][j];
                if xrj != 0.0 {
                    yr.axpy(h * xrj, &k_discrete[i].column(j), 1.0);
                }
            }
            let kr = (problem.f)(t + tableau.c[r] * h, &yr, &problem.params);
            k_discrete[i].set_column(r, &kr);
        }

        let mut phi = DVector::zeros(dim);
        phi += &yb;
        phi -= &ya;
        for r in 0..s {
            phi.axpy(-h * tableau.b[r], &k_discrete[i].column(r), 1.0);
        }
        residual.rows_mut(i * dim, dim).copy_from(&phi);
    }

    let bc_res = bc_residual(problem, mesh, x_flat);
    residual.rows_mut(n * dim, dim).copy_from(&bc_res);
    residual
}

/// Boundary residual at a flat unknown vector. Two-point conditions are two
/// independent calls, left block first; the general form receives the whole
/// trajectory sampled at the mesh points.
pub fn bc_residual(
    problem: &BVProblem,
    mesh: &DVector<f64>,
    x_flat: &DVector<f64>,
) -> DVector<f64> {
    let dim = problem.dim;
    let n = mesh.len() - 1;
    match &problem.bc {
        BoundaryConditions::TwoPoint { left, right } => {
            let ya = x_flat.rows(0, dim).into_owned();
            let yb = x_flat.rows(n * dim, dim).into_owned();
            let ra = left(&ya, &problem.params);
            let rb = right(&yb, &problem.params);
            let mut out = DVector::zeros(ra.len() + rb.len());
            out.rows_mut(0, ra.len()).copy_from(&ra);
            out.rows_mut(ra.len(), rb.len()).copy_from(&rb);
            out
        }
        BoundaryConditions::General(bc) => {
            let states: Vec<DVector<f64>> = (0..=n)
                .map(|i| x_flat.rows(i * dim, dim).into_owned())
                .collect();
            bc(&states, mesh, &problem.params)
        }
    }
}

/// Structural nonzero pattern of the collocation Jacobian, entry 1 where the
/// residual row may depend on the unknown column.
///
/// Each collocation block couples exactly its two adjacent mesh points, giving
/// a block-bidiagonal band. Two-point boundary rows split into a left block
/// (first `left_rows` rows, depending on the first point) and a right block
/// (depending on the last point); `left_rows = None` marks the general form,
/// whose rows may touch every point.
pub fn jacobian_pattern(n_subintervals: usize, dim: usize, left_rows: Option<usize>) -> DMatrix<u8> {
    let n = n_subintervals;
    let size = (n + 1) * dim;
    let mut pattern = DMatrix::zeros(size, size);

    for i in 0..n {
        for row in 0..dim {
            for col in 0..2 * dim {
                pattern[(i * dim + row, i * dim + col)] = 1;
            }
        }
    }
    match left_rows {
        Some(la) => {
            for row in 0..la {
                for col in 0..dim {
                    pattern[(n * dim + row, col)] = 1;
                }
            }
            for row in la..dim {
                for col in 0..dim {
                    pattern[(n * dim + row, n * dim + col)] = 1;
                }
            }
        }
        None => {
            for row in 0..dim {
                for col in 0..size {
                    pattern[(n * dim + row, col)] = 1;
                }
            }
        }
    }
    pattern
}

/////////////////////////////////////////////////////////////////////////
//          tests
//////////////////////////////////////////////////////////////////////////
