//! Defect-driven mesh refinement.
//!
//! The selector turns the per-subinterval defect profile into a refined mesh
//! that equidistributes the estimated error. Each subinterval gets a local
//! density
//!
//!   s_hat[k] = (defect[k] / abstol)^(1 / (order + 1)) / h[k]
//!
//! so that s_hat[k] * h[k] approximates how many pieces subinterval k should
//! be split into. When the profile is nearly uniform the mesh is simply
//! doubled by midpoint insertion; otherwise a new point count is predicted
//! from the total density mass with a safety factor, and the new points are
//! placed by an equidistribution walk over the density. The selector never
//! returns more subintervals than the configured bound; if equidistribution
//! would require more it fails instead of silently truncating.

use crate::numerical::problem::BVPError;
use log::debug;
use nalgebra::DVector;

/// Safety factor applied to the predicted subinterval count.
const SAFETY_FACTOR: f64 = 1.3;

/// Builds a refined mesh from the per-subinterval componentwise defect.
///
/// `defect[k]` holds the componentwise defect of subinterval k; its maximum
/// entry is the subinterval's defect magnitude. `order` is the method order.
pub fn mesh_selector(
    mesh: &DVector<f64>,
    mesh_dt: &DVector<f64>,
    defect: &[DVector<f64>],
    abstol: f64,
    order: usize,
    max_subintervals: usize,
) -> Result<DVector<f64>, BVPError> {
    let n = mesh_dt.len();
    let power = 1.0 / (order as f64 + 1.0);

    let mut s_hat = vec![0.0; n];
    let mut mass = vec![0.0; n];
    for k in 0..n {
        // Floor keeps fully converged subintervals from zeroing the density.
        let norm = defect[k].max().max(f64::EPSILON);
        s_hat[k] = (norm / abstol).powf(power) / mesh_dt[k];
        mass[k] = s_hat[k] * mesh_dt[k];
    }
    let r1 = mass.iter().cloned().fold(0.0, f64::max);
    let r2: f64 = mass.iter().sum();
    let r3 = r2 / n as f64;

    if r1 <= 2.0 * r3 {
        // Near-uniform defect profile: double by midpoint insertion.
        let n_new = 2 * n;
        if n_new > max_subintervals {
            return Err(BVPError::MeshSelection {
                required: n_new,
                max_subintervals,
            });
        }
        debug!("mesh_selector: uniform profile, doubling to {} subintervals", n_new);
        let mut new_mesh = DVector::zeros(n_new + 1);
        for k in 0..n {
            new_mesh[2 * k] = mesh[k];
            new_mesh[2 * k + 1] = 0.5 * (mesh[k] + mesh[k + 1]);
        }
        new_mesh[n_new] = mesh[n];
        Ok(new_mesh)
    } else {
        let predicted = (SAFETY_FACTOR * r2).ceil() as usize + 1;
        let n_star = predicted.max(n / 2).max(2);
        if n_star > max_subintervals {
            return Err(BVPError::MeshSelection {
                required: n_star,
                max_subintervals,
            });
        }
        debug!(
            "mesh_selector: redistributing {} -> {} subintervals (r1 = {:.3e}, mean = {:.3e})",
            n, n_star, r1, r3
        );
        Ok(redistribute(mesh, mesh_dt, &s_hat, n_star))
    }
}

/// Places `n_star` subintervals so each carries an equal share of the density
/// mass. Endpoints are copied exactly; interior points are found by walking
/// the piecewise-constant density.
fn redistribute(
    mesh: &DVector<f64>,
    mesh_dt: &DVector<f64>,
    s_hat: &[f64],
    n_star: usize,
) -> DVector<f64> {
    let n = mesh_dt.len();
    let total: f64 = (0..n).map(|k| s_hat[k] * mesh_dt[k]).sum();
    let zeta = total / n_star as f64;

    let mut new_mesh = DVector::zeros(n_star + 1);
    new_mesh[0] = mesh[0];
    let mut i = 1;
    let mut k = 0;
    let mut t = mesh[0];
    let mut acc = 0.0;
    while k < n && i < n_star {
        let available = s_hat[k] * (mesh[k + 1] - t);
        if acc + available > zeta {
            let t_new = t + (zeta - acc) / s_hat[k];
            new_mesh[i] = t_new;
            t = t_new;
            i += 1;
            acc = 0.0;
        } else {
            acc += available;
            t = mesh[k + 1];
            k += 1;
        }
    }
    // Rounding in the walk can leave trailing slots; fill them uniformly up
    // to the right endpoint so the mesh stays strictly increasing.
    let remaining = n_star + 1 - i;
    let left = new_mesh[i - 1];
    let h = (mesh[n] - left) / remaining as f64;
    while i < n_star {
        new_mesh[i] = left + h * (i + remaining - n_star) as f64;
        i += 1;
    }
    new_mesh[n_star] = mesh[n];
    new_mesh
}

/////////////////////////////////////////////////////////////////////////
//          tests
//////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn uniform_mesh(n: usize) -> (DVector<f64>, DVector<f64>) {
        let h = 1.0 / n as f64;
        let mesh = DVector::from_fn(n + 1, |i, _| i as f64 * h);
        let mesh_dt = DVector::from_element(n, h);
        (mesh, mesh_dt)
    }

    #[test]
    fn uniform_defect_doubles_the_mesh() {
        let (mesh, mesh_dt) = uniform_mesh(4);
        let defect: Vec<DVector<f64>> =
            (0..4).map(|_| DVector::from_element(2, 1e-3)).collect();
        let new_mesh = mesh_selector(&mesh, &mesh_dt, &defect, 1e-4, 4, 3000).unwrap();
        assert_eq!(new_mesh.len(), 9);
        for i in 0..mesh.len() {
            assert_abs_diff_eq!(new_mesh[2 * i], mesh[i], epsilon = 1e-14);
        }
    }

    #[test]
    fn concentrated_defect_piles_points_in_the_hot_interval() {
        let (mesh, mesh_dt) = uniform_mesh(8);
        let mut defect: Vec<DVector<f64>> =
            (0..8).map(|_| DVector::from_element(1, 1e-10)).collect();
        defect[0] = DVector::from_element(1, 10.0);
        let new_mesh = mesh_selector(&mesh, &mesh_dt, &defect, 1e-6, 4, 3000).unwrap();
        let n_new = new_mesh.len() - 1;
        // Strictly increasing, exact endpoints.
        assert_abs_diff_eq!(new_mesh[0], 0.0);
        assert_abs_diff_eq!(new_mesh[n_new], 1.0);
        for i in 0..n_new {
            assert!(new_mesh[i + 1] > new_mesh[i]);
        }
        // More than half the new points land in the first old subinterval.
        let inside = new_mesh.iter().filter(|&&t| t < 0.125).count();
        assert!(inside * 2 > n_new, "{} of {} points in hot interval", inside, n_new);
    }

    #[test]
    fn bound_violation_reports_failure_not_truncation() {
        let (mesh, mesh_dt) = uniform_mesh(10);
        let defect: Vec<DVector<f64>> =
            (0..10).map(|_| DVector::from_element(1, 1.0)).collect();
        let res = mesh_selector(&mesh, &mesh_dt, &defect, 1e-4, 4, 15);
        match res {
            Err(BVPError::MeshSelection {
                required,
                max_subintervals,
            }) => {
                assert!(required > 15);
                assert_eq!(max_subintervals, 15);
            }
            other => panic!("expected MeshSelection failure, got {:?}", other.map(|m| m.len())),
        }
    }

    #[test]
    fn selected_count_respects_the_bound() {
        let (mesh, mesh_dt) = uniform_mesh(6);
        let defect: Vec<DVector<f64>> = (0..6)
            .map(|k| DVector::from_element(1, 1e-3 * (k + 1) as f64))
            .collect();
        if let Ok(new_mesh) = mesh_selector(&mesh, &mesh_dt, &defect, 1e-4, 4, 3000) {
            assert!(new_mesh.len() - 1 <= 3000);
        }
    }
}
