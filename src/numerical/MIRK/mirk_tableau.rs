//! Coefficient tables of the mono-implicit Runge-Kutta (MIRK) collocation
//! schemes.
//!
//! Every method variant is a closed tag selecting one [`MirkTableau`]; the
//! solve loop works only against the table, never against per-variant
//! branches. A discrete stage r is built as
//!
//!   y_r = (1 - v[r]) * y_left + v[r] * y_right + h * sum_j x[r][j] * k_j
//!   k_r = f(t_left + c[r] * h, y_r)
//!
//! and the subinterval residual is y_right - y_left - h * sum_r b[r] * k_r.
//! `c_extra` lists the abscissae of the interpolation-only stages appended
//! under adaptivity; `tau_star` is where the defect is sampled (together with
//! its mirror 1 - tau_star).

/// Closed set of supported collocation methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MIRKMethod {
    MIRK2,
    MIRK3,
    MIRK4,
    MIRK5,
    MIRK6,
}

/// Butcher-like coefficient table of one MIRK scheme.
#[derive(Debug, Clone)]
pub struct MirkTableau {
    pub order: usize,
    /// Number of discrete stages.
    pub s: usize,
    /// Stage abscissae, length `s`.
    pub c: Vec<f64>,
    /// Endpoint blend coefficients, length `s`.
    pub v: Vec<f64>,
    /// Stage coupling matrix, strictly lower triangular, `s x s`.
    pub x: Vec<Vec<f64>>,
    /// Quadrature weights, length `s`.
    pub b: Vec<f64>,
    /// Interpolation-only stage abscissae (`s_star - s` of them).
    pub c_extra: Vec<f64>,
    /// Defect sampling point in (0, 1).
    pub tau_star: f64,
}

impl MirkTableau {
    /// Total stage count including interpolation-only stages.
    pub fn s_star(&self) -> usize {
        self.s + self.c_extra.len()
    }

    /// Abscissae of the discrete stages.
    pub fn discrete_abscissae(&self) -> Vec<f64> {
        self.c.clone()
    }

    /// Abscissae of all stages, discrete first, interpolation-only appended.
    pub fn full_abscissae(&self) -> Vec<f64> {
        let mut nodes = self.c.clone();
        nodes.extend_from_slice(&self.c_extra);
        nodes
    }
}

impl MIRKMethod {
    pub fn order(&self) -> usize {
        self.tableau().order
    }

    pub fn tableau(&self) -> MirkTableau {
        match self {
            // Trapezoidal scheme.
            MIRKMethod::MIRK2 => MirkTableau {
                order: 2,
                s: 2,
                c: vec![0.0, 1.0],
                v: vec![0.0, 1.0],
                x: vec![vec![0.0, 0.0], vec![0.0, 0.0]],
                b: vec![0.5, 0.5],
                c_extra: vec![0.5],
                tau_star: 0.25,
            },
            MIRKMethod::MIRK3 => MirkTableau {
                order: 3,
                s: 2,
                c: vec![0.0, 2.0 / 3.0],
                v: vec![0.0, 4.0 / 9.0],
                x: vec![vec![0.0, 0.0], vec![2.0 / 9.0, 0.0]],
                b: vec![0.25, 0.75],
                c_extra: vec![1.0, 1.0 / 3.0],
                tau_star: 0.25,
            },
            // Simpson quadrature with the classic deferred midpoint stage.
            MIRKMethod::MIRK4 => MirkTableau {
                order: 4,
                s: 3,
                c: vec![0.0, 1.0, 0.5],
                v: vec![0.0, 1.0, 0.5],
                x: vec![
                    vec![0.0, 0.0, 0.0],
                    vec![0.0, 0.0, 0.0],
                    vec![0.125, -0.125, 0.0],
                ],
                b: vec![1.0 / 6.0, 1.0 / 6.0, 2.0 / 3.0],
                c_extra: vec![0.75],
                tau_star: 0.226,
            },
            MIRKMethod::MIRK5 => MirkTableau {
                order: 5,
                s: 4,
                c: vec![0.0, 1.0, 0.75, 0.3],
                v: vec![0.0, 1.0, 27.0 / 32.0, 837.0 / 1250.0],
                x: vec![
                    vec![0.0, 0.0, 0.0, 0.0],
                    vec![0.0, 0.0, 0.0, 0.0],
                    vec![3.0 / 64.0, -9.0 / 64.0, 0.0, 0.0],
                    vec![21.0 / 1000.0, 63.0 / 5000.0, -252.0 / 625.0, 0.0],
                ],
                b: vec![5.0 / 54.0, 1.0 / 14.0, 32.0 / 81.0, 250.0 / 567.0],
                c_extra: vec![0.5, 0.25],
                tau_star: 0.3,
            },
            MIRKMethod::MIRK6 => MirkTableau {
                order: 6,
                s: 5,
                c: vec![0.0, 1.0, 0.25, 0.75, 0.5],
                v: vec![0.0, 1.0, 5.0 / 32.0, 27.0 / 32.0, 0.5],
                x: vec![
                    vec![0.0, 0.0, 0.0, 0.0, 0.0],
                    vec![0.0, 0.0, 0.0, 0.0, 0.0],
                    vec![9.0 / 64.0, -3.0 / 64.0, 0.0, 0.0, 0.0],
                    vec![3.0 / 64.0, -9.0 / 64.0, 0.0, 0.0, 0.0],
                    vec![-5.0 / 24.0, 5.0 / 24.0, 2.0 / 3.0, -2.0 / 3.0, 0.0],
                ],
                b: vec![7.0 / 90.0, 7.0 / 90.0, 16.0 / 45.0, 16.0 / 45.0, 2.0 / 15.0],
                c_extra: vec![1.0 / 6.0, 5.0 / 6.0],
                tau_star: 0.7156,
            },
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

    const ALL: [MIRKMethod; 5] = [
        MIRKMethod::MIRK2,
        MIRKMethod::MIRK3,
        MIRKMethod::MIRK4,
        MIRKMethod::MIRK5,
        MIRKMethod::MIRK6,
    ];

    #[test]
    fn quadrature_weights_are_consistent() {
        for method in ALL {
            let tab = method.tableau();
            assert_eq!(tab.b.len(), tab.s);
            assert_eq!(tab.c.len(), tab.s);
            assert_eq!(tab.v.len(), tab.s);
            // First-order condition: weights sum to one.
            let sum_b: f64 = tab.b.iter().sum();
            assert_abs_diff_eq!(sum_b, 1.0, epsilon = 1e-14);
            // Second-order condition for every method above MIRK2's trapezoid.
            let sum_bc: f64 = tab.b.iter().zip(&tab.c).map(|(b, c)| b * c).sum();
            assert_abs_diff_eq!(sum_bc, 0.5, epsilon = 1e-14);
        }
    }

    #[test]
    fn stage_abscissa_consistency() {
        // Each stage must satisfy c[r] = v[r] + sum_j x[r][j] so the stage
        // state is first-order consistent with the interpolated trajectory.
        for method in ALL {
            let tab = method.tableau();
            for r in 0..tab.s {
                let row_sum: f64 = tab.x[r].iter().sum();
                assert_abs_diff_eq!(tab.c[r], tab.v[r] + row_sum, epsilon = 1e-14);
            }
        }
    }

    #[test]
    fn coupling_matrix_is_strictly_lower_triangular() {
        for method in ALL {
            let tab = method.tableau();
            for r in 0..tab.s {
                for j in r..tab.s {
                    assert_eq!(tab.x[r][j], 0.0);
                }
            }
        }
    }

    #[test]
    fn full_abscissae_are_distinct() {
        // Lagrange interpolation over the stage nodes requires distinct points.
        for method in ALL {
            let nodes = method.tableau().full_abscissae();
            for i in 0..nodes.len() {
                for j in (i + 1)..nodes.len() {
                    assert!((nodes[i] - nodes[j]).abs() > 1e-6);
                }
            }
        }
    }

    #[test]
    fn defect_sampling_point_is_interior() {
        for method in ALL {
            let tau = method.tableau().tau_star;
            assert!(tau > 0.0 && tau < 1.0);
        }
    }
}
