//! IVP-solve collaborator interface used by the shooting method.
//!
//! The shooting solver only needs two things from an integrator: a trajectory
//! over the span and the ability to query that trajectory at arbitrary times.
//! [`Rk4Ivp`] is the shipped fixed-step 4th-order Runge-Kutta default;
//! [`IvpSolution`] evaluates between nodes with the cubic Hermite interpolant
//! built from the stored states and derivatives.

use log::debug;
use nalgebra::{DMatrix, DVector};

/// Trajectory of an IVP solve: states and derivatives column-per-node.
#[derive(Debug, Clone)]
pub struct IvpSolution {
    pub t: DVector<f64>,
    /// States, one column per time node.
    pub y: DMatrix<f64>,
    /// Right-hand side evaluated at each node, used for Hermite interpolation.
    pub yp: DMatrix<f64>,
}

impl IvpSolution {
    /// State at the final time node.
    pub fn last(&self) -> DVector<f64> {
        self.y.column(self.y.ncols() - 1).into_owned()
    }

    /// Evaluates the trajectory at an arbitrary query time using the local
    /// cubic Hermite interpolant; queries outside the span clamp to the ends.
    pub fn eval(&self, t_query: f64) -> DVector<f64> {
        let m = self.t.len();
        if m == 1 {
            return self.y.column(0).into_owned();
        }
        if t_query <= self.t[0] {
            return self.y.column(0).into_owned();
        }
        if t_query >= self.t[m - 1] {
            return self.y.column(m - 1).into_owned();
        }
        let mut i = self.t.as_slice().partition_point(|&tk| tk <= t_query);
        i = i.saturating_sub(1).min(m - 2);
        let h = self.t[i + 1] - self.t[i];
        let tau = (t_query - self.t[i]) / h;
        let y0 = self.y.column(i);
        let y1 = self.y.column(i + 1);
        let f0 = self.yp.column(i);
        let f1 = self.yp.column(i + 1);
        // Cubic Hermite basis in the local coordinate tau.
        let h00 = (1.0 + 2.0 * tau) * (1.0 - tau) * (1.0 - tau);
        let h10 = tau * (1.0 - tau) * (1.0 - tau);
        let h01 = tau * tau * (3.0 - 2.0 * tau);
        let h11 = tau * tau * (tau - 1.0);
        h00 * y0 + (h * h10) * f0 + h01 * y1 + (h * h11) * f1
    }
}

/// Black-box interface of the external initial-value-problem solver.
pub trait IvpSolver {
    fn solve(
        &self,
        f: &dyn Fn(f64, &DVector<f64>) -> DVector<f64>,
        y0: DVector<f64>,
        t0: f64,
        t1: f64,
    ) -> IvpSolution;
}

/// Fixed-step classical Runge-Kutta integrator.
#[derive(Debug, Clone)]
pub struct Rk4Ivp {
    pub step_size: f64,
}

impl Rk4Ivp {
    pub fn new(step_size: f64) -> Self {
        Rk4Ivp { step_size }
    }
}

impl Default for Rk4Ivp {
    fn default() -> Self {
        Rk4Ivp { step_size: 1e-2 }
    }
}

impl IvpSolver for Rk4Ivp {
    fn solve(
        &self,
        f: &dyn Fn(f64, &DVector<f64>) -> DVector<f64>,
        y0: DVector<f64>,
        t0: f64,
        t1: f64,
    ) -> IvpSolution {
        let dim = y0.len();
        // Degenerate span: the trajectory is the initial state.
        if (t1 - t0).abs() < f64::EPSILON {
            let yp0 = f(t0, &y0);
            return IvpSolution {
                t: DVector::from_vec(vec![t0]),
                y: DMatrix::from_column_slice(dim, 1, y0.as_slice()),
                yp: DMatrix::from_column_slice(dim, 1, yp0.as_slice()),
            };
        }

        let n_steps = ((t1 - t0) / self.step_size).ceil() as usize;
        debug!("RK4: integrating [{}, {}] in {} steps", t0, t1, n_steps);
        let mut t_nodes = Vec::with_capacity(n_steps + 1);
        let mut y = DMatrix::zeros(dim, n_steps + 1);
        let mut yp = DMatrix::zeros(dim, n_steps + 1);

        let mut t = t0;
        let mut state = y0;
        t_nodes.push(t);
        y.set_column(0, &state);
        yp.set_column(0, &f(t, &state));

        for step in 0..n_steps {
            let h = self.step_size.min(t1 - t);
            let k1 = f(t, &state);
            let k2 = f(t + h / 2.0, &(&state + (h / 2.0) * &k1));
            let k3 = f(t + h / 2.0, &(&state + (h / 2.0) * &k2));
            let k4 = f(t + h, &(&state + h * &k3));
            state += (h / 6.0) * (k1 + 2.0 * k2 + 2.0 * k3 + k4);
            t += h;
            t_nodes.push(t);
            y.set_column(step + 1, &state);
            yp.set_column(step + 1, &f(t, &state));
        }

        IvpSolution {
            t: DVector::from_vec(t_nodes),
            y,
            yp,
        }
    }
}

/////////////////////////////////////////////////////////////////////////
//          tests
//////////////////////////////////////////////////////////////////////////
