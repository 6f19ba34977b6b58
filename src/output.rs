/*!
Retained draws of a chain.

[`ChainOutput`] is sized for the number of retained draws up front and filled in retained-draw
order by [`ChainOutput::push`]. The arrays are laid out **draw × unit × coordinate** for the
per-unit quantities and **draw × entry** for the population parameters:

- `mu`: `[mu1, mu2]`
- `sigma`: `[Σ11, Σ12, Σ22]`
- `w`: `(W1, W2)` of every stored unit (regular, X1-homogeneous, X0-homogeneous)
- `w_pred`: posterior-predictive `(W1, W2)` for the same units

[`ChainOutput::to_flat`] exports everything as the flat, retained-draw-major buffers used by
callers that do not want `ndarray`.
*/

use ndarray::{s, Array1, Array2, Array3, Axis};

use crate::error::EcoError;
use crate::linalg::{Mat2, Vec2};

/// Everything recorded at one retained iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct Draw {
    pub mu: Vec2,
    pub sigma: Mat2,
    /// `W` of the stored units.
    pub w: Vec<Vec2>,
    /// Posterior-predictive `W`, one per stored unit.
    pub w_pred: Option<Vec<Vec2>>,
}

/// Retained draws, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    pub mu: Option<Array2<f64>>,
    pub sigma: Option<Array2<f64>>,
    pub w: Array3<f64>,
    pub w_pred: Option<Array3<f64>>,
    n_draws: usize,
}

/// The output as flat buffers, one entry per retained draw for the parameters and
/// `n_draws × n_units` entries (draw-major) for the per-unit values. Buffers that were not
/// requested are empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatOutput {
    pub mu0: Vec<f64>,
    pub mu1: Vec<f64>,
    pub sigma00: Vec<f64>,
    pub sigma01: Vec<f64>,
    pub sigma11: Vec<f64>,
    pub w1: Vec<f64>,
    pub w2: Vec<f64>,
    pub wt1: Vec<f64>,
    pub wt2: Vec<f64>,
}

impl ChainOutput {
    /// Allocates room for `capacity` draws of `n_units` stored units.
    pub fn new(capacity: usize, n_units: usize, store_parameters: bool, predict: bool) -> Self {
        Self {
            mu: store_parameters.then(|| Array2::zeros((capacity, 2))),
            sigma: store_parameters.then(|| Array2::zeros((capacity, 3))),
            w: Array3::zeros((capacity, n_units, 2)),
            w_pred: predict.then(|| Array3::zeros((capacity, n_units, 2))),
            n_draws: 0,
        }
    }

    /// Builds a finalized output from a sequence of draws.
    pub fn from_draws(
        draws: &[Draw],
        n_units: usize,
        store_parameters: bool,
        predict: bool,
    ) -> Result<Self, EcoError> {
        let mut output = Self::new(draws.len(), n_units, store_parameters, predict);
        for draw in draws {
            output.push(draw)?;
        }
        Ok(output)
    }

    /// Appends the next retained draw.
    pub fn push(&mut self, draw: &Draw) -> Result<(), EcoError> {
        let capacity = self.w.len_of(Axis(0));
        if self.n_draws >= capacity {
            return Err(EcoError::BufferLength {
                name: "retained draws",
                expected: capacity,
                actual: self.n_draws + 1,
            });
        }
        let n_units = self.n_units();
        if draw.w.len() != n_units {
            return Err(EcoError::DimensionMismatch {
                expected: n_units,
                actual: draw.w.len(),
            });
        }
        let k = self.n_draws;

        if let Some(mu) = self.mu.as_mut() {
            mu.row_mut(k).assign(&Array1::from(draw.mu.to_vec()));
        }
        if let Some(sigma) = self.sigma.as_mut() {
            sigma
                .row_mut(k)
                .assign(&Array1::from(draw.sigma.unique_entries().to_vec()));
        }
        write_units(self.w.slice_mut(s![k, .., ..]), &draw.w);
        if let Some(w_pred) = self.w_pred.as_mut() {
            let pred = draw.w_pred.as_deref().ok_or_else(|| {
                EcoError::InvalidConfig("draw carries no predictive values".to_string())
            })?;
            if pred.len() != n_units {
                return Err(EcoError::DimensionMismatch {
                    expected: n_units,
                    actual: pred.len(),
                });
            }
            write_units(w_pred.slice_mut(s![k, .., ..]), pred);
        }

        self.n_draws += 1;
        Ok(())
    }

    pub fn n_draws(&self) -> usize {
        self.n_draws
    }

    pub fn n_units(&self) -> usize {
        self.w.len_of(Axis(1))
    }

    /// Posterior mean of `mu` over the retained draws.
    pub fn mean_mu(&self) -> Option<Array1<f64>> {
        self.mu
            .as_ref()
            .and_then(|mu| mu.slice(s![..self.n_draws, ..]).mean_axis(Axis(0)))
    }

    /// Posterior mean of `W` per unit, `n_units × 2`.
    pub fn mean_w(&self) -> Option<Array2<f64>> {
        self.w.slice(s![..self.n_draws, .., ..]).mean_axis(Axis(0))
    }

    pub fn to_flat(&self) -> FlatOutput {
        let n = self.n_draws;
        let column = |a: &Option<Array2<f64>>, j: usize| -> Vec<f64> {
            a.as_ref()
                .map(|a| a.slice(s![..n, j]).to_vec())
                .unwrap_or_default()
        };
        let unit_coord = |a: &Array3<f64>, j: usize| -> Vec<f64> {
            a.slice(s![..n, .., j]).iter().copied().collect()
        };
        FlatOutput {
            mu0: column(&self.mu, 0),
            mu1: column(&self.mu, 1),
            sigma00: column(&self.sigma, 0),
            sigma01: column(&self.sigma, 1),
            sigma11: column(&self.sigma, 2),
            w1: unit_coord(&self.w, 0),
            w2: unit_coord(&self.w, 1),
            wt1: self
                .w_pred
                .as_ref()
                .map(|a| unit_coord(a, 0))
                .unwrap_or_default(),
            wt2: self
                .w_pred
                .as_ref()
                .map(|a| unit_coord(a, 1))
                .unwrap_or_default(),
        }
    }
}

fn write_units(mut dst: ndarray::ArrayViewMut2<f64>, values: &[Vec2]) {
    for (mut row, v) in dst.axis_iter_mut(Axis(0)).zip(values) {
        row[0] = v[0];
        row[1] = v[1];
    }
}
