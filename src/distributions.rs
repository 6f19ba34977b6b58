/*!
Densities and random variates used by the ecological-inference chain.

Latent proportions `W ∈ (0,1)²` are modeled through their logit transform `W* = logit(W)`, which
is bivariate normal with mean `mu` and covariance `Sigma`. Densities on the proportion scale are
therefore the normal log-density of `W*` minus the log-Jacobian of the logit map,
`Σ_j [ln w_j + ln(1 - w_j)]`. The same formula drives the grid sampler and both Metropolis
samplers.

Every random variate takes an explicit `&mut R: Rng` so that callers control the stream.

## Example

```rust
use eco_mcmc::distributions::{inv_logit, logit, BivariateNormal};
use eco_mcmc::linalg::Mat2;

let normal = BivariateNormal::from_precision([0.0, 0.0], Mat2::identity()).unwrap();
let lp = normal.logp_proportions([0.5, 0.5]);
// At the center the Jacobian term is -2 ln(1/4).
assert!((lp - (-(2.0 * std::f64::consts::PI).ln() + 2.0 * 4.0_f64.ln())).abs() < 1e-12);
assert!((inv_logit(logit(0.3)) - 0.3).abs() < 1e-12);
```
*/

use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::{ChiSquared, Gamma, StandardNormal};
use std::f64::consts::PI;

use crate::error::EcoError;
use crate::linalg::{self, Mat2, Vec2};

/// Observed proportions equal to exactly 0 or 1 are moved this far into the open interval.
pub const OBSERVED_EPS: f64 = 1e-4;

/// Grid coordinates are kept at least this far from 0 and 1.
pub const GRID_EPS: f64 = 1e-12;

/// Moves an observed proportion of exactly 0 or 1 to `OBSERVED_EPS` / `1 - OBSERVED_EPS`.
pub fn clamp_observed(w: f64) -> f64 {
    if w == 0.0 {
        OBSERVED_EPS
    } else if w == 1.0 {
        1.0 - OBSERVED_EPS
    } else {
        w
    }
}

/// Clamps into `[GRID_EPS, 1 - GRID_EPS]`.
pub fn clamp_open(w: f64) -> f64 {
    w.clamp(GRID_EPS, 1.0 - GRID_EPS)
}

#[inline]
pub fn logit(p: f64) -> f64 {
    p.ln() - (1.0 - p).ln()
}

#[inline]
pub fn inv_logit(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

pub fn logit2(w: Vec2) -> Vec2 {
    [logit(w[0]), logit(w[1])]
}

pub fn inv_logit2(x: Vec2) -> Vec2 {
    [inv_logit(x[0]), inv_logit(x[1])]
}

/// `Σ_j [ln w_j + ln(1 - w_j)]`, the log-Jacobian of the logit map.
#[inline]
pub fn logit_log_jacobian(w: &[f64]) -> f64 {
    w.iter().map(|&p| p.ln() + (1.0 - p).ln()).sum()
}

/**
A bivariate normal parameterized by its mean and precision (inverse covariance), with the
log-normalization constant precomputed.

The chain caches `Sigma⁻¹` alongside `Sigma`, so construction from the precision avoids an extra
inversion per density evaluation.
*/
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BivariateNormal {
    pub mean: Vec2,
    pub precision: Mat2,
    norm_const: f64,
}

impl BivariateNormal {
    pub fn from_precision(mean: Vec2, precision: Mat2) -> Result<Self, EcoError> {
        let det = precision.det();
        if !(det > 0.0) || !precision.is_finite() {
            return Err(EcoError::NotPositiveDefinite("precision matrix"));
        }
        // -(d/2) ln(2π) + (1/2) ln|Σ⁻¹| with d = 2
        let norm_const = -(2.0 * PI).ln() + 0.5 * det.ln();
        Ok(Self {
            mean,
            precision,
            norm_const,
        })
    }

    /// Normalized log-density at `x`.
    pub fn logp(&self, x: Vec2) -> f64 {
        let diff = linalg::sub(x, self.mean);
        self.norm_const - 0.5 * self.precision.quad_form(diff)
    }

    /// Log-density of proportions `w` whose logit is distributed as `self`.
    pub fn logp_proportions(&self, w: Vec2) -> f64 {
        self.logp(logit2(w)) - logit_log_jacobian(&w)
    }
}

/// A multivariate normal in arbitrary dimension, parameterized by mean and precision.
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateNormal {
    pub mean: Array1<f64>,
    pub precision: Array2<f64>,
    norm_const: f64,
}

impl MultivariateNormal {
    pub fn from_precision(mean: Array1<f64>, precision: Array2<f64>) -> Result<Self, EcoError> {
        let dim = mean.len();
        if precision.nrows() != dim || precision.ncols() != dim {
            return Err(EcoError::DimensionMismatch {
                expected: dim,
                actual: precision.nrows(),
            });
        }
        let lower = linalg::cholesky_lower(&precision)
            .ok_or(EcoError::NotPositiveDefinite("precision matrix"))?;
        let norm_const =
            -0.5 * dim as f64 * (2.0 * PI).ln() + 0.5 * linalg::log_det_from_cholesky(&lower);
        Ok(Self {
            mean,
            precision,
            norm_const,
        })
    }

    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn logp(&self, x: ArrayView1<f64>) -> f64 {
        let diff = &x - &self.mean;
        self.norm_const - 0.5 * linalg::quad_form(&self.precision, diff.view())
    }

    pub fn logp_proportions(&self, w: &[f64]) -> f64 {
        let x: Array1<f64> = w.iter().map(|&p| logit(p)).collect();
        self.logp(x.view()) - logit_log_jacobian(w)
    }
}

/// Draws from `Normal(mean, sd²)`.
pub fn sample_normal<R: Rng>(rng: &mut R, mean: f64, sd: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    mean + sd * z
}

/// Draws from a bivariate normal with the given covariance via its Cholesky factor.
pub fn sample_mvn2<R: Rng>(rng: &mut R, mean: Vec2, cov: &Mat2) -> Result<Vec2, EcoError> {
    let lower = cov
        .cholesky()
        .ok_or(EcoError::NotPositiveDefinite("covariance matrix"))?;
    let z = [rng.sample(StandardNormal), rng.sample(StandardNormal)];
    let lz = lower.mul_vec(z);
    Ok([mean[0] + lz[0], mean[1] + lz[1]])
}

/**
Draws a 2×2 Wishart matrix with `df` degrees of freedom and the given scale, using the Bartlett
decomposition `W = L A Aᵀ Lᵀ` where `L Lᵀ = scale`, `A` is lower triangular with
`A_ii = sqrt(χ²(df - i))` and standard normal entries below the diagonal.

Requires `df > 1`.
*/
pub fn sample_wishart2<R: Rng>(
    rng: &mut R,
    df: f64,
    scale: &Mat2,
) -> Result<Mat2, EcoError> {
    let lower = scale
        .cholesky()
        .ok_or(EcoError::NotPositiveDefinite("Wishart scale matrix"))?;
    let chi_first = ChiSquared::new(df)
        .map_err(|e| EcoError::InvalidPrior(format!("Wishart degrees of freedom {df}: {e}")))?;
    let chi_second = ChiSquared::new(df - 1.0)
        .map_err(|e| EcoError::InvalidPrior(format!("Wishart degrees of freedom {df}: {e}")))?;
    let a11 = rng.sample(chi_first).sqrt();
    let a21: f64 = rng.sample(StandardNormal);
    let a22 = rng.sample(chi_second).sqrt();
    let bartlett = Mat2::new(a11, 0.0, a21, a22);
    let la = lower.mul(&bartlett);
    Ok(la.mul(&la.transpose()))
}

/// Draws from `Dirichlet(alpha)` by normalizing independent `Gamma(alpha_j, 1)` draws.
pub fn sample_dirichlet<R: Rng>(rng: &mut R, alpha: &[f64]) -> Result<Vec<f64>, EcoError> {
    let mut draws = Vec::with_capacity(alpha.len());
    for &a in alpha {
        let gamma = Gamma::new(a, 1.0)
            .map_err(|e| EcoError::InvalidConfig(format!("Dirichlet parameter {a}: {e}")))?;
        draws.push(rng.sample(gamma));
    }
    let total: f64 = draws.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(EcoError::DegenerateDensity(
            "Dirichlet gamma draws summed to zero".to_string(),
        ));
    }
    Ok(draws.into_iter().map(|g| g / total).collect())
}

/// Inverse-CDF categorical draw: the smallest index whose cumulative probability is at least
/// `u`. Rounding in the last cumulative entry can leave it slightly below 1; the last index is
/// returned in that case.
pub fn categorical_from_cumulative(cumulative: &[f64], u: f64) -> usize {
    let last = cumulative.len().saturating_sub(1);
    cumulative.iter().position(|&c| u <= c).unwrap_or(last)
}
