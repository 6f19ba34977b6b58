/*!
Normal-Inverse-Wishart conjugate update of the population hyperparameters.

Model for the logit-scale latent values `W*_i`, `i = 1..T`:

```text
W*_i | mu, Sigma ~ N(mu, Sigma)
mu   | Sigma     ~ N(mu0, Sigma / tau0)
Sigma            ~ InvWishart(nu0, S0⁻¹)
```

Given all `T` current values, [`niw_update`] draws `(mu, Sigma)` exactly from the joint posterior:
first `Sigma⁻¹ ~ Wishart(nu0 + T, Sn⁻¹)`, then `mu ~ N(mun, Sigma / (tau0 + T))`.
*/

use rand::Rng;

use crate::distributions::{sample_mvn2, sample_wishart2, BivariateNormal};
use crate::error::EcoError;
use crate::linalg::{Mat2, Vec2};

/// Redraws allowed when a Wishart draw comes back numerically indefinite.
const MAX_WISHART_REDRAWS: usize = 10;

/// Fixed prior hyperparameters `(mu0, tau0, nu0, S0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    pub mu0: Vec2,
    pub tau0: f64,
    pub nu0: f64,
    pub s0: Mat2,
}

impl Prior {
    /// Validates and builds a prior. `tau0` must be positive, `nu0` must exceed 1 (the
    /// dimension minus one) and `s0` must be symmetric positive definite.
    pub fn new(mu0: Vec2, tau0: f64, nu0: f64, s0: Mat2) -> Result<Self, EcoError> {
        if !mu0.iter().all(|m| m.is_finite()) {
            return Err(EcoError::InvalidPrior(format!("mu0 must be finite, got {mu0:?}")));
        }
        if !(tau0 > 0.0) || !tau0.is_finite() {
            return Err(EcoError::InvalidPrior(format!(
                "tau0 must be positive, got {tau0}"
            )));
        }
        if !(nu0 > 1.0) || !nu0.is_finite() {
            return Err(EcoError::InvalidPrior(format!("nu0 must exceed 1, got {nu0}")));
        }
        if (s0.get(0, 1) - s0.get(1, 0)).abs() > 1e-12 * (1.0 + s0.get(0, 1).abs()) {
            return Err(EcoError::InvalidPrior("S0 must be symmetric".to_string()));
        }
        if !s0.is_positive_definite() {
            return Err(EcoError::NotPositiveDefinite("prior scale S0"));
        }
        Ok(Self { mu0, tau0, nu0, s0 })
    }
}

impl Default for Prior {
    /// A weakly informative prior: `mu0 = 0`, `tau0 = 2`, `nu0 = 4`, `S0 = 10·I`.
    fn default() -> Self {
        Self {
            mu0: [0.0, 0.0],
            tau0: 2.0,
            nu0: 4.0,
            s0: Mat2::identity().scale(10.0),
        }
    }
}

/// Current population mean and covariance of `W*`, with the cached precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PopulationParams {
    pub mu: Vec2,
    pub sigma: Mat2,
    pub inv_sigma: Mat2,
}

impl PopulationParams {
    pub fn new(mu: Vec2, sigma: Mat2) -> Result<Self, EcoError> {
        if !sigma.is_positive_definite() {
            return Err(EcoError::NotPositiveDefinite("Sigma"));
        }
        let inv_sigma = sigma
            .inverse()
            .ok_or(EcoError::NotPositiveDefinite("Sigma"))?;
        Ok(Self {
            mu,
            sigma,
            inv_sigma,
        })
    }

    /// Chain starting point `(mu0, S0)`.
    pub fn from_prior(prior: &Prior) -> Result<Self, EcoError> {
        Self::new(prior.mu0, prior.s0)
    }

    /// The logit-scale normal these parameters describe.
    pub fn normal(&self) -> Result<BivariateNormal, EcoError> {
        BivariateNormal::from_precision(self.mu, self.inv_sigma)
    }
}

/// Sample mean and centered scatter matrix of `values`.
pub fn mean_and_scatter(values: &[Vec2]) -> (Vec2, Mat2) {
    let n = values.len() as f64;
    let mut mean = [0.0, 0.0];
    for v in values {
        mean[0] += v[0];
        mean[1] += v[1];
    }
    mean[0] /= n;
    mean[1] /= n;
    let mut scatter = Mat2::zeros();
    for v in values {
        let d = [v[0] - mean[0], v[1] - mean[1]];
        scatter = scatter.add(&Mat2::outer(d, d));
    }
    (mean, scatter)
}

/// Calls `draw` until it returns a precision whose inverse is also positive definite, allowing
/// `MAX_WISHART_REDRAWS` redraws after the first draw. Returns `(Sigma⁻¹, Sigma)`.
fn draw_positive_definite<F>(mut draw: F) -> Result<(Mat2, Mat2), EcoError>
where
    F: FnMut() -> Result<Mat2, EcoError>,
{
    let mut redraws = 0;
    loop {
        let inv_sigma = draw()?;
        if let Some(sigma) = inv_sigma.inverse().map(|s| s.symmetrize()) {
            if inv_sigma.is_positive_definite() && sigma.is_positive_definite() {
                return Ok((inv_sigma, sigma));
            }
        }
        if redraws >= MAX_WISHART_REDRAWS {
            return Err(EcoError::NotPositiveDefinite("sampled Sigma"));
        }
        redraws += 1;
        log::warn!("Wishart draw was not positive definite, redraw {redraws}");
    }
}

/**
Draws `(mu, Sigma)` from the NIW posterior given the logit-scale values `wstar` of all effective
units.

```text
W̄   = mean(W*)
Sn  = S0 + Σ (W*_i - W̄)(W*_i - W̄)ᵀ + (tau0·T / (tau0 + T)) (W̄ - mu0)(W̄ - mu0)ᵀ
mun = (tau0·mu0 + T·W̄) / (tau0 + T)
Sigma⁻¹ ~ Wishart(nu0 + T, Sn⁻¹)
mu      ~ N(mun, Sigma / (tau0 + T))
```

`Sigma` is drawn before `mu` because the covariance of `mu` depends on it. A Wishart draw that
fails its Cholesky check is redrawn (at most `MAX_WISHART_REDRAWS` times).
*/
pub fn niw_update<R: Rng>(
    rng: &mut R,
    wstar: &[Vec2],
    prior: &Prior,
) -> Result<PopulationParams, EcoError> {
    if wstar.is_empty() {
        return Err(EcoError::InvalidConfig(
            "posterior update needs at least one unit".to_string(),
        ));
    }
    let t = wstar.len() as f64;
    let (wbar, scatter) = mean_and_scatter(wstar);
    let d = [wbar[0] - prior.mu0[0], wbar[1] - prior.mu0[1]];
    let shrink = prior.tau0 * t / (prior.tau0 + t);
    let sn = prior
        .s0
        .add(&scatter)
        .add(&Mat2::outer(d, d).scale(shrink))
        .symmetrize();
    let mun = [
        (prior.tau0 * prior.mu0[0] + t * wbar[0]) / (prior.tau0 + t),
        (prior.tau0 * prior.mu0[1] + t * wbar[1]) / (prior.tau0 + t),
    ];
    let sn_inv = sn
        .inverse()
        .ok_or(EcoError::NotPositiveDefinite("posterior scale Sn"))?
        .symmetrize();

    let df = prior.nu0 + t;
    let (inv_sigma, sigma) =
        draw_positive_definite(|| Ok(sample_wishart2(rng, df, &sn_inv)?.symmetrize()))?;

    let mu = sample_mvn2(rng, mun, &sigma.scale(1.0 / (prior.tau0 + t)))?;
    Ok(PopulationParams {
        mu,
        sigma,
        inv_sigma,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn sample_points(n: usize, seed: u64) -> Vec<Vec2> {
        let mut rng = SmallRng::seed_from_u64(seed);
        let cov = Mat2::new(0.5, 0.2, 0.2, 0.8);
        (0..n)
            .map(|_| sample_mvn2(&mut rng, [1.0, -0.5], &cov).unwrap())
            .collect()
    }

    #[test]
    fn prior_validation() {
        let s0 = Mat2::identity();
        assert!(Prior::new([0.0, 0.0], 1.0, 4.0, s0).is_ok());
        assert!(Prior::new([0.0, 0.0], 0.0, 4.0, s0).is_err());
        assert!(Prior::new([0.0, 0.0], 1.0, 1.0, s0).is_err());
        assert!(Prior::new([f64::NAN, 0.0], 1.0, 4.0, s0).is_err());
        assert!(Prior::new([0.0, 0.0], 1.0, 4.0, Mat2::new(1.0, 2.0, 2.0, 1.0)).is_err());
        assert!(Prior::new([0.0, 0.0], 1.0, 4.0, Mat2::new(1.0, 0.1, 0.0, 1.0)).is_err());
    }

    #[test]
    fn scatter_of_known_points() {
        let (mean, scatter) = mean_and_scatter(&[[0.0, 0.0], [2.0, 2.0], [1.0, -2.0]]);
        assert_abs_diff_eq!(mean[0], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(mean[1], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scatter.get(0, 0), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scatter.get(0, 1), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(scatter.get(1, 1), 8.0, epsilon = 1e-12);
    }

    #[test]
    fn update_is_reproducible_for_fixed_seed() {
        let data = sample_points(50, 1);
        let prior = Prior::default();
        let a = niw_update(&mut SmallRng::seed_from_u64(99), &data, &prior).unwrap();
        let b = niw_update(&mut SmallRng::seed_from_u64(99), &data, &prior).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn update_produces_positive_definite_sigma_and_its_inverse() {
        let data = sample_points(30, 2);
        let prior = Prior::default();
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..200 {
            let p = niw_update(&mut rng, &data, &prior).unwrap();
            assert!(p.sigma.is_positive_definite());
            let id = p.sigma.mul(&p.inv_sigma);
            assert_abs_diff_eq!(id.get(0, 0), 1.0, epsilon = 1e-9);
            assert_abs_diff_eq!(id.get(0, 1), 0.0, epsilon = 1e-9);
            assert!(p.mu.iter().all(|m| m.is_finite()));
        }
    }

    #[test]
    fn posterior_concentrates_on_data_moments() {
        let data = sample_points(5_000, 3);
        let (wbar, scatter) = mean_and_scatter(&data);
        let empirical_cov = scatter.scale(1.0 / data.len() as f64);
        let prior = Prior::default();
        let mut rng = SmallRng::seed_from_u64(11);

        let n = 500;
        let mut mu_acc = [0.0, 0.0];
        let mut sigma_acc = Mat2::zeros();
        for _ in 0..n {
            let p = niw_update(&mut rng, &data, &prior).unwrap();
            mu_acc[0] += p.mu[0];
            mu_acc[1] += p.mu[1];
            sigma_acc = sigma_acc.add(&p.sigma);
        }
        assert_abs_diff_eq!(mu_acc[0] / n as f64, wbar[0], epsilon = 0.02);
        assert_abs_diff_eq!(mu_acc[1] / n as f64, wbar[1], epsilon = 0.02);
        let sigma_mean = sigma_acc.scale(1.0 / n as f64);
        for r in 0..2 {
            for c in 0..2 {
                assert_abs_diff_eq!(sigma_mean.get(r, c), empirical_cov.get(r, c), epsilon = 0.03);
            }
        }
    }

    #[test]
    fn indefinite_draws_are_redrawn() {
        let mut calls = 0;
        let (inv_sigma, sigma) = draw_positive_definite(|| {
            calls += 1;
            Ok(if calls < 4 {
                Mat2::new(1.0, 2.0, 2.0, 1.0)
            } else {
                Mat2::new(2.0, 0.0, 0.0, 4.0)
            })
        })
        .unwrap();
        assert_eq!(calls, 4);
        assert_eq!(inv_sigma, Mat2::new(2.0, 0.0, 0.0, 4.0));
        assert_abs_diff_eq!(sigma.get(1, 1), 0.25, epsilon = 1e-12);
    }

    #[test]
    fn redraw_budget_is_bounded() {
        let mut calls = 0;
        let err = draw_positive_definite(|| {
            calls += 1;
            Ok(Mat2::new(1.0, 2.0, 2.0, 1.0))
        })
        .unwrap_err();
        assert_eq!(err, EcoError::NotPositiveDefinite("sampled Sigma"));
        assert_eq!(calls, 1 + MAX_WISHART_REDRAWS);
    }

    #[test]
    fn empty_input_is_rejected() {
        let mut rng = SmallRng::seed_from_u64(0);
        assert!(niw_update(&mut rng, &[], &Prior::default()).is_err());
    }
}
