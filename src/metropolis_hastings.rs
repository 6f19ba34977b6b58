/*!
# Metropolis–Hastings samplers for latent cell proportions.

Alternatives to the grid sampler for when discretizing the feasible set is impractical. Both
variants use an independence proposal that is uniform over the feasible set, so the proposal
density cancels and the acceptance probability is

```text
ratio = min(1, exp(logp(proposal) - logp(current)))
```

with `logp` the logit-normal density minus the logit Jacobian (see
[`crate::distributions::BivariateNormal::logp_proportions`]). A proposal is accepted when
`u < ratio` for `u ~ U(0,1)`; on rejection the current state is returned unchanged.

- [`metropolis_step_2x2`]: proposes `W1 ~ U(min_w1, max_w1)` and pairs it with the `W2` on the
  unit's tomography line.
- [`metropolis_step_rxc`]: for an R×C generalization, proposes a `Dirichlet(1, …, 1)` point
  restricted by rejection to per-cell bounds, then rescales it to the unit's margins.
- [`TomographyMetropolis`]: a stand-alone chain on one line, usable with
  [`crate::core::run_chain`].

## Example

```rust
use eco_mcmc::core::{run_chain, Schedule};
use eco_mcmc::distributions::BivariateNormal;
use eco_mcmc::linalg::Mat2;
use eco_mcmc::metropolis_hastings::TomographyMetropolis;
use eco_mcmc::tomography::TomographyLine;

let line = TomographyLine::new(0.4, 0.6).unwrap();
let normal = BivariateNormal::from_precision([0.0, 0.0], Mat2::identity()).unwrap();
let mut chain = TomographyMetropolis::new(line, normal).seed(42);
let draws = run_chain(&mut chain, Schedule::new(1_000, 100, 1)).unwrap();
assert_eq!(draws.len(), 900);
assert!(chain.acceptance_rate() > 0.0);
```
*/

use ndarray::{Array1, Array2};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::core::MarkovChain;
use crate::distributions::{sample_dirichlet, BivariateNormal, MultivariateNormal};
use crate::error::EcoError;
use crate::linalg::Vec2;
use crate::tomography::TomographyLine;

/// Default budget for the Dirichlet rejection step of the R×C proposal.
pub const DEFAULT_MAX_PROPOSAL_ATTEMPTS: usize = 100_000;

/// The result of one Metropolis–Hastings step.
#[derive(Debug, Clone, PartialEq)]
pub struct MetropolisOutcome<S> {
    /// The state after the step: the proposal if accepted, else the previous state.
    pub state: S,
    pub accepted: bool,
    /// Acceptance probability in `[0, 1]`.
    pub ratio: f64,
}

/**
`min(1, exp(log_proposed - log_current))`, always in `[0, 1]`.

A proposal with NaN or `-∞` log-density is never accepted; a finite proposal always replaces a
current state whose density is `-∞` or NaN.
*/
pub fn acceptance_ratio(log_proposed: f64, log_current: f64) -> f64 {
    if log_proposed.is_nan() || log_proposed == f64::NEG_INFINITY {
        return 0.0;
    }
    if log_current.is_nan() || log_current == f64::NEG_INFINITY {
        return 1.0;
    }
    (log_proposed - log_current).exp().min(1.0)
}

fn in_open_unit_interval(w: &[f64]) -> bool {
    w.iter().all(|&p| p > 0.0 && p < 1.0)
}

/// One uniform-proposal Metropolis step along a 2×2 tomography line.
pub fn metropolis_step_2x2<R: Rng>(
    rng: &mut R,
    current: Vec2,
    line: &TomographyLine,
    normal: &BivariateNormal,
) -> MetropolisOutcome<Vec2> {
    let b = line.bounds;
    let w1 = b.min_w1 + rng.random::<f64>() * b.width();
    let proposal = line.point(w1);

    let log_proposed = if in_open_unit_interval(&proposal) {
        normal.logp_proportions(proposal)
    } else {
        f64::NEG_INFINITY
    };
    let log_current = if in_open_unit_interval(&current) {
        normal.logp_proportions(current)
    } else {
        f64::NEG_INFINITY
    };
    let ratio = acceptance_ratio(log_proposed, log_current);

    let u: f64 = rng.random();
    if u < ratio {
        MetropolisOutcome {
            state: proposal,
            accepted: true,
            ratio,
        }
    } else {
        MetropolisOutcome {
            state: current,
            accepted: false,
            ratio,
        }
    }
}

/// An areal unit of an R×C table, as seen by [`metropolis_step_rxc`].
#[derive(Debug, Clone, PartialEq)]
pub struct RxcUnit {
    /// Unit total, the numerator of the rescaling `W_j = Z_j · total / margins[j]`.
    pub total: f64,
    /// Per-cell margins.
    pub margins: Vec<f64>,
    /// Lower bounds on the simplex proposal, one per cell.
    pub z_min: Vec<f64>,
    /// Upper bounds on the simplex proposal, one per cell.
    pub z_max: Vec<f64>,
}

impl RxcUnit {
    pub fn new(
        total: f64,
        margins: Vec<f64>,
        z_min: Vec<f64>,
        z_max: Vec<f64>,
    ) -> Result<Self, EcoError> {
        let dim = margins.len();
        for len in [z_min.len(), z_max.len()] {
            if len != dim {
                return Err(EcoError::DimensionMismatch {
                    expected: dim,
                    actual: len,
                });
            }
        }
        if !(total > 0.0) || margins.iter().any(|&m| !(m > 0.0)) {
            return Err(EcoError::InvalidConfig(
                "R×C unit total and margins must be positive".to_string(),
            ));
        }
        if z_min.iter().zip(&z_max).any(|(lo, hi)| lo > hi) {
            return Err(EcoError::InvalidConfig(
                "R×C lower bound exceeds upper bound".to_string(),
            ));
        }
        Ok(Self {
            total,
            margins,
            z_min,
            z_max,
        })
    }

    pub fn dim(&self) -> usize {
        self.margins.len()
    }

    /// Whether every cell of `z` lies within its bounds.
    pub fn admits(&self, z: &[f64]) -> bool {
        z.iter()
            .zip(self.z_min.iter().zip(&self.z_max))
            .all(|(v, (lo, hi))| v >= lo && v <= hi)
    }
}

/**
One Metropolis step for an R×C unit.

A `Dirichlet(1, …, 1)` point `Z` is redrawn until every cell lies in `[z_min, z_max]` (at most
`max_attempts` draws), then rescaled to `W_j = Z_j · total / margins[j]`. The acceptance ratio
uses the logit-normal density of `W` summed over cells, exactly as in the 2×2 case.
*/
pub fn metropolis_step_rxc<R: Rng>(
    rng: &mut R,
    current: &[f64],
    unit: &RxcUnit,
    normal: &MultivariateNormal,
    max_attempts: usize,
) -> Result<MetropolisOutcome<Vec<f64>>, EcoError> {
    let dim = unit.dim();
    for len in [current.len(), normal.dim()] {
        if len != dim {
            return Err(EcoError::DimensionMismatch {
                expected: dim,
                actual: len,
            });
        }
    }

    let alpha = vec![1.0; dim];
    let mut attempts = 0;
    let z = loop {
        if attempts >= max_attempts {
            return Err(EcoError::ProposalExhausted { attempts });
        }
        attempts += 1;
        let z = sample_dirichlet(rng, &alpha)?;
        if unit.admits(&z) {
            break z;
        }
    };
    log::trace!("R×C proposal admitted after {attempts} attempts");

    let proposal: Vec<f64> = z
        .iter()
        .zip(&unit.margins)
        .map(|(zj, m)| zj * unit.total / m)
        .collect();

    let log_density = |w: &[f64]| {
        if in_open_unit_interval(w) {
            normal.logp_proportions(w)
        } else {
            f64::NEG_INFINITY
        }
    };
    let ratio = acceptance_ratio(log_density(proposal.as_slice()), log_density(current));

    let u: f64 = rng.random();
    Ok(if u < ratio {
        MetropolisOutcome {
            state: proposal,
            accepted: true,
            ratio,
        }
    } else {
        MetropolisOutcome {
            state: current.to_vec(),
            accepted: false,
            ratio,
        }
    })
}

/**
A Metropolis chain on a single tomography line with fixed population parameters.

Each [`MarkovChain::step`] performs one [`metropolis_step_2x2`]. The chain starts at the line's
midpoint and tracks its acceptance rate.
*/
#[derive(Debug, Clone)]
pub struct TomographyMetropolis {
    pub line: TomographyLine,
    pub normal: BivariateNormal,
    pub current_state: Vec2,
    pub rng: SmallRng,
    n_steps: u64,
    n_accepted: u64,
}

impl TomographyMetropolis {
    pub fn new(line: TomographyLine, normal: BivariateNormal) -> Self {
        Self {
            line,
            normal,
            current_state: line.midpoint(),
            rng: SmallRng::seed_from_u64(rand::rng().random::<u64>()),
            n_steps: 0,
            n_accepted: 0,
        }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Fraction of accepted proposals so far; 0 before the first step.
    pub fn acceptance_rate(&self) -> f64 {
        if self.n_steps == 0 {
            0.0
        } else {
            self.n_accepted as f64 / self.n_steps as f64
        }
    }
}

impl MarkovChain for TomographyMetropolis {
    type State = Vec2;
    type Record = Vec2;

    fn step(&mut self) -> Result<(), EcoError> {
        let outcome =
            metropolis_step_2x2(&mut self.rng, self.current_state, &self.line, &self.normal);
        self.n_steps += 1;
        if outcome.accepted {
            self.n_accepted += 1;
        }
        self.current_state = outcome.state;
        Ok(())
    }

    fn current_state(&self) -> &Self::State {
        &self.current_state
    }

    fn current_record(&mut self) -> Result<Self::Record, EcoError> {
        Ok(self.current_state)
    }
}

/// Logit-normal precision and mean for the R×C sampler from plain slices.
pub fn rxc_normal(
    mean: &[f64],
    precision_row_major: &[f64],
) -> Result<MultivariateNormal, EcoError> {
    let dim = mean.len();
    if precision_row_major.len() != dim * dim {
        return Err(EcoError::DimensionMismatch {
            expected: dim * dim,
            actual: precision_row_major.len(),
        });
    }
    let precision = Array2::from_shape_vec((dim, dim), precision_row_major.to_vec())
        .map_err(|_| EcoError::DimensionMismatch {
            expected: dim * dim,
            actual: precision_row_major.len(),
        })?;
    MultivariateNormal::from_precision(Array1::from(mean.to_vec()), precision)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{run_chain, Schedule};
    use crate::linalg::Mat2;
    use crate::tomography::{TomographyGrid, DEFAULT_N_STEP};
    use approx::assert_abs_diff_eq;

    fn normal() -> BivariateNormal {
        BivariateNormal::from_precision([0.5, -0.3], Mat2::new(1.2, 0.3, 0.3, 0.9)).unwrap()
    }

    #[test]
    fn ratio_is_a_probability() {
        let cases = [
            (0.0, 0.0),
            (-1.0, 0.0),
            (3.0, -2.0),
            (-1e300, 1e300),
            (f64::NAN, 0.0),
            (0.0, f64::NAN),
            (f64::NEG_INFINITY, f64::NEG_INFINITY),
            (0.0, f64::NEG_INFINITY),
            (f64::INFINITY, 0.0),
        ];
        for (p, c) in cases {
            let r = acceptance_ratio(p, c);
            assert!((0.0..=1.0).contains(&r), "ratio {r} for ({p}, {c})");
        }
        assert_eq!(acceptance_ratio(1.0, 0.0), 1.0);
        assert_abs_diff_eq!(acceptance_ratio(-1.0, 0.0), (-1.0f64).exp(), epsilon = 1e-15);
        assert_eq!(acceptance_ratio(f64::NEG_INFINITY, 0.0), 0.0);
    }

    #[test]
    fn rejection_leaves_state_unchanged() {
        let line = TomographyLine::new(0.5, 0.5).unwrap();
        let n = normal();
        let mut rng = SmallRng::seed_from_u64(17);
        let mut current = line.midpoint();
        let mut seen_reject = false;
        for _ in 0..2_000 {
            let out = metropolis_step_2x2(&mut rng, current, &line, &n);
            assert!((0.0..=1.0).contains(&out.ratio));
            if !out.accepted {
                assert_eq!(out.state, current);
                seen_reject = true;
            }
            current = out.state;
        }
        assert!(seen_reject);
    }

    #[test]
    fn proposals_stay_on_the_line() {
        let line = TomographyLine::new(0.25, 0.6).unwrap();
        let n = normal();
        let mut rng = SmallRng::seed_from_u64(2);
        let mut current = line.midpoint();
        for _ in 0..1_000 {
            current = metropolis_step_2x2(&mut rng, current, &line, &n).state;
            assert!(line.bounds.contains(current[0]));
            assert_abs_diff_eq!(line.residual(current), 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn chain_matches_grid_distribution() {
        let line = TomographyLine::new(0.4, 0.45).unwrap();
        let n = normal();
        let grid = TomographyGrid::new(line, DEFAULT_N_STEP);
        let weights: Vec<f64> = grid
            .points
            .iter()
            .map(|&w| n.logp_proportions(w).exp())
            .collect();
        let total: f64 = weights.iter().sum();
        let grid_mean: f64 = grid
            .points
            .iter()
            .zip(&weights)
            .map(|(p, w)| p[0] * w / total)
            .sum();

        let mut chain = TomographyMetropolis::new(line, n).seed(42);
        let draws = run_chain(&mut chain, Schedule::new(60_000, 1_000, 1)).unwrap();
        let mcmc_mean = draws.iter().map(|w| w[0]).sum::<f64>() / draws.len() as f64;
        assert_abs_diff_eq!(mcmc_mean, grid_mean, epsilon = 0.01);
        let rate = chain.acceptance_rate();
        assert!(rate > 0.05 && rate <= 1.0, "acceptance rate {rate}");
    }

    #[test]
    fn rxc_candidates_respect_bounds_or_keep_state() {
        let unit = RxcUnit::new(
            0.5,
            vec![0.6, 0.7, 0.8],
            vec![0.1, 0.1, 0.1],
            vec![0.6, 0.6, 0.6],
        )
        .unwrap();
        let normal = rxc_normal(
            &[0.0, 0.0, 0.0],
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        )
        .unwrap();
        let mut rng = SmallRng::seed_from_u64(9);
        let mut current = vec![0.3, 0.3, 0.3];
        let mut n_accepted = 0;
        for _ in 0..500 {
            let previous = current.clone();
            let out = metropolis_step_rxc(
                &mut rng,
                &current,
                &unit,
                &normal,
                DEFAULT_MAX_PROPOSAL_ATTEMPTS,
            )
            .unwrap();
            assert!((0.0..=1.0).contains(&out.ratio));
            if out.accepted {
                n_accepted += 1;
                for (j, w) in out.state.iter().enumerate() {
                    let z = w * unit.margins[j] / unit.total;
                    assert!(z >= unit.z_min[j] - 1e-12 && z <= unit.z_max[j] + 1e-12);
                }
            } else {
                assert_eq!(out.state, previous);
            }
            current = out.state;
        }
        assert!(n_accepted > 0);
    }

    #[test]
    fn rxc_infeasible_bounds_exhaust_attempts() {
        let unit = RxcUnit::new(1.0, vec![1.0, 1.0], vec![0.9, 0.9], vec![1.0, 1.0]).unwrap();
        let normal = rxc_normal(&[0.0, 0.0], &[1.0, 0.0, 0.0, 1.0]).unwrap();
        let mut rng = SmallRng::seed_from_u64(0);
        let err = metropolis_step_rxc(&mut rng, &[0.5, 0.5], &unit, &normal, 50).unwrap_err();
        assert_eq!(err, EcoError::ProposalExhausted { attempts: 50 });
    }

    #[test]
    fn rxc_dimension_checks() {
        assert!(RxcUnit::new(1.0, vec![1.0, 1.0], vec![0.0], vec![1.0, 1.0]).is_err());
        let unit = RxcUnit::new(1.0, vec![1.0, 1.0], vec![0.0; 2], vec![1.0; 2]).unwrap();
        let normal = rxc_normal(&[0.0, 0.0, 0.0], &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
            .unwrap();
        let mut rng = SmallRng::seed_from_u64(0);
        assert!(metropolis_step_rxc(&mut rng, &[0.5, 0.5], &unit, &normal, 10).is_err());
    }
}
