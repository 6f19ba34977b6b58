/*!
# Gibbs sampler for 2×2 ecological inference.

[`EcoGibbs`] alternates between the latent per-unit proportions `W` and the population
parameters `(mu, Sigma)` of their logit transform `W* = logit(W)`:

1. every regular unit draws `W` on its tomography line given the current `(mu, Sigma)`;
2. every homogeneous unit draws its missing `W*` coordinate from the Gaussian conditional;
3. `(mu, Sigma)` is redrawn from the Normal-Inverse-Wishart posterior given all units' `W*`,
   survey units included.

Steps 1 and 2 only read the parameters produced by step 3 of the previous iteration, so the
unit updates are independent of each other. With [`DrawOrder::PerUnitStreams`] they run in
parallel, each unit with its own generator.

The [`MarkovChain`] trait is implemented for [`EcoGibbs`], so the generic chain runners in
[`crate::core`] drive it.

```rust
use eco_mcmc::config::GibbsConfig;
use eco_mcmc::data::EcoData;
use eco_mcmc::gibbs::EcoGibbs;
use eco_mcmc::niw::Prior;

let data = EcoData::new(vec![[0.5, 0.5], [0.3, 0.6], [0.8, 0.4]]);
let config = GibbsConfig::new(100, 10, 1);
let mut chain = EcoGibbs::new(data, Prior::default(), config)?.seed(42);
let output = chain.run()?;
assert_eq!(output.n_draws(), 90);
# Ok::<(), eco_mcmc::error::EcoError>(())
```
*/

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::{DrawOrder, GibbsConfig};
use crate::core::{run_chain, run_chain_progress, MarkovChain};
use crate::data::EcoData;
use crate::distributions::{
    clamp_observed, clamp_open, inv_logit2, logit2, sample_mvn2, BivariateNormal,
};
use crate::error::EcoError;
use crate::latent::{draw_missing_coordinate, LatentSampler, LatentSamplerKind, Observed};
use crate::linalg::Vec2;
use crate::niw::{niw_update, PopulationParams, Prior};
use crate::output::{ChainOutput, Draw};
use crate::tomography::{TomographyGrid, TomographyLine};

/// How one unit is updated each iteration.
#[derive(Debug, Clone, PartialEq)]
enum UnitModel {
    /// Regular unit with a proper tomography line.
    Line(TomographyGrid),
    /// Regular unit with `X2` exactly 0 or 1; `W` is pinned to its placeholder.
    Pinned,
    Homogeneous(Observed),
    Survey,
}

/// Latent values and population parameters after the last completed iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct EcoState {
    /// `W` of every unit, internal order.
    pub w: Vec<Vec2>,
    /// `logit(W)` of every unit.
    pub wstar: Vec<Vec2>,
    pub params: PopulationParams,
}

/// Gibbs chain over `(W, mu, Sigma)`.
#[derive(Debug, Clone)]
pub struct EcoGibbs {
    pub prior: Prior,
    pub config: GibbsConfig,
    pub state: EcoState,
    /// The random seed used for reproducibility.
    pub seed: u64,
    /// Generator of the population update, the predictive draws and, in sequential order, the
    /// unit updates.
    pub rng: SmallRng,
    /// Per-unit generators used with [`DrawOrder::PerUnitStreams`].
    unit_rngs: Vec<SmallRng>,
    units: Vec<UnitModel>,
    n_stored: usize,
    iteration: usize,
}

fn update_unit<R: Rng>(
    rng: &mut R,
    model: &UnitModel,
    kind: LatentSamplerKind,
    w: &mut Vec2,
    wstar: &mut Vec2,
    params: &PopulationParams,
    normal: &BivariateNormal,
) {
    match model {
        UnitModel::Line(grid) => {
            *w = LatentSampler::new(kind, grid).draw(rng, *w, normal);
            *wstar = logit2(*w);
        }
        UnitModel::Pinned => *wstar = logit2(*w),
        UnitModel::Homogeneous(observed) => {
            let (new_w, new_wstar) = draw_missing_coordinate(rng, *observed, *wstar, params);
            *w = new_w;
            *wstar = new_wstar;
        }
        UnitModel::Survey => {}
    }
}

impl EcoGibbs {
    /**
    Builds a chain from validated data.

    Regular units get their grid once, here, and start at the midpoint of their line; a regular
    unit with `X2` exactly 0 or 1 is pinned at `(X2, X2)` moved off the boundary. Observed
    homogeneous and survey proportions equal to 0 or 1 are moved to `0.0001` / `0.9999`. The
    chain starts at `(mu, Sigma) = (mu0, S0)`.

    # Errors

    Invalid data or configuration, a regular unit with `X1 ∉ (0, 1)` but `X2 ∈ (0, 1)`, or data
    without any unit.
    */
    pub fn new(data: EcoData, prior: Prior, config: GibbsConfig) -> Result<Self, EcoError> {
        config.validate()?;
        data.validate()?;
        if data.n_effective() == 0 {
            return Err(EcoError::InvalidConfig("no units to sample".to_string()));
        }

        let n = data.n_effective();
        let mut units = Vec::with_capacity(n);
        let mut w = Vec::with_capacity(n);
        for (index, &[x1, x2]) in data.regular.iter().enumerate() {
            if x2 <= 0.0 || x2 >= 1.0 {
                let pin = clamp_observed(x2);
                units.push(UnitModel::Pinned);
                w.push([pin, pin]);
                continue;
            }
            let line =
                TomographyLine::new(x1, x2).ok_or(EcoError::DegenerateCovariate { index, x1, x2 })?;
            let m = line.midpoint();
            w.push([clamp_open(m[0]), clamp_open(m[1])]);
            units.push(UnitModel::Line(TomographyGrid::new(line, config.n_step)));
        }
        for &w1 in &data.x1_homogeneous {
            units.push(UnitModel::Homogeneous(Observed::First));
            w.push([clamp_observed(w1), 0.5]);
        }
        for &w2 in &data.x0_homogeneous {
            units.push(UnitModel::Homogeneous(Observed::Second));
            w.push([0.5, clamp_observed(w2)]);
        }
        for &[w1, w2] in &data.survey {
            units.push(UnitModel::Survey);
            w.push([clamp_observed(w1), clamp_observed(w2)]);
        }
        let wstar = w.iter().map(|&v| logit2(v)).collect();

        let n_grids = units
            .iter()
            .filter(|u| matches!(u, UnitModel::Line(_)))
            .count();
        log::debug!(
            "built {n_grids} tomography grids for {} regular units, {n} units in total",
            data.regular.len()
        );

        let seed = config.seed.unwrap_or_else(|| rand::rng().random::<u64>());
        let params = PopulationParams::from_prior(&prior)?;
        let chain = Self {
            prior,
            state: EcoState { w, wstar, params },
            seed,
            rng: SmallRng::seed_from_u64(seed),
            unit_rngs: Vec::new(),
            units,
            n_stored: data.n_stored(),
            iteration: 0,
            config,
        };
        Ok(chain.seed(seed))
    }

    /// Sets a new seed for the chain. Per-unit generators are seeded from the first draws of the
    /// chain's own generator, in unit order.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.config.seed = Some(seed);
        self.rng = SmallRng::seed_from_u64(seed);
        let rng = &mut self.rng;
        self.unit_rngs = (0..self.units.len())
            .map(|_| SmallRng::seed_from_u64(rng.random::<u64>()))
            .collect();
        self
    }

    /// Number of units whose `W` is recorded (regular and homogeneous).
    pub fn n_stored(&self) -> usize {
        self.n_stored
    }

    /// Completed iterations.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Runs the configured number of iterations and returns the retained draws. Progress is
    /// reported when `config.verbose` is set.
    pub fn run(&mut self) -> Result<ChainOutput, EcoError> {
        let schedule = self.config.schedule();
        let draws = if self.config.verbose {
            log::info!(
                "running {} iterations, burn-in {}, thinning {}",
                schedule.n_gen,
                schedule.burn_in,
                schedule.thin
            );
            run_chain_progress(self, schedule)?
        } else {
            run_chain(self, schedule)?
        };
        ChainOutput::from_draws(
            &draws,
            self.n_stored,
            self.config.store_parameters,
            self.config.predict,
        )
    }

    fn update_units(&mut self) -> Result<(), EcoError> {
        let params = self.state.params;
        let normal = params.normal()?;
        let kind = self.config.latent_sampler;
        let EcoState { w, wstar, .. } = &mut self.state;

        match self.config.draw_order {
            DrawOrder::Sequential => {
                let rng = &mut self.rng;
                for ((model, w), wstar) in self.units.iter().zip(w.iter_mut()).zip(wstar.iter_mut())
                {
                    update_unit(rng, model, kind, w, wstar, &params, &normal);
                }
            }
            DrawOrder::PerUnitStreams => {
                self.units
                    .par_iter()
                    .zip(w.par_iter_mut())
                    .zip(wstar.par_iter_mut())
                    .zip(self.unit_rngs.par_iter_mut())
                    .for_each(|(((model, w), wstar), rng)| {
                        update_unit(rng, model, kind, w, wstar, &params, &normal);
                    });
            }
        }
        Ok(())
    }
}

impl MarkovChain for EcoGibbs {
    type State = EcoState;
    type Record = Draw;

    /// One Gibbs sweep: unit updates with the current parameters, then the population update.
    fn step(&mut self) -> Result<(), EcoError> {
        self.update_units()?;
        self.state.params = niw_update(&mut self.rng, &self.state.wstar, &self.prior)?;
        self.iteration += 1;
        Ok(())
    }

    fn current_state(&self) -> &EcoState {
        &self.state
    }

    /// The current `(mu, Sigma)` and stored `W`, plus one predictive `W` per stored unit when
    /// `config.predict` is set.
    fn current_record(&mut self) -> Result<Draw, EcoError> {
        let PopulationParams { mu, sigma, .. } = self.state.params;
        let w_pred = if self.config.predict {
            let mut pred = Vec::with_capacity(self.n_stored);
            for _ in 0..self.n_stored {
                pred.push(inv_logit2(sample_mvn2(&mut self.rng, mu, &sigma)?));
            }
            Some(pred)
        } else {
            None
        };
        Ok(Draw {
            mu,
            sigma,
            w: self.state.w[..self.n_stored].to_vec(),
            w_pred,
        })
    }
}
