//! Chain controls for [`crate::gibbs::EcoGibbs`].

use crate::core::Schedule;
use crate::error::EcoError;
use crate::latent::LatentSamplerKind;
use crate::tomography::DEFAULT_N_STEP;

/// Order in which per-unit latent draws consume randomness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawOrder {
    /// One generator, units visited in order.
    #[default]
    Sequential,
    /// One generator per unit, units updated in parallel with `rayon`. Results do not depend
    /// on thread scheduling.
    PerUnitStreams,
}

/// Controls for one Gibbs run.
#[derive(Debug, Clone, PartialEq)]
pub struct GibbsConfig {
    /// Total number of Gibbs iterations.
    pub n_gen: usize,
    /// Leading iterations that are discarded.
    pub burn_in: usize,
    /// Keep every `thin`-th draw after burn-in.
    pub thin: usize,
    /// Report progress.
    pub verbose: bool,
    /// Store one posterior-predictive `W` per stored unit and retained draw.
    pub predict: bool,
    /// Store `mu` and `Sigma` for each retained draw.
    pub store_parameters: bool,
    /// Grid steps per unit length of `W1`.
    pub n_step: usize,
    pub latent_sampler: LatentSamplerKind,
    pub draw_order: DrawOrder,
    /// Seed of the chain's generator. `None` seeds from the thread-local generator.
    pub seed: Option<u64>,
}

impl Default for GibbsConfig {
    fn default() -> Self {
        Self {
            n_gen: 5_000,
            burn_in: 0,
            thin: 1,
            verbose: false,
            predict: false,
            store_parameters: true,
            n_step: DEFAULT_N_STEP,
            latent_sampler: LatentSamplerKind::Grid,
            draw_order: DrawOrder::Sequential,
            seed: None,
        }
    }
}

impl GibbsConfig {
    pub fn new(n_gen: usize, burn_in: usize, thin: usize) -> Self {
        Self {
            n_gen,
            burn_in,
            thin,
            ..Self::default()
        }
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn predict(mut self, predict: bool) -> Self {
        self.predict = predict;
        self
    }

    pub fn store_parameters(mut self, store: bool) -> Self {
        self.store_parameters = store;
        self
    }

    pub fn n_step(mut self, n_step: usize) -> Self {
        self.n_step = n_step;
        self
    }

    pub fn latent_sampler(mut self, kind: LatentSamplerKind) -> Self {
        self.latent_sampler = kind;
        self
    }

    pub fn draw_order(mut self, order: DrawOrder) -> Self {
        self.draw_order = order;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.n_gen, self.burn_in, self.thin)
    }

    pub fn validate(&self) -> Result<(), EcoError> {
        self.schedule().validate()?;
        if self.n_step < 2 {
            return Err(EcoError::InvalidConfig(format!(
                "n_step must be at least 2, got {}",
                self.n_step
            )));
        }
        Ok(())
    }
}
