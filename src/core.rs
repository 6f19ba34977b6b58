/*!
# Core chain-running utilities.

- The [`MarkovChain`] trait, which abstracts a single MCMC chain.
- [`Schedule`], the burn-in/thinning rule deciding which iterations are retained.
- [`run_chain`] and [`run_chain_progress`] for executing a chain and collecting its retained
  records; the latter reports progress with an [`indicatif::ProgressBar`] and the `log` facade.

Any chain can only be stopped between two calls to [`MarkovChain::step`]; the state at that
boundary is a complete draw.
*/

use indicatif::{ProgressBar, ProgressStyle};

use crate::error::EcoError;

/// Iterations between two progress log lines.
pub const PROGRESS_INTERVAL: usize = 10_000;

/// A trait that abstracts a single MCMC chain.
///
/// A type implementing [`MarkovChain`] must provide:
/// - `step()`: advances the chain by one full iteration.
/// - `current_state()`: returns a reference to the current state without modifying the chain.
/// - `current_record()`: builds the record stored for a retained iteration. It takes `&mut self`
///   because a record may include fresh random draws (posterior predictions).
pub trait MarkovChain {
    type State;
    type Record;

    /// Performs one iteration of the chain.
    fn step(&mut self) -> Result<(), EcoError>;

    /// Returns a reference to the current state of the chain without advancing it.
    fn current_state(&self) -> &Self::State;

    /// Returns the record for the current state.
    fn current_record(&mut self) -> Result<Self::Record, EcoError>;
}

/// Run length, burn-in and thinning of a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Total number of iterations.
    pub n_gen: usize,
    /// Leading iterations that are never retained.
    pub burn_in: usize,
    /// Every `thin`-th post-burn-in iteration is retained.
    pub thin: usize,
}

impl Schedule {
    pub fn new(n_gen: usize, burn_in: usize, thin: usize) -> Self {
        Self {
            n_gen,
            burn_in,
            thin,
        }
    }

    pub fn validate(&self) -> Result<(), EcoError> {
        if self.n_gen == 0 {
            return Err(EcoError::InvalidConfig("n_gen must be positive".to_string()));
        }
        if self.thin == 0 {
            return Err(EcoError::InvalidConfig("thin must be positive".to_string()));
        }
        if self.burn_in >= self.n_gen {
            return Err(EcoError::InvalidConfig(format!(
                "burn_in ({}) must be smaller than n_gen ({})",
                self.burn_in, self.n_gen
            )));
        }
        Ok(())
    }

    /// Whether iteration `iter` (0-based) is retained: the `thin`-th, `2·thin`-th, …
    /// iteration after burn-in.
    pub fn is_retained(&self, iter: usize) -> bool {
        iter >= self.burn_in && (iter - self.burn_in + 1) % self.thin == 0
    }

    /// Number of retained iterations, `⌊(n_gen - burn_in) / thin⌋`.
    pub fn n_retained(&self) -> usize {
        self.n_gen.saturating_sub(self.burn_in) / self.thin
    }
}

fn run_with<M, F>(
    chain: &mut M,
    schedule: Schedule,
    mut after_iteration: F,
) -> Result<Vec<M::Record>, EcoError>
where
    M: MarkovChain,
    F: FnMut(usize, usize),
{
    schedule.validate()?;
    let mut records = Vec::with_capacity(schedule.n_retained());
    for iter in 0..schedule.n_gen {
        chain.step()?;
        if schedule.is_retained(iter) {
            records.push(chain.current_record()?);
        }
        after_iteration(iter, records.len());
    }
    Ok(records)
}

/// Runs a chain for `schedule.n_gen` iterations and returns the retained records in order.
pub fn run_chain<M: MarkovChain>(
    chain: &mut M,
    schedule: Schedule,
) -> Result<Vec<M::Record>, EcoError> {
    run_with(chain, schedule, |_, _| {})
}

/// Same as [`run_chain`], with a progress bar and an `info` log line every
/// [`PROGRESS_INTERVAL`] iterations.
pub fn run_chain_progress<M: MarkovChain>(
    chain: &mut M,
    schedule: Schedule,
) -> Result<Vec<M::Record>, EcoError> {
    let pb = ProgressBar::new(schedule.n_gen as u64);
    let style = ProgressStyle::default_bar()
        .template("{prefix:8} {bar:40.cyan/blue} {pos}/{len} ({eta}) | {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    pb.set_style(style);
    pb.set_prefix("Gibbs");

    let result = run_with(chain, schedule, |iter, n_kept| {
        if iter % PROGRESS_INTERVAL == 0 {
            log::info!("iteration {iter}");
            pb.set_message(format!("retained {n_kept}/{}", schedule.n_retained()));
        }
        pb.inc(1);
    });
    match &result {
        Ok(records) => pb.finish_with_message(format!("retained {}", records.len())),
        Err(e) => pb.abandon_with_message(format!("aborted: {e}")),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Counts its own steps; the record is the step count.
    struct Counter {
        n: usize,
        fail_at: Option<usize>,
    }

    impl MarkovChain for Counter {
        type State = usize;
        type Record = usize;

        fn step(&mut self) -> Result<(), EcoError> {
            self.n += 1;
            if Some(self.n) == self.fail_at {
                return Err(EcoError::DegenerateDensity("test".to_string()));
            }
            Ok(())
        }

        fn current_state(&self) -> &usize {
            &self.n
        }

        fn current_record(&mut self) -> Result<usize, EcoError> {
            Ok(self.n)
        }
    }

    #[test]
    fn retention_without_thinning() {
        let s = Schedule::new(100, 10, 1);
        assert_eq!(s.n_retained(), 90);
        assert!(!s.is_retained(9));
        assert!(s.is_retained(10));
        assert!(s.is_retained(99));
    }

    #[test]
    fn retention_with_thinning() {
        let s = Schedule::new(20, 5, 3);
        let kept: Vec<usize> = (0..20).filter(|&i| s.is_retained(i)).collect();
        assert_eq!(kept, vec![7, 10, 13, 16, 19]);
        assert_eq!(kept.len(), s.n_retained());

        let s = Schedule::new(21, 5, 4);
        assert_eq!((0..21).filter(|&i| s.is_retained(i)).count(), s.n_retained());
    }

    #[test]
    fn run_collects_retained_records_in_order() {
        let mut chain = Counter { n: 0, fail_at: None };
        let records = run_chain(&mut chain, Schedule::new(12, 2, 2)).unwrap();
        // Steps are 1-based in the counter: iterations 3, 5, ... are steps 4, 6, ...
        assert_eq!(records, vec![4, 6, 8, 10, 12]);
        assert_eq!(*chain.current_state(), 12);
    }

    #[test]
    fn progress_run_matches_plain_run() {
        let plain = run_chain(&mut Counter { n: 0, fail_at: None }, Schedule::new(30, 3, 3));
        let progress =
            run_chain_progress(&mut Counter { n: 0, fail_at: None }, Schedule::new(30, 3, 3));
        assert_eq!(plain.unwrap(), progress.unwrap());
    }

    #[test]
    fn errors_stop_the_chain() {
        let mut chain = Counter {
            n: 0,
            fail_at: Some(5),
        };
        assert!(run_chain(&mut chain, Schedule::new(10, 0, 1)).is_err());
        assert_eq!(chain.n, 5);
    }

    #[test]
    fn invalid_schedules() {
        assert!(Schedule::new(0, 0, 1).validate().is_err());
        assert!(Schedule::new(10, 10, 1).validate().is_err());
        assert!(Schedule::new(10, 0, 0).validate().is_err());
        assert!(Schedule::new(10, 9, 1).validate().is_ok());
    }
}
