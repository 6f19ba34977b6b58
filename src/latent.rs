/*!
Per-unit latent draws given the current population parameters.

- [`draw_from_grid`]: exact draw from the full conditional of `W` discretized on a unit's
  [`TomographyGrid`].
- [`draw_missing_coordinate`]: Gaussian conditioning for homogeneous units, where one
  coordinate of `W*` is observed.
- [`LatentSampler`]: the grid sampler and the uniform-proposal Metropolis sampler behind one
  "draw `W` on this line given `(mu, Sigma⁻¹)`" contract.
*/

use rand::Rng;

use crate::distributions::{categorical_from_cumulative, inv_logit, sample_normal, BivariateNormal};
use crate::linalg::Vec2;
use crate::metropolis_hastings::metropolis_step_2x2;
use crate::niw::PopulationParams;
use crate::tomography::TomographyGrid;

/**
Draws one grid point from the discretized conditional distribution of `W` on `grid`.

Each point `j` gets log-weight `log N(logit(w_j); mu, Sigma) - Σ ln w_j(1 - w_j)`. Weights are
exponentiated after subtracting the largest log-weight, accumulated, normalized, and a single
`u ~ U(0,1)` selects the smallest index with cumulative probability `≥ u`. Subtracting the
maximum leaves the distribution unchanged and keeps at least one weight at 1, so the
normalization cannot underflow. NaN log-weights count as zero weight; if no point has a finite
log-weight the draw is uniform over the grid.

The returned point is always one of `grid.points`.
*/
pub fn draw_from_grid<R: Rng>(
    rng: &mut R,
    grid: &TomographyGrid,
    normal: &BivariateNormal,
) -> Vec2 {
    let log_weights: Vec<f64> = grid
        .points
        .iter()
        .map(|&w| {
            let lw = normal.logp_proportions(w);
            if lw.is_nan() {
                f64::NEG_INFINITY
            } else {
                lw
            }
        })
        .collect();
    let max = log_weights
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);

    let u: f64 = rng.random();
    if !max.is_finite() {
        log::warn!(
            "all {} grid log-weights are non-finite, drawing uniformly on the line",
            grid.len()
        );
        let index = ((u * grid.len() as f64) as usize).min(grid.len() - 1);
        return grid.points[index];
    }

    let mut total = 0.0;
    let mut cumulative: Vec<f64> = log_weights
        .iter()
        .map(|&lw| {
            total += (lw - max).exp();
            total
        })
        .collect();
    for c in cumulative.iter_mut() {
        *c /= total;
    }
    grid.points[categorical_from_cumulative(&cumulative, u)]
}

/// Which coordinate of a homogeneous unit is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// `W1` is known (`X1 = 1` areas); `W2` is drawn.
    First,
    /// `W2` is known (`X1 = 0` areas); `W1` is drawn.
    Second,
}

/**
Draws the missing logit coordinate of a homogeneous unit from its exact Gaussian conditional.

For `Observed::First`:
`W*2 ~ N(mu2 + (Σ12 / Σ11)(W*1 - mu1), Σ22 (1 - Σ12² / (Σ11 Σ22)))`, and symmetrically for
`Observed::Second`. Returns the updated `(W, W*)` pair.
*/
pub fn draw_missing_coordinate<R: Rng>(
    rng: &mut R,
    observed: Observed,
    wstar: Vec2,
    params: &PopulationParams,
) -> (Vec2, Vec2) {
    let s = &params.sigma;
    let mu = params.mu;
    let (known, missing) = match observed {
        Observed::First => (0, 1),
        Observed::Second => (1, 0),
    };
    let s_kk = s.get(known, known);
    let s_mm = s.get(missing, missing);
    let s_km = s.get(0, 1);
    let mean = mu[missing] + s_km / s_kk * (wstar[known] - mu[known]);
    let var = (s_mm * (1.0 - s_km * s_km / (s_kk * s_mm))).max(f64::MIN_POSITIVE);

    let mut new_wstar = wstar;
    new_wstar[missing] = sample_normal(rng, mean, var.sqrt());
    let mut w = [inv_logit(new_wstar[0]), inv_logit(new_wstar[1])];
    w[known] = inv_logit(wstar[known]);
    (w, new_wstar)
}

/// How regular units draw `W` on their tomography line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatentSamplerKind {
    /// Exact draw from the discretized line.
    #[default]
    Grid,
    /// One Metropolis step with a uniform proposal along the line.
    Metropolis,
}

/// A latent-draw strategy bound to one unit's line.
#[derive(Debug, Clone, Copy)]
pub enum LatentSampler<'a> {
    Grid(&'a TomographyGrid),
    Metropolis(&'a TomographyGrid),
}

impl<'a> LatentSampler<'a> {
    pub fn new(kind: LatentSamplerKind, grid: &'a TomographyGrid) -> Self {
        match kind {
            LatentSamplerKind::Grid => LatentSampler::Grid(grid),
            LatentSamplerKind::Metropolis => LatentSampler::Metropolis(grid),
        }
    }

    /// Produces the next `W` for this unit given the current one and the population normal.
    /// The grid variant ignores `current`.
    pub fn draw<R: Rng>(&self, rng: &mut R, current: Vec2, normal: &BivariateNormal) -> Vec2 {
        match self {
            LatentSampler::Grid(grid) => draw_from_grid(rng, grid, normal),
            LatentSampler::Metropolis(grid) => {
                metropolis_step_2x2(rng, current, &grid.line, normal).state
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::logit2;
    use crate::linalg::Mat2;
    use crate::tomography::{TomographyLine, DEFAULT_N_STEP};
    use approx::assert_abs_diff_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn grid(x1: f64, x2: f64, n_step: usize) -> TomographyGrid {
        TomographyGrid::new(TomographyLine::new(x1, x2).unwrap(), n_step)
    }

    #[test]
    fn grid_draw_is_always_a_grid_point() {
        let g = grid(0.35, 0.6, DEFAULT_N_STEP);
        let normal =
            BivariateNormal::from_precision([0.3, -0.2], Mat2::new(1.5, 0.4, 0.4, 2.0)).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        for _ in 0..500 {
            let w = draw_from_grid(&mut rng, &g, &normal);
            assert!(g.points.contains(&w));
        }
    }

    #[test]
    fn grid_draw_frequencies_match_weights() {
        let g = grid(0.5, 0.5, 4);
        let normal =
            BivariateNormal::from_precision([0.5, -0.5], Mat2::new(2.0, 0.0, 0.0, 2.0)).unwrap();
        let weights: Vec<f64> = g
            .points
            .iter()
            .map(|&w| normal.logp_proportions(w).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        let mut rng = SmallRng::seed_from_u64(1);
        let n = 100_000;
        let mut counts = vec![0usize; g.len()];
        for _ in 0..n {
            let w = draw_from_grid(&mut rng, &g, &normal);
            let j = g.points.iter().position(|p| *p == w).unwrap();
            counts[j] += 1;
        }
        for (count, weight) in counts.iter().zip(&weights) {
            assert_abs_diff_eq!(*count as f64 / n as f64, weight / total, epsilon = 0.01);
        }
    }

    #[test]
    fn far_away_mean_does_not_underflow() {
        // Every naive weight exp(logp) underflows to zero here.
        let g = grid(0.4, 0.5, DEFAULT_N_STEP);
        let normal =
            BivariateNormal::from_precision([400.0, -400.0], Mat2::identity().scale(100.0))
                .unwrap();
        assert!(g
            .points
            .iter()
            .all(|&w| normal.logp_proportions(w).exp() == 0.0));
        let mut rng = SmallRng::seed_from_u64(3);
        let w = draw_from_grid(&mut rng, &g, &normal);
        assert!(g.points.contains(&w));
        // Mass sits at the end of the line closest to the mean: largest W1.
        assert!(w[0] > g.points[g.len() - 10][0]);
    }

    #[test]
    fn non_finite_weights_fall_back_to_uniform() {
        let g = grid(0.4, 0.5, DEFAULT_N_STEP);
        let normal = BivariateNormal::from_precision([f64::NAN, 0.0], Mat2::identity()).unwrap();
        let mut rng = SmallRng::seed_from_u64(13);
        let n = 2_000;
        let indices: Vec<usize> = (0..n)
            .map(|_| {
                let w = draw_from_grid(&mut rng, &g, &normal);
                g.points.iter().position(|p| *p == w).unwrap()
            })
            .collect();
        let mean_index = indices.iter().sum::<usize>() as f64 / n as f64;
        let center = (g.len() - 1) as f64 / 2.0;
        assert_abs_diff_eq!(mean_index, center, epsilon = 0.05 * g.len() as f64);
        let low = indices.iter().filter(|&&i| i < g.len() / 4).count();
        let high = indices.iter().filter(|&&i| i >= 3 * g.len() / 4).count();
        assert!(low > n / 8 && high > n / 8, "draws not spread: {low} low, {high} high");
    }

    #[test]
    fn conditional_draw_keeps_observed_coordinate() {
        let params = PopulationParams::new([0.0, 0.5], Mat2::new(1.0, 0.5, 0.5, 2.0)).unwrap();
        let mut rng = SmallRng::seed_from_u64(8);
        let wstar = logit2([0.3, 0.5]);
        let (w, new_wstar) = draw_missing_coordinate(&mut rng, Observed::First, wstar, &params);
        assert_eq!(new_wstar[0], wstar[0]);
        assert_abs_diff_eq!(w[0], 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(w[1], inv_logit(new_wstar[1]), epsilon = 1e-15);

        let (w, new_wstar) = draw_missing_coordinate(&mut rng, Observed::Second, wstar, &params);
        assert_eq!(new_wstar[1], wstar[1]);
        assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn conditional_draw_moments() {
        let params = PopulationParams::new([1.0, -1.0], Mat2::new(1.0, 0.6, 0.6, 2.0)).unwrap();
        let mut rng = SmallRng::seed_from_u64(21);
        let wstar = [2.0, 0.0];
        let n = 50_000;
        let draws: Vec<f64> = (0..n)
            .map(|_| draw_missing_coordinate(&mut rng, Observed::First, wstar, &params).1[1])
            .collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        // mean = -1 + 0.6 * (2 - 1); var = 2 (1 - 0.36 / 2)
        assert_abs_diff_eq!(mean, -0.4, epsilon = 0.03);
        assert_abs_diff_eq!(var, 1.64, epsilon = 0.05);
    }

    #[test]
    fn conditional_draw_moments_second_observed() {
        let params = PopulationParams::new([1.0, -1.0], Mat2::new(1.0, 0.6, 0.6, 2.0)).unwrap();
        let mut rng = SmallRng::seed_from_u64(22);
        let wstar = [0.0, 1.0];
        let n = 50_000;
        let draws: Vec<f64> = (0..n)
            .map(|_| draw_missing_coordinate(&mut rng, Observed::Second, wstar, &params).1[0])
            .collect();
        let mean = draws.iter().sum::<f64>() / n as f64;
        let var = draws.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        // mean = 1 + (0.6 / 2) * (1 + 1); var = 1 (1 - 0.36 / 2)
        assert_abs_diff_eq!(mean, 1.6, epsilon = 0.03);
        assert_abs_diff_eq!(var, 0.82, epsilon = 0.03);
    }

    #[test]
    fn sampler_variants_stay_on_the_line() {
        let g = grid(0.3, 0.4, DEFAULT_N_STEP);
        let normal = BivariateNormal::from_precision([0.0, 0.0], Mat2::identity()).unwrap();
        let mut rng = SmallRng::seed_from_u64(4);
        for kind in [LatentSamplerKind::Grid, LatentSamplerKind::Metropolis] {
            let sampler = LatentSampler::new(kind, &g);
            let mut w = g.line.midpoint();
            for _ in 0..200 {
                w = sampler.draw(&mut rng, w, &normal);
                assert_abs_diff_eq!(g.line.residual(w), 0.0, epsilon = 1e-9);
                assert!(w[0] > 0.0 && w[0] < 1.0 && w[1] > 0.0 && w[1] < 1.0);
            }
        }
    }
}
