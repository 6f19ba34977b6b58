/*!
Tomography lines and their discretization.

For a regular unit with observed margins `(X1, X2)` the latent pair `(W1, W2)` must satisfy
`X2 = X1·W1 + (1 - X1)·W2`. Intersected with the unit square this is a segment, parameterized by
`W1 ∈ [min_w1, max_w1]`. [`TomographyGrid`] places a fixed set of points on that segment once, at
chain construction; the grid sampler then draws from the full conditional restricted to these
points every iteration.
*/

use crate::distributions::clamp_open;
use crate::linalg::Vec2;

/// Default number of grid steps per unit length of `W1`.
pub const DEFAULT_N_STEP: usize = 1000;

/// Feasible interval of `W1` on a tomography line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_w1: f64,
    pub max_w1: f64,
}

impl Bounds {
    pub fn width(&self) -> f64 {
        self.max_w1 - self.min_w1
    }

    pub fn contains(&self, w1: f64) -> bool {
        (self.min_w1..=self.max_w1).contains(&w1)
    }
}

/// The segment `{(w1, w2) ∈ [0,1]²: X2 = X1·w1 + (1 - X1)·w2}`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TomographyLine {
    pub x1: f64,
    pub x2: f64,
    pub bounds: Bounds,
}

impl TomographyLine {
    /// Returns `None` unless both margins lie strictly inside `(0, 1)`; outside that range the
    /// line is either undefined or collapses to a corner of the square.
    pub fn new(x1: f64, x2: f64) -> Option<Self> {
        let interior = |v: f64| v > 0.0 && v < 1.0;
        if !interior(x1) || !interior(x2) {
            return None;
        }
        let bounds = Bounds {
            min_w1: f64::max(0.0, (x1 + x2 - 1.0) / x1),
            max_w1: f64::min(1.0, x2 / x1),
        };
        Some(Self { x1, x2, bounds })
    }

    /// The `W2` paired with `w1` by the accounting identity.
    #[inline]
    pub fn w2(&self, w1: f64) -> f64 {
        (self.x2 - self.x1 * w1) / (1.0 - self.x1)
    }

    pub fn point(&self, w1: f64) -> Vec2 {
        [w1, self.w2(w1)]
    }

    /// Residual of the accounting identity at `w`.
    pub fn residual(&self, w: Vec2) -> f64 {
        self.x1 * w[0] + (1.0 - self.x1) * w[1] - self.x2
    }

    pub fn midpoint(&self) -> Vec2 {
        let b = self.bounds;
        self.point(b.min_w1 + 0.5 * b.width())
    }
}

/// A fixed discretization of one tomography line.
#[derive(Debug, Clone, PartialEq)]
pub struct TomographyGrid {
    pub line: TomographyLine,
    /// Grid points `(W1, W2)`, ordered by increasing `W1`.
    pub points: Vec<Vec2>,
}

impl TomographyGrid {
    /**
    Discretizes `line` with spacing `1 / n_step`.

    When the feasible interval is wider than two steps, `⌊width · n_step⌋` points are laid out
    with spacing `step` and centered so that the leftover `resid = width - G·step` is split
    between both ends; a point closer than `resid / 2` to either bound is nudged inward by
    `resid / 2`. Narrower intervals get exactly two points, at one and two thirds of the
    interval.

    Coordinates are finally clamped away from 0 and 1 by [`crate::distributions::GRID_EPS`].
    */
    pub fn new(line: TomographyLine, n_step: usize) -> Self {
        let Bounds { min_w1, max_w1 } = line.bounds;
        let width = max_w1 - min_w1;
        let step = 1.0 / n_step as f64;

        let w1_values: Vec<f64> = if width > 2.0 * step {
            let n_grid = (width * n_step as f64).trunc() as usize;
            let resid = width - n_grid as f64 * step;
            (0..n_grid)
                .map(|j| {
                    let mut w1 = min_w1 + (j + 1) as f64 * step - (step + resid) / 2.0;
                    if w1 - min_w1 < resid / 2.0 {
                        w1 += resid / 2.0;
                    }
                    if max_w1 - w1 < resid / 2.0 {
                        w1 -= resid / 2.0;
                    }
                    w1
                })
                .collect()
        } else {
            vec![min_w1 + width / 3.0, min_w1 + 2.0 * width / 3.0]
        };

        let points = w1_values
            .into_iter()
            .map(|w1| [clamp_open(w1), clamp_open(line.w2(w1))])
            .collect();
        Self { line, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
