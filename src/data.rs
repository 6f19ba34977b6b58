/*!
Observed inputs of an ecological-inference problem.

Units come in four kinds:

| kind | observed | latent |
|---|---|---|
| [`UnitKind::Regular`] | margins `(X1, X2)` | `(W1, W2)` on the tomography line |
| [`UnitKind::X1Homogeneous`] | `W1` | `W2` |
| [`UnitKind::X0Homogeneous`] | `W2` | `W1` |
| [`UnitKind::Survey`] | `(W1, W2)` | none |

Internally units are always ordered regular, X1-homogeneous, X0-homogeneous, survey.
*/

use crate::error::EcoError;
use crate::linalg::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitKind {
    Regular,
    X1Homogeneous,
    X0Homogeneous,
    Survey,
}

/// All observed data for one chain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EcoData {
    /// Margins `(X1, X2)` of regular units.
    pub regular: Vec<Vec2>,
    /// Observed `W1` of units with `X1 = 1`.
    pub x1_homogeneous: Vec<f64>,
    /// Observed `W2` of units with `X1 = 0`.
    pub x0_homogeneous: Vec<f64>,
    /// Fully observed `(W1, W2)` from surveys.
    pub survey: Vec<Vec2>,
}

fn check_proportion(what: &'static str, index: usize, value: f64) -> Result<(), EcoError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EcoError::InvalidProportion { what, index, value })
    }
}

impl EcoData {
    pub fn new(regular: Vec<Vec2>) -> Self {
        Self {
            regular,
            ..Self::default()
        }
    }

    pub fn with_x1_homogeneous(mut self, w1: Vec<f64>) -> Self {
        self.x1_homogeneous = w1;
        self
    }

    pub fn with_x0_homogeneous(mut self, w2: Vec<f64>) -> Self {
        self.x0_homogeneous = w2;
        self
    }

    pub fn with_survey(mut self, w: Vec<Vec2>) -> Self {
        self.survey = w;
        self
    }

    /**
    Builds the data from flat buffers.

    `x` holds `n_regular` values of `X1` followed by `n_regular` values of `X2`; `survey` holds
    `n_survey` values of `W1` followed by `n_survey` values of `W2`.
    */
    pub fn from_flat(
        x: &[f64],
        n_regular: usize,
        survey: &[f64],
        n_survey: usize,
        x1_w1: &[f64],
        x0_w2: &[f64],
    ) -> Result<Self, EcoError> {
        let columns = |name: &'static str, buf: &[f64], n: usize| -> Result<Vec<Vec2>, EcoError> {
            if buf.len() != 2 * n {
                return Err(EcoError::BufferLength {
                    name,
                    expected: 2 * n,
                    actual: buf.len(),
                });
            }
            Ok((0..n).map(|i| [buf[i], buf[n + i]]).collect())
        };
        let data = Self {
            regular: columns("x", x, n_regular)?,
            survey: columns("survey", survey, n_survey)?,
            x1_homogeneous: x1_w1.to_vec(),
            x0_homogeneous: x0_w2.to_vec(),
        };
        data.validate()?;
        Ok(data)
    }

    /// Checks that every observed value is a proportion in `[0, 1]`.
    pub fn validate(&self) -> Result<(), EcoError> {
        for (i, x) in self.regular.iter().enumerate() {
            check_proportion("X1", i, x[0])?;
            check_proportion("X2", i, x[1])?;
        }
        for (i, &w) in self.x1_homogeneous.iter().enumerate() {
            check_proportion("X1-homogeneous W1", i, w)?;
        }
        for (i, &w) in self.x0_homogeneous.iter().enumerate() {
            check_proportion("X0-homogeneous W2", i, w)?;
        }
        for (i, w) in self.survey.iter().enumerate() {
            check_proportion("survey W1", i, w[0])?;
            check_proportion("survey W2", i, w[1])?;
        }
        Ok(())
    }

    /// Units whose `W` draws are stored: regular and homogeneous.
    pub fn n_stored(&self) -> usize {
        self.regular.len() + self.x1_homogeneous.len() + self.x0_homogeneous.len()
    }

    /// All units entering the population update.
    pub fn n_effective(&self) -> usize {
        self.n_stored() + self.survey.len()
    }

    /// Kind of the unit at `index` in the internal ordering.
    pub fn kind(&self, index: usize) -> Option<UnitKind> {
        let r = self.regular.len();
        let x1 = r + self.x1_homogeneous.len();
        let x0 = x1 + self.x0_homogeneous.len();
        match index {
            i if i < r => Some(UnitKind::Regular),
            i if i < x1 => Some(UnitKind::X1Homogeneous),
            i if i < x0 => Some(UnitKind::X0Homogeneous),
            i if i < x0 + self.survey.len() => Some(UnitKind::Survey),
            _ => None,
        }
    }
}
