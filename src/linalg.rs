/*!
Small dense linear algebra.

The bivariate model only ever needs 2×2 symmetric matrices, so [`Mat2`] and [`Vec2`] are plain
`Copy` value types with closed-form inverse, determinant and Cholesky factor. The R×C Metropolis
sampler works in arbitrary dimension and uses [`cholesky_lower`] on an [`ndarray::Array2`].
*/

use ndarray::{Array1, Array2, ArrayView1};

/// A point in ℝ².
pub type Vec2 = [f64; 2];

/// A 2×2 matrix stored row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mat2(pub [[f64; 2]; 2]);

impl Mat2 {
    pub fn new(a11: f64, a12: f64, a21: f64, a22: f64) -> Self {
        Self([[a11, a12], [a21, a22]])
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0)
    }

    pub fn zeros() -> Self {
        Self([[0.0; 2]; 2])
    }

    /// Builds a matrix from four values in column-major order, the layout of the flat prior
    /// scale buffer.
    pub fn from_column_major(values: [f64; 4]) -> Self {
        Self::new(values[0], values[2], values[1], values[3])
    }

    /// The outer product `u vᵀ`.
    pub fn outer(u: Vec2, v: Vec2) -> Self {
        Self::new(u[0] * v[0], u[0] * v[1], u[1] * v[0], u[1] * v[1])
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[row][col]
    }

    pub fn det(&self) -> f64 {
        let m = &self.0;
        m[0][0] * m[1][1] - m[0][1] * m[1][0]
    }

    /// Inverse via the adjugate: `[a, b; c, d]⁻¹ = (1/det) [d, -b; -c, a]`.
    ///
    /// Returns `None` for singular or non-finite input.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.det();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let m = &self.0;
        let inv_det = 1.0 / det;
        Some(Self::new(
            m[1][1] * inv_det,
            -m[0][1] * inv_det,
            -m[1][0] * inv_det,
            m[0][0] * inv_det,
        ))
    }

    /// Lower-triangular `L` with `L Lᵀ = self`, or `None` if the matrix is not symmetric
    /// positive definite.
    pub fn cholesky(&self) -> Option<Self> {
        let m = &self.0;
        if !(m[0][0] > 0.0) || !m[0][0].is_finite() {
            return None;
        }
        let l11 = m[0][0].sqrt();
        let l21 = m[1][0] / l11;
        let rem = m[1][1] - l21 * l21;
        if !(rem > 0.0) || !rem.is_finite() {
            return None;
        }
        Some(Self::new(l11, 0.0, l21, rem.sqrt()))
    }

    pub fn is_positive_definite(&self) -> bool {
        self.cholesky().is_some()
    }

    /// Averages the off-diagonal entries.
    pub fn symmetrize(&self) -> Self {
        let off = 0.5 * (self.0[0][1] + self.0[1][0]);
        Self::new(self.0[0][0], off, off, self.0[1][1])
    }

    pub fn transpose(&self) -> Self {
        let m = &self.0;
        Self::new(m[0][0], m[1][0], m[0][1], m[1][1])
    }

    pub fn add(&self, other: &Self) -> Self {
        let (a, b) = (&self.0, &other.0);
        Self::new(
            a[0][0] + b[0][0],
            a[0][1] + b[0][1],
            a[1][0] + b[1][0],
            a[1][1] + b[1][1],
        )
    }

    pub fn scale(&self, s: f64) -> Self {
        let m = &self.0;
        Self::new(m[0][0] * s, m[0][1] * s, m[1][0] * s, m[1][1] * s)
    }

    pub fn mul(&self, other: &Self) -> Self {
        let (a, b) = (&self.0, &other.0);
        Self::new(
            a[0][0] * b[0][0] + a[0][1] * b[1][0],
            a[0][0] * b[0][1] + a[0][1] * b[1][1],
            a[1][0] * b[0][0] + a[1][1] * b[1][0],
            a[1][0] * b[0][1] + a[1][1] * b[1][1],
        )
    }

    pub fn mul_vec(&self, v: Vec2) -> Vec2 {
        let m = &self.0;
        [m[0][0] * v[0] + m[0][1] * v[1], m[1][0] * v[0] + m[1][1] * v[1]]
    }

    /// `vᵀ M v`.
    pub fn quad_form(&self, v: Vec2) -> f64 {
        let mv = self.mul_vec(v);
        v[0] * mv[0] + v[1] * mv[1]
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|x| x.is_finite())
    }

    /// The three unique entries of a symmetric matrix: `(m11, m12, m22)`.
    pub fn unique_entries(&self) -> [f64; 3] {
        [self.0[0][0], self.0[0][1], self.0[1][1]]
    }
}

pub fn sub(a: Vec2, b: Vec2) -> Vec2 {
    [a[0] - b[0], a[1] - b[1]]
}

/// Lower Cholesky factor of a square symmetric matrix of any size.
pub fn cholesky_lower(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let dim = matrix.ncols();
    if matrix.nrows() != dim {
        return None;
    }
    let mut lower = Array2::<f64>::zeros((dim, dim));
    for row in 0..dim {
        for col in 0..=row {
            let mut sum = matrix[(row, col)];
            for k in 0..col {
                sum -= lower[(row, k)] * lower[(col, k)];
            }
            if row == col {
                if !(sum > 0.0) || !sum.is_finite() {
                    return None;
                }
                lower[(row, col)] = sum.sqrt();
            } else {
                lower[(row, col)] = sum / lower[(col, col)];
            }
        }
    }
    Some(lower)
}

/// `log |M|` from a lower Cholesky factor of `M`.
pub fn log_det_from_cholesky(lower: &Array2<f64>) -> f64 {
    2.0 * lower.diag().iter().map(|d| d.ln()).sum::<f64>()
}

/// `vᵀ M v` for a general square matrix.
pub fn quad_form(matrix: &Array2<f64>, v: ArrayView1<f64>) -> f64 {
    let mv: Array1<f64> = matrix.dot(&v);
    v.dot(&mv)
}
