//! Natural-abundance correction of isotopologue intensities.
//!
//! The correction matrix is built from the mean relative intensities of the
//! unlabeled (control) samples. Column `k` approximates the control
//! distribution shifted by `k` labeled positions, with a first order
//! correction for the natural 13C bleed-through of the M+0/M+1 channels.
//! This is intentionally not a full binomial convolution.

use crate::errors::{
    DataProcessingError,
    NumericError,
};
use nalgebra::{
    DMatrix,
    DVector,
};

/// Ratio of natural 13C to 12C abundance.
pub const NATURAL_C13_RATIO: f64 = 0.0107 / 0.9893;

fn carbon_abundance(labeled_positions: usize) -> f64 {
    labeled_positions as f64 * NATURAL_C13_RATIO
}

/// Shift of the M+0 channel when `labeled_positions` carbons carry the label.
fn m1_correction(unlabeled: &[f64], labeled_positions: usize) -> f64 {
    let p = carbon_abundance(labeled_positions);
    (unlabeled[0] * p) / ((unlabeled[1] / unlabeled[0]) + 1.0 - p)
}

#[derive(Debug, Clone)]
pub struct CorrectionMatrix {
    matrix: DMatrix<f64>,
    inverse: DMatrix<f64>,
}

impl CorrectionMatrix {
    /// Builds the correction matrix from the mean control distribution `u`.
    ///
    /// # Errors
    ///
    /// * fewer than two channels
    /// * non-finite entries (e.g. a zero M+0 control mean)
    /// * a singular matrix
    ///
    /// # Example
    ///
    /// ```
    /// use isonet::correction::CorrectionMatrix;
    ///
    /// let cm = CorrectionMatrix::from_unlabeled(&[0.9, 0.08, 0.02]).unwrap();
    /// assert_eq!(cm.size(), 3);
    /// assert_eq!(cm.matrix()[(0, 0)], 0.9);
    /// ```
    pub fn from_unlabeled(unlabeled: &[f64]) -> Result<Self, NumericError> {
        let n = unlabeled.len();
        if n < 2 {
            return Err(NumericError::InsufficientChannels { channels: n });
        }
        if let Some(channel) = unlabeled.iter().position(|x| !x.is_finite()) {
            return Err(NumericError::NonFiniteControl { channel });
        }

        let mut matrix = DMatrix::<f64>::zeros(n, n);
        matrix.set_column(0, &DVector::from_column_slice(unlabeled));

        for k in 1..(n - 1) {
            let m1 = m1_correction(unlabeled, k);
            let mut column = vec![0.0; n];
            column[k] = unlabeled[0] + m1;
            column[k + 1] = unlabeled[1] - m1;
            // Tail of the control distribution, truncated to fit the column.
            for (row, value) in ((k + 2)..n).zip(unlabeled[2..].iter()) {
                column[row] = *value;
            }
            matrix.set_column(k, &DVector::from_vec(column));
        }

        // The last column only carries the shifted M+0 entry.
        let last = n - 1;
        matrix[(last, last)] = unlabeled[0] + m1_correction(unlabeled, last);

        if matrix.iter().any(|x| !x.is_finite()) {
            return Err(NumericError::NonFiniteControl { channel: 0 });
        }

        let inverse = matrix
            .clone()
            .try_inverse()
            .ok_or(NumericError::SingularCorrectionMatrix { size: n })?;
        if inverse.iter().any(|x| !x.is_finite()) {
            return Err(NumericError::SingularCorrectionMatrix { size: n });
        }

        Ok(Self { matrix, inverse })
    }

    pub fn size(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Solves `C * mid = relative_intensities` for `mid`.
    pub fn correct(&self, relative_intensities: &[f64]) -> Result<Vec<f64>, DataProcessingError> {
        self.check_len(relative_intensities.len(), "CorrectionMatrix::correct")?;
        let rhs = DVector::from_column_slice(relative_intensities);
        Ok((&self.inverse * rhs).iter().copied().collect())
    }

    /// Forward application `C * mid`, the expected observed distribution.
    pub fn apply(&self, mid: &[f64]) -> Result<Vec<f64>, DataProcessingError> {
        self.check_len(mid.len(), "CorrectionMatrix::apply")?;
        let v = DVector::from_column_slice(mid);
        Ok((&self.matrix * v).iter().copied().collect())
    }

    fn check_len(&self, len: usize, context: &str) -> Result<(), DataProcessingError> {
        if len != self.size() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: self.size(),
                other: len,
                context: context.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTROL: [f64; 4] = [0.85, 0.1, 0.04, 0.01];

    #[test]
    fn test_first_column_is_control() {
        let cm = CorrectionMatrix::from_unlabeled(&CONTROL).unwrap();
        for (i, v) in CONTROL.iter().enumerate() {
            assert_eq!(cm.matrix()[(i, 0)], *v);
        }
    }

    #[test]
    fn test_column_layout() {
        let cm = CorrectionMatrix::from_unlabeled(&CONTROL).unwrap();
        let m = cm.matrix();
        let m1 = m1_correction(&CONTROL, 1);
        // Column 1: zero, shifted M+0, shifted M+1, then the tail.
        assert_eq!(m[(0, 1)], 0.0);
        assert!((m[(1, 1)] - (0.85 + m1)).abs() < 1e-15);
        assert!((m[(2, 1)] - (0.1 - m1)).abs() < 1e-15);
        assert_eq!(m[(3, 1)], 0.04);

        // Column n-2 has no room for the tail.
        let m2 = m1_correction(&CONTROL, 2);
        assert_eq!(m[(1, 2)], 0.0);
        assert!((m[(2, 2)] - (0.85 + m2)).abs() < 1e-15);
        assert!((m[(3, 2)] - (0.1 - m2)).abs() < 1e-15);

        // Last column only perturbs its diagonal entry.
        let m3 = m1_correction(&CONTROL, 3);
        for row in 0..3 {
            assert_eq!(m[(row, 3)], 0.0);
        }
        assert!((m[(3, 3)] - (0.85 + m3)).abs() < 1e-15);
    }

    #[test]
    fn test_round_trip() {
        let cm = CorrectionMatrix::from_unlabeled(&CONTROL).unwrap();
        let mid = vec![0.4, 0.1, 0.3, 0.2];
        let observed = cm.apply(&mid).unwrap();
        let recovered = cm.correct(&observed).unwrap();
        for (a, b) in mid.iter().zip(recovered.iter()) {
            assert!((a - b).abs() < 1e-10, "{:?} vs {:?}", mid, recovered);
        }
    }

    #[test]
    fn test_control_corrects_to_unlabeled() {
        let cm = CorrectionMatrix::from_unlabeled(&CONTROL).unwrap();
        let corrected = cm.correct(&CONTROL).unwrap();
        assert!((corrected[0] - 1.0).abs() < 1e-12);
        for v in &corrected[1..] {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn test_two_channels() {
        let cm = CorrectionMatrix::from_unlabeled(&[0.95, 0.05]).unwrap();
        assert_eq!(cm.matrix()[(0, 1)], 0.0);
        assert!(cm.matrix()[(1, 1)] > 0.95);
    }

    #[test]
    fn test_degenerate_controls() {
        assert_eq!(
            CorrectionMatrix::from_unlabeled(&[1.0]).unwrap_err(),
            NumericError::InsufficientChannels { channels: 1 }
        );
        assert!(CorrectionMatrix::from_unlabeled(&[0.0, 0.5, 0.5]).is_err());
        assert!(CorrectionMatrix::from_unlabeled(&[0.9, f64::NAN]).is_err());
    }

    #[test]
    fn test_length_mismatch() {
        let cm = CorrectionMatrix::from_unlabeled(&CONTROL).unwrap();
        assert!(cm.correct(&[0.5, 0.5]).is_err());
    }
}
