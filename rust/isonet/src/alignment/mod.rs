//! Global alignment of mass isotopomer distributions.
//!
//! MIDs of different metabolites rarely have the same length, so they are
//! aligned with a Needleman-Wunsch style dynamic program over the numeric
//! values. Gaps are padded with zeros and the normalized euclidean distance
//! between the padded vectors is compared against a Monte-Carlo null model
//! of random MIDs with the same lengths (see [`null_model`]).

pub mod null_model;

use crate::errors::InputValidationError;
pub use null_model::{
    NullModel,
    NullModelCache,
};

pub const DEFAULT_GAP_PENALTY: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trace {
    Start,
    Diag,
    Up,
    Left,
}

/// Two gap-padded MIDs of equal length and their normalized distance.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedMids {
    pub mid1: Vec<f64>,
    pub mid2: Vec<f64>,
    pub distance: f64,
}

/// Aligns `mid1` against `mid2` and returns the padded vectors.
///
/// Moving UP consumes an element of `mid2` against a gap, moving LEFT
/// consumes an element of `mid1`. Both gap costs grow with how far the
/// move is from the diagonal. Ties resolve DIAG, then UP, then LEFT.
///
/// # Example
///
/// ```
/// use isonet::alignment::align_vectors;
///
/// let out = align_vectors(&[0.9, 0.08, 0.02], &[0.9, 0.08, 0.02], 0.2).unwrap();
/// assert_eq!(out.distance, 0.0);
/// assert_eq!(out.mid1, vec![0.9, 0.08, 0.02]);
/// ```
pub fn align_vectors(
    mid1: &[f64],
    mid2: &[f64],
    gap_penalty: f64,
) -> Result<AlignedMids, InputValidationError> {
    if mid1.is_empty() || mid2.is_empty() {
        return Err(InputValidationError::EmptyMid {
            context: "align_vectors",
        });
    }

    let s_x = mid1.len() + 1;
    let s_y = mid2.len() + 1;
    let idx = |x: usize, y: usize| x * s_y + y;

    let mut score = vec![0.0; s_x * s_y];
    let mut trace = vec![Trace::Start; s_x * s_y];
    for x in 1..s_x {
        score[idx(x, 0)] = x as f64 * gap_penalty;
        trace[idx(x, 0)] = Trace::Left;
    }
    for y in 1..s_y {
        score[idx(0, y)] = y as f64 * gap_penalty;
        trace[idx(0, y)] = Trace::Up;
    }

    for y in 1..s_y {
        for x in 1..s_x {
            let off_diagonal = (x.abs_diff(y) + 1) as f64 * gap_penalty;
            let s_diag = score[idx(x - 1, y - 1)] + (mid1[x - 1] - mid2[y - 1]).abs();
            let s_up = score[idx(x, y - 1)] + off_diagonal + mid2[y - 1].abs();
            let s_left = score[idx(x - 1, y)] + off_diagonal + mid1[x - 1].abs();

            let (best, direction) = if s_diag <= s_up && s_diag <= s_left {
                (s_diag, Trace::Diag)
            } else if s_up <= s_left {
                (s_up, Trace::Up)
            } else {
                (s_left, Trace::Left)
            };
            score[idx(x, y)] = best;
            trace[idx(x, y)] = direction;
        }
    }

    let mut r_mid1 = Vec::with_capacity(s_x + s_y);
    let mut r_mid2 = Vec::with_capacity(s_x + s_y);
    let (mut x, mut y) = (s_x - 1, s_y - 1);
    while x != 0 || y != 0 {
        match trace[idx(x, y)] {
            Trace::Diag => {
                r_mid1.push(mid1[x - 1]);
                r_mid2.push(mid2[y - 1]);
                x -= 1;
                y -= 1;
            }
            Trace::Up => {
                r_mid1.push(0.0);
                r_mid2.push(mid2[y - 1]);
                y -= 1;
            }
            Trace::Left => {
                r_mid1.push(mid1[x - 1]);
                r_mid2.push(0.0);
                x -= 1;
            }
            Trace::Start => unreachable!("traceback reached the origin early at ({x}, {y})"),
        }
    }
    r_mid1.reverse();
    r_mid2.reverse();

    for v in r_mid1.iter_mut().chain(r_mid2.iter_mut()) {
        if !v.is_finite() {
            *v = 0.0;
        }
    }

    let dist = r_mid1
        .iter()
        .zip(r_mid2.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt();
    let distance = (dist / (mid1.len() + mid2.len()) as f64).abs();

    Ok(AlignedMids {
        mid1: r_mid1,
        mid2: r_mid2,
        distance,
    })
}

/// Result of aligning two MIDs, with its significance against the null model.
#[derive(Debug, Clone, PartialEq)]
pub struct MidAlignment {
    pub mid1: Vec<f64>,
    pub mid2: Vec<f64>,
    pub distance: f64,
    /// `None` when the null model has no spread and the z-score is undefined.
    pub zscore: Option<f64>,
}

impl MidAlignment {
    /// Lower distances are better, so this is a left tail test.
    pub fn is_significant(&self, z_threshold: f64) -> bool {
        matches!(self.zscore, Some(z) if z <= z_threshold)
    }
}

/// Aligns MIDs and scores them against a shared null model cache.
#[derive(Debug, Clone, Copy)]
pub struct MidAligner<'a> {
    cache: &'a NullModelCache,
    gap_penalty: f64,
}

impl<'a> MidAligner<'a> {
    pub fn new(cache: &'a NullModelCache, gap_penalty: f64) -> Self {
        Self { cache, gap_penalty }
    }

    pub fn gap_penalty(&self) -> f64 {
        self.gap_penalty
    }

    pub fn align(&self, mid1: &[f64], mid2: &[f64]) -> Result<MidAlignment, InputValidationError> {
        let aligned = align_vectors(mid1, mid2, self.gap_penalty)?;
        let model = self
            .cache
            .get_or_simulate(mid1.len(), mid2.len(), self.gap_penalty)?;
        Ok(MidAlignment {
            zscore: model.zscore(aligned.distance),
            mid1: aligned.mid1,
            mid2: aligned.mid2,
            distance: aligned.distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_alignment() {
        let v = vec![0.5, 0.2, 0.2, 0.1];
        let out = align_vectors(&v, &v, DEFAULT_GAP_PENALTY).unwrap();
        assert_eq!(out.distance, 0.0);
        assert_eq!(out.mid1, v);
        assert_eq!(out.mid2, v);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let cases: [(&[f64], &[f64]); 4] = [
            (&[0.9, 0.08, 0.02], &[0.1, 0.3, 0.6]),
            (&[0.7, 0.2, 0.1], &[0.4, 0.3, 0.2, 0.1]),
            (&[0.2, 0.3, 0.1, 0.3, 0.1], &[0.6, 0.4]),
            (&[1.0], &[0.25, 0.25, 0.25, 0.25]),
        ];
        for (a, b) in cases {
            let ab = align_vectors(a, b, DEFAULT_GAP_PENALTY).unwrap();
            let ba = align_vectors(b, a, DEFAULT_GAP_PENALTY).unwrap();
            assert!(
                (ab.distance - ba.distance).abs() < 1e-12,
                "{:?} vs {:?}: {} != {}",
                a,
                b,
                ab.distance,
                ba.distance
            );
        }
    }

    #[test]
    fn test_outputs_have_equal_length() {
        let out = align_vectors(&[0.6, 0.4], &[0.2, 0.3, 0.1, 0.3, 0.1], 0.2).unwrap();
        assert_eq!(out.mid1.len(), out.mid2.len());
        assert!(out.mid1.len() >= 5);
        // Every input value survives the traceback in order.
        let kept: Vec<f64> = out.mid2.iter().copied().filter(|x| *x != 0.0).collect();
        assert_eq!(kept, vec![0.2, 0.3, 0.1, 0.3, 0.1]);
    }

    #[test]
    fn test_single_element_gap_cost() {
        // A cheap gap lets the trailing zero pair with padding.
        let out = align_vectors(&[1.0], &[1.0, 0.0], 0.01).unwrap();
        assert_eq!(out.mid1, vec![1.0, 0.0]);
        assert_eq!(out.mid2, vec![1.0, 0.0]);
        assert_eq!(out.distance, 0.0);

        // An expensive one pushes the mismatch onto the diagonal.
        let out = align_vectors(&[1.0], &[1.0, 0.0], 10.0).unwrap();
        assert_eq!(out.mid1, vec![0.0, 1.0]);
        assert_eq!(out.mid2, vec![1.0, 0.0]);
        assert!(out.distance > 0.0);
    }

    #[test]
    fn test_non_finite_values_are_clamped() {
        let out = align_vectors(&[f64::NAN, 0.5], &[0.5, 0.5], 0.2).unwrap();
        assert!(out.mid1.iter().all(|x| x.is_finite()));
        assert!(out.distance.is_finite());
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(align_vectors(&[], &[1.0], 0.2).is_err());
        assert!(align_vectors(&[1.0], &[], 0.2).is_err());
    }

    #[test]
    fn test_aligner_flags_similar_mids() {
        let cache = NullModelCache::with_seed(1000, 42);
        let aligner = MidAligner::new(&cache, DEFAULT_GAP_PENALTY);

        let same = aligner.align(&[0.9, 0.08, 0.02], &[0.9, 0.08, 0.02]).unwrap();
        assert!(same.distance.abs() < 1e-12);
        assert!(same.is_significant(-1.0), "z = {:?}", same.zscore);

        let different = aligner.align(&[0.9, 0.08, 0.02], &[0.1, 0.3, 0.6]).unwrap();
        assert!(!different.is_significant(-1.0), "z = {:?}", different.zscore);
    }
}
