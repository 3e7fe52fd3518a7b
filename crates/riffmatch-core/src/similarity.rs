//! Similarity scoring between fingerprints
//!
//! The score is the larger of two terms, clamped to `[0, 1]`:
//!
//! * shape: the Pearson correlation of the two vectors (cosine of the
//!   mean-centred vectors). Descriptor vectors are non-negative, so a plain
//!   cosine rates almost any two recordings as fairly similar. After
//!   centring, unrelated material sits near 0 and takes of the same part sit
//!   near 1.
//! * closeness: one minus the chord distance between the unit-length
//!   vectors, scaled so that only near-duplicates score above 0. Pearson
//!   ignores the mean level, so two nearly flat profiles (noisy or
//!   percussive takes) that differ only by noise can correlate at 0. This
//!   term keeps them near 1.
//!
//! Both terms are continuous in the vector values, so small changes in a
//! recording never flip the score between the ends of the range.
//!
//! Scores returned here are raw. Reference-folder weighting happens in the
//! matcher and never feeds back into this value.

use crate::error::IncompatibleFingerprintError;
use crate::fingerprint::Fingerprint;

/// Chord distance between unit vectors at which closeness reaches 0
const NEAR_DUPLICATE_DISTANCE: f64 = 0.25;

/// Check that two fingerprints can be compared
pub fn check_compatible(a: &Fingerprint, b: &Fingerprint) -> Result<(), IncompatibleFingerprintError> {
    if a.algorithm_id() != b.algorithm_id() {
        return Err(IncompatibleFingerprintError::AlgorithmMismatch {
            left: a.algorithm_id(),
            right: b.algorithm_id(),
        });
    }
    if a.vector().len() != b.vector().len() {
        return Err(IncompatibleFingerprintError::LengthMismatch {
            left: a.vector().len(),
            right: b.vector().len(),
        });
    }
    Ok(())
}

/// Raw similarity in `[0, 1]`.
///
/// `score(a, a) == 1.0` and `score(a, b) == score(b, a)` hold exactly.
pub fn score(a: &Fingerprint, b: &Fingerprint) -> Result<f32, IncompatibleFingerprintError> {
    check_compatible(a, b)?;
    Ok(vector_similarity(a.vector(), b.vector()))
}

/// Similarity of two equal-length vectors
pub(crate) fn vector_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a == b {
        return 1.0;
    }
    let similarity = correlation(a, b).max(closeness(a, b));
    if !similarity.is_finite() {
        return 0.0;
    }
    similarity.clamp(0.0, 1.0) as f32
}

/// Pearson correlation, 0 when either vector has no variance
fn correlation(a: &[f32], b: &[f32]) -> f64 {
    let ca = centred(a);
    let cb = centred(b);

    let mut dot = 0.0f64;
    let mut ss_a = 0.0f64;
    let mut ss_b = 0.0f64;
    for (x, y) in ca.iter().zip(&cb) {
        dot += x * y;
        ss_a += x * x;
        ss_b += y * y;
    }

    let r = dot / (ss_a * ss_b).sqrt();
    if r.is_finite() {
        r
    } else {
        0.0
    }
}

/// 1 for vectors pointing the same way, falling linearly to 0 at
/// `NEAR_DUPLICATE_DISTANCE`
fn closeness(a: &[f32], b: &[f32]) -> f64 {
    let ua = unit(a);
    let ub = unit(b);
    let distance = ua
        .iter()
        .zip(&ub)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt();
    (1.0 - distance / NEAR_DUPLICATE_DISTANCE).max(0.0)
}

fn centred(v: &[f32]) -> Vec<f64> {
    let n = v.len().max(1) as f64;
    let mean = v.iter().map(|&x| x as f64).sum::<f64>() / n;
    v.iter().map(|&x| x as f64 - mean).collect()
}

/// Unit-length copy in f64; an all-zero vector stays zero
fn unit(v: &[f32]) -> Vec<f64> {
    let norm = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter().map(|&x| x as f64 / norm).collect()
    } else {
        vec![0.0; v.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use riffmatch_fp::AlgorithmId;

    fn fp(values: Vec<f32>) -> Fingerprint {
        Fingerprint::from_vector(AlgorithmId::Chroma, values).unwrap()
    }

    fn profile(seed: u32) -> Vec<f32> {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        (0..12)
            .map(|_| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                (state >> 8) as f32 / (1u32 << 24) as f32
            })
            .collect()
    }

    #[test]
    fn test_reflexive_and_symmetric() {
        for seed in 0..20 {
            let a = fp(profile(seed));
            let b = fp(profile(seed + 100));
            assert_eq!(score(&a, &a).unwrap(), 1.0);
            assert_eq!(score(&a, &b).unwrap(), score(&b, &a).unwrap());
        }
    }

    #[test]
    fn test_scores_stay_in_unit_range() {
        for seed in 0..50 {
            let s = score(&fp(profile(seed)), &fp(profile(seed * 7 + 3))).unwrap();
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_gain_does_not_change_score() {
        let a = profile(1);
        let louder: Vec<f32> = a.iter().map(|v| v * 3.0).collect();
        assert_abs_diff_eq!(score(&fp(a), &fp(louder)).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_degrades_smoothly_with_divergence() {
        let a = profile(5);
        let b = profile(9);
        let mut last = 1.0f32;
        for step in 1..=10 {
            let t = step as f32 / 10.0;
            let mixed: Vec<f32> = a.iter().zip(&b).map(|(x, y)| x * (1.0 - t) + y * t).collect();
            let s = score(&fp(a.clone()), &fp(mixed)).unwrap();
            assert!(s <= last + 1e-6, "step {}: {} > {}", step, s, last);
            last = s;
        }
        // Near-duplicates stay near the top
        let nudged: Vec<f32> = a.iter().map(|v| v + 0.001).collect();
        assert!(score(&fp(a.clone()), &fp(nudged)).unwrap() > 0.99);
    }

    #[test]
    fn test_anti_correlated_clamps_to_zero() {
        let a = vec![1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let b: Vec<f32> = a.iter().map(|v| 1.0 - v).collect();
        assert_eq!(score(&fp(a), &fp(b)).unwrap(), 0.0);
    }

    #[test]
    fn test_flat_vectors() {
        let zero = fp(vec![0.0; 12]);
        let flat = fp(vec![0.1; 12]);
        let louder_flat = fp(vec![0.3; 12]);
        let shaped = fp(profile(3));
        assert_eq!(score(&zero, &zero).unwrap(), 1.0);
        assert_abs_diff_eq!(score(&flat, &louder_flat).unwrap(), 1.0, epsilon = 1e-6);
        // Silence against sound
        assert_eq!(score(&zero, &flat).unwrap(), 0.0);
        assert_eq!(score(&zero, &shaped).unwrap(), 0.0);
        assert_eq!(score(&shaped, &zero).unwrap(), 0.0);
    }

    #[test]
    fn test_near_flat_near_duplicates_score_high() {
        // Same level, noise patterns that are uncorrelated with each other
        let base = 1.0 / 12.0;
        let alternating: Vec<f32> = (0..12)
            .map(|i| base + if i % 2 == 0 { 1e-4 } else { -1e-4 })
            .collect();
        let pairwise: Vec<f32> = (0..12)
            .map(|i| base + if (i / 2) % 2 == 0 { 1e-4 } else { -1e-4 })
            .collect();
        let flat = vec![base; 12];

        let a = fp(alternating);
        let b = fp(pairwise);
        let f = fp(flat);
        assert!(score(&a, &b).unwrap() > 0.9, "{}", score(&a, &b).unwrap());
        assert!(score(&a, &f).unwrap() > 0.9);
        assert!(score(&f, &b).unwrap() > 0.9);
        assert_eq!(score(&a, &b).unwrap(), score(&b, &a).unwrap());
    }

    #[test]
    fn test_no_jump_as_profile_leaves_flatness() {
        // A ripple growing from nothing never drops the score off a cliff
        let flat = fp(vec![0.5; 12]);
        let mut last = 1.0f32;
        for step in 0..=40 {
            let depth = step as f32 * 0.0025;
            let rippled: Vec<f32> = (0..12)
                .map(|i| 0.5 + if i % 3 == 0 { depth } else { -depth / 2.0 })
                .collect();
            let s = score(&flat, &fp(rippled)).unwrap();
            assert!(last - s < 0.1, "depth {}: {} after {}", depth, s, last);
            last = s;
        }
    }

    #[test]
    fn test_different_algorithms_fail() {
        let a = fp(vec![0.5; 12]);
        let b = Fingerprint::from_vector(AlgorithmId::BandEnergy, vec![0.5; 16]).unwrap();
        assert_eq!(
            score(&a, &b).unwrap_err(),
            IncompatibleFingerprintError::AlgorithmMismatch {
                left: AlgorithmId::Chroma,
                right: AlgorithmId::BandEnergy,
            }
        );
    }
}
