//! Tests for cross-folder matching

use super::*;
use approx::assert_abs_diff_eq;
use riffmatch_fp::AlgorithmId;

/// Zero-mean basis vectors, orthogonal to each other
fn basis() -> (Vec<f32>, Vec<f32>) {
    let x: Vec<f32> = (0..12).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
    let y: Vec<f32> = (0..12).map(|i| if (i / 2) % 2 == 0 { 1.0 } else { -1.0 }).collect();
    (x, y)
}

fn target() -> Fingerprint {
    let (x, _) = basis();
    Fingerprint::from_vector(AlgorithmId::Chroma, x)
        .unwrap()
        .with_source("/music/new/take.wav", 1)
}

/// Candidate whose raw score against `target()` is exactly `r`
fn candidate_with_score(r: f32, name: &str, folder: &str) -> MatchCandidate {
    let (x, y) = basis();
    let s = (1.0 - r * r).sqrt();
    let v = x.iter().zip(&y).map(|(a, b)| r * a + s * b).collect();
    MatchCandidate {
        fingerprint: Fingerprint::from_vector(AlgorithmId::Chroma, v)
            .unwrap()
            .with_source(format!("{}/{}.wav", folder, name), 1),
        provided_name: name.to_string(),
        folder_path: PathBuf::from(folder),
        source_path: PathBuf::from(format!("{}/{}.wav", folder, name)),
    }
}

fn matcher() -> CrossFolderMatcher {
    CrossFolderMatcher::new(&MatchingConfig::default())
}

#[test]
fn test_empty_pool_is_not_an_error() {
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &[], &ReferenceIndex::default(), 0.75)
        .unwrap();
    assert!(result.selected.is_none());
    assert!(result.all_scored.is_empty());
    assert_eq!(result.candidates_considered, 0);
    assert_eq!(result.raw_score, 0.0);
    assert!(result.best_near_miss().is_none());
}

#[test]
fn test_selects_exact_duplicate() {
    let pool = vec![
        candidate_with_score(0.1, "other", "/music/old"),
        candidate_with_score(1.0, "riff", "/music/old"),
        candidate_with_score(0.3, "ballad", "/music/old"),
    ];
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &pool, &ReferenceIndex::default(), 0.75)
        .unwrap();

    assert_eq!(result.selected.unwrap().provided_name, "riff");
    assert_abs_diff_eq!(result.raw_score, 1.0, epsilon = 1e-5);
    assert_eq!(result.candidates_considered, 3);
}

#[test]
fn test_dissimilar_pool_selects_nothing() {
    let pool = vec![
        candidate_with_score(0.2, "a", "/music/old"),
        candidate_with_score(0.5, "b", "/music/old"),
    ];
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &pool, &ReferenceIndex::default(), 0.75)
        .unwrap();

    assert!(result.selected.is_none());
    let near = result.best_near_miss().unwrap();
    assert_eq!(near.candidate.provided_name, "b");
    assert_abs_diff_eq!(near.raw_score, 0.5, epsilon = 1e-5);
}

#[test]
fn test_global_reference_outranks_higher_raw_score() {
    let pool = vec![
        candidate_with_score(0.80, "plain", "/music/2024-05"),
        candidate_with_score(0.70, "canonical", "/music/masters"),
    ];
    let references = ReferenceIndex::new(&[ReferenceFolderMark::global("/music/masters")]);
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &pool, &references, 0.75)
        .unwrap();

    let top = &result.all_scored[0];
    assert_eq!(top.candidate.provided_name, "canonical");
    assert_eq!(top.boost, Boost::Global);
    assert_abs_diff_eq!(top.weighted_score, 0.85, epsilon = 1e-5);
    // Raw score stays unboosted
    assert_abs_diff_eq!(top.raw_score, 0.70, epsilon = 1e-5);
    assert_abs_diff_eq!(result.raw_score, 0.70, epsilon = 1e-5);

    assert_eq!(result.all_scored[1].boost, Boost::None);
    assert_eq!(result.selected.unwrap().provided_name, "canonical");
}

#[test]
fn test_local_reference_only_applies_in_target_folder() {
    let references = ReferenceIndex::new(&[ReferenceFolderMark::local("/music/new")]);
    assert_eq!(
        references.boost_for(Path::new("/music/new"), Path::new("/music/new")),
        Boost::Local
    );
    assert_eq!(
        references.boost_for(Path::new("/music/new"), Path::new("/music/other")),
        Boost::None
    );

    let pool = vec![candidate_with_score(0.70, "local", "/music/new")];
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &pool, &references, 0.75)
        .unwrap();
    assert_abs_diff_eq!(result.weighted_score, 0.80, epsilon = 1e-5);
    assert!(result.selected.is_some());
}

#[test]
fn test_weighted_score_saturates() {
    let mark = ReferenceFolderMark {
        folder_path: PathBuf::from("/music/new"),
        is_global_reference: true,
        is_local_reference: true,
    };
    let references = ReferenceIndex::new(&[mark]);
    let pool = vec![candidate_with_score(1.0, "riff", "/music/new")];
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &pool, &references, 0.75)
        .unwrap();

    assert_eq!(result.all_scored[0].boost, Boost::Global);
    assert!(result.weighted_score <= 1.0);
    assert_abs_diff_eq!(result.weighted_score, 1.0, epsilon = 1e-6);
}

#[test]
fn test_ties_break_on_folder_path() {
    let pool = vec![
        candidate_with_score(0.9, "riff", "/music/b"),
        candidate_with_score(0.9, "riff", "/music/a"),
        candidate_with_score(0.9, "riff", "/music/c"),
    ];
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &pool, &ReferenceIndex::default(), 0.75)
        .unwrap();

    let folders: Vec<_> = result
        .all_scored
        .iter()
        .map(|s| s.candidate.folder_path.clone())
        .collect();
    assert_eq!(
        folders,
        vec![
            PathBuf::from("/music/a"),
            PathBuf::from("/music/b"),
            PathBuf::from("/music/c"),
        ]
    );
}

#[test]
fn test_other_algorithms_are_skipped() {
    let mut pool = vec![candidate_with_score(0.9, "riff", "/music/old")];
    pool.push(MatchCandidate {
        fingerprint: Fingerprint::from_vector(AlgorithmId::BandEnergy, vec![0.5; 16]).unwrap(),
        provided_name: "bands".to_string(),
        folder_path: PathBuf::from("/music/old"),
        source_path: PathBuf::from("/music/old/bands.wav"),
    });
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &pool, &ReferenceIndex::default(), 0.75)
        .unwrap();

    assert_eq!(result.candidates_considered, 1);
    assert_eq!(result.all_scored[0].candidate.provided_name, "riff");
}

#[test]
fn test_diagnostics_are_capped() {
    let config = MatchingConfig {
        max_diagnostics: 3,
        ..MatchingConfig::default()
    };
    let pool: Vec<_> = (0..8)
        .map(|i| candidate_with_score(0.1 * i as f32, &format!("song{}", i), "/music/old"))
        .collect();
    let result = CrossFolderMatcher::new(&config)
        .find_best_match(&target(), Path::new("/music/new"), &pool, &ReferenceIndex::default(), 0.5)
        .unwrap();

    assert_eq!(result.all_scored.len(), 3);
    assert_eq!(result.candidates_considered, 8);
    assert_eq!(result.selected.unwrap().provided_name, "song7");
    let raws: Vec<f32> = result.all_scored.iter().map(|s| s.raw_score).collect();
    assert!(raws.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_result_serialises_to_json() {
    let pool = vec![candidate_with_score(0.9, "riff", "/music/old")];
    let result = matcher()
        .find_best_match(&target(), Path::new("/music/new"), &pool, &ReferenceIndex::default(), 0.75)
        .unwrap();

    let json = serde_json::to_string(&result).unwrap();
    assert!(json.contains("\"boost\":\"none\""));
    let back: MatchResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back, result);
}
