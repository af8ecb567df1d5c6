use chrono::{TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;

use ensemble_forecast::classifier::{
    batch_size_for, softmax, train, ClassifierModel, FeatureExtractor, SoftmaxClassifier,
};
use ensemble_forecast::config::{ClassifierConfig, FeatureConfig};
use ensemble_forecast::model::{Alphabet, Distribution, History, Round};

fn alternating(len: usize) -> History {
    let alphabet = Alphabet::new(&["R", "B", "G"]).unwrap();
    let mut history = History::new(alphabet.clone(), 1, 10_000);
    for i in 0..len {
        let o = alphabet.outcome(i % 2).unwrap();
        let at = Utc.timestamp_opt(1_700_000_000 + i as i64 * 37, 0).unwrap();
        history.push(at, Round::single(o)).unwrap();
    }
    history
}

#[test]
fn feature_vector_has_declared_width_and_is_bounded() {
    let h = alternating(30);
    let extractor = FeatureExtractor::new(3, 1, FeatureConfig::default());
    assert_eq!(extractor.dim(), 3 * 3 + 1 + 5 + 2 + 1);
    for i in 0..h.len() {
        let x = extractor.extract(h.prefix(i), i, 0);
        assert_eq!(x.len(), extractor.dim());
        assert!(x.iter().all(|v| v.is_finite() && (-1.0..=1.0).contains(v)));
    }
}

#[test]
fn feature_extraction_is_pure() {
    let h = alternating(25);
    let extractor = FeatureExtractor::new(3, 1, FeatureConfig::default());
    let a = extractor.extract(h.as_slice(), h.len(), 0);
    let b = extractor.extract(h.as_slice(), h.len(), 0);
    assert_eq!(a, b);
}

#[test]
fn empty_prefix_features_are_zero_except_phase_and_slot() {
    let extractor = FeatureExtractor::new(3, 2, FeatureConfig::default());
    let x = extractor.extract(&[], 0, 1);
    let nonzero: Vec<usize> = x
        .iter()
        .enumerate()
        .filter(|(_, v)| **v != 0.0)
        .map(|(i, _)| i)
        .collect();
    // phase one-hot starts at 2n + 1, slot one-hot is at the tail
    assert_eq!(nonzero, vec![7, x.len() - 1]);
}

#[test]
fn streak_feature_is_capped() {
    let alphabet = Alphabet::new(&["R", "B"]).unwrap();
    let mut h = History::new(alphabet.clone(), 1, 100);
    for i in 0..30 {
        let at = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
        h.push_outcome(at, alphabet.outcome(0).unwrap()).unwrap();
    }
    let extractor = FeatureExtractor::new(2, 1, FeatureConfig::default());
    let x = extractor.extract(h.as_slice(), h.len(), 0);
    assert_eq!(x[2 * 2], 1.0);
}

#[test]
fn training_samples_only_see_earlier_rounds() {
    let h = alternating(40);
    let extractor = FeatureExtractor::new(3, 1, FeatureConfig::default());
    let samples = extractor.training_samples(h.as_slice(), 10);
    assert_eq!(samples.len(), 10);
    let last = samples.last().unwrap();
    assert_eq!(last.features, extractor.extract(h.prefix(39), 39, 0));
    assert_eq!(last.label, 1);
}

#[test]
fn training_is_skipped_below_min_samples() {
    let h = alternating(20);
    let extractor = FeatureExtractor::new(3, 1, FeatureConfig::default());
    let samples = extractor.training_samples(h.as_slice(), 500);
    let cfg = ClassifierConfig::default();
    assert!(samples.len() < cfg.min_samples);
    let mut rng = StdRng::seed_from_u64(3);
    assert!(train(&samples, 3, &cfg, &mut rng).is_none());
    let classifier = SoftmaxClassifier::fit(3, &samples, &cfg, &mut rng);
    assert!(!classifier.is_trained());
    assert_eq!(classifier.predict(&samples[0].features), Distribution::uniform(3));
}

/// An alternating stream is fully determined by the previous outcome.
#[test]
fn classifier_learns_alternating_stream() {
    let h = alternating(240);
    let extractor = FeatureExtractor::new(3, 1, FeatureConfig::default());
    let samples = extractor.training_samples(h.as_slice(), 500);
    let cfg = ClassifierConfig {
        learning_rate: 0.3,
        epochs: 80,
        ..ClassifierConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(11);
    let (model, report) = train(&samples, 3, &cfg, &mut rng).unwrap();
    assert_eq!(report.samples, 239);
    assert!(report.final_loss < 0.5, "loss = {}", report.final_loss);

    // Last observed is B, so R comes next.
    let x = extractor.extract(h.as_slice(), h.len(), 0);
    let p = model.predict_proba(&x);
    assert!(p.probs()[0] > 0.5, "p = {:?}", p.probs());
    assert!((p.sum() - 1.0).abs() < 1e-9);
}

#[test]
fn seeded_training_is_reproducible() {
    let h = alternating(120);
    let extractor = FeatureExtractor::new(3, 1, FeatureConfig::default());
    let samples = extractor.training_samples(h.as_slice(), 500);
    let cfg = ClassifierConfig::default();
    let a = train(&samples, 3, &cfg, &mut StdRng::seed_from_u64(42)).unwrap().0;
    let b = train(&samples, 3, &cfg, &mut StdRng::seed_from_u64(42)).unwrap().0;
    assert_eq!(a, b);
    assert!(a.bias.len() == 3 && a.dim() == extractor.dim());
}

#[test]
fn batch_size_is_bounded() {
    let cfg = ClassifierConfig::default();
    assert_eq!(batch_size_for(50, &cfg), 8);
    assert_eq!(batch_size_for(300, &cfg), 30);
    assert_eq!(batch_size_for(10_000, &cfg), 64);
    assert_eq!(batch_size_for(3, &cfg), 3);
}

#[test]
fn softmax_is_stable_for_large_logits() {
    let p = softmax(&[1000.0, 1000.0, -1000.0]);
    assert!((p[0] - 0.5).abs() < 1e-12);
    assert!(p[2] >= 0.0 && p[2] < 1e-12);
}

#[test]
fn snapshot_with_wrong_class_count_is_rejected() {
    let model = ClassifierModel {
        weights: vec![vec![0.0; 4]; 2],
        bias: vec![0.0; 2],
    };
    assert!(!SoftmaxClassifier::with_model(3, model.clone()).is_trained());
    let classifier = SoftmaxClassifier::with_model(2, model);
    assert!(classifier.is_trained());
    // Feature width mismatch degrades to uniform rather than panicking.
    assert_eq!(classifier.predict(&[1.0, 2.0]), Distribution::uniform(2));
}
