use chrono::{TimeZone, Utc};
use tempfile::tempdir;

use ensemble_forecast::classifier::{ClassifierModel, SoftmaxClassifier};
use ensemble_forecast::config::Config;
use ensemble_forecast::ensemble::{Ensemble, EnsembleWeights};
use ensemble_forecast::model::{Alphabet, History, Observation, Round};
use ensemble_forecast::store::{
    load_json, load_model, load_weights, save_model, save_weights, HistoryStore,
};

fn round(alphabet: &Alphabet, s: &str) -> Round {
    Round::new(
        s.chars()
            .map(|c| alphabet.parse(&c.to_string()).unwrap())
            .collect(),
    )
}

/// Reloading ten persisted rounds, with nanosecond timestamps, rebuilds the
/// same history and identical model outputs.
#[test]
fn history_round_trip_rebuilds_identical_models() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("history.sqlite");
    let mut cfg = Config::default();
    cfg.game.round_width = 3;
    let alphabet = cfg.alphabet().unwrap();

    let mut history = History::new(alphabet.clone(), 3, 1000);
    let mut store = HistoryStore::open(&path).unwrap();
    let rounds = ["RBG", "RRG", "BBG", "GRB", "RBG", "RRR", "BGR", "RBG", "GGB", "RBB"];
    for (i, r) in rounds.iter().enumerate() {
        let at = Utc
            .timestamp_opt(1_700_000_000 + i as i64 * 61, 123_456_789 + i as u32)
            .unwrap();
        history.push(at, round(&alphabet, r)).unwrap();
        store.append(&alphabet, history.last().unwrap()).unwrap();
    }
    assert_eq!(store.len().unwrap(), 10);
    drop(store);

    let mut reopened = HistoryStore::open(&path).unwrap();
    let restored = reopened.load(&alphabet, 3, 1000).unwrap();
    assert_eq!(restored.as_slice(), history.as_slice());

    let ensemble = Ensemble::from_config(&cfg).unwrap();
    let classifier = SoftmaxClassifier::untrained(3);
    assert_eq!(
        ensemble.components(history.as_slice(), &classifier),
        ensemble.components(restored.as_slice(), &classifier)
    );
}

#[test]
fn truncate_and_clear_follow_undo_and_reset() {
    let dir = tempdir().unwrap();
    let alphabet = Alphabet::new(&["R", "B"]).unwrap();
    let mut store = HistoryStore::open(&dir.path().join("h.sqlite")).unwrap();
    let mut history = History::new(alphabet.clone(), 1, 100);
    for (i, s) in ["R", "B", "B"].iter().enumerate() {
        let at = Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap();
        history.push(at, round(&alphabet, s)).unwrap();
        store.append(&alphabet, history.last().unwrap()).unwrap();
    }

    history.undo();
    assert!(store.truncate_last().unwrap());
    let restored = store.load(&alphabet, 1, 100).unwrap();
    assert_eq!(restored.as_slice(), history.as_slice());

    store.clear().unwrap();
    assert!(store.is_empty().unwrap());
    assert!(!store.truncate_last().unwrap());
}

#[test]
fn rows_outside_the_alphabet_are_skipped_on_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("h.sqlite");
    let wide = Alphabet::new(&["R", "B", "G"]).unwrap();
    let mut store = HistoryStore::open(&path).unwrap();
    let mut history = History::new(wide.clone(), 1, 100);
    for (i, s) in ["R", "G", "B"].iter().enumerate() {
        let at = Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap();
        history.push(at, round(&wide, s)).unwrap();
        store.append(&wide, history.last().unwrap()).unwrap();
    }

    let narrow = Alphabet::new(&["R", "B"]).unwrap();
    let restored = store.load(&narrow, 1, 100).unwrap();
    assert_eq!(restored.len(), 2);
    assert_eq!(restored.last().unwrap().round.render(&narrow), "B");
}

#[test]
fn undo_after_skipped_rows_removes_the_live_round() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("h.sqlite");
    let wide = Alphabet::new(&["R", "B", "G"]).unwrap();
    let mut store = HistoryStore::open(&path).unwrap();
    for (i, s) in ["R", "B", "G"].iter().enumerate() {
        let at = Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap();
        store
            .append(&wide, &Observation::new(at, round(&wide, s)))
            .unwrap();
    }
    drop(store);

    let narrow = Alphabet::new(&["R", "B"]).unwrap();
    let mut store = HistoryStore::open(&path).unwrap();
    let mut history = store.load(&narrow, 1, 100).unwrap();
    assert_eq!(history.len(), 2);

    // The skipped G row stays; the replayed B row goes.
    history.undo();
    assert!(store.truncate_last().unwrap());
    assert_eq!(store.len().unwrap(), 2);
    assert_eq!(store.load(&narrow, 1, 100).unwrap().as_slice(), history.as_slice());
    let labels: Vec<String> = store
        .load(&wide, 1, 100)
        .unwrap()
        .as_slice()
        .iter()
        .map(|o| o.round.render(&wide))
        .collect();
    assert_eq!(labels, vec!["R", "G"]);
}

#[test]
fn truncate_stops_at_rows_evicted_by_the_cap() {
    let dir = tempdir().unwrap();
    let alphabet = Alphabet::new(&["R", "B"]).unwrap();
    let mut store = HistoryStore::open(&dir.path().join("h.sqlite")).unwrap();
    for i in 0..4 {
        let at = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
        store
            .append(&alphabet, &Observation::new(at, round(&alphabet, "R")))
            .unwrap();
    }
    assert_eq!(store.load(&alphabet, 1, 2).unwrap().len(), 2);
    assert!(store.truncate_last().unwrap());
    assert!(store.truncate_last().unwrap());
    assert!(!store.truncate_last().unwrap());
    assert_eq!(store.len().unwrap(), 2);
}

#[test]
fn load_respects_history_cap() {
    let dir = tempdir().unwrap();
    let alphabet = Alphabet::new(&["R", "B"]).unwrap();
    let mut store = HistoryStore::open(&dir.path().join("h.sqlite")).unwrap();
    for i in 0..6 {
        let at = Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap();
        let label = if i % 3 == 0 { "R" } else { "B" };
        let obs = Observation::new(at, round(&alphabet, label));
        store.append(&alphabet, &obs).unwrap();
    }
    let restored = store.load(&alphabet, 1, 4).unwrap();
    assert_eq!(restored.len(), 4);
    assert_eq!(
        restored.as_slice()[0].observed_at,
        Utc.timestamp_opt(1_700_000_002, 0).unwrap()
    );
}

#[test]
fn weights_snapshot_round_trips_without_temp_residue() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.json");
    assert!(load_weights(&path).unwrap().is_none());

    let mut weights = EnsembleWeights::new(0.1, 0.5, 0.3, 0.1);
    weights.classifier = 0.2;
    save_weights(&path, &weights).unwrap();
    assert_eq!(load_weights(&path).unwrap(), Some(weights));

    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[test]
fn four_weight_snapshot_defaults_classifier_to_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.json");
    std::fs::write(
        &path,
        r#"{"slot":0.4,"markov":0.3,"pattern":0.2,"streak":0.1}"#,
    )
    .unwrap();
    let weights = load_weights(&path).unwrap().unwrap();
    assert_eq!(weights.classifier, 0.0);
    assert_eq!(weights.markov, 0.3);
}

#[test]
fn invalid_snapshots_are_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("weights.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(load_weights(&path).is_err());
    std::fs::write(
        &path,
        r#"{"slot":0.0,"markov":0.0,"pattern":0.0,"streak":0.0}"#,
    )
    .unwrap();
    assert!(load_weights(&path).is_err());
    assert!(load_json::<EnsembleWeights>(&path).unwrap().is_some());
}

#[test]
fn classifier_snapshot_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("model").join("classifier.json");
    let model = ClassifierModel {
        weights: vec![vec![0.25, -1.5], vec![0.0, 3.0], vec![1e-3, -2e-3]],
        bias: vec![0.1, -0.1, 0.0],
    };
    save_model(&path, &model).unwrap();
    let restored = load_model(&path).unwrap().unwrap();
    assert_eq!(restored, model);
    assert!(SoftmaxClassifier::with_model(3, restored).is_trained());
}
