use ensemble_forecast::ensemble::EnsembleWeights;
use ensemble_forecast::error::AppError;
use ensemble_forecast::input::{parse_command, parse_round, Command};
use ensemble_forecast::model::Alphabet;

fn rbg() -> Alphabet {
    Alphabet::new(&["R", "B", "G"]).unwrap()
}

#[test]
fn parse_command_maps_case_insensitive_words() {
    let a = rbg();
    assert_eq!(parse_command("undo", &a), Some(Command::Undo));
    assert_eq!(parse_command("U", &a), Some(Command::Undo));
    assert_eq!(parse_command("RESET", &a), Some(Command::Reset));
    assert_eq!(parse_command("stats", &a), Some(Command::Stats));
    assert_eq!(parse_command("bt", &a), Some(Command::Backtest));
    assert_eq!(parse_command("tune", &a), Some(Command::Tune));
    assert_eq!(parse_command("retrain", &a), Some(Command::Retrain));
    assert_eq!(parse_command("weights", &a), Some(Command::ShowWeights));
    assert_eq!(parse_command("?", &a), Some(Command::Help));
    assert_eq!(parse_command("  quit ", &a), Some(Command::Quit));
}

#[test]
fn parse_command_reads_weight_vectors() {
    let a = rbg();
    assert_eq!(
        parse_command("weights 0.4 0.3 0.2 0.1", &a),
        Some(Command::SetWeights(EnsembleWeights::new(0.4, 0.3, 0.2, 0.1)))
    );
    let Some(Command::SetWeights(w)) = parse_command("w 1 1 1 1 2", &a) else {
        panic!("expected weights");
    };
    assert_eq!(w.classifier, 2.0);
    assert_eq!(parse_command("weights 0 0 0 0", &a), None);
    assert_eq!(parse_command("weights 1 x 1 1", &a), None);
    assert_eq!(parse_command("weights 1 1", &a), None);
}

#[test]
fn observations_are_not_commands() {
    let a = rbg();
    assert_eq!(parse_command("R", &a), None);
    assert_eq!(parse_command("R B G", &a), None);
    assert_eq!(parse_command("", &a), None);
}

#[test]
fn outcome_labels_shadow_short_aliases() {
    let a = Alphabet::new(&["W", "L"]).unwrap();
    assert_eq!(parse_command("W", &a), None);
    assert_eq!(parse_command("w", &a), None);
    assert_eq!(parse_round("w", &a, 1).unwrap().render(&a), "W");
    assert_eq!(parse_command("weights", &a), Some(Command::ShowWeights));
    assert_eq!(parse_command("q", &a), Some(Command::Quit));

    let words = Alphabet::new(&["SMALL", "BIG"]).unwrap();
    assert_eq!(parse_command("s", &words), None);
    assert_eq!(parse_command("stats", &words), Some(Command::Stats));
    assert!(matches!(
        parse_command("w 0.4 0.3 0.2 0.1", &a),
        Some(Command::SetWeights(_))
    ));
}

#[test]
fn parse_round_accepts_separated_and_compact_forms() {
    let a = rbg();
    let expected = parse_round("R B G R B", &a, 5).unwrap();
    assert_eq!(parse_round("r,b,g,r,b", &a, 5).unwrap(), expected);
    assert_eq!(parse_round("R; B; G; R; B", &a, 5).unwrap(), expected);
    assert_eq!(parse_round("rbgrb", &a, 5).unwrap(), expected);
    assert_eq!(expected.render(&a), "R B G R B");
}

#[test]
fn parse_round_single_slot() {
    let a = Alphabet::new(&["red", "black", "green"]).unwrap();
    let r = parse_round("Black", &a, 1).unwrap();
    assert_eq!(r.render(&a), "BLACK");
    assert_eq!(parse_round("g", &a, 1).unwrap().render(&a), "GREEN");
}

#[test]
fn parse_round_rejects_bad_input() {
    let a = rbg();
    assert!(matches!(parse_round("   ", &a, 1), Err(AppError::EmptyInput)));
    assert!(matches!(
        parse_round("R B", &a, 3),
        Err(AppError::RoundWidth { expected: 3, got: 2 })
    ));
    assert!(matches!(
        parse_round("RBX", &a, 3),
        Err(AppError::InvalidOutcome { .. })
    ));
    assert!(matches!(
        parse_round("Y", &a, 1),
        Err(AppError::InvalidOutcome { .. })
    ));
}

#[test]
fn compact_form_requires_unique_initials() {
    let a = Alphabet::new(&["RED", "ROSE", "BLUE"]).unwrap();
    assert!(!a.has_unique_initials());
    assert!(matches!(
        parse_round("RB", &a, 2),
        Err(AppError::RoundWidth { expected: 2, got: 1 })
    ));
    assert!(matches!(
        parse_round("R", &a, 1),
        Err(AppError::InvalidOutcome { .. })
    ));
    assert_eq!(parse_round("rose blue", &a, 2).unwrap().render(&a), "ROSE BLUE");
}

#[test]
fn labels_with_separators_are_rejected() {
    for bad in ["R,B", "R;B", "DARK RED"] {
        assert!(
            matches!(Alphabet::new(&[bad, "G"]), Err(AppError::Config(_))),
            "accepted {:?}",
            bad
        );
    }
    assert!(Alphabet::new(&[" R ", "G"]).is_ok());
}
