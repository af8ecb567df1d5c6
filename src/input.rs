use crate::ensemble::EnsembleWeights;
use crate::error::AppError;
use crate::model::{Alphabet, Round};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Undo,
    Reset,
    Stats,
    Backtest,
    Tune,
    Retrain,
    ShowWeights,
    SetWeights(EnsembleWeights),
    Help,
    Quit,
}

/// Maps a line to a session command. Anything else is treated as an
/// observation by the caller. A bare word that names an outcome of `alphabet`
/// is always an observation, so labels shadow short aliases like `w` or `s`.
pub fn parse_command(line: &str, alphabet: &Alphabet) -> Option<Command> {
    let mut parts = line.split_whitespace();
    let head = parts.next()?.to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();
    if args.is_empty() && alphabet.parse(&head).is_ok() {
        return None;
    }
    match (head.as_str(), args.len()) {
        ("undo" | "u", 0) => Some(Command::Undo),
        ("reset", 0) => Some(Command::Reset),
        ("stats" | "s", 0) => Some(Command::Stats),
        ("backtest" | "bt", 0) => Some(Command::Backtest),
        ("tune", 0) => Some(Command::Tune),
        ("retrain", 0) => Some(Command::Retrain),
        ("weights" | "w", 0) => Some(Command::ShowWeights),
        ("weights" | "w", 4 | 5) => parse_weights(&args).map(Command::SetWeights),
        ("help" | "?", 0) => Some(Command::Help),
        ("quit" | "exit" | "q", 0) => Some(Command::Quit),
        _ => None,
    }
}

fn parse_weights(args: &[&str]) -> Option<EnsembleWeights> {
    let values: Vec<f64> = args
        .iter()
        .map(|a| a.parse::<f64>().ok())
        .collect::<Option<_>>()?;
    let mut weights = EnsembleWeights::new(values[0], values[1], values[2], values[3]);
    if let Some(classifier) = values.get(4) {
        weights.classifier = *classifier;
    }
    weights.validate().ok()?;
    Some(weights)
}

/// Parses one observed round.
///
/// Accepts `width` tokens separated by whitespace, commas or semicolons
/// (`R B G`, `red,blue,green`), or, when every label has a distinct initial,
/// a compact string of exactly `width` initials (`RBG`). Labels match
/// case-insensitively.
pub fn parse_round(line: &str, alphabet: &Alphabet, width: usize) -> Result<Round, AppError> {
    let tokens: Vec<&str> = line
        .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return Err(AppError::EmptyInput);
    }

    if tokens.len() == 1 && width > 1 && alphabet.has_unique_initials() {
        let token = tokens[0];
        if token.chars().count() == width {
            let slots = token
                .chars()
                .map(|c| {
                    let mut buf = [0u8; 4];
                    alphabet.parse(c.encode_utf8(&mut buf))
                })
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(Round::new(slots));
        }
    }

    if tokens.len() != width {
        return Err(AppError::RoundWidth {
            expected: width,
            got: tokens.len(),
        });
    }
    let slots = tokens
        .iter()
        .map(|t| alphabet.parse(t))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Round::new(slots))
}
