use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;

use ensemble_forecast::backtest::{WalkForwardEvaluator, WeightTuner};
use ensemble_forecast::config::Config;
use ensemble_forecast::ensemble::Forecast;
use ensemble_forecast::input::{parse_command, parse_round, Command};
use ensemble_forecast::model::{Alphabet, History};
use ensemble_forecast::predictor::Predictor;
use ensemble_forecast::store::{self, HistoryStore};

const HELP: &str = "\
Enter an observed round (e.g. `R`, `R B G`, `RBG`) or a command:
  undo | reset | stats | backtest | tune | retrain
  weights [slot markov pattern streak [classifier]]
  help | quit";

struct Session {
    config: Config,
    predictor: Predictor,
    history_store: Option<HistoryStore>,
    weights_path: PathBuf,
    model_path: PathBuf,
    saved_generation: u64,
}

impl Session {
    fn open(config: Config) -> Result<Self> {
        let alphabet = config.alphabet()?;
        let mut history_store = match HistoryStore::open(&store::history_path(&config.storage)) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "History log unavailable, running in memory");
                None
            }
        };
        let history = history_store
            .as_mut()
            .and_then(|s| {
                s.load(&alphabet, config.game.round_width, config.game.max_history)
                    .map_err(|e| {
                        tracing::warn!(error = %format!("{:#}", e), "Failed to replay history log");
                    })
                    .ok()
            })
            .unwrap_or_else(|| {
                History::new(alphabet.clone(), config.game.round_width, config.game.max_history)
            });

        let mut predictor = Predictor::with_history(&config, history)?;
        let weights_path = store::weights_path(&config.storage);
        let model_path = store::model_path(&config.storage);

        match store::load_weights(&weights_path) {
            Ok(Some(w)) => {
                if let Err(e) = predictor.replace_weights(w) {
                    tracing::warn!(error = %e, "Ignoring stored weights");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %format!("{:#}", e), "Failed to load stored weights"),
        }
        match store::load_model(&model_path) {
            Ok(Some(model)) => {
                if !predictor.install_model(model) {
                    tracing::warn!("Stored classifier does not match the configured game");
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %format!("{:#}", e), "Failed to load stored classifier"),
        }
        let saved_generation = predictor.model_generation();

        tracing::info!(
            rounds = predictor.history().len(),
            alphabet = %alphabet.labels().join("/"),
            width = config.game.round_width,
            "Session ready"
        );
        Ok(Self {
            config,
            predictor,
            history_store,
            weights_path,
            model_path,
            saved_generation,
        })
    }

    fn alphabet(&self) -> &Alphabet {
        self.predictor.alphabet()
    }

    /// Returns false when the session should end.
    fn handle_line(&mut self, line: &str) -> bool {
        if let Some(cmd) = parse_command(line, self.alphabet()) {
            return self.handle_command(cmd);
        }
        let width = self.config.game.round_width;
        let round = match parse_round(line, self.alphabet(), width) {
            Ok(r) => r,
            Err(e) => {
                println!("error: {}", e);
                return true;
            }
        };
        let observed_at = chrono::Utc::now();
        match self.predictor.observe(observed_at, round) {
            Ok(scored) => {
                if let Some(s) = scored {
                    println!(
                        "predicted {} / actual {}: {}",
                        s.predicted.render(self.alphabet()),
                        s.actual.render(self.alphabet()),
                        if s.round_correct { "hit" } else { "miss" }
                    );
                }
                if let (Some(store), Some(obs)) =
                    (&mut self.history_store, self.predictor.history().last())
                {
                    if let Err(e) = store.append(self.predictor.alphabet(), obs) {
                        tracing::warn!(error = %format!("{:#}", e), "Failed to append round to log");
                    }
                }
                self.persist_model_if_changed();
                self.forecast();
            }
            Err(e) => println!("error: {}", e),
        }
        true
    }

    fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Quit => return false,
            Command::Help => println!("{}", HELP),
            Command::Undo => match self.predictor.undo() {
                Some(obs) => {
                    println!("removed {}", obs.round.render(self.alphabet()));
                    if let Some(store) = &mut self.history_store {
                        if let Err(e) = store.truncate_last() {
                            tracing::warn!(error = %format!("{:#}", e), "Failed to truncate round log");
                        }
                    }
                    self.forecast();
                }
                None => println!("history is empty"),
            },
            Command::Reset => {
                self.predictor.reset();
                if let Some(store) = &mut self.history_store {
                    if let Err(e) = store.clear() {
                        tracing::warn!(error = %format!("{:#}", e), "Failed to clear round log");
                    }
                }
                println!("history cleared");
                self.forecast();
            }
            Command::Stats => self.print_stats(),
            Command::Backtest => self.backtest(),
            Command::Tune => self.tune(),
            Command::Retrain => {
                if self.predictor.retrain() {
                    println!("classifier retrained");
                    self.persist_model_if_changed();
                    self.forecast();
                } else {
                    println!(
                        "not enough history to train (need {} samples)",
                        self.config.classifier.min_samples
                    );
                }
            }
            Command::ShowWeights => {
                let w = self.predictor.weights();
                println!(
                    "slot={:.2} markov={:.2} pattern={:.2} streak={:.2} classifier={:.2}",
                    w.slot, w.markov, w.pattern, w.streak, w.classifier
                );
            }
            Command::SetWeights(w) => match self.predictor.replace_weights(w) {
                Ok(()) => {
                    self.persist_weights();
                    println!("weights updated");
                    self.forecast();
                }
                Err(e) => println!("error: {:#}", e),
            },
        }
        true
    }

    fn forecast(&mut self) {
        let forecast = self.predictor.predict();
        print_forecast(self.predictor.alphabet(), &forecast);
    }

    fn print_stats(&self) {
        let snap = self.predictor.metrics().snapshot();
        let pct = |v: Option<f64>| {
            v.map(|x| format!("{:.1}%", x * 100.0))
                .unwrap_or_else(|| "-".to_string())
        };
        println!(
            "rounds={} predictions={} correct={} accuracy={} slot_accuracy={} rolling({})={} best_streak={}",
            self.predictor.history().len(),
            snap.predictions,
            snap.correct,
            pct(snap.accuracy),
            pct(snap.slot_accuracy),
            snap.rolling_len,
            pct(snap.rolling_accuracy),
            snap.best_streak
        );
    }

    fn evaluator(&self) -> Option<WalkForwardEvaluator> {
        match WalkForwardEvaluator::from_config(&self.config) {
            Ok(e) => Some(e),
            Err(e) => {
                println!("error: {:#}", e);
                None
            }
        }
    }

    fn backtest(&self) {
        let Some(evaluator) = self.evaluator() else {
            return;
        };
        let report = evaluator.evaluate(self.predictor.history().as_slice(), &self.predictor.weights());
        if report.summary.rounds == 0 {
            println!(
                "need more than {} rounds to backtest",
                evaluator.min_train()
            );
            return;
        }
        println!(
            "backtest over {} rounds: round accuracy {:.1}%, slot accuracy {:.1}%",
            report.summary.rounds,
            report.summary.round_accuracy() * 100.0,
            report.summary.slot_accuracy() * 100.0
        );
    }

    fn tune(&mut self) {
        let Some(evaluator) = self.evaluator() else {
            return;
        };
        let min_train = evaluator.min_train();
        let tuner = WeightTuner::new(evaluator, self.config.backtest.grid_step);
        let base = self.predictor.weights();
        let Some(result) = tuner.tune(self.predictor.history().as_slice(), &base) else {
            println!("need more than {} rounds to tune", min_train);
            return;
        };
        println!(
            "best of {} grid points: slot={:.2} markov={:.2} pattern={:.2} streak={:.2} (slot accuracy {:.1}%)",
            result.evaluated,
            result.weights.slot,
            result.weights.markov,
            result.weights.pattern,
            result.weights.streak,
            result.summary.slot_accuracy() * 100.0
        );
        match self.predictor.replace_weights(result.weights) {
            Ok(()) => {
                self.persist_weights();
                self.forecast();
            }
            Err(e) => println!("error: {:#}", e),
        }
    }

    fn persist_weights(&self) {
        if let Err(e) = store::save_weights(&self.weights_path, &self.predictor.weights()) {
            tracing::warn!(error = %format!("{:#}", e), "Failed to persist weights");
        }
    }

    fn persist_model_if_changed(&mut self) {
        if self.predictor.model_generation() == self.saved_generation {
            return;
        }
        let Some(model) = self.predictor.classifier().model() else {
            return;
        };
        match store::save_model(&self.model_path, model) {
            Ok(()) => self.saved_generation = self.predictor.model_generation(),
            Err(e) => tracing::warn!(error = %format!("{:#}", e), "Failed to persist classifier"),
        }
    }
}

fn print_forecast(alphabet: &Alphabet, forecast: &Forecast) {
    for slot in &forecast.slots {
        let probs = alphabet
            .outcomes()
            .map(|o| format!("{}={:.3}", alphabet.label(o), slot.distribution.prob(o)))
            .collect::<Vec<_>>()
            .join(" ");
        println!(
            "next slot {}: {}  -> {}",
            slot.slot + 1,
            probs,
            alphabet.label(slot.pick)
        );
    }
}

fn main() -> Result<()> {
    let config = match Config::load() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };

    // Log to a file so it does not interleave with the prompt.
    let log_file = std::fs::File::create(&config.logging.file)?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .json()
        .init();

    tracing::info!(
        alphabet = %config.game.alphabet.join("/"),
        round_width = config.game.round_width,
        "Starting ensemble-forecast"
    );

    let mut session = Session::open(config)?;
    println!("{}", HELP);
    session.forecast();

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    for line in stdin.lock().lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !session.handle_line(line) {
            break;
        }
        stdout.flush()?;
    }

    tracing::info!(rounds = session.predictor.history().len(), "Session closed");
    Ok(())
}
