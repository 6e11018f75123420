//! Levelbot CLI
//!
//! Usage:
//!   levelbot --replay turns.jsonl               # Feed recorded evidence through the belief engine
//!   levelbot --interactive                      # Typed placement interview against the backend
//!   levelbot --serve                            # HTTP API server
//!   levelbot --replay turns.jsonl --json        # JSON output

use clap::Parser;
use colored::Colorize;
use serde::Deserialize;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use levelbot::core::{
    run_server, summary_distribution, BeliefEngine, Capabilities, FileStore, HttpBackend,
    KeyValueStore, MemoryStore, QuestionTypeSelector, Session, StopRule, TurnController,
    TurnOutcome,
};
use levelbot::types::{
    progress, EvaluationEntry, FinalScore, LevelDistribution, ObservationKind, ReasonCode,
    SelfReportedLevel, TurnHistory, TurnOutput, TurnRecord, UserProfile,
};
use levelbot::{SessionConfig, SessionError, QUALITY_DISCARD_BELOW, USEFUL_QUALITY, VERSION};

#[derive(Parser, Debug)]
#[command(
    name = "levelbot",
    version = VERSION,
    about = "Levelbot - adaptive spoken-language placement interview",
    long_about = "Levelbot estimates a speaker's CEFR level (A1..C1) from a short\n\
                  conversation. Every bot turn carries a quality score and an evidence\n\
                  distribution; the belief engine folds them into the running estimate\n\
                  and the stop rule decides when there is enough information.\n\n\
                  Modes:\n  \
                  --replay FILE  Replay recorded {quality, distribution} lines\n  \
                  --interactive  Typed interview against the backend\n  \
                  --serve        HTTP API server mode"
)]
struct Args {
    /// Replay a JSON-lines file of {"quality", "distribution"} turns
    #[arg(short, long, value_name = "FILE")]
    replay: Option<String>,

    /// Interactive typed interview
    #[arg(short, long)]
    interactive: bool,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Backend base URL (overrides the config file)
    #[arg(long)]
    backend: Option<String>,

    /// Session configuration file (JSON)
    #[arg(long, value_name = "FILE")]
    config: Option<String>,

    /// Directory for resumable session state (interactive mode)
    #[arg(long, default_value = "./levelbot-state")]
    state_dir: String,

    /// Self-reported level: low, medium, high
    #[arg(long)]
    level: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);
    if args.no_color {
        colored::control::set_override(false);
    }

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let result = if args.serve {
        run_serve(&args, config).await
    } else if let Some(path) = args.replay.as_deref() {
        run_replay(path, &args, &config)
    } else {
        run_interactive(&args, config).await
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<SessionConfig, SessionError> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };
    if let Some(url) = &args.backend {
        config.backend_url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn self_reported(args: &Args) -> SelfReportedLevel {
    args.level
        .as_deref()
        .map(SelfReportedLevel::parse)
        .unwrap_or_default()
}

// =============================================================================
// REPLAY
// =============================================================================

#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(default, alias = "Q")]
    quality: f64,
    #[serde(alias = "P_nueva")]
    distribution: LevelDistribution,
}

/// Feed recorded turns through belief, stop rule and selector
fn run_replay(path: &str, args: &Args, config: &SessionConfig) -> Result<(), SessionError> {
    let file = std::fs::File::open(path)
        .map_err(|e| SessionError::Config(format!("{}: {}", path, e)))?;

    let level = self_reported(args);
    let engine = BeliefEngine::from_config(config);
    let rule = StopRule::new();
    let selector = QuestionTypeSelector::new();
    let mut rng = rand::thread_rng();

    let mut distribution = LevelDistribution::seed(level);
    let mut qualities = Vec::new();
    let mut useful = 0u32;
    let mut history = TurnHistory::new();
    let mut log = Vec::new();

    if !args.json {
        print_header("Replay", args.no_color);
        println!("Seed ({}): {}", level, distribution.to_compact_string());
        println!();
    }

    for (n, line) in io::BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| SessionError::Config(format!("{}: {}", path, e)))?;
        if line.trim().is_empty() {
            continue;
        }
        let turn: ReplayLine = match serde_json::from_str(&line) {
            Ok(turn) => turn,
            Err(e) => {
                tracing::warn!(line = n + 1, error = %e, "skipping malformed replay line");
                continue;
            }
        };

        let first_turn = config.thread_first_turn && qualities.is_empty();
        distribution = engine.update(&distribution, &turn.distribution, turn.quality, first_turn);
        qualities.push(turn.quality);
        if turn.quality >= USEFUL_QUALITY {
            useful += 1;
        }
        log.push(EvaluationEntry {
            evidence: turn.distribution,
            quality: turn.quality,
        });

        let next = selector.select(&distribution, &history, &mut rng);
        history.push(TurnRecord::scored(
            format!("turn {}", n + 1),
            next,
            turn.quality,
            distribution,
        ));

        let decision = rule.evaluate(&distribution, &qualities, useful);
        let reason = if !decision.stop && turn.quality < QUALITY_DISCARD_BELOW {
            ReasonCode::S005_EVIDENCE_DISCARDED
        } else {
            decision.reason
        };
        let output = TurnOutput {
            timestamp: chrono::Utc::now(),
            quality: turn.quality,
            distribution,
            dominant: distribution.dominant(),
            confidence: distribution.confidence(),
            useful_turns: useful,
            progress: progress(useful),
            question_type: next,
            reason,
            finalized: decision.stop,
        };
        print_output(&output, args);

        if decision.stop {
            break;
        }
    }

    let summary = summary_distribution(&log);
    if args.json {
        let value = serde_json::json!({
            "final": distribution,
            "summary": summary,
            "useful_turns": useful,
            "turns": qualities.len(),
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    } else {
        println!();
        println!("{} {}", "Final:".bold(), distribution.to_compact_string());
        println!("{} {}", "Weighted summary:".bold(), summary.to_compact_string());
    }
    Ok(())
}

// =============================================================================
// INTERACTIVE
// =============================================================================

/// Typed interview against the HTTP backend; resumes from --state-dir
async fn run_interactive(args: &Args, config: SessionConfig) -> Result<(), SessionError> {
    let store: Arc<dyn KeyValueStore> = match FileStore::open(&args.state_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(error = %e, "state directory unavailable, session will not persist");
            Arc::new(MemoryStore::new())
        }
    };
    let backend = Arc::new(HttpBackend::new(config.backend_url.clone()));
    let caps = Capabilities::from_backend(backend);

    print_header("Interactive", args.no_color);

    let mut controller = match Session::restore(config.clone(), store.clone())? {
        Some(session) => {
            let mut controller = TurnController::new(session, caps);
            let closed = controller.session().score().cloned();
            if let Some(score) = closed {
                println!("This session is already closed.");
                print_score(&score, args);
                println!("Type 'reset' to start over, anything else to exit.");
                let line = read_line("> ")?;
                if !line.eq_ignore_ascii_case("reset") {
                    return Ok(());
                }
                controller.session_mut().reset()?;
                controller.open().await.map(|g| print_bot(&g))?;
            } else if controller.session().is_finalized() {
                println!("This session ended before it was scored. Scoring now...");
                let score = controller.finalize().await?;
                print_score(&score, args);
                return Ok(());
            } else {
                for record in controller.session().history().completed_exchanges() {
                    print_bot(record.prompt.as_deref().unwrap_or_default());
                    println!("{} {}", "You:".bold(), record.response.as_deref().unwrap_or_default());
                }
                if let Some(prompt) = controller.session().pending_prompt() {
                    print_bot(prompt);
                }
                controller.session_mut().resume_listening();
            }
            controller
        }
        None => {
            let profile = onboard(args)?;
            let session = Session::new(profile, config, store);
            let mut controller = TurnController::new(session, caps);
            let greeting = controller.open().await?;
            print_bot(&greeting);
            controller
        }
    };

    println!("Type your answers. 'quit' to exit, 'reset' to start over.");
    println!();

    loop {
        let line = read_line("> ")?;
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            println!("\nSession saved. Useful turns: {}", controller.session().useful_turns());
            break;
        }
        if line.eq_ignore_ascii_case("reset") {
            controller.session_mut().reset()?;
            let greeting = controller.open().await?;
            print_bot(&greeting);
            continue;
        }
        if line.is_empty() {
            continue;
        }

        match controller.run_turn(&line).await {
            Ok(TurnOutcome::Continue { reply, output }) => {
                print_bot(&reply);
                print_output(&output, args);
            }
            Ok(TurnOutcome::Finalize { output, .. }) => {
                print_output(&output, args);
                print_bot(&controller.session().profile().closing());
                match controller.session().score() {
                    Some(score) => print_score(score, args),
                    None => println!("Scoring failed. Run again later to retry."),
                }
                break;
            }
            Ok(TurnOutcome::Ignored(reason)) => println!("({})", reason.description()),
            Ok(TurnOutcome::NoSpeech) => {}
            Err(SessionError::Finalized) => {
                println!("The session is closed. Type 'reset' to start over.");
            }
            Err(e) if e.is_recoverable() => {
                eprintln!("{} {}", "!".yellow(), e);
                println!("Please answer again.");
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn onboard(args: &Args) -> Result<UserProfile, SessionError> {
    let name = read_line("Your name: ")?;
    let language = read_line("Language to assess: ")?;
    let situation = read_line("Conversation topic: ")?;
    let level = match &args.level {
        Some(_) => self_reported(args),
        None => SelfReportedLevel::parse(&read_line("Your level (low/medium/high): ")?),
    };
    let profile = UserProfile::new(name, language, situation, level);
    if !profile.is_complete() {
        return Err(SessionError::Config(
            "name, language and topic are required".to_string(),
        ));
    }
    Ok(profile)
}

fn read_line(prompt: &str) -> Result<String, SessionError> {
    print!("{}", prompt);
    io::stdout()
        .flush()
        .map_err(|e| SessionError::Config(e.to_string()))?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| SessionError::Config(e.to_string()))?;
    Ok(line.trim().to_string())
}

// =============================================================================
// SERVE
// =============================================================================

/// Run HTTP API server
async fn run_serve(args: &Args, config: SessionConfig) -> Result<(), SessionError> {
    println!();
    println!("{}", "Levelbot API Server".bold());
    println!("  Version: {}", VERSION);
    println!("  Backend: {}", config.backend_url);
    println!();

    let backend = Arc::new(HttpBackend::new(config.backend_url.clone()));
    let caps = Capabilities::from_backend(backend);
    run_server(&args.addr, config, caps)
        .await
        .map_err(|e| SessionError::Config(format!("server error: {}", e)))
}

// =============================================================================
// OUTPUT
// =============================================================================

fn print_header(mode: &str, no_color: bool) {
    let title = format!("  Levelbot v{} - {}", VERSION, mode);
    println!("========================================");
    if no_color {
        println!("{}", title);
    } else {
        println!("{}", title.bold());
    }
    println!("========================================");
    println!();
}

fn print_bot(text: &str) {
    println!("{} {}", "Bot:".cyan().bold(), text);
}

fn print_output(output: &TurnOutput, args: &Args) {
    if args.json {
        println!("{}", serde_json::to_string(output).unwrap_or_default());
    } else if args.no_color {
        println!("{}", output.to_parseable_string());
    } else {
        println!("{}", output.to_terminal_string());
    }
    if args.verbose && !args.json {
        println!("    {}", output.reason.description().dimmed());
    }
}

fn print_score(score: &FinalScore, args: &Args) {
    if args.json {
        println!("{}", serde_json::to_string_pretty(score).unwrap_or_default());
        return;
    }
    println!();
    println!("{} {}", "Level:".green().bold(), score.level);
    if !score.message.is_empty() {
        println!("{}", score.message);
    }
    for obs in &score.observations {
        match obs.kind {
            ObservationKind::Strength => println!("  {} {}", "+".green(), obs.text),
            ObservationKind::Advice => println!("  {} {}", "→".yellow(), obs.text),
        }
    }
}
