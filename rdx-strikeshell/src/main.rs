use anyhow::Result;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strikeclock::prelude::*;
use strikeclock::{ENGINE_NAME, VERSION as LIB_VERSION};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", "   _____ __       _ __        _____ __         ____".cyan());
    println!("{}", "  / ___// /______(_) /_____  / ___// /_  ___  / / /".cyan());
    println!("{}", "  \\__ \\/ __/ ___/ / //_/ _ \\ \\__ \\/ __ \\/ _ \\/ / / ".cyan());
    println!("{}", " ___/ / /_/ /  / / ,< /  __/___/ / / / /  __/ / /  ".cyan());
    println!("{}", "/____/\\__/_/  /_/_/|_|\\___//____/_/ /_/\\___/_/_/   ".cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );

    println!("{}", "---------------------------------------------------------------".dimmed());

    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());

    println!("{}", "---------------------------------------------------------------".dimmed());
}

/// Spawns listeners that print session activity above the prompt.
fn spawn_event_listeners(engine: &SessionEngine, is_listening_to_ticks: Arc<AtomicBool>) {
    let mut session_rx = engine.subscribe_session_events();
    tokio::spawn(async move {
        while let Ok(event) = session_rx.recv().await {
            match event {
                SessionEvent::Tick { phase, seconds_left } => {
                    if is_listening_to_ticks.load(Ordering::Relaxed) {
                        println!("<-- [TICK] {} {}", phase, format_clock(seconds_left));
                    }
                }
                // The console speaker already prints every cue.
                SessionEvent::Spoke { .. } => {}
                SessionEvent::PhaseChanged { to, round, seconds_left, .. } => {
                    println!(
                        "\n<-- [PHASE] {} round {} ({})\n>> ",
                        to.label().cyan().bold(),
                        round,
                        format_clock(seconds_left)
                    );
                }
                SessionEvent::Finished { rounds_completed, completed, .. } => {
                    let outcome = if completed { "complete" } else { "stopped" };
                    println!(
                        "\n<-- [SESSION] {} after {} round(s). Type 'start' for a new one.\n>> ",
                        outcome, rounds_completed
                    );
                }
                other => println!("\n<-- [SESSION EVENT] {:?}\n>> ", other),
            }
        }
    });

    let mut metronome_rx = engine.subscribe_metronome_events();
    tokio::spawn(async move {
        while let Ok(event) = metronome_rx.recv().await {
            match event {
                MetronomeEvent::Beat { .. } | MetronomeEvent::Ducked { .. } => {}
                other => println!("\n<-- [METRONOME] {:?}\n>> ", other),
            }
        }
    });
}

fn create_engine(config: &SessionConfig, is_listening_to_ticks: &Arc<AtomicBool>) -> SessionEngine {
    let engine = SessionEngine::new(
        config.clone(),
        Arc::new(ConsoleSpeaker),
        &ConsoleSoundLoader { visible: false },
    );
    spawn_event_listeners(&engine, is_listening_to_ticks.clone());
    engine
}

fn print_status(engine: &SessionEngine) {
    let SessionSnapshot { run, metronome } = engine.snapshot();
    let rounds = engine.config().rounds;
    let mode = if run.is_paused {
        "paused".yellow()
    } else if run.is_running {
        "running".green()
    } else {
        "idle".dimmed()
    };
    println!(
        "  {:<9} round {}/{}  {}  [{}]",
        run.phase.label().cyan().bold(),
        run.current_round,
        rounds,
        format_clock(run.seconds_left),
        mode
    );
    if !run.last_callout.is_empty() {
        println!("  last callout: {}", run.last_callout.yellow());
    }
    println!(
        "  metronome: {:?} {} BPM, volume {:.2}{}, {} beats{}",
        metronome.transport,
        metronome.bpm,
        metronome.volume,
        if metronome.is_ducked { " (ducked)" } else { "" },
        metronome.beat_count,
        if metronome.is_counting_in {
            format!(", count-in {}", metronome.count_in_remaining)
        } else {
            String::new()
        }
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    let path = env::args().nth(1).map(PathBuf::from);
    let config = SessionConfig::load_or_default(path.as_deref());

    // Create the shared flag for the tick listener.
    let is_listening_to_ticks = Arc::new(AtomicBool::new(false));

    info!("Creating {} session...", ENGINE_NAME.cyan());
    let mut engine = create_engine(&config, &is_listening_to_ticks);

    let mut rl = Editor::new()?;
    let helper = CommandHighlighter {};
    rl.set_helper(Some(helper));

    println!("{} is ready. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let readline = rl.readline(&prompt);
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let args = line.split_whitespace().collect::<Vec<_>>();

                if let Some(command) = args.first() {
                    match *command {
                        "start" => {
                            // A finished session cannot be restarted; build a fresh one.
                            if engine.state().phase == RunnerPhase::Finished {
                                engine.shutdown().await;
                                engine = create_engine(&config, &is_listening_to_ticks);
                            }
                            engine.start();
                            println!("--> Session started.");
                        }
                        "pause" => engine.pause(),
                        "resume" => engine.resume(),
                        "stop" => engine.stop(),
                        "bpm" => match args.get(1).map(|v| v.parse::<u32>()) {
                            Some(Ok(bpm)) => {
                                let applied = engine.set_metronome_bpm(bpm);
                                println!("--> Metronome set to {} BPM.", applied);
                            }
                            Some(Err(_)) => println!("Error: '{}' is not a valid tempo.", args[1]),
                            None => println!("Usage: bpm <40-220>"),
                        },
                        "volume" => match args.get(1).map(|v| v.parse::<f32>()) {
                            Some(Ok(volume)) => match engine.set_metronome_volume(volume) {
                                Some(applied) => println!("--> Metronome volume set to {:.2}.", applied),
                                None => println!("Error: volume must be a finite number."),
                            },
                            Some(Err(_)) => println!("Error: '{}' is not a valid volume.", args[1]),
                            None => println!("Usage: volume <0.0-1.0>"),
                        },
                        "duck" => match args.get(1).map(|v| v.parse::<u64>()) {
                            Some(Ok(millis)) => {
                                engine.duck_metronome(Some(Duration::from_millis(millis)));
                                println!("--> Ducking the metronome for {}ms.", millis);
                            }
                            Some(Err(_)) => println!("Error: '{}' is not a number of milliseconds.", args[1]),
                            None => {
                                engine.duck_metronome(None);
                                println!("--> Ducking the metronome.");
                            }
                        },
                        "status" => print_status(&engine),
                        "callouts" => {
                            println!("Callouts:");
                            for callout in &engine.config().callouts {
                                let marker = if callout.enabled { "x".green() } else { " ".normal() };
                                println!("  [{}] {:>4}  {}", marker, callout.id, callout.label);
                            }
                        }
                        "ticks" => match args.get(1) {
                            Some(&"on") => {
                                is_listening_to_ticks.store(true, Ordering::Relaxed);
                                println!("--> Started printing the per-second ticks.");
                            }
                            Some(&"off") => {
                                is_listening_to_ticks.store(false, Ordering::Relaxed);
                                println!("--> Stopped printing the per-second ticks.");
                            }
                            _ => println!("Usage: ticks <on|off>"),
                        },
                        "help" => {
                            println!("Available commands:");
                            println!("  start                 - Starts the session (a new one if finished).");
                            println!("  pause | resume        - Pauses or resumes the session.");
                            println!("  stop                  - Ends the session early.");
                            println!("  bpm <N>               - Sets the live metronome tempo.");
                            println!("  volume <V>            - Sets the live metronome volume.");
                            println!("  duck [MS]             - Ducks the metronome (600ms by default).");
                            println!("  status                - Shows the session and metronome state.");
                            println!("  callouts              - Lists the callout catalogue.");
                            println!("  ticks <on|off>        - Toggles printing the per-second ticks.");
                            println!("  exit                  - Quits the shell.");
                        }
                        "exit" => break,
                        _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
                    }
                }
            }
            Err(_) => {
                println!("Exiting strikeshell...");
                break;
            }
        }
    }

    engine.shutdown().await;
    Ok(())
}
