use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use strikeclock::prelude::*;
use strikeclock::ENGINE_NAME;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. RUST_LOG overrides the default level.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // 2. Load the session configuration from an optional TOML file.
    let path = std::env::args().nth(1).map(PathBuf::from);
    let config = SessionConfig::load_or_default(path.as_deref());
    info!(
        "Loaded session with {} enabled callouts, metronome {}.",
        config.enabled_callouts().len(),
        if config.metronome.enabled { "on" } else { "off" }
    );

    // 3. Create the SessionEngine with console collaborators.
    let engine = SessionEngine::new(
        config,
        Arc::new(ConsoleSpeaker),
        &ConsoleSoundLoader { visible: true },
    );

    // 4. Spawn listeners for both event streams.
    spawn_event_listeners(&engine);

    // 5. Run the session until it completes or Ctrl+C stops it.
    let final_state = engine.run().await?;
    print_summary(&final_state);

    Ok(())
}

/// Spawns one task per event stream, logging what the engine reports.
fn spawn_event_listeners(engine: &SessionEngine) {
    let mut session_rx = engine.subscribe_session_events();
    tokio::spawn(async move {
        while let Ok(event) = session_rx.recv().await {
            match event {
                SessionEvent::Tick { phase, seconds_left } => {
                    debug!("[TICK] {} {}", phase, format_clock(seconds_left));
                }
                SessionEvent::Spoke { .. } => {}
                other => info!("[SESSION] => {:?}", other),
            }
        }
    });

    let mut metronome_rx = engine.subscribe_metronome_events();
    tokio::spawn(async move {
        while let Ok(event) = metronome_rx.recv().await {
            match event {
                MetronomeEvent::Beat { .. } => debug!("[METRONOME] => {:?}", event),
                other => info!("[METRONOME] => {:?}", other),
            }
        }
    });
}

fn print_summary(state: &RunState) {
    println!("{}", "-----------------------------------------".dimmed());
    println!(
        "{} finished in round {} ({})",
        ENGINE_NAME.cyan(),
        state.current_round,
        state.phase
    );
    if !state.last_callout.is_empty() {
        println!("Last callout: {}", state.last_callout.yellow());
    }
    println!("{}", "-----------------------------------------".dimmed());
}
