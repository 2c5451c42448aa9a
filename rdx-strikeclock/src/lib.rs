//! # Strikeclock
//!
//! A round timer engine for combat-sports training, with voice callouts and a
//! drift-free metronome.
//!
//! Strikeclock drives a session through its countdown, work and rest phases,
//! calls out random techniques during work, and keeps a click track running
//! at a steady tempo underneath. It is a library that a front end uses to run
//! one session at a time and to draw its state.
//!
//! ## Core Concepts
//!
//! - **Phase Machine**: Advances the session once per second through
//!   countdown, work, rest and finished, and decides every spoken cue.
//! - **Metronome**: A look-ahead beat scheduler with count-in, pause/resume
//!   that keeps the beat phase, and volume ducking while a callout is spoken.
//! - **Event-Driven**: Front ends subscribe to strongly-typed event streams
//!   (`SessionEvent`, `MetronomeEvent`) and read snapshots of the run-state.
//! - **Capabilities**: Speech and sound playback are traits (`Speaker`,
//!   `SoundLoader`), so the engine runs the same on a console or under test.
//! - **Configuration-Driven**: Sessions are described by a `SessionConfig`,
//!   often loaded from a TOML file with environment overrides.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use strikeclock::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Load a configuration, falling back to the defaults.
//!     let config = SessionConfig::load_or_default(None);
//!
//!     // 2. Create the engine with console collaborators.
//!     let engine = SessionEngine::new(
//!         config,
//!         Arc::new(ConsoleSpeaker),
//!         &ConsoleSoundLoader { visible: true },
//!     );
//!
//!     // 3. Subscribe to an event stream before starting the session.
//!     let mut session_events = engine.subscribe_session_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = session_events.recv().await {
//!             println!("Received Session Event: {:?}", event);
//!         }
//!     });
//!
//!     // 4. Run the session. It stops early on Ctrl+C.
//!     let final_state = engine.run().await?;
//!     println!("Finished in round {}", final_state.current_round);
//!
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Strike Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod audio;
pub mod common;
pub mod components;
pub mod config;
pub mod engine;
pub mod events;
pub mod time;

#[cfg(test)]
pub(crate) mod test_support;

/// A prelude module for easy importing of the most common Strikeclock types.
pub mod prelude {
    pub use crate::audio::{
        AudioError, ConsoleSoundLoader, ConsoleSpeaker, SoundHandle, SoundLoader, Speaker,
    };
    pub use crate::common::{CountInPhase, RunnerPhase};
    pub use crate::components::metronome::{Metronome, MetronomeState, Transport};
    pub use crate::components::phase::RunState;
    pub use crate::config::{Callout, MetronomeConfig, SessionConfig, SoundId};
    pub use crate::engine::{SessionEngine, SessionSnapshot};
    pub use crate::events::{MetronomeEvent, SessionEvent, SoundSlot};
    pub use crate::time::format_clock;
}
