//! Capability seams for the collaborators the engine drives but does not own.
//!
//! Speech synthesis and sample playback are consumed as fire-and-forget
//! capabilities. The engine never waits on them and absorbs every failure they
//! report. Console implementations are provided for the binaries.

use crate::config::SoundId;
use colored::Colorize;
use thiserror::Error;
use tracing::trace;

/// Failures reported by a sound collaborator.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("failed to load sound asset `{sound}`: {reason}")]
    Load { sound: SoundId, reason: String },
    #[error("sound playback failed: {0}")]
    Playback(String),
}

/// Voice synthesis of literal cue text.
pub trait Speaker: Send + Sync {
    /// Starts speaking `text`. Never awaited by the engine.
    fn speak(&self, text: &str);

    /// Cancels any in-flight speech immediately.
    fn stop_speech(&self);
}

/// One loaded instance of a sound asset.
pub trait SoundHandle: Send {
    fn set_volume(&mut self, volume: f32) -> Result<(), AudioError>;
    fn reset_to_start(&mut self) -> Result<(), AudioError>;
    /// Triggers playback without waiting for it to complete.
    fn play(&mut self) -> Result<(), AudioError>;
    fn unload(&mut self);
}

/// Loads sound assets by id.
pub trait SoundLoader: Send + Sync {
    fn load(&self, sound: SoundId) -> Result<Box<dyn SoundHandle>, AudioError>;
}

/// Prints every cue to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSpeaker;

impl Speaker for ConsoleSpeaker {
    fn speak(&self, text: &str) {
        println!("{} {}", "<<".magenta().bold(), text.yellow().bold());
    }

    fn stop_speech(&self) {
        trace!("Speech cancelled.");
    }
}

/// Loads `ConsoleClick` handles.
///
/// With `visible` unset the clicks are only traced, which keeps an interactive
/// prompt readable while the metronome runs.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSoundLoader {
    pub visible: bool,
}

impl SoundLoader for ConsoleSoundLoader {
    fn load(&self, sound: SoundId) -> Result<Box<dyn SoundHandle>, AudioError> {
        Ok(Box::new(ConsoleClick {
            sound,
            volume: 1.0,
            visible: self.visible,
            loaded: true,
        }))
    }
}

/// A sound handle that renders each beat as a marker on the terminal.
#[derive(Debug)]
pub struct ConsoleClick {
    sound: SoundId,
    volume: f32,
    visible: bool,
    loaded: bool,
}

impl SoundHandle for ConsoleClick {
    fn set_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.volume = volume;
        Ok(())
    }

    fn reset_to_start(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), AudioError> {
        if !self.loaded {
            return Err(AudioError::Playback(format!("`{}` was unloaded", self.sound)));
        }
        if self.visible {
            let marker = format!("[{} {:.2}]", self.sound, self.volume);
            println!("{}", marker.dimmed());
        } else {
            trace!(sound = %self.sound, volume = self.volume, "click");
        }
        Ok(())
    }

    fn unload(&mut self) {
        self.loaded = false;
    }
}
