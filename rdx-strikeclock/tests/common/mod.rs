//! Fakes shared by the integration scenarios.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use strikeclock::prelude::*;
use tokio::time::Instant;

/// Records every cue with the virtual instant it was spoken.
#[derive(Clone, Default)]
pub struct Transcript {
    lines: Arc<Mutex<Vec<(Instant, String)>>>,
}

impl Transcript {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().iter().map(|(_, text)| text.clone()).collect()
    }

    /// Cues with their offset from `origin` in whole seconds.
    pub fn timeline(&self, origin: Instant) -> Vec<(u64, String)> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(at, text)| ((*at - origin).as_secs(), text.clone()))
            .collect()
    }
}

impl Speaker for Transcript {
    fn speak(&self, text: &str) {
        self.lines.lock().unwrap().push((Instant::now(), text.to_string()));
    }

    fn stop_speech(&self) {}
}

/// Counts playbacks across both metronome sound instances.
#[derive(Clone, Default)]
pub struct ClickCounter {
    plays: Arc<Mutex<Vec<Instant>>>,
}

impl ClickCounter {
    pub fn plays(&self) -> Vec<Instant> {
        self.plays.lock().unwrap().clone()
    }
}

impl SoundLoader for ClickCounter {
    fn load(&self, _sound: SoundId) -> Result<Box<dyn SoundHandle>, AudioError> {
        Ok(Box::new(CountedClick {
            plays: self.plays.clone(),
        }))
    }
}

struct CountedClick {
    plays: Arc<Mutex<Vec<Instant>>>,
}

impl SoundHandle for CountedClick {
    fn set_volume(&mut self, _volume: f32) -> Result<(), AudioError> {
        Ok(())
    }

    fn reset_to_start(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), AudioError> {
        self.plays.lock().unwrap().push(Instant::now());
        Ok(())
    }

    fn unload(&mut self) {}
}

pub fn session(rounds: u32, round: u32, rest: u32, countdown: u32) -> SessionConfig {
    SessionConfig {
        rounds,
        round_duration_secs: round,
        rest_duration_secs: rest,
        countdown_duration_secs: countdown,
        ..Default::default()
    }
}

pub fn engine(config: SessionConfig) -> (SessionEngine, Transcript, ClickCounter) {
    let transcript = Transcript::default();
    let clicks = ClickCounter::default();
    let engine = SessionEngine::with_seed(config, Arc::new(transcript.clone()), &clicks, 17);
    (engine, transcript, clicks)
}
