//! Recording fakes for the audio and speech capabilities, used by unit tests.

use crate::audio::{AudioError, SoundHandle, SoundLoader, Speaker};
use crate::common::lock;
use crate::config::SoundId;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlayRecord {
    pub handle: usize,
    pub volume: f32,
    pub rewound: bool,
}

#[derive(Default)]
struct Recorder {
    loads: usize,
    unloads: usize,
    plays: Vec<PlayRecord>,
}

/// Hands out handles that log every playback into a shared recorder.
#[derive(Clone, Default)]
pub(crate) struct RecordingLoader {
    recorder: Arc<Mutex<Recorder>>,
}

impl RecordingLoader {
    pub fn loads(&self) -> usize {
        lock(&self.recorder).loads
    }

    pub fn unloads(&self) -> usize {
        lock(&self.recorder).unloads
    }

    pub fn plays(&self) -> Vec<PlayRecord> {
        lock(&self.recorder).plays.clone()
    }
}

impl SoundLoader for RecordingLoader {
    fn load(&self, _sound: SoundId) -> Result<Box<dyn SoundHandle>, AudioError> {
        let mut recorder = lock(&self.recorder);
        let index = recorder.loads;
        recorder.loads += 1;
        Ok(Box::new(RecordingHandle {
            index,
            volume: 1.0,
            rewound: false,
            recorder: self.recorder.clone(),
        }))
    }
}

struct RecordingHandle {
    index: usize,
    volume: f32,
    rewound: bool,
    recorder: Arc<Mutex<Recorder>>,
}

impl SoundHandle for RecordingHandle {
    fn set_volume(&mut self, volume: f32) -> Result<(), AudioError> {
        self.volume = volume;
        Ok(())
    }

    fn reset_to_start(&mut self) -> Result<(), AudioError> {
        self.rewound = true;
        Ok(())
    }

    fn play(&mut self) -> Result<(), AudioError> {
        lock(&self.recorder).plays.push(PlayRecord {
            handle: self.index,
            volume: self.volume,
            rewound: self.rewound,
        });
        self.rewound = false;
        Ok(())
    }

    fn unload(&mut self) {
        lock(&self.recorder).unloads += 1;
    }
}

/// Fails either at load time or on every playback.
pub(crate) struct FailingLoader {
    fail_load: bool,
}

impl FailingLoader {
    pub fn on_load() -> Self {
        Self { fail_load: true }
    }

    pub fn on_play() -> Self {
        Self { fail_load: false }
    }
}

impl SoundLoader for FailingLoader {
    fn load(&self, sound: SoundId) -> Result<Box<dyn SoundHandle>, AudioError> {
        if self.fail_load {
            return Err(AudioError::Load {
                sound,
                reason: "asset missing".to_string(),
            });
        }
        Ok(Box::new(BrokenHandle))
    }
}

struct BrokenHandle;

impl SoundHandle for BrokenHandle {
    fn set_volume(&mut self, _volume: f32) -> Result<(), AudioError> {
        Ok(())
    }

    fn reset_to_start(&mut self) -> Result<(), AudioError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), AudioError> {
        Err(AudioError::Playback("device busy".to_string()))
    }

    fn unload(&mut self) {}
}

/// Remembers every cue with the instant it was spoken.
#[derive(Clone, Default)]
pub(crate) struct RecordingSpeaker {
    spoken: Arc<Mutex<Vec<(Instant, String)>>>,
    stops: Arc<Mutex<usize>>,
}

impl RecordingSpeaker {
    pub fn spoken(&self) -> Vec<String> {
        lock(&self.spoken).iter().map(|(_, text)| text.clone()).collect()
    }

    pub fn spoken_at(&self) -> Vec<(Instant, String)> {
        lock(&self.spoken).clone()
    }

    pub fn stops(&self) -> usize {
        *lock(&self.stops)
    }
}

impl Speaker for RecordingSpeaker {
    fn speak(&self, text: &str) {
        lock(&self.spoken).push((Instant::now(), text.to_string()));
    }

    fn stop_speech(&self) {
        *lock(&self.stops) += 1;
    }
}
