//! The metronome controller.
//!
//! Wraps a [`BeatScheduler`] with count-in, pause/resume, volume ducking and
//! A/B sound alternation. The controller is a cheap, cloneable handle. All
//! state lives behind one mutex that is never held while a caller-supplied
//! callback runs.
//!
//! Methods that (re)start beat scheduling spawn Tokio tasks and must be called
//! from within a runtime.

use crate::audio::{AudioError, SoundHandle, SoundLoader};
use crate::common::{lock, TimerId};
use crate::components::beat::{BeatFire, BeatScheduler, POLL_INTERVAL};
use crate::components::timer::{TimerKind, TimerSet};
use crate::config::{clamp_bpm, MetronomeConfig, SoundId};
use crate::events::{MetronomeEvent, SoundSlot};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// The fixed level substituted for the configured volume while ducked.
pub const DUCK_VOLUME: f32 = 0.25;
pub const DEFAULT_DUCK_DURATION: Duration = Duration::from_millis(600);

/// Invoked once when the count-in has played its last beat.
pub type CountInCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stopped,
    Playing,
    Paused,
}

/// A point-in-time copy of the metronome run-state.
#[derive(Debug, Clone, PartialEq)]
pub struct MetronomeState {
    pub transport: Transport,
    /// True from start until stop, including while paused.
    pub is_playing: bool,
    pub bpm: u32,
    pub volume: f32,
    pub beat_count: u64,
    pub is_counting_in: bool,
    pub count_in_remaining: u32,
    pub is_ducked: bool,
}

/// The only fields a caller may change while the metronome runs.
#[derive(Debug, Clone, Copy)]
struct LiveSettings {
    bpm: u32,
    volume: f32,
}

struct CountIn {
    remaining: u32,
    on_complete: Option<CountInCallback>,
}

/// Two instances of the same asset, so a beat can start before the previous
/// one's tail has finished.
struct SoundPair {
    a: Option<Box<dyn SoundHandle>>,
    b: Option<Box<dyn SoundHandle>>,
    next: SoundSlot,
}

impl SoundPair {
    fn empty() -> Self {
        Self {
            a: None,
            b: None,
            next: SoundSlot::A,
        }
    }

    fn load(loader: &dyn SoundLoader, sound: SoundId) -> Self {
        let load_one = |slot: SoundSlot| match loader.load(sound) {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Metronome sound {:?} unavailable, beats will be silent: {}", slot, e);
                None
            }
        };
        Self {
            a: load_one(SoundSlot::A),
            b: load_one(SoundSlot::B),
            next: SoundSlot::A,
        }
    }

    /// Plays the next instance from the start and flips to the other one.
    fn play_next(&mut self, volume: f32) -> SoundSlot {
        let slot = self.next;
        self.next = slot.other();
        let handle = match slot {
            SoundSlot::A => self.a.as_mut(),
            SoundSlot::B => self.b.as_mut(),
        };
        match handle {
            Some(handle) => {
                if let Err(e) = play_from_start(handle.as_mut(), volume) {
                    warn!("Metronome beat on slot {:?} was not played: {}", slot, e);
                }
            }
            None => trace!("No sound loaded on slot {:?}, beat is silent.", slot),
        }
        slot
    }

    fn release(&mut self) {
        for mut handle in [self.a.take(), self.b.take()].into_iter().flatten() {
            handle.unload();
        }
    }
}

fn play_from_start(handle: &mut dyn SoundHandle, volume: f32) -> Result<(), AudioError> {
    handle.set_volume(volume)?;
    handle.reset_to_start()?;
    handle.play()
}

struct MetronomeInner {
    config: MetronomeConfig,
    live: LiveSettings,
    transport: Transport,
    scheduler: BeatScheduler,
    beat_count: u64,
    count_in: Option<CountIn>,
    ducked: bool,
    duck_timer: Option<TimerId>,
    paused_remainder: Duration,
    timers: TimerSet,
    poll_task: Option<JoinHandle<()>>,
    sounds: SoundPair,
}

impl MetronomeInner {
    fn effective_volume(&self) -> f32 {
        if self.ducked {
            DUCK_VOLUME
        } else {
            self.live.volume
        }
    }

    /// Cancels the poll loop and every pending timer and resets the counters.
    fn halt(&mut self) {
        self.transport = Transport::Stopped;
        self.scheduler.halt();
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.timers.cancel_all();
        self.duck_timer = None;
        self.ducked = false;
        self.beat_count = 0;
        self.count_in = None;
        self.paused_remainder = Duration::ZERO;
    }

    /// Accounts for one beat and plays it. Returns the count-in callback if
    /// this beat finished the count-in.
    fn process_beat(
        &mut self,
        at: Instant,
        events: &broadcast::Sender<MetronomeEvent>,
    ) -> Option<CountInCallback> {
        self.beat_count += 1;

        let mut finished = false;
        if let Some(count_in) = self.count_in.as_mut() {
            count_in.remaining = count_in.remaining.saturating_sub(1);
            finished = count_in.remaining == 0;
        }
        let on_complete = if finished {
            self.count_in.take().and_then(|count_in| count_in.on_complete)
        } else {
            None
        };

        let volume = self.effective_volume();
        let slot = self.sounds.play_next(volume);
        trace!(beat = self.beat_count, ?slot, volume, "beat");
        events
            .send(MetronomeEvent::Beat {
                beat_count: self.beat_count,
                slot,
                at,
                count_in_remaining: self.count_in.as_ref().map_or(0, |c| c.remaining),
            })
            .ok();
        if finished {
            debug!("Count-in finished after {} beats.", self.beat_count);
            events.send(MetronomeEvent::CountInFinished).ok();
        }
        on_complete
    }
}

/// A handle to the metronome controller.
#[derive(Clone)]
pub struct Metronome {
    inner: Arc<Mutex<MetronomeInner>>,
    event_sender: broadcast::Sender<MetronomeEvent>,
}

impl Metronome {
    /// Creates a stopped metronome. Both sound instances are loaded up front
    /// when the metronome is enabled. Load failures are logged and leave the
    /// beats silent.
    pub fn new(config: MetronomeConfig, loader: &dyn SoundLoader) -> Self {
        let (event_sender, _) = broadcast::channel(256);
        let sounds = if config.enabled {
            SoundPair::load(loader, config.sound_id)
        } else {
            SoundPair::empty()
        };
        let live = LiveSettings {
            bpm: clamp_bpm(config.bpm),
            volume: clamp_volume(config.volume).unwrap_or(0.0),
        };
        Self {
            inner: Arc::new(Mutex::new(MetronomeInner {
                config,
                live,
                transport: Transport::Stopped,
                scheduler: BeatScheduler::new(),
                beat_count: 0,
                count_in: None,
                ducked: false,
                duck_timer: None,
                paused_remainder: Duration::ZERO,
                timers: TimerSet::new(),
                poll_task: None,
                sounds,
            })),
            event_sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MetronomeEvent> {
        self.event_sender.subscribe()
    }

    pub fn config(&self) -> MetronomeConfig {
        lock(&self.inner).config.clone()
    }

    pub fn state(&self) -> MetronomeState {
        let inner = lock(&self.inner);
        MetronomeState {
            transport: inner.transport,
            is_playing: inner.transport != Transport::Stopped,
            bpm: inner.live.bpm,
            volume: inner.live.volume,
            beat_count: inner.beat_count,
            is_counting_in: inner.count_in.is_some(),
            count_in_remaining: inner.count_in.as_ref().map_or(0, |c| c.remaining),
            is_ducked: inner.ducked,
        }
    }

    /// Starts playing with the configured count-in, then calls `on_complete`.
    ///
    /// A disabled metronome calls `on_complete` right away and does nothing
    /// else. Without a count-in, `on_complete` runs before the first beat.
    pub fn start_with_count_in(&self, on_complete: impl FnOnce() + Send + 'static) {
        let count_in_beats = {
            let inner = lock(&self.inner);
            if inner.config.count_in_enabled {
                inner.config.count_in_beats
            } else {
                0
            }
        };
        self.begin(count_in_beats, Some(Box::new(on_complete)));
    }

    /// Starts playing regular beats immediately, without a count-in.
    pub fn start(&self) {
        self.begin(0, None);
    }

    fn begin(&self, count_in_beats: u32, on_complete: Option<CountInCallback>) {
        let (immediate, generation) = {
            let mut inner = lock(&self.inner);
            if !inner.config.enabled {
                drop(inner);
                debug!("Metronome disabled, skipping start.");
                if let Some(callback) = on_complete {
                    callback();
                }
                return;
            }
            inner.halt();
            inner.transport = Transport::Playing;
            let immediate = if count_in_beats > 0 {
                inner.count_in = Some(CountIn {
                    remaining: count_in_beats,
                    on_complete,
                });
                None
            } else {
                on_complete
            };
            let generation = inner.scheduler.start_at(Instant::now());
            info!(
                "Metronome started at {} BPM with {} count-in beats.",
                inner.live.bpm, count_in_beats
            );
            self.event_sender
                .send(MetronomeEvent::Started {
                    bpm: inner.live.bpm,
                    count_in_beats,
                })
                .ok();
            (immediate, generation)
        };

        if let Some(callback) = immediate {
            callback();
        }

        let mut inner = lock(&self.inner);
        self.launch_poll_loop(&mut inner, generation);
    }

    /// Spawns the self-rescheduling poll loop unless the scheduler moved on.
    fn launch_poll_loop(&self, inner: &mut MetronomeInner, generation: u64) {
        if !inner.scheduler.is_current(generation) {
            return;
        }
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
        let metronome = self.clone();
        inner.poll_task = Some(tokio::spawn(async move {
            while metronome.poll_once(generation) {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            trace!("Beat poll loop {} exited.", generation);
        }));
    }

    /// Runs one scheduler cycle. Returns `false` once the loop should end.
    fn poll_once(&self, generation: u64) -> bool {
        let callbacks = {
            let mut inner = lock(&self.inner);
            if inner.transport != Transport::Playing || !inner.scheduler.is_current(generation) {
                return false;
            }
            let now = Instant::now();
            let bpm = inner.live.bpm;
            let fires = inner.scheduler.poll_once(now, bpm);
            let mut callbacks = Vec::new();
            for fire in fires {
                match fire {
                    BeatFire::Now => {
                        callbacks.extend(inner.process_beat(now, &self.event_sender));
                    }
                    BeatFire::At(due) => {
                        let metronome = self.clone();
                        inner.timers.arm(TimerKind::Beat, due, move |id| {
                            tokio::spawn(async move {
                                tokio::time::sleep_until(due).await;
                                metronome.fire_deferred(id);
                            })
                        });
                    }
                }
            }
            callbacks
        };
        for callback in callbacks {
            callback();
        }
        true
    }

    fn fire_deferred(&self, id: TimerId) {
        let callback = {
            let mut inner = lock(&self.inner);
            if !inner.timers.complete(id) || inner.transport != Transport::Playing {
                return;
            }
            inner.process_beat(Instant::now(), &self.event_sender)
        };
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Stops playback, cancels every timer and resets the counters.
    /// A pending count-in callback is dropped without being called.
    pub fn stop(&self) {
        let was_active = {
            let mut inner = lock(&self.inner);
            let was_active = inner.transport != Transport::Stopped;
            inner.halt();
            was_active
        };
        if was_active {
            info!("Metronome stopped.");
            self.event_sender.send(MetronomeEvent::Stopped).ok();
        }
    }

    /// Pauses a playing metronome, remembering how long was left until the
    /// next beat. The beat count is kept.
    pub fn pause(&self) {
        let mut inner = lock(&self.inner);
        if inner.transport != Transport::Playing {
            return;
        }
        // A deferred beat that has not fired yet was never heard: put it back.
        if let Some(earliest) = inner.timers.cancel_kind(TimerKind::Beat) {
            inner.scheduler.rewind_to(earliest);
        }
        let remainder = inner.scheduler.remaining(Instant::now());
        inner.paused_remainder = remainder;
        inner.scheduler.halt();
        if let Some(task) = inner.poll_task.take() {
            task.abort();
        }
        inner.transport = Transport::Paused;
        debug!("Metronome paused with {:?} until the next beat.", remainder);
        self.event_sender
            .send(MetronomeEvent::Paused { remainder })
            .ok();
    }

    /// Resumes a paused metronome so that the next beat lands exactly the
    /// recorded remainder after now.
    pub fn resume(&self) {
        let mut inner = lock(&self.inner);
        if inner.transport != Transport::Paused {
            return;
        }
        inner.transport = Transport::Playing;
        let first = Instant::now() + inner.paused_remainder;
        let generation = inner.scheduler.start_at(first);
        self.launch_poll_loop(&mut inner, generation);
        debug!("Metronome resumed.");
        self.event_sender.send(MetronomeEvent::Resumed).ok();
    }

    /// Sets the live tempo, clamped to 40-220 BPM. Applies from the next
    /// scheduled interval. Returns the value actually applied.
    pub fn set_bpm(&self, bpm: u32) -> u32 {
        let bpm = clamp_bpm(bpm);
        lock(&self.inner).live.bpm = bpm;
        self.event_sender.send(MetronomeEvent::BpmChanged { bpm }).ok();
        bpm
    }

    /// Sets the live volume, clamped to 0.0-1.0. Non-finite values are ignored.
    pub fn set_volume(&self, volume: f32) -> Option<f32> {
        let volume = clamp_volume(volume)?;
        lock(&self.inner).live.volume = volume;
        self.event_sender
            .send(MetronomeEvent::VolumeChanged { volume })
            .ok();
        Some(volume)
    }

    /// Drops the click to [`DUCK_VOLUME`] for `duration`. Calling again while
    /// ducked restarts the window.
    pub fn duck_volume(&self, duration: Duration) {
        let mut inner = lock(&self.inner);
        if inner.transport == Transport::Stopped {
            return;
        }
        if let Some(previous) = inner.duck_timer.take() {
            inner.timers.cancel(previous);
        }
        inner.ducked = true;
        let due = Instant::now() + duration;
        let metronome = self.clone();
        let id = inner.timers.arm(TimerKind::DuckExpiry, due, move |id| {
            tokio::spawn(async move {
                tokio::time::sleep_until(due).await;
                metronome.expire_duck(id);
            })
        });
        inner.duck_timer = Some(id);
        self.event_sender
            .send(MetronomeEvent::Ducked { duration })
            .ok();
    }

    fn expire_duck(&self, id: TimerId) {
        let mut inner = lock(&self.inner);
        if inner.timers.complete(id) {
            inner.ducked = false;
            inner.duck_timer = None;
            trace!("Metronome volume restored.");
        }
    }

    /// Stops the metronome and unloads both sound instances.
    pub fn release(&self) {
        self.stop();
        lock(&self.inner).sounds.release();
        debug!("Metronome sounds released.");
    }
}

fn clamp_volume(volume: f32) -> Option<f32> {
    volume.is_finite().then(|| volume.clamp(0.0, 1.0))
}
