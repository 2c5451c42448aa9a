//! The core engine that orchestrates a training session.

use crate::audio::{SoundLoader, Speaker};
use crate::common::RunnerPhase;
use crate::components::callout::CalloutScheduler;
use crate::components::metronome::{Metronome, MetronomeState, DEFAULT_DUCK_DURATION};
use crate::components::phase::{Effect, MetronomeCommand, PhaseMachine, RunState};
use crate::config::SessionConfig;
use crate::events::{MetronomeEvent, SessionEvent};
use crate::time::{sleep_until_opt, PhaseClock};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, trace};

/// Messages handled by the dispatcher task, in arrival order.
#[derive(Debug)]
enum SessionCommand {
    Start,
    Pause,
    Resume,
    Stop,
    CountInFinished,
    Shutdown,
}

/// Everything a presentation layer needs to draw the session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub run: RunState,
    pub metronome: MetronomeState,
}

/// The main Strikeclock engine.
///
/// The engine spawns one dispatcher task that owns the phase machine, the
/// per-second clock and the callout scheduler. Controls are forwarded to it
/// as messages, so every transition is decided in one place and in order.
/// The metronome runs its own beat clock and is shared with the dispatcher.
///
/// `SessionEngine` is a cheap handle and can be cloned freely.
#[derive(Clone)]
pub struct SessionEngine {
    config: Arc<SessionConfig>,
    command_sender: mpsc::UnboundedSender<SessionCommand>,
    state_receiver: watch::Receiver<RunState>,
    session_event_sender: broadcast::Sender<SessionEvent>,
    metronome: Metronome,
    dispatcher: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionEngine {
    /// Creates a session for `config` and spawns its dispatcher task.
    ///
    /// The config is sanitized first. Must be called from within a Tokio runtime.
    pub fn new(config: SessionConfig, speaker: Arc<dyn Speaker>, loader: &dyn SoundLoader) -> Self {
        Self::build(config, speaker, loader, CalloutScheduler::new)
    }

    /// Like [`SessionEngine::new`] but with a reproducible callout sequence.
    pub fn with_seed(
        config: SessionConfig,
        speaker: Arc<dyn Speaker>,
        loader: &dyn SoundLoader,
        seed: u64,
    ) -> Self {
        Self::build(config, speaker, loader, |config| {
            CalloutScheduler::with_seed(config, seed)
        })
    }

    fn build(
        config: SessionConfig,
        speaker: Arc<dyn Speaker>,
        loader: &dyn SoundLoader,
        callouts: impl FnOnce(&SessionConfig) -> CalloutScheduler,
    ) -> Self {
        const CHANNEL_CAPACITY: usize = 256;
        let config = Arc::new(config.sanitized());
        let (session_event_sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (command_sender, command_receiver) = mpsc::unbounded_channel();

        let machine = PhaseMachine::new(config.clone());
        let (state_sender, state_receiver) = watch::channel(machine.state().clone());
        let metronome = Metronome::new(config.metronome.clone(), loader);

        let dispatcher = Dispatcher {
            callouts: callouts(&config),
            machine,
            clock: PhaseClock::new(),
            metronome: metronome.clone(),
            speaker,
            command_sender: command_sender.downgrade(),
            state_sender,
            events: session_event_sender.clone(),
            started_at: None,
        };
        let handle = tokio::spawn(dispatcher.run(command_receiver));

        info!(
            "Session created: {} x {}s rounds, {}s rest, {}s countdown.",
            config.rounds,
            config.round_duration_secs,
            config.rest_duration_secs,
            config.countdown_duration_secs
        );
        Self {
            config,
            command_sender,
            state_receiver,
            session_event_sender,
            metronome,
            dispatcher: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Starts the session and waits until it finishes or Ctrl+C is pressed.
    ///
    /// On Ctrl+C the session is stopped. Either way the engine is shut down
    /// and the final run-state is returned.
    pub async fn run(&self) -> anyhow::Result<RunState> {
        info!("Session starting. Press Ctrl+C to stop.");
        self.start();
        tokio::select! {
            _ = self.wait_until_finished() => {}
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("Shutdown signal received. Stopping session...");
                self.stop();
            }
        }
        let final_state = self.wait_until_finished().await;
        self.shutdown().await;
        Ok(final_state)
    }

    fn send(&self, command: SessionCommand) {
        if self.command_sender.send(command).is_err() {
            debug!("Session dispatcher has exited, control ignored.");
        }
    }

    /// Leaves the initial state. Ignored after the first call.
    pub fn start(&self) {
        self.send(SessionCommand::Start);
    }

    /// Forces the session to finish. Ignored once finished.
    pub fn stop(&self) {
        self.send(SessionCommand::Stop);
    }

    pub fn pause(&self) {
        self.send(SessionCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(SessionCommand::Resume);
    }

    /// Changes the live tempo. Returns the clamped value.
    pub fn set_metronome_bpm(&self, bpm: u32) -> u32 {
        self.metronome.set_bpm(bpm)
    }

    /// Changes the live volume. Returns the clamped value, or `None` for a
    /// non-finite input.
    pub fn set_metronome_volume(&self, volume: f32) -> Option<f32> {
        self.metronome.set_volume(volume)
    }

    /// Ducks the click for `duration`, or for the default 600 ms.
    pub fn duck_metronome(&self, duration: Option<Duration>) {
        self.metronome
            .duck_volume(duration.unwrap_or(DEFAULT_DUCK_DURATION));
    }

    /// Stops the session if needed, cancels every timer and unloads the
    /// metronome sounds. Waits for the dispatcher task to exit.
    pub async fn shutdown(&self) {
        self.send(SessionCommand::Shutdown);
        let handle = crate::common::lock(&self.dispatcher).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Session dispatcher ended abnormally: {}", e);
            }
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> RunState {
        self.state_receiver.borrow().clone()
    }

    pub fn metronome_state(&self) -> MetronomeState {
        self.metronome.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            run: self.state(),
            metronome: self.metronome_state(),
        }
    }

    /// Resolves with the terminal run-state once the session has finished.
    pub async fn wait_until_finished(&self) -> RunState {
        let mut receiver = self.state_receiver.clone();
        if let Ok(state) = receiver
            .wait_for(|state| state.phase == RunnerPhase::Finished)
            .await
        {
            return state.clone();
        }
        // The dispatcher is gone; its last published state is final.
        let state = receiver.borrow().clone();
        state
    }

    /// Subscribes to run-state snapshots.
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state_receiver.clone()
    }

    /// Subscribes to the `SessionEvent` stream.
    pub fn subscribe_session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_event_sender.subscribe()
    }

    /// Subscribes to the `MetronomeEvent` stream.
    pub fn subscribe_metronome_events(&self) -> broadcast::Receiver<MetronomeEvent> {
        self.metronome.subscribe()
    }
}

/// Owns the mutable side of a session. Runs as a single task.
struct Dispatcher {
    machine: PhaseMachine,
    clock: PhaseClock,
    callouts: CalloutScheduler,
    metronome: Metronome,
    speaker: Arc<dyn Speaker>,
    command_sender: mpsc::WeakUnboundedSender<SessionCommand>,
    state_sender: watch::Sender<RunState>,
    events: broadcast::Sender<SessionEvent>,
    started_at: Option<DateTime<Utc>>,
}

impl Dispatcher {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        loop {
            let effects = tokio::select! {
                biased;
                command = commands.recv() => match command {
                    None | Some(SessionCommand::Shutdown) => break,
                    Some(command) => self.handle_command(command),
                },
                ticks = self.clock.tick() => {
                    trace!("Phase tick #{} received.", ticks);
                    self.machine.tick()
                }
                _ = sleep_until_opt(self.callouts.deadline()) => self.fire_callout(),
            };
            self.apply(effects);
            self.publish();
        }
        self.teardown();
    }

    fn handle_command(&mut self, command: SessionCommand) -> Vec<Effect> {
        match command {
            SessionCommand::Start => {
                let effects = self.machine.start();
                if !effects.is_empty() {
                    let timestamp = Utc::now();
                    self.started_at = Some(timestamp);
                    info!("Session started in {} phase.", self.machine.state().phase);
                    self.emit(SessionEvent::Started {
                        phase: self.machine.state().phase,
                        timestamp,
                    });
                }
                effects
            }
            SessionCommand::Pause => self.machine.pause(),
            SessionCommand::Resume => self.machine.resume(),
            SessionCommand::Stop => self.machine.stop(),
            SessionCommand::CountInFinished => self.machine.count_in_complete(),
            // Handled by the loop itself.
            SessionCommand::Shutdown => Vec::new(),
        }
    }

    fn fire_callout(&mut self) -> Vec<Effect> {
        if !self.machine.callouts_active() {
            self.callouts.cancel();
            return Vec::new();
        }
        if let Some(callout) = self.callouts.fire() {
            let round = self.machine.state().current_round;
            debug!("Callout '{}' in round {}.", callout.label, round);
            self.machine.record_callout(&callout.label);
            self.speak(&callout.label);
            self.metronome.duck_volume(DEFAULT_DUCK_DURATION);
            self.emit(SessionEvent::Callout {
                id: callout.id,
                label: callout.label,
                round,
            });
        }
        Vec::new()
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Speak(text) => self.speak(&text),
                Effect::StopSpeech => self.speaker.stop_speech(),
                Effect::StartClock => self.clock.start(),
                Effect::StopClock => self.clock.stop(),
                Effect::ArmCallouts(arm) => self.callouts.arm(arm, Instant::now()),
                Effect::CancelCallouts => self.callouts.cancel(),
                Effect::Metronome(command) => self.command_metronome(command),
                Effect::PhaseChanged { from, to } => {
                    let state = self.machine.state();
                    info!("Phase changed: {} -> {} (round {}).", from, to, state.current_round);
                    self.emit(SessionEvent::PhaseChanged {
                        from,
                        to,
                        round: state.current_round,
                        seconds_left: state.seconds_left,
                    });
                }
                Effect::Tick => {
                    let state = self.machine.state();
                    self.emit(SessionEvent::Tick {
                        phase: state.phase,
                        seconds_left: state.seconds_left,
                    });
                }
                Effect::CountInFinished => {
                    debug!("Count-in finished, round clock running.");
                    self.emit(SessionEvent::CountInFinished {
                        round: self.machine.state().current_round,
                    });
                }
                Effect::Paused => {
                    info!("Session paused.");
                    self.emit(SessionEvent::Paused);
                }
                Effect::Resumed => {
                    info!("Session resumed.");
                    self.emit(SessionEvent::Resumed);
                }
                Effect::Finished { completed } => {
                    let rounds_completed = self.machine.rounds_completed();
                    info!(
                        "Session {} after {} completed round(s).",
                        if completed { "complete" } else { "stopped" },
                        rounds_completed
                    );
                    self.emit(SessionEvent::Finished {
                        rounds_completed,
                        completed,
                        started_at: self.started_at,
                        finished_at: Utc::now(),
                    });
                }
            }
        }
    }

    fn command_metronome(&self, command: MetronomeCommand) {
        match command {
            MetronomeCommand::StartWithCountIn => {
                let sender = self.command_sender.clone();
                self.metronome.start_with_count_in(move || {
                    if let Some(sender) = sender.upgrade() {
                        sender.send(SessionCommand::CountInFinished).ok();
                    }
                });
            }
            MetronomeCommand::Release => self.metronome.release(),
            MetronomeCommand::Pause => self.metronome.pause(),
            MetronomeCommand::Resume => self.metronome.resume(),
        }
    }

    fn speak(&self, text: &str) {
        self.speaker.speak(text);
        self.emit(SessionEvent::Spoke {
            text: text.to_string(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        self.events.send(event).ok();
    }

    fn publish(&self) {
        let state = self.machine.state();
        self.state_sender.send_if_modified(|current| {
            if *current == *state {
                false
            } else {
                *current = state.clone();
                true
            }
        });
    }

    fn teardown(&mut self) {
        let effects = self.machine.stop();
        self.apply(effects);
        self.publish();
        self.clock.stop();
        self.callouts.cancel();
        self.metronome.release();
        info!("Session engine has shut down.");
    }
}
