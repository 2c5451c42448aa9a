//! The session phase machine.
//!
//! `PhaseMachine` owns the run-state and decides every transition, but it
//! never touches a clock, a speaker or the metronome itself. Each operation
//! returns the [`Effect`]s the engine must carry out, in order. This keeps the
//! countdown, work, rest and finished rules testable without a runtime.

use crate::common::{CountInPhase, RunnerPhase};
use crate::components::callout::CalloutArm;
use crate::config::SessionConfig;
use serde::Serialize;
use std::sync::Arc;

pub const GET_READY_CUE: &str = "Get ready";
pub const FIGHT_CUE: &str = "Fight!";
pub const REST_CUE: &str = "Rest";
pub const COMPLETE_CUE: &str = "Time. Session complete.";

/// Rest announces only its final seconds.
const REST_CUE_SECS: u32 = 3;

/// The observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub phase: RunnerPhase,
    /// 1-based, in `1..=rounds`.
    pub current_round: u32,
    pub seconds_left: u32,
    /// Most recently spoken callout label, cleared on every phase change.
    pub last_callout: String,
    pub is_running: bool,
    pub is_paused: bool,
    pub count_in: CountInPhase,
}

/// Metronome operations requested by a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetronomeCommand {
    StartWithCountIn,
    /// Stops playback and unloads both sounds. Sent once, at the end.
    Release,
    Pause,
    Resume,
}

/// A side effect requested by the phase machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Speak(String),
    StopSpeech,
    StartClock,
    StopClock,
    ArmCallouts(CalloutArm),
    CancelCallouts,
    Metronome(MetronomeCommand),
    // Notifications for subscribers.
    PhaseChanged { from: RunnerPhase, to: RunnerPhase },
    Tick,
    CountInFinished,
    Paused,
    Resumed,
    Finished { completed: bool },
}

#[derive(Debug)]
pub struct PhaseMachine {
    config: Arc<SessionConfig>,
    state: RunState,
    started: bool,
    rounds_completed: u32,
}

impl PhaseMachine {
    pub fn new(config: Arc<SessionConfig>) -> Self {
        let countdown = config.countdown_duration_secs;
        let state = RunState {
            phase: if countdown > 0 {
                RunnerPhase::Countdown
            } else {
                RunnerPhase::Work
            },
            current_round: 1,
            seconds_left: if countdown > 0 {
                countdown + 2
            } else {
                config.round_duration_secs
            },
            last_callout: String::new(),
            is_running: false,
            is_paused: false,
            count_in: CountInPhase::Idle,
        };
        Self {
            config,
            state,
            started: false,
            rounds_completed: 0,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Work phases that ran to zero.
    pub fn rounds_completed(&self) -> u32 {
        self.rounds_completed
    }

    /// Whether a callout may be spoken right now.
    pub fn callouts_active(&self) -> bool {
        self.state.is_running
            && !self.state.is_paused
            && self.state.phase == RunnerPhase::Work
            && self.state.count_in != CountInPhase::Counting
    }

    /// Leaves the initial state. A session starts at most once.
    pub fn start(&mut self) -> Vec<Effect> {
        if self.started {
            return Vec::new();
        }
        self.started = true;
        self.state.is_running = true;
        let mut effects = vec![Effect::StartClock];
        if self.state.phase == RunnerPhase::Countdown {
            effects.push(Effect::Speak(GET_READY_CUE.to_string()));
        } else {
            effects.extend(self.enter_work(1, "Round 1".to_string()));
        }
        effects
    }

    /// Advances the session by one elapsed second.
    pub fn tick(&mut self) -> Vec<Effect> {
        if !self.state.is_running || self.state.is_paused {
            return Vec::new();
        }
        if self.state.phase == RunnerPhase::Work && self.state.count_in == CountInPhase::Counting {
            return Vec::new();
        }
        if self.state.seconds_left > 1 {
            self.state.seconds_left -= 1;
            let secs = self.state.seconds_left;
            let mut effects = Vec::new();
            let cue = match self.state.phase {
                RunnerPhase::Countdown => secs <= self.config.countdown_duration_secs,
                RunnerPhase::Rest => secs <= REST_CUE_SECS,
                _ => false,
            };
            if cue {
                effects.push(Effect::Speak(secs.to_string()));
            }
            effects.push(Effect::Tick);
            return effects;
        }

        match self.state.phase {
            RunnerPhase::Countdown => self.enter_work(1, FIGHT_CUE.to_string()),
            RunnerPhase::Work => {
                self.rounds_completed += 1;
                let round = self.state.current_round;
                if round >= self.config.rounds {
                    self.finish(true)
                } else if self.config.rest_duration_secs > 0 {
                    self.enter_rest()
                } else {
                    self.enter_work(round + 1, format!("Round {}", round + 1))
                }
            }
            RunnerPhase::Rest => {
                let round = self.state.current_round + 1;
                self.enter_work(round, format!("Round {}", round))
            }
            RunnerPhase::Finished => Vec::new(),
        }
    }

    pub fn pause(&mut self) -> Vec<Effect> {
        if !self.state.is_running || self.state.is_paused {
            return Vec::new();
        }
        self.state.is_paused = true;
        let mut effects = vec![Effect::StopClock, Effect::CancelCallouts];
        if self.config.metronome.enabled {
            effects.push(Effect::Metronome(MetronomeCommand::Pause));
        }
        effects.push(Effect::Paused);
        effects
    }

    pub fn resume(&mut self) -> Vec<Effect> {
        if !self.state.is_running || !self.state.is_paused {
            return Vec::new();
        }
        self.state.is_paused = false;
        let mut effects = vec![Effect::StartClock];
        if self.callouts_active() {
            effects.push(Effect::ArmCallouts(CalloutArm::Fresh));
        }
        if self.metronome_audible() {
            effects.push(Effect::Metronome(MetronomeCommand::Resume));
        }
        effects.push(Effect::Resumed);
        effects
    }

    /// Ends the session early. Stopping a finished session does nothing.
    pub fn stop(&mut self) -> Vec<Effect> {
        if self.state.phase == RunnerPhase::Finished {
            return Vec::new();
        }
        self.finish(false)
    }

    /// The metronome pre-roll has ended; the round clock may run.
    pub fn count_in_complete(&mut self) -> Vec<Effect> {
        if self.state.count_in != CountInPhase::Counting {
            return Vec::new();
        }
        self.state.count_in = CountInPhase::Done;
        let mut effects = vec![Effect::CountInFinished];
        if self.callouts_active() {
            effects.push(Effect::ArmCallouts(CalloutArm::AfterGrace));
        }
        effects
    }

    pub fn record_callout(&mut self, label: &str) {
        self.state.last_callout = label.to_string();
    }

    fn metronome_audible(&self) -> bool {
        let metronome = &self.config.metronome;
        metronome.enabled
            && match self.state.phase {
                RunnerPhase::Work => true,
                RunnerPhase::Rest => metronome.play_during_rest,
                _ => false,
            }
    }

    fn enter_work(&mut self, round: u32, cue: String) -> Vec<Effect> {
        let from = self.state.phase;
        let first = self.state.count_in == CountInPhase::Idle;
        self.state.phase = RunnerPhase::Work;
        self.state.current_round = round;
        self.state.seconds_left = self.config.round_duration_secs;
        self.state.last_callout.clear();

        let mut effects = Vec::new();
        if from != RunnerPhase::Work || round > 1 {
            effects.push(Effect::PhaseChanged {
                from,
                to: RunnerPhase::Work,
            });
        }
        effects.push(Effect::Speak(cue));

        let metronome = &self.config.metronome;
        if first {
            if metronome.enabled {
                self.state.count_in = if metronome.has_count_in() {
                    CountInPhase::Counting
                } else {
                    CountInPhase::Done
                };
                effects.push(Effect::Metronome(MetronomeCommand::StartWithCountIn));
            } else {
                self.state.count_in = CountInPhase::Done;
            }
        } else if from == RunnerPhase::Rest && metronome.enabled && !metronome.play_during_rest {
            effects.push(Effect::Metronome(MetronomeCommand::Resume));
        }

        if self.state.count_in == CountInPhase::Done {
            effects.push(Effect::ArmCallouts(CalloutArm::AfterGrace));
        }
        effects
    }

    fn enter_rest(&mut self) -> Vec<Effect> {
        let from = self.state.phase;
        self.state.phase = RunnerPhase::Rest;
        self.state.seconds_left = self.config.rest_duration_secs;
        self.state.last_callout.clear();

        let mut effects = vec![
            Effect::PhaseChanged {
                from,
                to: RunnerPhase::Rest,
            },
            Effect::CancelCallouts,
            Effect::Speak(REST_CUE.to_string()),
        ];
        // A short rest starts inside the announced window.
        let secs = self.state.seconds_left;
        if secs <= REST_CUE_SECS {
            effects.push(Effect::Speak(secs.to_string()));
        }
        let metronome = &self.config.metronome;
        if metronome.enabled && !metronome.play_during_rest {
            effects.push(Effect::Metronome(MetronomeCommand::Pause));
        }
        effects
    }

    fn finish(&mut self, completed: bool) -> Vec<Effect> {
        let from = self.state.phase;
        self.state.phase = RunnerPhase::Finished;
        self.state.seconds_left = 0;
        self.state.is_running = false;
        self.state.is_paused = false;
        self.started = true;

        let mut effects = vec![
            Effect::StopClock,
            Effect::CancelCallouts,
            Effect::PhaseChanged {
                from,
                to: RunnerPhase::Finished,
            },
        ];
        if completed {
            effects.push(Effect::Speak(COMPLETE_CUE.to_string()));
        } else {
            effects.push(Effect::StopSpeech);
        }
        effects.push(Effect::Metronome(MetronomeCommand::Release));
        effects.push(Effect::Finished { completed });
        effects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MetronomeConfig;

    fn machine(rounds: u32, round: u32, rest: u32, countdown: u32) -> PhaseMachine {
        PhaseMachine::new(Arc::new(SessionConfig {
            rounds,
            round_duration_secs: round,
            rest_duration_secs: rest,
            countdown_duration_secs: countdown,
            ..Default::default()
        }))
    }

    fn with_metronome(metronome: MetronomeConfig) -> PhaseMachine {
        PhaseMachine::new(Arc::new(SessionConfig {
            rounds: 2,
            round_duration_secs: 5,
            rest_duration_secs: 3,
            countdown_duration_secs: 0,
            metronome,
            ..Default::default()
        }))
    }

    fn run_ticks(machine: &mut PhaseMachine, n: u32) -> Vec<Effect> {
        (0..n).flat_map(|_| machine.tick()).collect()
    }

    fn spoken(effects: &[Effect]) -> Vec<String> {
        effects
            .iter()
            .filter_map(|effect| match effect {
                Effect::Speak(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    fn snapshot(machine: &PhaseMachine) -> (RunnerPhase, u32, u32) {
        let state = machine.state();
        (state.phase, state.current_round, state.seconds_left)
    }

    #[test]
    fn test_initial_state() {
        let with_countdown = machine(3, 180, 60, 10);
        assert_eq!(snapshot(&with_countdown), (RunnerPhase::Countdown, 1, 12));
        assert!(!with_countdown.state().is_running);
        assert_eq!(with_countdown.state().count_in, CountInPhase::Idle);

        let without = machine(3, 180, 60, 0);
        assert_eq!(snapshot(&without), (RunnerPhase::Work, 1, 180));
    }

    #[test]
    fn test_three_rounds_without_countdown() {
        let mut m = machine(3, 180, 60, 0);
        let effects = m.start();
        assert_eq!(spoken(&effects), vec!["Round 1"]);
        assert!(effects.contains(&Effect::ArmCallouts(CalloutArm::AfterGrace)));
        assert_eq!(snapshot(&m), (RunnerPhase::Work, 1, 180));

        let effects = run_ticks(&mut m, 180);
        assert_eq!(snapshot(&m), (RunnerPhase::Rest, 1, 60));
        assert_eq!(spoken(&effects), vec!["Rest"]);
        assert!(effects.contains(&Effect::CancelCallouts));

        let effects = run_ticks(&mut m, 60);
        assert_eq!(snapshot(&m), (RunnerPhase::Work, 2, 180));
        assert_eq!(spoken(&effects), vec!["3", "2", "1", "Round 2"]);

        run_ticks(&mut m, 180 + 60 + 179);
        assert_eq!(snapshot(&m), (RunnerPhase::Work, 3, 1));
        let effects = m.tick();
        assert_eq!(snapshot(&m), (RunnerPhase::Finished, 3, 0));
        assert!(!m.state().is_running);
        assert_eq!(spoken(&effects), vec![COMPLETE_CUE]);
        assert!(effects.contains(&Effect::Finished { completed: true }));
        assert_eq!(m.rounds_completed(), 3);

        // Finished is terminal.
        assert!(m.tick().is_empty());
        assert!(m.stop().is_empty());
    }

    #[test]
    fn test_countdown_cues_and_fight() {
        let mut m = machine(3, 180, 60, 10);
        assert_eq!(spoken(&m.start()), vec![GET_READY_CUE]);

        let effects = m.tick();
        assert_eq!(snapshot(&m), (RunnerPhase::Countdown, 1, 11));
        assert!(spoken(&effects).is_empty());

        let effects = run_ticks(&mut m, 10);
        assert_eq!(
            spoken(&effects),
            vec!["10", "9", "8", "7", "6", "5", "4", "3", "2", "1"]
        );
        let effects = m.tick();
        assert_eq!(snapshot(&m), (RunnerPhase::Work, 1, 180));
        assert_eq!(spoken(&effects), vec![FIGHT_CUE]);
        assert!(effects.contains(&Effect::PhaseChanged {
            from: RunnerPhase::Countdown,
            to: RunnerPhase::Work,
        }));
    }

    #[test]
    fn test_zero_rest_goes_straight_to_next_round() {
        let mut m = machine(2, 3, 0, 0);
        m.start();
        let effects = run_ticks(&mut m, 3);
        assert_eq!(snapshot(&m), (RunnerPhase::Work, 2, 3));
        assert_eq!(spoken(&effects), vec!["Round 2"]);
        assert!(effects.contains(&Effect::PhaseChanged {
            from: RunnerPhase::Work,
            to: RunnerPhase::Work,
        }));
    }

    #[test]
    fn test_short_rest_announces_every_second() {
        let mut m = machine(2, 2, 3, 0);
        let mut effects = m.start();
        effects.extend(run_ticks(&mut m, 5));
        assert_eq!(snapshot(&m), (RunnerPhase::Work, 2, 2));
        assert_eq!(
            spoken(&effects),
            vec!["Round 1", "Rest", "3", "2", "1", "Round 2"]
        );

        let mut m = machine(2, 2, 1, 0);
        let mut effects = m.start();
        effects.extend(run_ticks(&mut m, 2));
        assert_eq!(snapshot(&m), (RunnerPhase::Rest, 1, 1));
        effects.extend(m.tick());
        assert_eq!(snapshot(&m), (RunnerPhase::Work, 2, 2));
        assert_eq!(spoken(&effects), vec!["Round 1", "Rest", "1", "Round 2"]);
    }

    #[test]
    fn test_single_round_skips_rest() {
        let mut m = machine(1, 2, 60, 0);
        m.start();
        run_ticks(&mut m, 2);
        assert_eq!(m.state().phase, RunnerPhase::Finished);
    }

    #[test]
    fn test_ticks_are_ignored_before_start_and_while_paused() {
        let mut m = machine(3, 180, 60, 0);
        assert!(m.tick().is_empty());
        m.start();
        m.tick();
        let effects = m.pause();
        assert_eq!(
            effects,
            vec![Effect::StopClock, Effect::CancelCallouts, Effect::Paused]
        );
        assert!(m.tick().is_empty());
        assert_eq!(m.state().seconds_left, 179);
        // A second pause does nothing.
        assert!(m.pause().is_empty());

        let effects = m.resume();
        assert_eq!(
            effects,
            vec![
                Effect::StartClock,
                Effect::ArmCallouts(CalloutArm::Fresh),
                Effect::Resumed,
            ]
        );
        assert!(m.resume().is_empty());
        m.tick();
        assert_eq!(m.state().seconds_left, 178);
    }

    #[test]
    fn test_resume_during_rest_does_not_arm_callouts() {
        let mut m = machine(2, 2, 10, 0);
        m.start();
        run_ticks(&mut m, 2);
        m.pause();
        let effects = m.resume();
        assert!(!effects.iter().any(|e| matches!(e, Effect::ArmCallouts(_))));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut m = machine(3, 180, 60, 0);
        m.start();
        run_ticks(&mut m, 5);
        m.record_callout("Jab");
        let effects = m.stop();
        assert!(effects.contains(&Effect::StopSpeech));
        assert!(effects.contains(&Effect::Finished { completed: false }));
        assert!(spoken(&effects).is_empty());
        let state = m.state();
        assert_eq!(state.phase, RunnerPhase::Finished);
        assert_eq!(state.seconds_left, 0);
        assert!(!state.is_running);
        assert!(m.stop().is_empty());
        // A stopped session cannot be restarted.
        assert!(m.start().is_empty());
    }

    #[test]
    fn test_start_twice_is_ignored() {
        let mut m = machine(3, 180, 60, 10);
        assert!(!m.start().is_empty());
        assert!(m.start().is_empty());
    }

    #[test]
    fn test_last_callout_cleared_on_phase_change() {
        let mut m = machine(2, 2, 2, 0);
        m.start();
        m.record_callout("Cross");
        assert_eq!(m.state().last_callout, "Cross");
        run_ticks(&mut m, 2);
        assert_eq!(m.state().last_callout, "");
    }

    #[test]
    fn test_count_in_gates_the_round_clock() {
        let mut m = with_metronome(MetronomeConfig {
            enabled: true,
            ..Default::default()
        });
        let effects = m.start();
        assert!(effects.contains(&Effect::Metronome(MetronomeCommand::StartWithCountIn)));
        assert!(!effects.iter().any(|e| matches!(e, Effect::ArmCallouts(_))));
        assert_eq!(m.state().count_in, CountInPhase::Counting);
        assert!(!m.callouts_active());

        assert!(run_ticks(&mut m, 3).is_empty());
        assert_eq!(m.state().seconds_left, 5);

        let effects = m.count_in_complete();
        assert_eq!(
            effects,
            vec![
                Effect::CountInFinished,
                Effect::ArmCallouts(CalloutArm::AfterGrace),
            ]
        );
        assert!(m.count_in_complete().is_empty());
        m.tick();
        assert_eq!(m.state().seconds_left, 4);
    }

    #[test]
    fn test_metronome_follows_rest_policy() {
        let mut m = with_metronome(MetronomeConfig {
            enabled: true,
            count_in_enabled: false,
            ..Default::default()
        });
        m.start();
        assert_eq!(m.state().count_in, CountInPhase::Done);
        let effects = run_ticks(&mut m, 5);
        assert!(effects.contains(&Effect::Metronome(MetronomeCommand::Pause)));
        let effects = run_ticks(&mut m, 3);
        assert!(effects.contains(&Effect::Metronome(MetronomeCommand::Resume)));
        // The count-in belongs to the first work phase only.
        assert!(!effects.contains(&Effect::Metronome(MetronomeCommand::StartWithCountIn)));
        let effects = run_ticks(&mut m, 5);
        assert!(effects.contains(&Effect::Metronome(MetronomeCommand::Release)));

        let mut keeps_playing = with_metronome(MetronomeConfig {
            enabled: true,
            count_in_enabled: false,
            play_during_rest: true,
            ..Default::default()
        });
        keeps_playing.start();
        let effects = run_ticks(&mut keeps_playing, 8);
        assert_eq!(keeps_playing.state().current_round, 2);
        assert!(!effects.iter().any(|e| matches!(
            e,
            Effect::Metronome(MetronomeCommand::Pause) | Effect::Metronome(MetronomeCommand::Resume)
        )));
    }

    #[test]
    fn test_disabled_metronome_is_never_commanded_until_stop() {
        let mut m = machine(2, 2, 2, 3);
        let mut effects = m.start();
        effects.extend(run_ticks(&mut m, 5 + 2 + 2));
        effects.extend(m.pause());
        effects.extend(m.resume());
        let commands: Vec<_> = effects
            .iter()
            .filter(|e| matches!(e, Effect::Metronome(_)))
            .collect();
        assert!(commands.is_empty());
        assert_eq!(m.state().count_in, CountInPhase::Done);
    }
}
