mod common;

use common::{engine, session};
use std::time::Duration;
use strikeclock::prelude::*;
use tokio::time::{sleep, Instant};

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn secs(v: u64) -> Duration {
    Duration::from_secs(v)
}

fn phase_of(engine: &SessionEngine) -> (RunnerPhase, u32, u32) {
    let state = engine.state();
    (state.phase, state.current_round, state.seconds_left)
}

#[tokio::test(start_paused = true)]
async fn three_rounds_with_rest_and_no_countdown() {
    let (engine, transcript, _) = engine(session(3, 180, 60, 0));
    let t0 = Instant::now();
    engine.start();

    sleep(ms(500)).await;
    assert_eq!(phase_of(&engine), (RunnerPhase::Work, 1, 180));
    assert!(engine.state().is_running);

    sleep(secs(180)).await;
    assert_eq!(phase_of(&engine), (RunnerPhase::Rest, 1, 60));

    sleep(secs(60)).await;
    assert_eq!(phase_of(&engine), (RunnerPhase::Work, 2, 180));

    let final_state = engine.wait_until_finished().await;
    assert_eq!(t0.elapsed(), secs(3 * 180 + 2 * 60));
    assert_eq!(final_state.phase, RunnerPhase::Finished);
    assert_eq!(final_state.seconds_left, 0);
    assert!(!final_state.is_running);

    let lines = transcript.lines();
    assert_eq!(lines.first().map(String::as_str), Some("Round 1"));
    assert_eq!(lines.last().map(String::as_str), Some("Time. Session complete."));
    assert_eq!(lines.iter().filter(|l| *l == "Rest").count(), 2);
}

#[tokio::test(start_paused = true)]
async fn countdown_pads_two_seconds_before_the_numerals() {
    let (engine, transcript, _) = engine(session(3, 180, 60, 10));
    assert_eq!(phase_of(&engine), (RunnerPhase::Countdown, 1, 12));
    let t0 = Instant::now();
    engine.start();

    sleep(ms(2_500)).await;
    assert_eq!(phase_of(&engine), (RunnerPhase::Countdown, 1, 10));
    sleep(secs(10)).await;
    assert_eq!(phase_of(&engine), (RunnerPhase::Work, 1, 180));

    let timeline = transcript.timeline(t0);
    assert_eq!(timeline[0], (0, "Get ready".to_string()));
    assert_eq!(timeline[1], (2, "10".to_string()));
    assert!(timeline.contains(&(12, "Fight!".to_string())));
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn metronome_holds_tempo_for_a_whole_round() {
    let mut config = session(1, 10, 0, 0);
    config.callouts.clear();
    config.metronome = MetronomeConfig {
        enabled: true,
        bpm: 120,
        count_in_enabled: false,
        ..Default::default()
    };
    let (engine, _, clicks) = engine(config);
    let t0 = Instant::now();
    engine.start();
    engine.wait_until_finished().await;

    let plays = clicks.plays();
    assert!(plays.len() >= 19, "only {} beats played", plays.len());
    for (i, at) in plays.iter().enumerate() {
        let ideal = t0 + ms(500) * i as u32;
        let error = at.saturating_duration_since(ideal) + ideal.saturating_duration_since(*at);
        assert!(error < ms(100), "beat {} off by {:?}", i, error);
    }
}

#[tokio::test(start_paused = true)]
async fn pause_keeps_the_beat_phase() {
    let mut config = session(1, 60, 0, 0);
    config.callouts.clear();
    config.metronome = MetronomeConfig {
        enabled: true,
        bpm: 120,
        count_in_enabled: false,
        ..Default::default()
    };
    let (engine, _, clicks) = engine(config);
    let t0 = Instant::now();
    engine.start();
    sleep(ms(1_200)).await;
    engine.pause();
    sleep(ms(7_000)).await;
    let before_resume = clicks.plays().len();
    assert_eq!(before_resume, 3);

    engine.resume();
    sleep(ms(400)).await;
    let plays = clicks.plays();
    assert_eq!(plays.len(), 4);
    // 300ms were left at the pause, so the next beat lands at 8.2s + 300ms.
    let resumed_beat = plays[3] - t0;
    assert!(resumed_beat >= ms(8_499) && resumed_beat <= ms(8_501), "{:?}", resumed_beat);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn toml_session_is_sanitized_and_runs() {
    let config = SessionConfig::from_toml_str(
        r#"
        rounds = 0
        round_duration_secs = 5
        rest_duration_secs = 0
        countdown_duration_secs = 0
        callout_interval_min = 9
        callout_interval_max = 2
        "#,
    )
    .unwrap();
    assert_eq!(config.rounds, 3);
    assert_eq!((config.callout_interval_min, config.callout_interval_max), (2, 9));

    let (engine, transcript, _) = engine(config);
    let t0 = Instant::now();
    engine.start();
    engine.wait_until_finished().await;
    assert_eq!(t0.elapsed(), secs(15));
    let lines = transcript.lines();
    assert!(lines.contains(&"Round 2".to_string()));
    assert!(lines.contains(&"Round 3".to_string()));
    assert!(!lines.contains(&"Rest".to_string()));
}

#[tokio::test(start_paused = true)]
async fn state_watchers_see_every_phase() {
    let (engine, _, _) = engine(session(2, 3, 2, 0));
    let mut states = engine.subscribe_state();
    engine.start();
    let mut phases = vec![states.borrow().phase];
    while states.changed().await.is_ok() {
        let phase = states.borrow().phase;
        if phases.last() != Some(&phase) {
            phases.push(phase);
        }
        if phase == RunnerPhase::Finished {
            break;
        }
    }
    assert_eq!(
        phases,
        vec![
            RunnerPhase::Work,
            RunnerPhase::Rest,
            RunnerPhase::Work,
            RunnerPhase::Finished,
        ]
    );
}
