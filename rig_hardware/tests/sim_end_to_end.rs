use std::sync::Arc;
use std::time::Duration;

use rig_core::{
    AxisId, AxisSet, Positioning, RetryPolicy, RigBuilder, ScaleReader, Settle,
    StabilizationDetector, StabilizeParams,
};
use rig_hardware::sim::{SimulatedMarlin, SimulatedScaleLink};
use rig_traits::Connector;
use rig_traits::clock::test_clock::TestClock;
use rstest::rstest;

fn id(c: char) -> AxisId {
    AxisId::new(c).unwrap()
}

#[rstest]
#[case('X', 800, 10.0)]
#[case('Z', -400, -5.0)]
#[case('E', 250, 0.5)]
fn steps_reach_the_board_as_distance(#[case] axis: char, #[case] steps: i64, #[case] expected: f64) {
    let marlin = SimulatedMarlin::new();
    let mut planner = RigBuilder::new()
        .with_connector(marlin.clone())
        .with_axes(AxisSet::marlin_default())
        .with_clock(Arc::new(TestClock::new()))
        .auto_enable(true)
        .build()
        .unwrap();

    planner.move_by_steps(id(axis), steps, 600).unwrap();
    let state = planner.query_position().unwrap();

    assert!(marlin.steppers_on());
    assert_eq!(marlin.position(axis), Some(expected));
    assert_eq!(state.get(id(axis)), Some(expected));
}

#[test]
fn reopen_after_unplug_clears_mode_on_both_sides() {
    let marlin = SimulatedMarlin::new();
    let mut planner = RigBuilder::new()
        .with_connector(marlin.clone())
        .with_axes(AxisSet::marlin_default())
        .with_policy(RetryPolicy {
            close_delay: Duration::ZERO,
            settle_delay: Duration::ZERO,
            ..RetryPolicy::default()
        })
        .with_clock(Arc::new(TestClock::new()))
        .initial_positioning(Positioning::Relative)
        .build()
        .unwrap();
    assert!(marlin.is_relative());

    marlin.fail_next_writes(1);
    planner.protocol_mut().enable_steppers().unwrap();

    assert_eq!(marlin.opens(), 2);
    assert!(!marlin.is_relative());
    assert_eq!(planner.protocol().session().positioning, None);
    // The planner re-establishes relative mode before its next move.
    planner.move_by_steps(id('X'), 80, 600).unwrap();
    assert_eq!(marlin.position('X'), Some(1.0));
}

#[test]
fn home_and_absolute_move() {
    let marlin = SimulatedMarlin::new();
    let mut planner = RigBuilder::new()
        .with_connector(marlin.clone())
        .with_axes(AxisSet::marlin_default())
        .with_clock(Arc::new(TestClock::new()))
        .initial_positioning(Positioning::Absolute)
        .build()
        .unwrap();
    let p = planner.protocol_mut();

    p.move_to([(id('X'), 12.0), (id('Y'), 3.5)], 1200).unwrap();
    let lines = p.home(&[id('X')], true).unwrap();

    assert!(lines.iter().any(|l| l.text.starts_with("echo:busy")));
    assert_eq!(p.motor_state().get(id('X')), Some(0.0));
    assert_eq!(p.motor_state().get(id('Y')), Some(3.5));
}

#[test]
fn noisy_scale_still_settles() {
    let scale = SimulatedScaleLink::new(0.0, 12.5).garble_every(4);
    let det = StabilizationDetector::with_clock(
        StabilizeParams {
            window: 3,
            threshold: 0.001,
            timeout: Duration::from_secs(6),
            poll: Duration::from_millis(50),
        },
        Arc::new(TestClock::new()),
    )
    .unwrap();

    let r = det.await_stable(ScaleReader::new(scale.open().unwrap()));

    assert_eq!(r.outcome, Settle::Converged);
    assert!((r.value - 12.5).abs() < 0.001);
    assert!(r.failures > 0);
}
