// Tests for the splice event model and its 90 kHz timing arithmetic.

pub mod common;
use common::setup_logging;
use pretty_assertions::assert_eq;
use splice_console::scte35::{
    compute_pts, current_pts_ticks, generate_ad_break_sequence, seconds_to_ticks, SpliceEvent,
    SpliceKind, PTS_CLOCK_HZ, PTS_MODULUS,
};
use splice_console::SpliceError;


#[test]
fn test_insert_out_duration_ticks() {
    setup_logging();
    for seconds in [0.5, 1.0, 15.0, 30.0, 120.0, 3600.0] {
        let ev = SpliceEvent::insert_out(42, seconds, false).unwrap();
        assert_eq!(ev.duration, Some((seconds * PTS_CLOCK_HZ as f64).round() as u64));
        assert_eq!(ev.kind, SpliceKind::InsertOut);
        assert!(ev.out_of_network());
    }
    // A zero duration signals "indefinite / not applicable", carried as absence.
    let ev = SpliceEvent::insert_out(42, 0.0, true).unwrap();
    assert_eq!(ev.duration, None);
    assert!(ev.immediate);
}

#[test]
fn test_insert_out_rejects_negative_duration() {
    setup_logging();
    for bad in [-1.0, -0.001, f64::NAN, f64::INFINITY] {
        let res = SpliceEvent::insert_out(1, bad, false);
        assert!(matches!(res, Err(SpliceError::InvalidArgument { .. })), "accepted {bad}");
    }
}

#[test]
fn test_insert_in_never_carries_duration() {
    setup_logging();
    let ev = SpliceEvent::insert_in(7, false);
    assert_eq!(ev.duration, None);
    assert_eq!(ev.kind, SpliceKind::InsertIn);
    assert!(!ev.out_of_network());
}

#[test]
fn test_crash_out_is_immediate_and_unbounded() {
    setup_logging();
    let ev = SpliceEvent::crash_out(9);
    assert!(ev.immediate);
    assert_eq!(ev.pts_time, None);
    assert_eq!(ev.duration, None);
    assert!(ev.out_of_network());
}

#[test]
fn test_immediate_and_pts_are_exclusive() {
    setup_logging();
    let ev = SpliceEvent::insert_in(3, true);
    assert!(ev.immediate);
    assert_eq!(ev.pts_time, None);

    let timed = ev.clone().with_pts(123_456);
    assert!(!timed.immediate);
    assert_eq!(timed.pts_time, Some(123_456));

    let back = timed.with_immediate();
    assert!(back.immediate);
    assert_eq!(back.pts_time, None);
}

#[test]
fn test_compute_pts_always_in_range() {
    setup_logging();
    let cases = [
        (0u64, 0i64),
        (0, -1),
        (0, -90_000),
        (PTS_MODULUS - 1, 1),
        (PTS_MODULUS - 1, i64::MAX / 4),
        (1234, i64::MIN / 4),
        (8_589_934_591, 90_000),
        (90_000, -180_000),
    ];
    for (now, offset) in cases {
        let pts = compute_pts(now, offset);
        assert!(pts < PTS_MODULUS, "compute_pts({now}, {offset}) = {pts} out of range");
    }
    // Floored modulo: a negative sum wraps to the top of the clock, never to a negative.
    assert_eq!(compute_pts(0, -1), PTS_MODULUS - 1);
    assert_eq!(compute_pts(10, -90_010), PTS_MODULUS - 90_000);
}

#[test]
fn test_compute_pts_wraps_at_33_bits() {
    setup_logging();
    assert_eq!(compute_pts(PTS_MODULUS - 1, 1), 0);
    assert_eq!(compute_pts(PTS_MODULUS - 1, 2), 1);
    assert_eq!(compute_pts(0, PTS_MODULUS as i64), 0);
}

#[test]
fn test_current_pts_in_range() {
    setup_logging();
    for _ in 0..100 {
        assert!(current_pts_ticks() < PTS_MODULUS);
    }
}

#[test]
fn test_ad_break_sequence_shape() {
    setup_logging();
    let events = generate_ad_break_sequence(1000, 30.0, 2.0).unwrap();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event_id, 1000);
    assert_eq!(events[1].event_id, 1001);
    assert_eq!(events[2].event_id, 1002);
    assert_eq!(events[0].kind, SpliceKind::TimeSignal);
    assert_eq!(events[1].kind, SpliceKind::InsertOut);
    assert_eq!(events[2].kind, SpliceKind::InsertIn);
    assert_eq!(events[1].duration, Some(30 * PTS_CLOCK_HZ));
    for ev in &events {
        assert!(!ev.immediate);
        let pts = ev.pts_time.expect("scheduled event missing PTS");
        assert!(pts < PTS_MODULUS);
    }
}

#[test]
fn test_ad_break_sequence_offsets() {
    setup_logging();
    let events = generate_ad_break_sequence(500, 10.0, 1.0).unwrap();
    let preroll = events[0].pts_time.unwrap();
    let out = events[1].pts_time.unwrap();
    let cue_in = events[2].pts_time.unwrap();
    // preroll is 1 s before the splice point, the CUE-IN 10 s after it (modulo wrap).
    assert_eq!(compute_pts(out, -(PTS_CLOCK_HZ as i64)), preroll);
    assert_eq!(compute_pts(out, 10 * PTS_CLOCK_HZ as i64), cue_in);
}

#[test]
fn test_ad_break_sequence_rejects_bad_input() {
    setup_logging();
    assert!(generate_ad_break_sequence(1, -3.0, 0.0).is_err());
    assert!(generate_ad_break_sequence(1, 30.0, -1.0).is_err());
    assert!(generate_ad_break_sequence(u32::MAX - 1, 30.0, 0.0).is_err());
    // finite but absurd durations overflow the signed tick offset and must be rejected,
    // not wrapped into an offset with the opposite sign
    assert!(generate_ad_break_sequence(1, 1.0e18, 0.0).is_err());
    assert!(generate_ad_break_sequence(1, 30.0, 1.0e18).is_err());
}

#[test]
fn test_seconds_to_ticks_rounding() {
    setup_logging();
    assert_eq!(seconds_to_ticks(0.0).unwrap(), 0);
    assert_eq!(seconds_to_ticks(1.0).unwrap(), 90_000);
    assert_eq!(seconds_to_ticks(0.5).unwrap(), 45_000);
    assert_eq!(seconds_to_ticks(1.0 / 3.0).unwrap(), 30_000);
}
