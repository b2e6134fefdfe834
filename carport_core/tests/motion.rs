//! Motion classification with the jitter/max-slope hysteresis band.

use carport_core::motion::{MotionClassifier, MotionSample, MotionState};
use proptest::prelude::*;
use rstest::rstest;

fn feed(c: &mut MotionClassifier, start_seq: u64, distances: &[f64]) {
    for (i, d) in distances.iter().enumerate() {
        c.input(MotionSample::new(start_seq + i as u64, *d));
    }
}

#[rstest]
#[case(&[200.0, 195.0, 190.0, 185.0], MotionState::Opening)]
#[case(&[185.0, 190.0, 195.0, 200.0], MotionState::Closing)]
#[case(&[150.0, 150.0, 150.0, 150.0], MotionState::Static)]
fn classifies_full_window(#[case] distances: &[f64], #[case] expected: MotionState) {
    let mut c = MotionClassifier::new(25.0, 0.4);
    feed(&mut c, 0, distances);
    assert_eq!(c.motion(), expected);
    assert_eq!(c.len(), 4);
}

#[test]
fn fewer_than_four_samples_stay_static() {
    let mut c = MotionClassifier::new(25.0, 0.4);
    feed(&mut c, 0, &[300.0, 200.0, 100.0]);
    assert_eq!(c.motion(), MotionState::Static);
    assert_eq!(c.last_slope(), None);
}

#[test]
fn jitter_band_keeps_previous_state() {
    let mut c = MotionClassifier::new(25.0, 0.4);
    feed(&mut c, 0, &[200.0, 195.0, 190.0, 185.0]);
    assert_eq!(c.motion(), MotionState::Opening);

    // Slope of +0.1 per sample: inside (0, jitter], ignored.
    let mut c2 = c.clone();
    feed(&mut c2, 4, &[185.0, 185.1, 185.2, 185.3]);
    assert!(c2.last_slope().is_some_and(|m| m > 0.0 && m <= 0.4));
    assert_eq!(c2.motion(), MotionState::Opening);
}

#[test]
fn steep_slope_raises_ceiling_before_acting() {
    let mut c = MotionClassifier::new(25.0, 0.4);
    feed(&mut c, 0, &[100.0, 140.0, 180.0, 220.0]);
    // |m| = 40 >= ceiling: ceiling catches up, state held.
    assert_eq!(c.max_slope, 40.0);
    assert_eq!(c.motion(), MotionState::Static);

    // Next window is slightly shallower and now inside the band.
    c.input(MotionSample::new(4, 250.0));
    assert!(c.last_slope().is_some_and(|m| m < 40.0));
    assert_eq!(c.motion(), MotionState::Closing);
}

#[test]
fn thresholds_are_seedable_and_inspectable() {
    let mut c = MotionClassifier::new(5.0, 1.0);
    c.jitter_slope = 0.0;
    feed(&mut c, 10, &[10.0, 10.5, 11.0, 11.5]);
    assert_eq!(c.motion(), MotionState::Closing);
    assert_eq!(c.max_slope, 5.0);
}

#[test]
fn duplicate_sequence_numbers_are_ignored() {
    let mut c = MotionClassifier::new(25.0, 0.4);
    for d in [200.0, 190.0, 180.0, 170.0] {
        c.input(MotionSample::new(7, d));
    }
    assert_eq!(c.motion(), MotionState::Static);
    assert_eq!(c.last_slope(), None);
}

proptest! {
    #[test]
    fn max_slope_never_decreases(distances in prop::collection::vec(0.0f64..1200.0, 0..64)) {
        let mut c = MotionClassifier::new(25.0, 0.4);
        let mut prev = c.max_slope;
        for (i, d) in distances.iter().enumerate() {
            c.input(MotionSample::new(i as u64, *d));
            prop_assert!(c.max_slope >= prev);
            prev = c.max_slope;
        }
    }
}
