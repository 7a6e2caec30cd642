//! [`DecisionInterpreter`] – output vector → [`Decision`].
//!
//! | Output channel | Meaning |
//! |---|---|
//! | `0..4` | forward / left / right / stop scores |
//! | last (when ≥ 5 channels) | safety score |
//!
//! Confidence is the largest value over *all* channels and selects the
//! behavioral band, evaluated from the highest band down with strict `>`.

use neurobridge_types::{BehavioralLabel, Decision, MovementClass, OutputVector};

/// Confidence above which the robot navigates confidently.
pub const CONFIDENT_ABOVE: f32 = 0.8;
/// Confidence above which the robot navigates cautiously.
pub const CAUTIOUS_ABOVE: f32 = 0.5;
/// Confidence above which the robot explores.
pub const EXPLORATION_ABOVE: f32 = 0.3;
/// Safety score reported when the output has no safety channel.
pub const DEFAULT_SAFETY_SCORE: f32 = 0.5;

/// Stateless interpreter of raw inference outputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecisionInterpreter;

impl DecisionInterpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn interpret(&self, output: &OutputVector) -> Decision {
        let values = output.as_slice();
        let confidence = confidence_of(values);
        Decision {
            movement: movement_of(values),
            confidence,
            safety_score: safety_of(values),
            behavior: behavior_for(confidence),
        }
    }
}

/// Largest finite value, clamped to `[0, 1]`; `0.0` for an empty vector.
fn confidence_of(values: &[f32]) -> f32 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f32::NEG_INFINITY, f32::max)
        .clamp(0.0, 1.0)
}

/// First-wins argmax over the four movement channels.
fn movement_of(values: &[f32]) -> MovementClass {
    if values.len() < MovementClass::CHANNELS.len() {
        return MovementClass::Unknown;
    }
    let mut best = 0;
    for (i, v) in values[..MovementClass::CHANNELS.len()].iter().enumerate().skip(1) {
        // Strict comparison keeps the lowest index on ties.
        if *v > values[best] || values[best].is_nan() {
            best = i;
        }
    }
    MovementClass::CHANNELS[best]
}

fn safety_of(values: &[f32]) -> f32 {
    match values.last() {
        Some(v) if values.len() >= 5 && v.is_finite() => v.clamp(0.0, 1.0),
        _ => DEFAULT_SAFETY_SCORE,
    }
}

/// Behavioral band for a confidence value.
pub fn behavior_for(confidence: f32) -> BehavioralLabel {
    if confidence > CONFIDENT_ABOVE {
        BehavioralLabel::ConfidentNavigation
    } else if confidence > CAUTIOUS_ABOVE {
        BehavioralLabel::CautiousNavigation
    } else if confidence > EXPLORATION_ABOVE {
        BehavioralLabel::Exploration
    } else {
        BehavioralLabel::Uncertain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interpret(values: &[f32]) -> Decision {
        DecisionInterpreter::new().interpret(&OutputVector::from_vec(values.to_vec()))
    }

    #[test]
    fn forward_example_decision() {
        let d = interpret(&[0.9, 0.1, 0.1, 0.1, 0.2]);
        assert_eq!(d.movement, MovementClass::Forward);
        assert!((d.confidence - 0.9).abs() < 1e-6);
        assert!((d.safety_score - 0.2).abs() < 1e-6);
        assert_eq!(d.behavior, BehavioralLabel::ConfidentNavigation);
    }

    #[test]
    fn each_movement_channel_maps_in_order() {
        assert_eq!(interpret(&[0.9, 0.1, 0.1, 0.1]).movement, MovementClass::Forward);
        assert_eq!(interpret(&[0.1, 0.9, 0.1, 0.1]).movement, MovementClass::Left);
        assert_eq!(interpret(&[0.1, 0.1, 0.9, 0.1]).movement, MovementClass::Right);
        assert_eq!(interpret(&[0.1, 0.1, 0.1, 0.9]).movement, MovementClass::Stop);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        assert_eq!(interpret(&[0.4, 0.7, 0.7, 0.7]).movement, MovementClass::Left);
        assert_eq!(interpret(&[0.5, 0.5, 0.5, 0.5]).movement, MovementClass::Forward);
        assert_eq!(interpret(&[0.1, 0.2, 0.6, 0.6, 0.0]).movement, MovementClass::Right);
    }

    #[test]
    fn argmax_ignores_channels_beyond_the_fourth() {
        let d = interpret(&[0.1, 0.6, 0.2, 0.3, 0.95, 0.4]);
        assert_eq!(d.movement, MovementClass::Left);
        // ...but confidence still covers every channel.
        assert!((d.confidence - 0.95).abs() < 1e-6);
    }

    #[test]
    fn short_outputs_are_unknown_with_default_safety() {
        let d = interpret(&[0.6, 0.2, 0.1]);
        assert_eq!(d.movement, MovementClass::Unknown);
        assert!((d.safety_score - DEFAULT_SAFETY_SCORE).abs() < 1e-6);
        assert_eq!(d.behavior, BehavioralLabel::CautiousNavigation);
    }

    #[test]
    fn four_channels_have_movement_but_default_safety() {
        let d = interpret(&[0.1, 0.2, 0.3, 0.05]);
        assert_eq!(d.movement, MovementClass::Right);
        assert!((d.safety_score - DEFAULT_SAFETY_SCORE).abs() < 1e-6);
    }

    #[test]
    fn behavior_bands_are_strict_on_the_upper_edge() {
        assert_eq!(behavior_for(0.81), BehavioralLabel::ConfidentNavigation);
        assert_eq!(behavior_for(0.8), BehavioralLabel::CautiousNavigation);
        assert_eq!(behavior_for(0.5), BehavioralLabel::Exploration);
        assert_eq!(behavior_for(0.31), BehavioralLabel::Exploration);
        assert_eq!(behavior_for(0.3), BehavioralLabel::Uncertain);
        assert_eq!(behavior_for(0.0), BehavioralLabel::Uncertain);
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        // tanh outputs can be negative everywhere.
        let d = interpret(&[-0.4, -0.2, -0.9, -0.1, -0.3]);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.safety_score, 0.0);
        assert_eq!(d.behavior, BehavioralLabel::Uncertain);
        assert_eq!(d.movement, MovementClass::Stop);

        let d = interpret(&[1.7, 0.0, 0.0, 0.0, 2.0]);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.safety_score, 1.0);
    }

    #[test]
    fn empty_output_is_uncertain() {
        let d = interpret(&[]);
        assert_eq!(d.movement, MovementClass::Unknown);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.behavior, BehavioralLabel::Uncertain);
    }

    #[test]
    fn nan_channels_are_skipped() {
        let d = interpret(&[f32::NAN, 0.6, 0.2, 0.1, f32::NAN]);
        assert_eq!(d.movement, MovementClass::Left);
        assert!((d.confidence - 0.6).abs() < 1e-6);
        assert!((d.safety_score - DEFAULT_SAFETY_SCORE).abs() < 1e-6);
    }

    #[test]
    fn movement_matches_lowest_index_of_max_for_many_vectors() {
        let mut seed = 17u32;
        let mut next = || {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            // Coarse grid so ties actually occur.
            ((seed >> 16) % 5) as f32 / 4.0
        };
        for _ in 0..500 {
            let v: Vec<f32> = (0..6).map(|_| next()).collect();
            let max = v[..4].iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let expected = v[..4].iter().position(|x| *x == max).unwrap();
            assert_eq!(interpret(&v).movement, MovementClass::CHANNELS[expected], "{v:?}");
        }
    }
}
