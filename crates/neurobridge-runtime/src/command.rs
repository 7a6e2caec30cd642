//! [`CommandGenerator`] – [`Decision`] → bounded [`VelocityCommand`].
//!
//! | Decision | Command |
//! |---|---|
//! | confidence ≤ 0.3, any class | stationary |
//! | `stop` | stationary |
//! | `forward`, confidence > threshold | `linear = linear_scale · confidence` |
//! | `left`, confidence > threshold | `angular = angular_scale · confidence` |
//! | `right`, confidence > threshold | `angular = −angular_scale · confidence` |
//! | anything else | stationary |
//!
//! Confidence is in `[0, 1]`, so `|linear| ≤ linear_scale` and
//! `|angular| ≤ angular_scale`.

use neurobridge_types::{Decision, MovementClass, VelocityCommand};

/// At or below this confidence the robot never moves, whatever the class.
pub const LOW_CONFIDENCE_STOP: f32 = 0.3;
/// Default forward speed per unit of confidence (m/s).
pub const DEFAULT_LINEAR_SCALE: f32 = 0.3;
/// Default yaw rate per unit of confidence (rad/s).
pub const DEFAULT_ANGULAR_SCALE: f32 = 0.5;

/// Converts decisions into velocity commands.
#[derive(Debug, Clone, Copy)]
pub struct CommandGenerator {
    linear_scale: f32,
    angular_scale: f32,
}

impl Default for CommandGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_LINEAR_SCALE, DEFAULT_ANGULAR_SCALE)
    }
}

impl CommandGenerator {
    pub fn new(linear_scale: f32, angular_scale: f32) -> Self {
        Self {
            linear_scale,
            angular_scale,
        }
    }

    /// Command for `decision`, moving only when its confidence exceeds
    /// `confidence_threshold`.
    pub fn generate(&self, decision: &Decision, confidence_threshold: f32) -> VelocityCommand {
        let confidence = decision.confidence;
        if confidence <= LOW_CONFIDENCE_STOP || confidence <= confidence_threshold {
            return VelocityCommand::default();
        }
        match decision.movement {
            MovementClass::Forward => VelocityCommand {
                linear_velocity: self.linear_scale * confidence,
                angular_velocity: 0.0,
            },
            MovementClass::Left => VelocityCommand {
                linear_velocity: 0.0,
                angular_velocity: self.angular_scale * confidence,
            },
            MovementClass::Right => VelocityCommand {
                linear_velocity: 0.0,
                angular_velocity: -self.angular_scale * confidence,
            },
            MovementClass::Stop | MovementClass::Unknown => VelocityCommand::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurobridge_types::BehavioralLabel;

    fn decision(movement: MovementClass, confidence: f32) -> Decision {
        Decision {
            movement,
            confidence,
            safety_score: 0.5,
            behavior: BehavioralLabel::Uncertain,
        }
    }

    #[test]
    fn forward_above_threshold_drives_forward() {
        let cmd = CommandGenerator::default().generate(&decision(MovementClass::Forward, 0.9), 0.7);
        assert!((cmd.linear_velocity - 0.27).abs() < 1e-6);
        assert_eq!(cmd.angular_velocity, 0.0);
    }

    #[test]
    fn left_and_right_turn_in_opposite_directions() {
        let generator = CommandGenerator::default();
        let left = generator.generate(&decision(MovementClass::Left, 0.8), 0.7);
        let right = generator.generate(&decision(MovementClass::Right, 0.8), 0.7);
        assert_eq!(left.linear_velocity, 0.0);
        assert!((left.angular_velocity - 0.4).abs() < 1e-6);
        assert!((right.angular_velocity + 0.4).abs() < 1e-6);
    }

    #[test]
    fn stop_is_always_stationary() {
        let cmd = CommandGenerator::default().generate(&decision(MovementClass::Stop, 1.0), 0.1);
        assert!(cmd.is_stationary());
    }

    #[test]
    fn at_or_below_threshold_is_stationary() {
        let generator = CommandGenerator::default();
        assert!(generator.generate(&decision(MovementClass::Forward, 0.7), 0.7).is_stationary());
        assert!(generator.generate(&decision(MovementClass::Left, 0.6), 0.7).is_stationary());
    }

    #[test]
    fn low_confidence_stops_even_below_a_low_threshold() {
        let generator = CommandGenerator::default();
        for confidence in [0.0, 0.1, 0.25, 0.3] {
            for class in MovementClass::CHANNELS {
                let cmd = generator.generate(&decision(class, confidence), 0.05);
                assert!(cmd.is_stationary(), "{class} at {confidence}");
            }
        }
        // Just above the floor a low threshold lets the robot move.
        assert!(!generator.generate(&decision(MovementClass::Forward, 0.35), 0.05).is_stationary());
    }

    #[test]
    fn unknown_class_is_stationary() {
        let cmd = CommandGenerator::default().generate(&decision(MovementClass::Unknown, 0.95), 0.7);
        assert!(cmd.is_stationary());
    }

    #[test]
    fn magnitudes_bounded_by_scales() {
        let generator = CommandGenerator::new(0.3, 0.5);
        for class in MovementClass::CHANNELS {
            let cmd = generator.generate(&decision(class, 1.0), 0.0);
            assert!(cmd.linear_velocity.abs() <= 0.3 + 1e-6);
            assert!(cmd.angular_velocity.abs() <= 0.5 + 1e-6);
        }
    }

    #[test]
    fn custom_scales_apply() {
        let cmd = CommandGenerator::new(1.0, 2.0).generate(&decision(MovementClass::Left, 0.5), 0.4);
        assert!((cmd.angular_velocity - 1.0).abs() < 1e-6);
    }
}
