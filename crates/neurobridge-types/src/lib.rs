use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Sensor readings
// ─────────────────────────────────────────────────────────────────────────────

/// A single ranging scan (e.g. a 2-D LiDAR sweep).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanData {
    /// Measured distances in stream order (metres).
    pub ranges: Vec<f32>,
    /// Smallest distance the sensor can report reliably.
    pub range_min: f32,
    /// Largest distance the sensor can report reliably.
    pub range_max: f32,
}

/// A single inertial measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImuData {
    /// Linear acceleration `[x, y, z]` (m/s²).
    pub linear_acceleration: [f32; 3],
    /// Angular velocity `[x, y, z]` (rad/s).
    pub angular_velocity: [f32; 3],
    /// Orientation quaternion `[x, y, z, w]`.
    pub orientation: [f32; 4],
}

impl ImuData {
    /// Magnitude of the linear acceleration vector.
    pub fn acceleration_magnitude(&self) -> f32 {
        let [x, y, z] = self.linear_acceleration;
        (x * x + y * y + z * z).sqrt()
    }
}

/// A single odometry estimate (pose + velocity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometryData {
    /// Robot X position in the odometry frame (metres).
    pub position_x: f32,
    /// Robot Y position in the odometry frame (metres).
    pub position_y: f32,
    /// Heading, counter-clockwise from +X (radians).
    pub heading_rad: f32,
    /// Forward velocity (m/s).
    pub linear_velocity: f32,
    /// Yaw rate (rad/s).
    pub angular_velocity: f32,
}

/// One value on one sensor stream, as handed to the sensor cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorReading {
    Scan(ScanData),
    Imu(ImuData),
    Odometry(OdometryData),
}

impl SensorReading {
    /// Short stream name used in log fields.
    pub fn stream(&self) -> &'static str {
        match self {
            SensorReading::Scan(_) => "scan",
            SensorReading::Imu(_) => "imu",
            SensorReading::Odometry(_) => "odometry",
        }
    }
}

/// Point-in-time copy of the latest value of every sensor stream.
///
/// A stream that has never been written is `None`; downstream stages can
/// therefore tell "no data" apart from a measured zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub scan: Option<ScanData>,
    pub imu: Option<ImuData>,
    pub odometry: Option<OdometryData>,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

impl SensorSnapshot {
    /// A snapshot with no stream populated.
    pub fn empty() -> Self {
        Self {
            scan: None,
            imu: None,
            odometry: None,
            timestamp: Utc::now(),
        }
    }

    /// `true` when a scan with at least one range reading is present.
    pub fn has_ranging(&self) -> bool {
        self.scan.as_ref().is_some_and(|s| !s.ranges.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Model vectors
// ─────────────────────────────────────────────────────────────────────────────

/// Model-ready input of fixed length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputVector(Vec<f32>);

impl InputVector {
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Raw inference result of fixed length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputVector(Vec<f32>);

impl OutputVector {
    pub fn from_vec(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decisions and commands
// ─────────────────────────────────────────────────────────────────────────────

/// Discrete movement class read from the first four output channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementClass {
    Forward,
    Left,
    Right,
    Stop,
    /// The output vector is too short to carry a movement class.
    Unknown,
}

impl MovementClass {
    /// Movement classes in output-channel order.
    pub const CHANNELS: [MovementClass; 4] = [
        MovementClass::Forward,
        MovementClass::Left,
        MovementClass::Right,
        MovementClass::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementClass::Forward => "forward",
            MovementClass::Left => "left",
            MovementClass::Right => "right",
            MovementClass::Stop => "stop",
            MovementClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for MovementClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral context derived from the overall confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehavioralLabel {
    ConfidentNavigation,
    CautiousNavigation,
    Exploration,
    Uncertain,
}

impl BehavioralLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            BehavioralLabel::ConfidentNavigation => "confident_navigation",
            BehavioralLabel::CautiousNavigation => "cautious_navigation",
            BehavioralLabel::Exploration => "exploration",
            BehavioralLabel::Uncertain => "uncertain",
        }
    }
}

impl std::fmt::Display for BehavioralLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpreted inference output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub movement: MovementClass,
    /// Maximum output value, in `[0, 1]`.
    pub confidence: f32,
    /// In `[0, 1]`; `0.5` when the output carries no safety channel.
    pub safety_score: f32,
    pub behavior: BehavioralLabel,
}

/// Differential-drive velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear_velocity: f32,
    pub angular_velocity: f32,
}

impl VelocityCommand {
    /// `true` when both velocities are zero.
    pub fn is_stationary(&self) -> bool {
        self.linear_velocity == 0.0 && self.angular_velocity == 0.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event envelope
// ─────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "neurobridge-middleware::ros2/scan"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped with the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the internal event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Inbound sensor value destined for the sensor cache.
    Sensor(SensorReading),
    /// Inbound external command array (pass-through hook).
    ExternalCommand(Vec<f32>),
    /// Raw inference output of one completed cycle.
    NeuralOutput(Vec<f32>),
    /// Velocity command of one completed cycle.
    NavSuggestion(VelocityCommand),
    /// Human-readable pipeline status line.
    Status(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error type shared by every NeuroBridge crate.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NeuralError {
    #[error("Model Load Failure at {path}: {details}")]
    ModelLoad { path: String, details: String },

    #[error("Shape Mismatch in {stage}: expected {expected} values, got {actual}")]
    ShapeMismatch {
        stage: String,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),

    #[error("Middleware Channel Error: {0}")]
    Channel(String),

    #[error("Message Parsing Error: {0}")]
    Parsing(String),

    #[error("Cycle Processing Failure: {0}")]
    Processing(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_snapshot_has_no_streams() {
        let snap = SensorSnapshot::empty();
        assert!(snap.scan.is_none());
        assert!(snap.imu.is_none());
        assert!(snap.odometry.is_none());
        assert!(!snap.has_ranging());
    }

    #[test]
    fn empty_scan_is_not_ranging_data() {
        let mut snap = SensorSnapshot::empty();
        snap.scan = Some(ScanData {
            ranges: vec![],
            range_min: 0.1,
            range_max: 10.0,
        });
        assert!(!snap.has_ranging());

        snap.scan = Some(ScanData {
            ranges: vec![1.0],
            range_min: 0.1,
            range_max: 10.0,
        });
        assert!(snap.has_ranging());
    }

    #[test]
    fn movement_class_channel_order() {
        assert_eq!(MovementClass::CHANNELS[0], MovementClass::Forward);
        assert_eq!(MovementClass::CHANNELS[1], MovementClass::Left);
        assert_eq!(MovementClass::CHANNELS[2], MovementClass::Right);
        assert_eq!(MovementClass::CHANNELS[3], MovementClass::Stop);
    }

    #[test]
    fn labels_serialize_as_snake_case() {
        let json = serde_json::to_string(&BehavioralLabel::ConfidentNavigation).unwrap();
        assert_eq!(json, "\"confident_navigation\"");
        let json = serde_json::to_string(&MovementClass::Unknown).unwrap();
        assert_eq!(json, "\"unknown\"");
        assert_eq!(BehavioralLabel::CautiousNavigation.to_string(), "cautious_navigation");
    }

    #[test]
    fn velocity_command_defaults_to_stationary() {
        let cmd = VelocityCommand::default();
        assert!(cmd.is_stationary());
        let moving = VelocityCommand {
            linear_velocity: 0.1,
            angular_velocity: 0.0,
        };
        assert!(!moving.is_stationary());
    }

    #[test]
    fn imu_acceleration_magnitude() {
        let imu = ImuData {
            linear_acceleration: [3.0, 4.0, 0.0],
            angular_velocity: [0.0; 3],
            orientation: [0.0, 0.0, 0.0, 1.0],
        };
        assert!((imu.acceleration_magnitude() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "neurobridge-middleware::ros2/scan",
            EventPayload::Sensor(SensorReading::Scan(ScanData {
                ranges: vec![0.5, 1.0],
                range_min: 0.1,
                range_max: 3.5,
            })),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
        assert!(matches!(
            back.payload,
            EventPayload::Sensor(SensorReading::Scan(ref s)) if s.ranges == vec![0.5, 1.0]
        ));
    }

    #[test]
    fn neural_error_display() {
        let err = NeuralError::ShapeMismatch {
            stage: "inference".to_string(),
            expected: 10,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("inference"));
        assert!(msg.contains("expected 10"));

        let err2 = NeuralError::ModelLoad {
            path: "models/snn_model.json".to_string(),
            details: "not found".to_string(),
        };
        assert!(err2.to_string().contains("snn_model.json"));
    }
}
