//! rosbridge-style ROS 2 ⇄ WebSocket bridge.
//!
//! This module provides [`Ros2Bridge`], which:
//!
//! 1. **Ingests** rosbridge `publish` frames for the sensor topics and the
//!    external command topic, translating them into [`Event`] values that are
//!    published onto the internal [`EventBus`].
//!
//! 2. **Serves** a WebSocket endpoint where a rosbridge client can push those
//!    frames in and receive the pipeline's outputs back as `publish` frames.
//!
//! | Direction | ROS topic | Message fields used |
//! |---|---|---|
//! | in | `/scan` | `ranges`, `range_min`, `range_max` |
//! | in | `/imu` | `linear_acceleration`, `angular_velocity`, `orientation` |
//! | in | `/odom` | `pose.pose.position`, `pose.pose.orientation`, `twist.twist` |
//! | in | `/eos/neural_command` | `data` |
//! | out | `/eos/neural_output` | `data` |
//! | out | `/eos/neural_status` | `data` |
//! | out | `/eos/nav_suggestion` | `linear.x`, `angular.z` |
//!
//! The bridge is agnostic about the *meaning* of the data it routes; it only
//! handles serialisation and transport.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use neurobridge_types::{
    Event, EventPayload, ImuData, NeuralError, OdometryData, ScanData, SensorReading,
};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::bus::{EventBus, Topic};

/// Maximum number of range readings accepted in a single scan.
///
/// Payloads with more entries than this are rejected to prevent memory
/// exhaustion from malformed scan messages.
pub const MAX_SCAN_RANGES: usize = 4096;

/// Maximum number of values accepted in an external command array.
pub const MAX_COMMAND_VALUES: usize = 1024;

pub const SCAN_TOPIC: &str = "/scan";
pub const IMU_TOPIC: &str = "/imu";
pub const ODOM_TOPIC: &str = "/odom";
pub const NEURAL_COMMAND_TOPIC: &str = "/eos/neural_command";
pub const NEURAL_OUTPUT_TOPIC: &str = "/eos/neural_output";
pub const NEURAL_STATUS_TOPIC: &str = "/eos/neural_status";
pub const NAV_SUGGESTION_TOPIC: &str = "/eos/nav_suggestion";

/// Bridge between rosbridge clients and the internal [`EventBus`].
#[derive(Clone)]
pub struct Ros2Bridge {
    bus: Arc<EventBus>,
}

impl Ros2Bridge {
    /// Create a new bridge backed by `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    // -----------------------------------------------------------------------
    // Typed ingest helpers
    // -----------------------------------------------------------------------

    /// Publish a ranging scan on [`Topic::Sensors`].
    pub fn ingest_scan(&self, scan: ScanData) -> Result<usize, NeuralError> {
        if scan.ranges.len() > MAX_SCAN_RANGES {
            return Err(NeuralError::Parsing(format!(
                "scan has {} range readings, exceeding the limit of {}",
                scan.ranges.len(),
                MAX_SCAN_RANGES,
            )));
        }
        debug!(
            points = scan.ranges.len(),
            range_min = scan.range_min,
            range_max = scan.range_max,
            "scan received"
        );
        self.publish_sensor("scan", SensorReading::Scan(scan))
    }

    /// Publish an inertial measurement on [`Topic::Sensors`].
    pub fn ingest_imu(&self, imu: ImuData) -> Result<usize, NeuralError> {
        debug!(acceleration = imu.acceleration_magnitude(), "imu received");
        self.publish_sensor("imu", SensorReading::Imu(imu))
    }

    /// Publish an odometry estimate on [`Topic::Sensors`].
    pub fn ingest_odom(&self, odom: OdometryData) -> Result<usize, NeuralError> {
        debug!(x = odom.position_x, y = odom.position_y, "odometry received");
        self.publish_sensor("odom", SensorReading::Odometry(odom))
    }

    /// Publish an external command array on [`Topic::ExternalCommands`].
    pub fn ingest_external_command(&self, values: Vec<f32>) -> Result<usize, NeuralError> {
        if values.len() > MAX_COMMAND_VALUES {
            return Err(NeuralError::Parsing(format!(
                "external command has {} values, exceeding the limit of {}",
                values.len(),
                MAX_COMMAND_VALUES,
            )));
        }
        let event = Event::new(
            "neurobridge-middleware::ros2/eos/neural_command",
            EventPayload::ExternalCommand(values),
        );
        self.bus.publish_to(Topic::ExternalCommands, event)
    }

    fn publish_sensor(&self, ros_topic: &str, reading: SensorReading) -> Result<usize, NeuralError> {
        let event = Event::new(
            format!("neurobridge-middleware::ros2/{ros_topic}"),
            EventPayload::Sensor(reading),
        );
        self.bus.publish_to(Topic::Sensors, event)
    }

    // -----------------------------------------------------------------------
    // rosbridge frames
    // -----------------------------------------------------------------------

    /// Parse one rosbridge `publish` frame and publish it on the bus.
    ///
    /// Returns `Ok(false)` for frames on topics the bridge does not consume
    /// (they are ignored) and `Ok(true)` once a recognised frame has been
    /// handed to the bus.  Having no subscriber on the destination topic is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns [`NeuralError::Parsing`] when the frame is not valid JSON, or
    /// when a recognised topic carries a malformed or oversized message.
    pub fn ingest_frame(&self, text: &str) -> Result<bool, NeuralError> {
        let json: Value = serde_json::from_str(text)
            .map_err(|e| NeuralError::Parsing(format!("invalid rosbridge frame: {e}")))?;

        if json.get("op").and_then(Value::as_str) != Some("publish") {
            return Ok(false);
        }
        let topic = json.get("topic").and_then(Value::as_str).unwrap_or("");
        let msg = json.get("msg").unwrap_or(&Value::Null);

        let published = match topic {
            SCAN_TOPIC => self.ingest_scan(parse_scan(msg)?),
            IMU_TOPIC => self.ingest_imu(parse_imu(msg)?),
            ODOM_TOPIC => self.ingest_odom(parse_odom(msg)?),
            NEURAL_COMMAND_TOPIC => {
                let values = float_array(msg.get("data"))
                    .ok_or_else(|| missing_field(topic, "data"))?;
                self.ingest_external_command(values)
            }
            _ => return Ok(false),
        };

        match published {
            Ok(_) | Err(NeuralError::Channel(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Encode an outbound pipeline event as a rosbridge `publish` frame.
    ///
    /// Returns `None` for payloads that have no outbound ROS topic.
    pub fn encode_outbound(event: &Event) -> Option<String> {
        let frame = match &event.payload {
            EventPayload::NeuralOutput(values) => json!({
                "op": "publish",
                "topic": NEURAL_OUTPUT_TOPIC,
                "msg": { "data": values }
            }),
            EventPayload::Status(line) => json!({
                "op": "publish",
                "topic": NEURAL_STATUS_TOPIC,
                "msg": { "data": line }
            }),
            EventPayload::NavSuggestion(cmd) => json!({
                "op": "publish",
                "topic": NAV_SUGGESTION_TOPIC,
                "msg": {
                    "linear":  { "x": cmd.linear_velocity, "y": 0.0, "z": 0.0 },
                    "angular": { "x": 0.0, "y": 0.0, "z": cmd.angular_velocity }
                }
            }),
            EventPayload::Sensor(_) | EventPayload::ExternalCommand(_) => return None,
        };
        Some(frame.to_string())
    }

    // -----------------------------------------------------------------------
    // WebSocket server
    // -----------------------------------------------------------------------

    /// Start a WebSocket server on `addr`.
    ///
    /// Every connecting client may push rosbridge frames (see
    /// [`ingest_frame`][Self::ingest_frame]) and receives every outbound
    /// pipeline event as a rosbridge `publish` frame.  The server runs until
    /// it encounters a fatal bind error.
    ///
    /// # Errors
    ///
    /// Returns [`NeuralError::Channel`] if the TCP listener cannot be bound.
    pub async fn run_ws_server(self, addr: SocketAddr) -> Result<(), NeuralError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NeuralError::Channel(format!("ws bind error on {addr}: {e}")))?;
        info!(%addr, "rosbridge WebSocket server listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let bridge = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = bridge.handle_ws_client(stream, peer).await {
                            error!(peer = %peer, error = %e, "ws client error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "ws accept error");
                }
            }
        }
    }

    async fn handle_ws_client(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), NeuralError> {
        let ws_stream = accept_async(stream)
            .await
            .map_err(|e| NeuralError::Channel(format!("ws handshake from {peer}: {e}")))?;
        info!(peer = %peer, "rosbridge client connected");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let mut output_rx = self.bus.subscribe_to(Topic::NeuralOutput);
        let mut nav_rx = self.bus.subscribe_to(Topic::NavSuggestion);
        let mut status_rx = self.bus.subscribe_to(Topic::Status);

        loop {
            let outbound = tokio::select! {
                result = output_rx.recv() => result,
                result = nav_rx.recv() => result,
                result = status_rx.recv() => result,
                msg = ws_rx.next() => {
                    match msg {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Err(_)) => break,
                        Some(Ok(Message::Text(text))) => {
                            match self.ingest_frame(text.as_str()) {
                                Ok(true) => {}
                                Ok(false) => debug!(peer = %peer, "ignoring frame on unconsumed topic"),
                                Err(e) => warn!(peer = %peer, error = %e, "rejected rosbridge frame"),
                            }
                        }
                        _ => {}
                    }
                    continue;
                }
            };

            match outbound {
                Ok(event) => {
                    if let Some(frame) = Self::encode_outbound(&event) {
                        if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    warn!(peer = %peer, lagged_by = n, "ws client lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }

        info!(peer = %peer, "rosbridge client disconnected");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

fn missing_field(topic: &str, field: &str) -> NeuralError {
    NeuralError::Parsing(format!("{topic} message is missing '{field}'"))
}

/// Follow `path` through nested objects and read the leaf as `f32`.
fn f32_at(value: &Value, path: &[&str]) -> Option<f32> {
    let mut cur = value;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_f64().map(|v| v as f32)
}

/// Read a JSON array of numbers.  rosbridge encodes non-finite floats as
/// `null`; those become `f32::INFINITY` so range filtering discards them.
fn float_array(value: Option<&Value>) -> Option<Vec<f32>> {
    let arr = value?.as_array()?;
    arr.iter()
        .map(|v| match v {
            Value::Null => Some(f32::INFINITY),
            other => other.as_f64().map(|f| f as f32),
        })
        .collect()
}

fn vector3(value: &Value, key: &str) -> [f32; 3] {
    [
        f32_at(value, &[key, "x"]).unwrap_or(0.0),
        f32_at(value, &[key, "y"]).unwrap_or(0.0),
        f32_at(value, &[key, "z"]).unwrap_or(0.0),
    ]
}

fn parse_scan(msg: &Value) -> Result<ScanData, NeuralError> {
    let ranges = float_array(msg.get("ranges")).ok_or_else(|| missing_field(SCAN_TOPIC, "ranges"))?;
    let range_min = f32_at(msg, &["range_min"]).ok_or_else(|| missing_field(SCAN_TOPIC, "range_min"))?;
    let range_max = f32_at(msg, &["range_max"]).ok_or_else(|| missing_field(SCAN_TOPIC, "range_max"))?;
    Ok(ScanData {
        ranges,
        range_min,
        range_max,
    })
}

fn parse_imu(msg: &Value) -> Result<ImuData, NeuralError> {
    if msg.get("linear_acceleration").is_none() {
        return Err(missing_field(IMU_TOPIC, "linear_acceleration"));
    }
    let orientation = [
        f32_at(msg, &["orientation", "x"]).unwrap_or(0.0),
        f32_at(msg, &["orientation", "y"]).unwrap_or(0.0),
        f32_at(msg, &["orientation", "z"]).unwrap_or(0.0),
        f32_at(msg, &["orientation", "w"]).unwrap_or(1.0),
    ];
    Ok(ImuData {
        linear_acceleration: vector3(msg, "linear_acceleration"),
        angular_velocity: vector3(msg, "angular_velocity"),
        orientation,
    })
}

fn parse_odom(msg: &Value) -> Result<OdometryData, NeuralError> {
    let position_x = f32_at(msg, &["pose", "pose", "position", "x"])
        .ok_or_else(|| missing_field(ODOM_TOPIC, "pose.pose.position"))?;
    let position_y = f32_at(msg, &["pose", "pose", "position", "y"])
        .ok_or_else(|| missing_field(ODOM_TOPIC, "pose.pose.position"))?;

    let q = |axis: &str| f32_at(msg, &["pose", "pose", "orientation", axis]);
    let (qx, qy, qz, qw) = (
        q("x").unwrap_or(0.0),
        q("y").unwrap_or(0.0),
        q("z").unwrap_or(0.0),
        q("w").unwrap_or(1.0),
    );
    // Yaw of a unit quaternion.
    let heading_rad = (2.0 * (qw * qz + qx * qy)).atan2(1.0 - 2.0 * (qy * qy + qz * qz));

    Ok(OdometryData {
        position_x,
        position_y,
        heading_rad,
        linear_velocity: f32_at(msg, &["twist", "twist", "linear", "x"]).unwrap_or(0.0),
        angular_velocity: f32_at(msg, &["twist", "twist", "angular", "z"]).unwrap_or(0.0),
    })
}
