//! `neurobridge-middleware` – The Nervous System
//!
//! Routes asynchronous data between the sensor transport, the inference
//! pipeline, and external clients without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.
//! - [`ros2_bridge`] – rosbridge-style WebSocket bridge that translates ROS 2
//!   JSON frames (`/scan`, `/imu`, `/odom`, …) into bus events and streams the
//!   pipeline's outputs back as publish frames.

pub mod bus;
pub mod ros2_bridge;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use ros2_bridge::Ros2Bridge;
