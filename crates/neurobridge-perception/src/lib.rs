//! `neurobridge-perception` – Sensor Intake
//!
//! Turns independently-arriving sensor streams into model-ready input.
//!
//! # Modules
//!
//! - [`cache`] – [`SensorCache`][cache::SensorCache]: mutex-guarded
//!   latest-value store for the ranging, inertial and odometry streams with
//!   atomic point-in-time snapshots.
//! - [`preprocess`] – [`Preprocessor`][preprocess::Preprocessor]: builds the
//!   fixed-length [`InputVector`][neurobridge_types::InputVector] from a
//!   snapshot's ranging data.

pub mod cache;
pub mod preprocess;

pub use cache::SensorCache;
pub use preprocess::Preprocessor;
