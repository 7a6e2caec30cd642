//! `neurobridge-runtime` – The Inference Loop
//!
//! Turns cached sensor data into velocity commands at a fixed rate.
//!
//! # Modules
//!
//! - [`inference`] – the [`InferenceAdapter`][inference::InferenceAdapter]
//!   trait with a deterministic
//!   [`LinearTanhModel`][inference::LinearTanhModel] loaded from a JSON
//!   artifact and a random [`StandInModel`][inference::StandInModel]
//!   fallback, chosen once by [`select_adapter`][inference::select_adapter].
//! - [`interpreter`] – [`DecisionInterpreter`][interpreter::DecisionInterpreter]:
//!   output vector → movement class, confidence, safety score and
//!   behavioral band.
//! - [`command`] – [`CommandGenerator`][command::CommandGenerator]:
//!   decision → bounded differential-drive velocity command.
//! - [`pipeline`] – [`NeuralPipeline`][pipeline::NeuralPipeline]: owns the
//!   sensor cache and every stage, runs one guarded cycle per
//!   [`tick`][pipeline::NeuralPipeline::tick] and reports
//!   [`PipelineStatus`][pipeline::PipelineStatus].
//! - [`scheduler`] – [`CycleScheduler`][scheduler::CycleScheduler]: Tokio
//!   drivers for the cycle and status rates, plus
//!   [`spawn_sensor_feed`][scheduler::spawn_sensor_feed] wiring the event bus
//!   into the pipeline.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP span export.
//!
//! # Data flow
//!
//! ```text
//! EventBus ─► SensorCache ─► Preprocessor ─► InferenceAdapter
//!                                                  │
//! EventBus ◄─ CommandGenerator ◄─ DecisionInterpreter
//! ```

pub mod command;
pub mod inference;
pub mod interpreter;
pub mod pipeline;
pub mod scheduler;
pub mod telemetry;

pub use command::CommandGenerator;
pub use inference::{InferenceAdapter, InferenceBackend, LinearTanhModel, StandInModel, select_adapter};
pub use interpreter::DecisionInterpreter;
pub use pipeline::{
    CycleOutcome, CycleReport, CycleState, ExternalCommandHook, LoggingCommandHook, ModelConfig,
    NeuralPipeline, PipelineStatus,
};
pub use scheduler::{CycleScheduler, SchedulerHandle, spawn_sensor_feed};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
