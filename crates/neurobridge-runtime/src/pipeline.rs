//! [`NeuralPipeline`] – one sense → infer → decide → command cycle.
//!
//! The pipeline owns every stage and the reentrancy flag.  Each call to
//! [`NeuralPipeline::tick`] runs at most one cycle:
//!
//! 1. **Guard** – `Idle → Processing` by compare-and-swap; a tick that loses
//!    the race is dropped, never queued.
//! 2. **Snapshot** – copy the [`SensorCache`]; a snapshot with no ranging
//!    data ends the cycle without inference.
//! 3. **Process** – [`Preprocessor`] → [`InferenceAdapter`] →
//!    [`DecisionInterpreter`] → [`CommandGenerator`], with the vector lengths
//!    checked between stages.
//! 4. **Publish** – raw output on [`Topic::NeuralOutput`], velocity command on
//!    [`Topic::NavSuggestion`] (best effort).
//!
//! The flag returns to `Idle` when the guard drops, whether the cycle
//! completed, failed or panicked inside a plugged adapter.
//!
//! # Example
//!
//! ```rust
//! use neurobridge_middleware::EventBus;
//! use neurobridge_runtime::pipeline::{CycleOutcome, ModelConfig, NeuralPipeline};
//!
//! let pipeline = NeuralPipeline::new(ModelConfig::default(), EventBus::default()).unwrap();
//!
//! // Nothing has been sensed yet, so the cycle is skipped.
//! assert!(matches!(pipeline.tick(), CycleOutcome::InsufficientData));
//! assert!(pipeline.status().to_string().contains("READY"));
//! ```

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use neurobridge_middleware::{EventBus, Topic};
use neurobridge_perception::{Preprocessor, SensorCache};
use neurobridge_types::{
    Decision, Event, EventPayload, InputVector, NeuralError, OutputVector, SensorReading,
    SensorSnapshot, VelocityCommand,
};
use tracing::{debug, error, info, warn};

use crate::command::{CommandGenerator, DEFAULT_ANGULAR_SCALE, DEFAULT_LINEAR_SCALE};
use crate::inference::{InferenceAdapter, InferenceBackend, select_adapter};
use crate::interpreter::DecisionInterpreter;

const SOURCE: &str = "neurobridge-runtime::pipeline";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable pipeline configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    /// Model artifact to load.  `None` selects the stand-in adapter.
    pub model_path: Option<PathBuf>,
    /// Cycle frequency in Hz.
    pub update_rate_hz: f64,
    /// Status publication frequency in Hz.
    pub status_rate_hz: f64,
    pub input_size: usize,
    pub output_size: usize,
    /// Confidence a decision must exceed before the robot moves.
    pub confidence_threshold: f32,
    pub linear_scale: f32,
    pub angular_scale: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            update_rate_hz: 10.0,
            status_rate_hz: 1.0,
            input_size: 100,
            output_size: 10,
            confidence_threshold: 0.7,
            linear_scale: DEFAULT_LINEAR_SCALE,
            angular_scale: DEFAULT_ANGULAR_SCALE,
        }
    }
}

impl ModelConfig {
    /// Check every field.
    ///
    /// # Errors
    ///
    /// [`NeuralError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<(), NeuralError> {
        if self.input_size == 0 {
            return Err(invalid("input_size must be at least 1"));
        }
        if self.output_size == 0 {
            return Err(invalid("output_size must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(invalid(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            )));
        }
        for (name, scale) in [("linear_scale", self.linear_scale), ("angular_scale", self.angular_scale)] {
            if !scale.is_finite() || scale < 0.0 {
                return Err(invalid(format!("{name} must be finite and non-negative, got {scale}")));
            }
        }
        self.cycle_period()?;
        self.status_period()?;
        Ok(())
    }

    /// Interval between cycle ticks.
    pub fn cycle_period(&self) -> Result<Duration, NeuralError> {
        period_of("update_rate_hz", self.update_rate_hz)
    }

    /// Interval between status publications.
    pub fn status_period(&self) -> Result<Duration, NeuralError> {
        period_of("status_rate_hz", self.status_rate_hz)
    }
}

fn period_of(name: &str, rate_hz: f64) -> Result<Duration, NeuralError> {
    if !rate_hz.is_finite() || rate_hz <= 0.0 {
        return Err(invalid(format!("{name} must be finite and positive, got {rate_hz}")));
    }
    match Duration::try_from_secs_f64(1.0 / rate_hz) {
        Ok(period) if !period.is_zero() => Ok(period),
        _ => Err(invalid(format!("{name} of {rate_hz} Hz gives no usable period"))),
    }
}

fn invalid(msg: impl Into<String>) -> NeuralError {
    NeuralError::InvalidConfig(msg.into())
}

// ─────────────────────────────────────────────────────────────────────────────
// Reentrancy guard
// ─────────────────────────────────────────────────────────────────────────────

/// Whether a cycle is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    Processing,
}

const IDLE: u8 = 0;
const PROCESSING: u8 = 1;

/// Holds the flag in `Processing`; dropping it restores `Idle`.
struct CycleGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> CycleGuard<'a> {
    fn acquire(state: &'a AtomicU8) -> Option<Self> {
        state
            .compare_exchange(IDLE, PROCESSING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { state })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.store(IDLE, Ordering::Release);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// External command hook
// ─────────────────────────────────────────────────────────────────────────────

/// Receives externally supplied command arrays.
///
/// Hooks run on the sensor-feed task and never touch the cycle state.
pub trait ExternalCommandHook: Send + Sync {
    fn on_command(&self, values: &[f32]);
}

/// Logs the number of values and, when there are at least three, the first
/// three of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCommandHook;

impl ExternalCommandHook for LoggingCommandHook {
    fn on_command(&self, values: &[f32]) {
        if values.len() >= 3 {
            info!(count = values.len(), first = ?&values[..3], "external command received");
        } else {
            info!(count = values.len(), "external command received");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcomes and status
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one completed cycle produced.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub input: InputVector,
    pub output: OutputVector,
    pub decision: Decision,
    pub command: VelocityCommand,
}

/// Result of one [`NeuralPipeline::tick`].
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Completed(CycleReport),
    /// Another cycle was still running.
    Dropped,
    /// The snapshot held no usable ranging data.
    InsufficientData,
    /// The adapter is not ready to serve inference.
    ModelNotReady,
    Failed(NeuralError),
}

/// Point-in-time summary of the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStatus {
    pub model_loaded: bool,
    pub backend: InferenceBackend,
    pub state: CycleState,
    pub cycles_completed: u64,
    pub cycles_skipped: u64,
    pub cycles_failed: u64,
    pub ticks_dropped: u64,
    /// Wall time of the most recent completed cycle, from preprocessing to
    /// the velocity command.  `None` until a cycle completes.
    pub last_cycle_latency: Option<Duration>,
    /// Accuracy recorded in the loaded model artifact.
    pub model_accuracy: Option<f32>,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.model_loaded {
            return write!(f, "Neural Bridge: ERROR - Model not loaded");
        }
        match self.state {
            CycleState::Processing => {
                write!(f, "Neural Bridge: PROCESSING - Active inference ({})", self.backend)
            }
            CycleState::Idle => {
                write!(f, "Neural Bridge: READY - Model loaded and waiting ({})", self.backend)
            }
        }
    }
}

#[derive(Debug, Default)]
struct CycleCounters {
    completed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    last_latency_nanos: AtomicU64,
}

// ─────────────────────────────────────────────────────────────────────────────
// NeuralPipeline
// ─────────────────────────────────────────────────────────────────────────────

/// The inference pipeline.  Share it behind an `Arc`; every method takes
/// `&self`.
pub struct NeuralPipeline {
    config: ModelConfig,
    cycle_period: Duration,
    status_period: Duration,
    cache: Arc<SensorCache>,
    preprocessor: Preprocessor,
    adapter: Box<dyn InferenceAdapter>,
    interpreter: DecisionInterpreter,
    generator: CommandGenerator,
    bus: EventBus,
    state: AtomicU8,
    command_hook: Box<dyn ExternalCommandHook>,
    counters: CycleCounters,
}

impl NeuralPipeline {
    /// Validate `config` and select the adapter from its model path.
    pub fn new(config: ModelConfig, bus: EventBus) -> Result<Self, NeuralError> {
        // An invalid config must not reach the model loader.
        config.validate()?;
        let adapter = select_adapter(config.model_path.as_deref(), config.input_size, config.output_size);
        Self::assemble(config, bus, adapter)
    }

    /// Validate `config` and run cycles through `adapter`.
    pub fn with_adapter(
        config: ModelConfig,
        bus: EventBus,
        adapter: Box<dyn InferenceAdapter>,
    ) -> Result<Self, NeuralError> {
        config.validate()?;
        Self::assemble(config, bus, adapter)
    }

    /// Build the stages from an already validated `config`.
    fn assemble(
        config: ModelConfig,
        bus: EventBus,
        adapter: Box<dyn InferenceAdapter>,
    ) -> Result<Self, NeuralError> {
        let cycle_period = config.cycle_period()?;
        let status_period = config.status_period()?;
        info!(
            backend = %adapter.backend(),
            input_size = config.input_size,
            output_size = config.output_size,
            update_rate_hz = config.update_rate_hz,
            confidence_threshold = config.confidence_threshold,
            "neural pipeline initialised"
        );
        Ok(Self {
            preprocessor: Preprocessor::new(config.input_size),
            generator: CommandGenerator::new(config.linear_scale, config.angular_scale),
            interpreter: DecisionInterpreter::new(),
            cache: Arc::new(SensorCache::new()),
            state: AtomicU8::new(IDLE),
            command_hook: Box::new(LoggingCommandHook),
            counters: CycleCounters::default(),
            cycle_period,
            status_period,
            config,
            adapter,
            bus,
        })
    }

    /// Replace the external command hook.
    pub fn with_command_hook(mut self, hook: impl ExternalCommandHook + 'static) -> Self {
        self.command_hook = Box::new(hook);
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn cycle_period(&self) -> Duration {
        self.cycle_period
    }

    pub fn status_period(&self) -> Duration {
        self.status_period
    }

    /// The cache sensor writers feed.
    pub fn cache(&self) -> &Arc<SensorCache> {
        &self.cache
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn backend(&self) -> InferenceBackend {
        self.adapter.backend()
    }

    pub fn state(&self) -> CycleState {
        match self.state.load(Ordering::Acquire) {
            PROCESSING => CycleState::Processing,
            _ => CycleState::Idle,
        }
    }

    pub fn update_sensor(&self, reading: SensorReading) {
        self.cache.update(reading);
    }

    /// Pass an external command array to the hook.
    pub fn handle_external_command(&self, values: &[f32]) {
        self.command_hook.on_command(values);
    }

    /// Run one cycle unless one is already in flight.
    pub fn tick(&self) -> CycleOutcome {
        let Some(_guard) = CycleGuard::acquire(&self.state) else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("cycle still in flight; tick dropped");
            return CycleOutcome::Dropped;
        };

        if !self.adapter.is_ready() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("inference adapter not ready; cycle skipped");
            return CycleOutcome::ModelNotReady;
        }

        let snapshot = self.cache.snapshot();
        if !snapshot.has_ranging() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            debug!("no ranging data yet; cycle skipped");
            return CycleOutcome::InsufficientData;
        }

        let started = Instant::now();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.process(&snapshot))) {
            Ok(result) => result,
            Err(payload) => Err(NeuralError::Processing(format!(
                "inference panicked: {}",
                panic_message(&*payload)
            ))),
        };
        let latency = started.elapsed();

        match result {
            Ok(report) => {
                let latency_nanos = u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX);
                self.counters.last_latency_nanos.store(latency_nanos, Ordering::Relaxed);
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    movement = %report.decision.movement,
                    confidence = report.decision.confidence,
                    safety_score = report.decision.safety_score,
                    behavior = %report.decision.behavior,
                    linear_velocity = report.command.linear_velocity,
                    angular_velocity = report.command.angular_velocity,
                    latency_us = latency_nanos / 1_000,
                    "cycle complete"
                );
                self.publish_cycle(&report);
                CycleOutcome::Completed(report)
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %e, elapsed_us = latency.as_micros() as u64, "cycle failed");
                CycleOutcome::Failed(e)
            }
        }
    }

    fn process(&self, snapshot: &SensorSnapshot) -> Result<CycleReport, NeuralError> {
        let input = self.preprocessor.build(snapshot);
        if input.len() != self.preprocessor.input_size() {
            return Err(NeuralError::ShapeMismatch {
                stage: "preprocess".to_string(),
                expected: self.preprocessor.input_size(),
                actual: input.len(),
            });
        }

        let output = self.adapter.infer(&input)?;
        if output.len() != self.config.output_size {
            return Err(NeuralError::ShapeMismatch {
                stage: "inference".to_string(),
                expected: self.config.output_size,
                actual: output.len(),
            });
        }

        let decision = self.interpreter.interpret(&output);
        let command = self.generator.generate(&decision, self.config.confidence_threshold);
        Ok(CycleReport {
            input,
            output,
            decision,
            command,
        })
    }

    fn publish_cycle(&self, report: &CycleReport) {
        // Nobody listening is not an error for the cycle.
        let _ = self.bus.publish_to(
            Topic::NeuralOutput,
            Event::new(SOURCE, EventPayload::NeuralOutput(report.output.as_slice().to_vec())),
        );
        let _ = self.bus.publish_to(
            Topic::NavSuggestion,
            Event::new(SOURCE, EventPayload::NavSuggestion(report.command)),
        );
    }

    /// Current summary; never blocks on a running cycle.
    pub fn status(&self) -> PipelineStatus {
        let cycles_completed = self.counters.completed.load(Ordering::Relaxed);
        let last_cycle_latency = (cycles_completed > 0)
            .then(|| Duration::from_nanos(self.counters.last_latency_nanos.load(Ordering::Relaxed)));
        PipelineStatus {
            model_loaded: self.adapter.is_ready(),
            backend: self.adapter.backend(),
            state: self.state(),
            cycles_completed,
            cycles_skipped: self.counters.skipped.load(Ordering::Relaxed),
            cycles_failed: self.counters.failed.load(Ordering::Relaxed),
            ticks_dropped: self.counters.dropped.load(Ordering::Relaxed),
            last_cycle_latency,
            model_accuracy: self.adapter.accuracy(),
        }
    }

    /// Publish the status line on [`Topic::Status`] and return the status.
    pub fn publish_status(&self) -> PipelineStatus {
        let status = self.status();
        if !status.model_loaded {
            warn!("status: model not loaded");
        }
        let _ = self.bus.publish_to(
            Topic::Status,
            Event::new(SOURCE, EventPayload::Status(status.to_string())),
        );
        status
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
