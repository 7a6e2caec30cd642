//! [`CycleScheduler`] – periodic drivers for a [`NeuralPipeline`].
//!
//! Two independent Tokio tasks run per scheduler:
//!
//! | Driver | Period | Work |
//! |---|---|---|
//! | cycle | `1 / update_rate_hz` | hands [`NeuralPipeline::tick`] to the blocking pool |
//! | status | `1 / status_rate_hz` | [`NeuralPipeline::publish_status`] |
//!
//! The cycle driver never waits for a cycle to finish.  A tick that fires
//! while the previous cycle is still running reaches the pipeline's guard
//! and is dropped there, so there is at most one cycle in flight and no
//! backlog.  The status driver never touches the guard.
//!
//! [`spawn_sensor_feed`] connects the event bus to the pipeline: sensor
//! readings go to the cache, external command arrays to the command hook.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use neurobridge_middleware::EventBus;
//! use neurobridge_runtime::pipeline::{ModelConfig, NeuralPipeline};
//! use neurobridge_runtime::scheduler::{CycleScheduler, spawn_sensor_feed};
//!
//! # async fn run() {
//! let bus = EventBus::default();
//! let pipeline = Arc::new(NeuralPipeline::new(ModelConfig::default(), bus.clone()).unwrap());
//!
//! let _feed = spawn_sensor_feed(&bus, Arc::clone(&pipeline));
//! let handle = CycleScheduler::new(pipeline).start();
//! // ...
//! handle.shutdown();
//! # }
//! ```

use std::sync::Arc;

use neurobridge_middleware::{EventBus, Topic};
use neurobridge_types::{Event, EventPayload};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::pipeline::NeuralPipeline;

// ─────────────────────────────────────────────────────────────────────────────
// CycleScheduler
// ─────────────────────────────────────────────────────────────────────────────

/// Drives a pipeline's cycles and status reports at their configured rates.
pub struct CycleScheduler {
    pipeline: Arc<NeuralPipeline>,
}

impl CycleScheduler {
    pub fn new(pipeline: Arc<NeuralPipeline>) -> Self {
        Self { pipeline }
    }

    /// Spawn the cycle and status drivers on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn start(&self) -> SchedulerHandle {
        info!(
            cycle_period_ms = self.pipeline.cycle_period().as_millis() as u64,
            status_period_ms = self.pipeline.status_period().as_millis() as u64,
            "scheduler started"
        );
        SchedulerHandle {
            cycle_task: tokio::spawn(drive_cycles(Arc::clone(&self.pipeline))),
            status_task: tokio::spawn(drive_status(Arc::clone(&self.pipeline))),
        }
    }
}

/// Stops both drivers when shut down or dropped.
///
/// A cycle already handed to the blocking pool runs to completion; it is
/// never cancelled midway.
pub struct SchedulerHandle {
    cycle_task: JoinHandle<()>,
    status_task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop scheduling new cycles and status reports.
    pub fn shutdown(&self) {
        if !self.cycle_task.is_finished() {
            info!("scheduler stopping");
        }
        self.cycle_task.abort();
        self.status_task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.cycle_task.is_finished() || !self.status_task.is_finished()
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cycle_task.abort();
        self.status_task.abort();
    }
}

async fn drive_cycles(pipeline: Arc<NeuralPipeline>) {
    let mut ticker = time::interval(pipeline.cycle_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let pipeline = Arc::clone(&pipeline);
        // Detached: the next tick must not wait on a slow cycle.
        drop(tokio::task::spawn_blocking(move || pipeline.tick()));
    }
}

async fn drive_status(pipeline: Arc<NeuralPipeline>) {
    let mut ticker = time::interval(pipeline.status_period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let status = pipeline.publish_status();
        debug!(
            %status,
            completed = status.cycles_completed,
            skipped = status.cycles_skipped,
            failed = status.cycles_failed,
            dropped = status.ticks_dropped,
            last_cycle_latency = ?status.last_cycle_latency,
            "status published"
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sensor feed
// ─────────────────────────────────────────────────────────────────────────────

/// Forward [`Topic::Sensors`] and [`Topic::ExternalCommands`] traffic from
/// `bus` into `pipeline`.
///
/// Both subscriptions are taken before the task is spawned, so events
/// published after this call returns are never missed.
pub fn spawn_sensor_feed(bus: &EventBus, pipeline: Arc<NeuralPipeline>) -> JoinHandle<()> {
    let mut sensors = bus.subscribe_to(Topic::Sensors);
    let mut commands = bus.subscribe_to(Topic::ExternalCommands);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                r = sensors.recv() => r,
                r = commands.recv() => r,
            };
            match received {
                Ok(event) => feed(&pipeline, event),
                Err(RecvError::Lagged(n)) => {
                    warn!(skipped = n, "sensor feed lagged; oldest events dropped");
                }
                Err(RecvError::Closed) => {
                    debug!("event bus closed; sensor feed stopping");
                    break;
                }
            }
        }
    })
}

fn feed(pipeline: &NeuralPipeline, event: Event) {
    match event.payload {
        EventPayload::Sensor(reading) => pipeline.update_sensor(reading),
        EventPayload::ExternalCommand(values) => pipeline.handle_external_command(&values),
        other => debug!(source = %event.source, payload = ?other, "sensor feed ignoring event"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{InferenceAdapter, InferenceBackend, LinearTanhModel};
    use crate::pipeline::{ExternalCommandHook, ModelConfig};
    use neurobridge_types::{InputVector, NeuralError, OutputVector, ScanData, SensorReading};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(update_rate_hz: f64, status_rate_hz: f64) -> ModelConfig {
        ModelConfig {
            input_size: 3,
            output_size: 5,
            update_rate_hz,
            status_rate_hz,
            ..ModelConfig::default()
        }
    }

    fn forward_model() -> Box<dyn InferenceAdapter> {
        let mut rows = vec![vec![0.0; 3]; 5];
        rows[0] = vec![0.0, 0.0, 2.0];
        Box::new(LinearTanhModel::from_rows(rows).unwrap())
    }

    fn scan() -> SensorReading {
        SensorReading::Scan(ScanData {
            ranges: vec![0.2, 0.4, 1.0],
            range_min: 0.0,
            range_max: 1.0,
        })
    }

    /// Sleeps inside every inference and records the peak concurrency.
    struct SlowAdapter {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl InferenceAdapter for SlowAdapter {
        fn backend(&self) -> InferenceBackend {
            InferenceBackend::Deterministic
        }

        fn infer(&self, _input: &InputVector) -> Result<OutputVector, NeuralError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(OutputVector::from_vec(vec![0.0; 5]))
        }
    }

    struct RecordingHook(Arc<Mutex<Vec<Vec<f32>>>>);

    impl ExternalCommandHook for RecordingHook {
        fn on_command(&self, values: &[f32]) {
            self.0.lock().unwrap().push(values.to_vec());
        }
    }

    #[tokio::test]
    async fn scheduler_publishes_velocity_commands() {
        let bus = EventBus::default();
        let pipeline = Arc::new(
            NeuralPipeline::with_adapter(config(50.0, 1.0), bus.clone(), forward_model()).unwrap(),
        );
        pipeline.update_sensor(scan());
        let mut nav_rx = bus.subscribe_to(Topic::NavSuggestion);

        let handle = CycleScheduler::new(Arc::clone(&pipeline)).start();
        let event = time::timeout(Duration::from_secs(2), nav_rx.recv())
            .await
            .expect("no command within timeout")
            .expect("bus closed");
        handle.shutdown();

        match event.payload {
            EventPayload::NavSuggestion(cmd) => {
                assert!((cmd.linear_velocity - 0.3 * 2.0f32.tanh()).abs() < 1e-6);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn status_reports_ready_without_ranging_data() {
        let bus = EventBus::default();
        let pipeline = Arc::new(
            NeuralPipeline::with_adapter(config(20.0, 20.0), bus.clone(), forward_model()).unwrap(),
        );
        let mut status_rx = bus.subscribe_to(Topic::Status);

        let handle = CycleScheduler::new(Arc::clone(&pipeline)).start();
        let mut lines = Vec::new();
        for _ in 0..3 {
            let event = time::timeout(Duration::from_secs(2), status_rx.recv())
                .await
                .expect("no status within timeout")
                .expect("bus closed");
            if let EventPayload::Status(line) = event.payload {
                lines.push(line);
            }
        }
        handle.shutdown();

        assert!(lines.iter().all(|l| l.starts_with("Neural Bridge:")), "{lines:?}");
        assert!(lines.iter().any(|l| l.contains("READY")), "{lines:?}");
        assert_eq!(pipeline.status().cycles_completed, 0);
    }

    #[tokio::test]
    async fn slow_cycles_drop_overlapping_ticks() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let adapter = SlowAdapter {
            in_flight: Arc::clone(&in_flight),
            peak: Arc::clone(&peak),
            delay: Duration::from_millis(150),
        };
        let pipeline = Arc::new(
            NeuralPipeline::with_adapter(config(100.0, 1.0), EventBus::default(), Box::new(adapter))
                .unwrap(),
        );
        pipeline.update_sensor(scan());

        let handle = CycleScheduler::new(Arc::clone(&pipeline)).start();
        time::sleep(Duration::from_millis(400)).await;
        handle.shutdown();

        let status = pipeline.status();
        assert!(status.ticks_dropped > 0, "{status:?}");
        assert!(status.cycles_completed >= 1, "{status:?}");
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_new_cycles() {
        let pipeline = Arc::new(
            NeuralPipeline::with_adapter(config(100.0, 1.0), EventBus::default(), forward_model())
                .unwrap(),
        );
        let handle = CycleScheduler::new(Arc::clone(&pipeline)).start();
        time::sleep(Duration::from_millis(100)).await;
        handle.shutdown();
        // Let any cycle already handed off finish.
        time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_running());

        let before = pipeline.status().cycles_skipped;
        assert!(before > 0);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pipeline.status().cycles_skipped, before);
    }

    #[tokio::test]
    async fn sensor_feed_writes_cache_and_forwards_commands() {
        let bus = EventBus::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let pipeline = Arc::new(
            NeuralPipeline::with_adapter(config(10.0, 1.0), bus.clone(), forward_model())
                .unwrap()
                .with_command_hook(RecordingHook(Arc::clone(&seen))),
        );
        let feed_task = spawn_sensor_feed(&bus, Arc::clone(&pipeline));

        bus.publish_to(Topic::Sensors, Event::new("test", EventPayload::Sensor(scan())))
            .unwrap();
        bus.publish_to(
            Topic::ExternalCommands,
            Event::new("test", EventPayload::ExternalCommand(vec![0.1, 0.2, 0.3])),
        )
        .unwrap();

        let mut delivered = false;
        for _ in 0..100 {
            if pipeline.cache().snapshot().scan.is_some() && !seen.lock().unwrap().is_empty() {
                delivered = true;
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        feed_task.abort();

        assert!(delivered, "feed did not deliver both events");
        assert_eq!(pipeline.cache().snapshot().scan.unwrap().ranges, vec![0.2, 0.4, 1.0]);
        assert_eq!(*seen.lock().unwrap(), vec![vec![0.1, 0.2, 0.3]]);
    }
}
