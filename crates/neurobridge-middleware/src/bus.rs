//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Traffic is partitioned into five [`Topic`] lanes so components only
//! receive the messages they care about:
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::Sensors`] | High-frequency ranging, inertial and odometry readings |
//! | [`Topic::ExternalCommands`] | Externally supplied command arrays |
//! | [`Topic::NeuralOutput`] | Raw output vector of every completed cycle |
//! | [`Topic::NavSuggestion`] | Velocity command of every completed cycle |
//! | [`Topic::Status`] | Periodic human-readable pipeline status |

use neurobridge_types::{Event, NeuralError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all first-class routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Inbound sensor readings destined for the sensor cache.
    Sensors,
    /// Inbound external command arrays.
    ExternalCommands,
    /// Raw inference output vectors.
    NeuralOutput,
    /// Velocity commands produced by the pipeline.
    NavSuggestion,
    /// Pipeline status lines.
    Status,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    sensors: broadcast::Sender<Event>,
    external_commands: broadcast::Sender<Event>,
    neural_output: broadcast::Sender<Event>,
    nav_suggestion: broadcast::Sender<Event>,
    status: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (sensors, _) = broadcast::channel(capacity);
        let (external_commands, _) = broadcast::channel(capacity);
        let (neural_output, _) = broadcast::channel(capacity);
        let (nav_suggestion, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        Self {
            sensors,
            external_commands,
            neural_output,
            nav_suggestion,
            status,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event, or
    /// [`NeuralError::Channel`] when no subscriber is listening on the topic.
    /// Publishers that treat delivery as best effort may ignore that error.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, NeuralError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| NeuralError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::Sensors => &self.sensors,
            Topic::ExternalCommands => &self.external_commands,
            Topic::NeuralOutput => &self.neural_output,
            Topic::NavSuggestion => &self.nav_suggestion,
            Topic::Status => &self.status,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.  The caller decides whether to
    ///   continue or abort.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurobridge_types::{EventPayload, VelocityCommand};

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::NavSuggestion(VelocityCommand {
                linear_velocity: 0.27,
                angular_velocity: 0.0,
            }),
        )
    }

    #[test]
    fn publish_without_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::NavSuggestion, make_event("test"));
        assert!(matches!(result, Err(NeuralError::Channel(_))));
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut subscriber1 = bus.subscribe_to(Topic::NavSuggestion);
        let mut subscriber2 = bus.subscribe_to(Topic::NavSuggestion);

        let event = make_event("neurobridge-runtime::pipeline");
        let delivered = bus.publish_to(Topic::NavSuggestion, event.clone())?;
        assert_eq!(delivered, 2);

        let recv1 = subscriber1.recv().await?;
        let recv2 = subscriber2.recv().await?;
        assert_eq!(recv1.id, event.id);
        assert_eq!(recv2.id, event.id);
        Ok(())
    }

    /// A subscriber on `Status` must not receive events published to
    /// `Sensors` because they are routed through separate channels.
    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut status_sub = bus.subscribe_to(Topic::Status);
        let _sensor_sub = bus.subscribe_to(Topic::Sensors);

        bus.publish_to(Topic::Sensors, make_event("ros2::scan"))?;

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            status_sub.recv(),
        )
        .await;
        assert!(result.is_err(), "Status subscriber must not receive a Sensors event");
        Ok(())
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must produce
    /// a `Lagged` error rather than panicking or blocking.
    #[tokio::test]
    async fn topic_channel_lag_on_slow_subscriber() {
        let bus = EventBus::new(16);
        let mut slow_sub = bus.subscribe_to(Topic::Sensors);

        for _ in 0..1_000 {
            let _ = bus.publish_to(Topic::Sensors, make_event("flood::scan"));
        }

        let result = slow_sub.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[test]
    fn receiver_reports_its_topic() {
        let bus = EventBus::default();
        let rx = bus.subscribe_to(Topic::Status);
        assert_eq!(rx.topic(), Topic::Status);
    }
}
