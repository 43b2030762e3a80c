//! Tracing setup and capture progress forwarding.
//!
//! [`StatusLayer`] turns capture progress log events into [`StatusEvent`]s so
//! that status stream clients see the same shot-by-shot progress as the
//! console. Only events from the capture sequencer are forwarded; run outcomes
//! are published by the orchestrator itself.

use shared::config::Verbosity;
use shared::status::{StatusBroadcaster, StatusEvent, StatusLevel};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Log target whose events are forwarded.
pub const CAPTURE_TARGET: &str = "shared::capture";

/// Visitor to extract the message from a tracing event.
struct MessageVisitor {
    message: String,
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" || self.message.is_empty() {
            self.message = format!("{value:?}");
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" || self.message.is_empty() {
            self.message = value.to_string();
        }
    }
}

/// Tracing layer that publishes capture progress to a [`StatusBroadcaster`].
pub struct StatusLayer {
    broadcaster: StatusBroadcaster,
}

impl StatusLayer {
    pub fn new(broadcaster: StatusBroadcaster) -> Self {
        Self { broadcaster }
    }
}

impl<S> Layer<S> for StatusLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if !metadata.target().starts_with(CAPTURE_TARGET) {
            return;
        }

        let level = match *metadata.level() {
            Level::ERROR => StatusLevel::Error,
            Level::WARN => StatusLevel::Warning,
            Level::INFO => StatusLevel::Info,
            _ => return,
        };

        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);
        if visitor.message.is_empty() {
            return;
        }

        self.broadcaster.publish(StatusEvent::new(level, visitor.message));
    }
}

/// Install the global subscriber.
///
/// The console filter comes from `RUST_LOG` when set, otherwise from
/// `verbosity`. When `status` is given, capture progress is also published to
/// it regardless of the console filter.
pub fn init_tracing(verbosity: Verbosity, status: Option<StatusBroadcaster>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::filter::{EnvFilter, Targets};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));

    tracing_subscriber::registry()
        .with(status.map(|broadcaster| {
            StatusLayer::new(broadcaster)
                .with_filter(Targets::new().with_target(CAPTURE_TARGET, Level::INFO))
        }))
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();
}
