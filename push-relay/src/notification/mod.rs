//! Notification delivery.
//!
//! - [`outcome`]: classification of push service responses
//! - [`registry`]: the subscriber set and the last-active pointer
//! - [`stats`]: persisted delivery counter
//! - [`engine`]: broadcast and single-target delivery
//! - [`scheduler`]: periodic re-send to the last-active subscriber
//! - [`transport`]: Web Push encryption and HTTP delivery

pub mod engine;
pub mod outcome;
pub mod payload;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::{BroadcastSummary, DeliveryEngine};
pub use outcome::{DeliveryOutcome, OutcomeKind, TransportResponse, classify};
pub use payload::NotificationPayload;
pub use registry::{SubscriberRegistry, validate_subscriber};
pub use scheduler::{ScheduledBroadcaster, TickOutcome};
pub use stats::StatsAccumulator;
pub use transport::{PushTransport, WebPushTransport};
