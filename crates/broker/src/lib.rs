//! Broker client for CoffeeBuddy events.
//!
//! [`KafkaRestPublisher`] implements [`coffeebuddy_core::EventPublisher`] on
//! top of the Kafka REST Proxy v3 API. Its lifecycle (`start`/`stop`) is
//! driven by the server process; request retries follow [`RetryPolicy`].

pub mod rest;
pub mod retry;

pub use rest::{BrokerError, KafkaRestPublisher, PublisherState, PublisherStatus};
pub use retry::RetryPolicy;
