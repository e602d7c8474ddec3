pub mod config;
pub mod publisher;

pub use publisher::{
    EventPublisher, InMemoryEventPublisher, NoopEventPublisher, PublishError, PublishedRecord,
    RecordHeaders,
};
