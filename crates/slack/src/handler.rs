//! `/coffee` slash command handling.
//!
//! A request is authenticated, turned into a [`SlashCommandEvent`], offered to
//! the broker for at most `publish_timeout`, and answered with the order
//! modal. Broker trouble never changes the response.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use coffeebuddy_core::config::BrokerConfig;
use coffeebuddy_core::{EventPublisher, PublishError};
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::blocks::{coffee_order_modal, ViewOpenPayload};
use crate::commands::InboundRequest;
use crate::events::SlashCommandEvent;
use crate::signature::{AuthenticationError, RequestValidator, SignatureValidator};

pub const DEFAULT_EVENTS_TOPIC: &str = "slack.events";
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_millis(300);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStage {
    Received,
    Validating,
    Rejected,
    Validated,
    Emitting,
    Responding,
    Done,
}

impl CommandStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Validating => "validating",
            Self::Rejected => "rejected",
            Self::Validated => "validated",
            Self::Emitting => "emitting",
            Self::Responding => "responding",
            Self::Done => "done",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] AuthenticationError),
}

impl CommandError {
    /// Short reason safe to return to the caller.
    pub fn detail(&self) -> &'static str {
        match self {
            Self::Unauthorized(AuthenticationError::StaleRequest { .. }) => {
                "Request timestamp too old"
            }
            Self::Unauthorized(AuthenticationError::SignatureMismatch) => "Invalid signature",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandHandlerOptions {
    pub topic: String,
    pub publish_timeout: Duration,
}

impl Default for CommandHandlerOptions {
    fn default() -> Self {
        Self { topic: DEFAULT_EVENTS_TOPIC.to_owned(), publish_timeout: DEFAULT_PUBLISH_TIMEOUT }
    }
}

impl From<&BrokerConfig> for CommandHandlerOptions {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            topic: config.topic.clone(),
            publish_timeout: Duration::from_millis(config.publish_timeout_ms),
        }
    }
}

pub struct CoffeeCommandHandler<V = SignatureValidator> {
    validator: V,
    publisher: Arc<dyn EventPublisher>,
    options: CommandHandlerOptions,
}

impl<V> CoffeeCommandHandler<V>
where
    V: RequestValidator,
{
    pub fn new(
        validator: V,
        publisher: Arc<dyn EventPublisher>,
        options: CommandHandlerOptions,
    ) -> Self {
        Self { validator, publisher, options }
    }

    pub fn options(&self) -> &CommandHandlerOptions {
        &self.options
    }

    pub async fn handle(&self, request: &InboundRequest) -> Result<ViewOpenPayload, CommandError> {
        debug!(stage = CommandStage::Received.as_str(), "slash command received");

        debug!(stage = CommandStage::Validating.as_str(), "validating slash command signature");
        if let Err(error) =
            self.validator.verify(request.timestamp(), request.body(), request.signature())
        {
            warn!(
                event_name = "slack.command.rejected",
                stage = CommandStage::Rejected.as_str(),
                timestamp = %request.timestamp(),
                error = %error,
                "rejected slash command"
            );
            return Err(error.into());
        }
        debug!(stage = CommandStage::Validated.as_str(), "slash command signature accepted");

        let event = SlashCommandEvent::new(request.form(), request.timestamp(), Utc::now());

        debug!(
            stage = CommandStage::Emitting.as_str(),
            correlation_id = %event.correlation_id(),
            "emitting slash command event"
        );
        self.emit(&event).await;

        debug!(
            stage = CommandStage::Responding.as_str(),
            correlation_id = %event.correlation_id(),
            "building order modal"
        );
        let response = coffee_order_modal(event.trigger_id().map(str::to_owned));

        debug!(
            stage = CommandStage::Done.as_str(),
            correlation_id = %event.correlation_id(),
            "slash command handled"
        );
        Ok(response)
    }

    async fn emit(&self, event: &SlashCommandEvent) {
        match self.try_emit(event).await {
            Ok(()) => info!(
                event_name = "slack.command.published",
                correlation_id = %event.correlation_id(),
                user_id = event.user_id().unwrap_or_default(),
                command = event.command().unwrap_or_default(),
                topic = %self.options.topic,
                "published slash command event"
            ),
            Err(error) => error!(
                event_name = "slack.command.publish_failed",
                correlation_id = %event.correlation_id(),
                user_id = event.user_id().unwrap_or_default(),
                topic = %self.options.topic,
                error = %error,
                "failed to publish slash command event, continuing with modal response"
            ),
        }
    }

    async fn try_emit(&self, event: &SlashCommandEvent) -> Result<(), PublishError> {
        let value = event.to_value()?;
        let headers = event.headers();
        let publish =
            self.publisher.publish(&self.options.topic, event.routing_key(), &value, &headers);

        tokio::time::timeout(self.options.publish_timeout, publish).await.map_err(|_| {
            PublishError::Timeout {
                after_ms: u64::try_from(self.options.publish_timeout.as_millis())
                    .unwrap_or(u64::MAX),
            }
        })?
    }
}

pub fn create_coffee_command_handler(
    signing_secret: SecretString,
    publisher: Arc<dyn EventPublisher>,
    config: &BrokerConfig,
) -> CoffeeCommandHandler<SignatureValidator> {
    CoffeeCommandHandler::new(
        SignatureValidator::new(signing_secret),
        publisher,
        CommandHandlerOptions::from(config),
    )
}
