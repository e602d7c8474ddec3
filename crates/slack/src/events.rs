use std::fmt;

use chrono::{DateTime, Utc};
use coffeebuddy_core::RecordHeaders;
use serde::Serialize;
use serde_json::Value;

use crate::commands::SlashCommandPayload;

pub const SLASH_COMMAND_EVENT_TYPE: &str = "slash_command";
pub const CORRELATION_ID_HEADER: &str = "correlation_id";

/// `{user_id}_{epoch_millis}` tag that follows one command through the broker.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn derive(user_id: Option<&str>, at: DateTime<Utc>) -> Self {
        Self(format!("{}_{}", user_id.unwrap_or_default(), at.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// User id prefix, or `None` when the id was derived without one.
    pub fn user_id(&self) -> Option<&str> {
        let (user_id, millis) = self.0.rsplit_once('_')?;
        if user_id.is_empty() || millis.is_empty() {
            return None;
        }
        if !millis.bytes().all(|byte| byte.is_ascii_digit() || byte == b'-') {
            return None;
        }
        Some(user_id)
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Event emitted for one authenticated slash command invocation.
///
/// Only the command handler constructs these, and only after the request
/// signature has been accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SlashCommandEvent {
    event_type: &'static str,
    command: Option<String>,
    text: Option<String>,
    trigger_id: Option<String>,
    user_id: Option<String>,
    channel_id: Option<String>,
    team_id: Option<String>,
    timestamp: String,
    #[serde(skip)]
    correlation_id: CorrelationId,
}

impl SlashCommandEvent {
    pub(crate) fn new(
        payload: SlashCommandPayload,
        timestamp: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        let correlation_id = CorrelationId::derive(payload.user_id.as_deref(), received_at);
        Self {
            event_type: SLASH_COMMAND_EVENT_TYPE,
            command: payload.command,
            text: payload.text,
            trigger_id: payload.trigger_id,
            user_id: payload.user_id,
            channel_id: payload.channel_id,
            team_id: payload.team_id,
            timestamp: timestamp.into(),
            correlation_id,
        }
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn trigger_id(&self) -> Option<&str> {
        self.trigger_id.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    /// Partition key; events without a user share the empty key.
    pub fn routing_key(&self) -> &str {
        self.user_id.as_deref().unwrap_or_default()
    }

    pub fn headers(&self) -> RecordHeaders {
        RecordHeaders::from([(
            CORRELATION_ID_HEADER.to_owned(),
            self.correlation_id.as_str().to_owned(),
        )])
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
