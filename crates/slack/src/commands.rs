use std::collections::HashMap;

pub const COFFEE_COMMAND: &str = "/coffee";

pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER_ALIAS: &str = "x-request-timestamp";
pub const SIGNATURE_HEADER_ALIAS: &str = "x-request-signature";

/// Form fields Slack posts for a slash command invocation.
///
/// Every field is optional: a missing field stays `None` and is carried
/// through to the emitted event as `null`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SlashCommandPayload {
    pub command: Option<String>,
    pub text: Option<String>,
    pub trigger_id: Option<String>,
    pub user_id: Option<String>,
    pub channel_id: Option<String>,
    pub team_id: Option<String>,
}

impl SlashCommandPayload {
    /// Decodes an `application/x-www-form-urlencoded` body. Undecodable
    /// sequences are replaced rather than rejected and the last occurrence of
    /// a repeated key wins.
    pub fn from_form(body: &[u8]) -> Self {
        let mut fields = url::form_urlencoded::parse(body)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect::<HashMap<_, _>>();

        Self {
            command: fields.remove("command"),
            text: fields.remove("text"),
            trigger_id: fields.remove("trigger_id"),
            user_id: fields.remove("user_id"),
            channel_id: fields.remove("channel_id"),
            team_id: fields.remove("team_id"),
        }
    }
}

/// One inbound webhook delivery exactly as received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundRequest {
    timestamp: String,
    signature: String,
    body: Vec<u8>,
}

impl InboundRequest {
    pub fn new(
        timestamp: impl Into<String>,
        signature: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self { timestamp: timestamp.into(), signature: signature.into(), body: body.into() }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn form(&self) -> SlashCommandPayload {
        SlashCommandPayload::from_form(&self.body)
    }
}
