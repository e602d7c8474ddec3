//! Slack Integration - `/coffee` slash command webhook
//!
//! This crate provides the Slack-facing core of CoffeeBuddy:
//! - **Signatures** (`signature`) - HMAC-SHA256 request signing and replay window
//! - **Slash Commands** (`commands`) - raw inbound request and form field extraction
//! - **Events** (`events`) - the outbound `slash_command` event and its correlation id
//! - **Block Kit** (`blocks`) - the coffee order modal
//! - **Handler** (`handler`) - validate, emit, respond
//!
//! # Architecture
//!
//! ```text
//! POST /slack/commands/coffee → SignatureValidator → CoffeeCommandHandler → modal
//!                                                           ↓ (best-effort, time-bounded)
//!                                                     EventPublisher
//! ```
//!
//! # Key Types
//!
//! - `SignatureValidator` - verifies `v0=` signatures against the signing secret
//! - `CoffeeCommandHandler` - orchestrates one webhook invocation
//! - `SlashCommandEvent` - the event handed to the broker

pub mod blocks;
pub mod commands;
pub mod events;
pub mod handler;
pub mod signature;
