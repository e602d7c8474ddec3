pub mod connection;
pub mod migrations;

pub use connection::{close, connect, connect_with_config, connect_with_settings, ping, DbPool};
