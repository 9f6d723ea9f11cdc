pub mod config;
pub mod logging;

pub const APP_NAME: &str = "tally";

pub use config::{BotConfig, ConfigError, DeliveryMode};
