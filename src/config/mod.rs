//! Configuration and settings management.
//!
//! Settings are read from the environment at startup, or from a JSON file in
//! the user's config directory.

mod settings;

pub use settings::{
    AiProviderKind, AiSettings, ConfigError, DatabaseSettings, GoogleSettings, RealtimeSettings,
    Result, ServerSettings, Settings, SyncSettings, UnsubscribeSettings,
};
