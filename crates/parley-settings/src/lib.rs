//! # parley-settings
//!
//! Configuration for the parley server, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ParleySettings::default()`]
//! 2. **User file**: `~/.parley/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `PARLEY_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, parley_home, settings_path};
pub use types::{ChatSettings, LoggingSettings, ParleySettings, ServerSettings, StorageSettings};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = ParleySettings::default();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9300);
        assert_eq!(settings.server.session_header, "session_token");
        assert_eq!(settings.server.outbound_queue_capacity, 256);
        assert_eq!(settings.storage.session_ttl_hours, 24);
        assert_eq!(settings.chat.max_message_chars, 4000);
        assert_eq!(settings.logging.level, "info");
        assert!(!settings.logging.json);
    }

    #[test]
    fn settings_path_is_under_parley_home() {
        assert!(settings_path().starts_with(parley_home()));
        assert!(settings_path().ends_with("settings.json"));
    }
}
