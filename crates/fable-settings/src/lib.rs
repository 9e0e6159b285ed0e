//! # fable-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`AppSettings::default()`]
//! 2. **User file**: `~/.fable/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `FABLE_*` and `<PROVIDER>_API_KEY` overrides
//!
//! The orchestration core only ever reads settings; nothing here writes back.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = AppSettings::default();
        assert!(settings_path().ends_with("settings.json"));
    }
}
