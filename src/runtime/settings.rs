use crate::config::{self, Settings};

/// Settings from the environment and config file. A missing, unreadable or
/// invalid config never stops startup; defaults are used instead.
pub fn load_settings() -> Settings {
    if let Some(path) = config::resolve_config_path() {
        log::debug!("reading settings from {}", path.display());
    }
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            log::warn!("failed to load config, using defaults: {e}");
            return Settings::default();
        }
    };
    match settings.validate() {
        Ok(()) => settings,
        Err(msg) => {
            log::warn!("invalid config, using defaults: {msg}");
            Settings::default()
        }
    }
}
