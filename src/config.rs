use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "PlanScout";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default OpenAI-compatible vision endpoint.
pub const DEFAULT_VISION_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_VISION_MODEL: &str = "gpt-4o";
pub const DEFAULT_VISION_TIMEOUT_SECS: u64 = 300;

/// Get the application data directory (`~/PlanScout/` on all platforms,
/// user-visible by design).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("PlanScout")
}

/// Root of the per-job artifact store.
pub fn storage_dir() -> PathBuf {
    app_data_dir().join("storage")
}

pub fn database_path() -> PathBuf {
    app_data_dir().join("planscout.db")
}

/// Default tracing filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    "info,planscout=debug".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_under_home() {
        let dir = app_data_dir();
        let home = dirs::home_dir().unwrap();
        assert!(dir.starts_with(home));
        assert!(dir.ends_with("PlanScout"));
    }

    #[test]
    fn storage_dir_under_app_data() {
        let storage = storage_dir();
        assert!(storage.starts_with(app_data_dir()));
        assert!(storage.ends_with("storage"));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
