use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Medtrail";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default `tracing` filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

/// Get the application data directory
/// ~/Medtrail/ on all platforms (user-visible, per design requirement)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Medtrail")
}

/// Get the profiles directory
pub fn profiles_dir() -> PathBuf {
    app_data_dir().join("profiles")
}

/// Database file for one (user, profile) pair.
pub fn database_path(user_id: &str, profile_id: &str) -> PathBuf {
    profiles_dir()
        .join(user_id)
        .join(profile_id)
        .join("medtrail.db")
}
