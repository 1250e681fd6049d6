/// Canonical file locations.
///
/// The optional config file lives in the platform config directory:
///   - Linux   $XDG_CONFIG_HOME/sentinel/config.toml (usually ~/.config)
///   - macOS   ~/Library/Application Support/sentinel/config.toml
///   - Windows %APPDATA%\sentinel\config.toml
use std::path::PathBuf;

const APP_DIR_NAME: &str = "sentinel";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Returns the sentinel configuration directory, if the platform has one.
pub fn app_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}

/// Returns the default config file path.
pub fn config_file_path() -> Option<PathBuf> {
    app_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_config_dir_ends_with_sentinel() {
        if let Some(dir) = app_config_dir() {
            assert_eq!(dir.file_name().unwrap(), APP_DIR_NAME);
        }
    }

    #[test]
    fn config_file_path_has_correct_name() {
        if let Some(path) = config_file_path() {
            assert_eq!(path.file_name().unwrap(), CONFIG_FILE_NAME);
            assert_eq!(path.parent(), app_config_dir().as_deref());
        }
    }
}
