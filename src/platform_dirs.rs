/// Cross-platform directory management for tabwarden
///
/// Uses the `dirs` crate to handle platform-specific data directories
/// following OS conventions:
/// - Linux/Unix: XDG Base Directory Specification
/// - macOS: Apple directory guidelines
/// - Windows: Windows directory standards
use anyhow::{anyhow, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the data directory for tabwarden
///
/// Returns platform-specific data directory:
/// - Linux: `$XDG_DATA_HOME/tabwarden` or `~/.local/share/tabwarden`
/// - macOS: `~/Library/Application Support/tabwarden`
/// - Windows: `%LOCALAPPDATA%\tabwarden`
pub fn data_dir() -> Result<PathBuf> {
    let base_dir =
        dirs::data_local_dir().ok_or_else(|| anyhow!("Unable to determine data directory"))?;
    Ok(base_dir.join("tabwarden"))
}

/// Get the config directory for tabwarden
///
/// Returns platform-specific config directory:
/// - Linux: `$XDG_CONFIG_HOME/tabwarden` or `~/.config/tabwarden`
/// - macOS: `~/Library/Preferences/tabwarden`
/// - Windows: Same as data directory
pub fn config_dir() -> Result<PathBuf> {
    let base_dir =
        dirs::config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
    Ok(base_dir.join("tabwarden"))
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the path of the persisted policy document
pub fn policy_path() -> Result<PathBuf> {
    let data = data_dir()?;
    Ok(data.join("policy.json"))
}

/// Get the path of the engine configuration file
pub fn config_path() -> Result<PathBuf> {
    let config = config_dir()?;
    Ok(config.join("tabwarden.toml"))
}

/// Get the directory for rotated log files
pub fn log_dir() -> Result<PathBuf> {
    let data = data_dir()?;
    Ok(data.join("logs"))
}

/// Initialize all required directories
pub fn init_directories() -> Result<()> {
    ensure_dir(&data_dir()?)?;
    ensure_dir(&config_dir()?)?;
    ensure_dir(&log_dir()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_dir() {
        let dir = data_dir().unwrap();
        assert!(dir.to_string_lossy().contains("tabwarden"));
    }

    #[test]
    fn test_paths() {
        let policy = policy_path().unwrap();
        let config = config_path().unwrap();
        let logs = log_dir().unwrap();

        assert!(policy.file_name().unwrap() == "policy.json");
        assert!(config.file_name().unwrap() == "tabwarden.toml");
        assert!(logs.ends_with("logs"));
    }
}
