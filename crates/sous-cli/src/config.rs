//! Configuration file management for sous.
//!
//! Provides a TOML-based config file at `~/.config/sous/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use sous_db::config::DbConfig;

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub database: DatabaseSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSection {
    pub url: String,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the sous config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/sous` or `~/.config/sous`.
/// We intentionally ignore the platform-specific `dirs::config_dir()`
/// (which returns `~/Library/Application Support` on macOS).
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("sous");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("sous")
}

/// Return the path to the sous config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Write a fresh config file for `sous init`.
pub fn init_config(db_url: &str, force: bool) -> Result<PathBuf> {
    let path = config_path();
    if path.exists() && !force {
        bail!(
            "config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    let config = ConfigFile {
        database: DatabaseSection {
            url: db_url.to_owned(),
        },
    };
    save_config(&config)?;
    Ok(path)
}

// -----------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------

/// Resolve the database config: CLI flag > `SOUS_DATABASE_URL` env var >
/// config file > compile-time default.
pub fn resolve_db_config(flag: Option<&str>) -> DbConfig {
    if let Some(url) = flag {
        return DbConfig::new(url);
    }
    if let Ok(url) = std::env::var("SOUS_DATABASE_URL") {
        return DbConfig::new(url);
    }
    if let Ok(config) = load_config() {
        return DbConfig::new(config.database.url);
    }
    DbConfig::new(DbConfig::DEFAULT_URL)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Point XDG_CONFIG_HOME at a temp dir for the duration of a test.
    struct ConfigHome {
        _dir: tempfile::TempDir,
    }

    impl ConfigHome {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            // SAFETY: test-only; env var manipulation is safe in
            // single-threaded tests.
            unsafe { std::env::set_var("XDG_CONFIG_HOME", dir.path()) };
            Self { _dir: dir }
        }
    }

    impl Drop for ConfigHome {
        fn drop(&mut self) {
            unsafe { std::env::remove_var("XDG_CONFIG_HOME") };
        }
    }

    #[test]
    fn init_writes_and_loads_roundtrip() {
        let _home = ConfigHome::new();

        let path = init_config("postgresql://localhost:5432/sous_test", false).expect("init");
        assert!(path.exists());

        let loaded = load_config().expect("load");
        assert_eq!(loaded.database.url, "postgresql://localhost:5432/sous_test");
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let _home = ConfigHome::new();

        init_config("postgresql://localhost:5432/first", false).expect("first init");
        let err = init_config("postgresql://localhost:5432/second", false).unwrap_err();
        assert!(err.to_string().contains("--force"));

        init_config("postgresql://localhost:5432/second", true).expect("forced init");
        let loaded = load_config().expect("load");
        assert_eq!(loaded.database.url, "postgresql://localhost:5432/second");
    }

    #[test]
    fn flag_beats_config_file() {
        let _home = ConfigHome::new();
        init_config("postgresql://localhost:5432/from_file", false).expect("init");

        let resolved = resolve_db_config(Some("postgresql://localhost:5432/from_flag"));
        assert_eq!(resolved.database_url, "postgresql://localhost:5432/from_flag");
    }
}
