use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Deserialize;

/// Root configuration structure, deserialized from `.spdx-notice/config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where license texts are looked up.
    pub registry: RegistryConfig,
    /// Where generated artifacts are written.
    pub output: OutputConfig,
}

/// Endpoints and HTTP settings for the SPDX license list.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Catalog of every listed license and the URL of its detail record.
    pub license_list_url: String,
    /// Catalog of license exceptions (`WITH` operands).
    pub exception_list_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            license_list_url: "https://spdx.org/licenses/licenses.json".to_string(),
            exception_list_url: "https://spdx.org/licenses/exceptions.json".to_string(),
            timeout_secs: 30,
            user_agent: concat!("spdx-notice/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            directory: PathBuf::from("output"),
        }
    }
}

/// Load configuration, searching in order:
///
/// 1. `config_override`, the path passed via `--config`
/// 2. `<base_path>/.spdx-notice/config.toml`
/// 3. `~/.config/spdx-notice/config.toml`
/// 4. Built-in [`Config::default`]
pub fn load_config(base_path: &Path, config_override: Option<&Path>) -> Result<Config> {
    if let Some(path) = config_override {
        let content = std::fs::read_to_string(path)?;
        return Ok(toml::from_str(&content)?);
    }

    let local_config = base_path.join(".spdx-notice").join("config.toml");
    if local_config.exists() {
        let content = std::fs::read_to_string(&local_config)?;
        return Ok(toml::from_str(&content)?);
    }

    if let Some(home) = dirs::home_dir() {
        let home_config = home.join(".config").join("spdx-notice").join("config.toml");
        if home_config.exists() {
            let content = std::fs::read_to_string(&home_config)?;
            return Ok(toml::from_str(&content)?);
        }
    }

    Ok(Config::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(
            cfg.registry.license_list_url,
            "https://spdx.org/licenses/licenses.json"
        );
        assert_eq!(cfg.registry.timeout_secs, 30);
        assert_eq!(cfg.output.directory, PathBuf::from("output"));
    }

    #[test]
    fn test_partial_override() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "[registry]").unwrap();
        writeln!(f, "license_list_url = \"http://mirror.local/licenses.json\"").unwrap();
        writeln!(f, "timeout_secs = 5").unwrap();

        let cfg = load_config(Path::new("."), Some(f.path())).unwrap();
        assert_eq!(cfg.registry.license_list_url, "http://mirror.local/licenses.json");
        assert_eq!(cfg.registry.timeout_secs, 5);
        // untouched keys keep their defaults
        assert_eq!(
            cfg.registry.exception_list_url,
            "https://spdx.org/licenses/exceptions.json"
        );
        assert_eq!(cfg.output.directory, PathBuf::from("output"));
    }

    #[test]
    fn test_local_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".spdx-notice")).unwrap();
        std::fs::write(
            dir.path().join(".spdx-notice").join("config.toml"),
            "[output]\ndirectory = \"notices\"\n",
        )
        .unwrap();

        let cfg = load_config(dir.path(), None).unwrap();
        assert_eq!(cfg.output.directory, PathBuf::from("notices"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let mut f = NamedTempFile::new().unwrap();
        writeln!(f, "[registry").unwrap();
        assert!(load_config(Path::new("."), Some(f.path())).is_err());
    }
}
