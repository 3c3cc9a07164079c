//! Configuration loading and validation

use anyhow::{bail, Context, Result};
use mtsniff_discovery::SnifferConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discovery: SnifferConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    /// How discovered devices are printed
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `name  address:port  mac`
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Load configuration from file, falling back to defaults if it is missing
pub fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config.discovery.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

/// Save default configuration to file
pub fn save_default_config(path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(&Config::default())?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Parse a port list such as `5000-5019` or `5000,5001,7878`
///
/// Ranges and single ports can be mixed: `5000-5003,7878`.
pub fn parse_port_list(list: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();

    for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match item.split_once('-') {
            Some((start, end)) => {
                let start = parse_port(start)?;
                let end = parse_port(end)?;
                if start > end {
                    bail!("Port range {}-{} is reversed", start, end);
                }
                ports.extend(start..=end);
            }
            None => ports.push(parse_port(item)?),
        }
    }

    if ports.is_empty() {
        bail!("No ports given");
    }
    Ok(ports)
}

fn parse_port(s: &str) -> Result<u16> {
    let s = s.trim();
    let port: u16 = s.parse().with_context(|| format!("Invalid port '{}'", s))?;
    if port == 0 {
        bail!("Port 0 is not scannable");
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = load_config(&dir.path().join("mtsniff.toml")).unwrap();
        assert_eq!(config.discovery, SnifferConfig::default());
        assert_eq!(config.output.format, OutputFormat::Text);
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mtsniff.toml");
        std::fs::write(
            &path,
            r#"
[discovery]
timeout_ms = 250
ports = [7878]

[output]
format = "json"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.discovery.timeout_ms, 250);
        assert_eq!(config.discovery.ports, vec![7878]);
        assert_eq!(config.discovery.prefix_len, 24);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mtsniff.toml");

        std::fs::write(&path, "[discovery]\nports = []\n").unwrap();
        assert!(load_config(&path).is_err());

        std::fs::write(&path, "[discovery\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mtsniff.toml");

        save_default_config(&path).unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.discovery, SnifferConfig::default());
    }

    #[test]
    fn test_parse_port_list() {
        assert_eq!(parse_port_list("5000").unwrap(), vec![5000]);
        assert_eq!(parse_port_list("5000-5003").unwrap(), vec![5000, 5001, 5002, 5003]);
        assert_eq!(parse_port_list("5000,5001,7878").unwrap(), vec![5000, 5001, 7878]);
        assert_eq!(parse_port_list("5000-5001, 7878").unwrap(), vec![5000, 5001, 7878]);
        assert_eq!(parse_port_list("5000-5019").unwrap().len(), 20);
    }

    #[test]
    fn test_parse_port_list_errors() {
        assert!(parse_port_list("").is_err());
        assert!(parse_port_list("5010-5000").is_err());
        assert!(parse_port_list("http").is_err());
        assert!(parse_port_list("70000").is_err());
        assert!(parse_port_list("0").is_err());
    }
}
