use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Variables use a double underscore between sections:
/// `TRAWL_SEARCH__TIMEOUT_SECS=20`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("TRAWL_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[server]
port = 9000

[search]
timeout_secs = 12
max_results = 25
sort_by_resolution = true

[filter]
min_size_mb = 100
exclude_keywords = ["cam"]

[sources.private]
enabled = true
username = "me"
password = "pw"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.search.timeout_secs, 12);
        assert_eq!(config.search.max_results, 25);
        assert!(config.search.sort_by_resolution);
        assert_eq!(config.search.poll_interval_ms, 250);
        assert_eq!(config.filter.min_size_mb, 100);
        assert_eq!(config.sources["private"].enabled, Some(true));
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_load_config_from_str_invalid() {
        let result = load_config_from_str("[search]\ntimeout_secs = \"soon\"\n");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[server]
host = "127.0.0.1"
port = 3000

[catalog]
path = "/etc/trawl/sources.toml"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.host.to_string(), "127.0.0.1");
        assert_eq!(
            config.catalog.path.to_string_lossy(),
            "/etc/trawl/sources.toml"
        );
    }
}
