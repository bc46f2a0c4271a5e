//! Configuration file parsing (HOCON format).

use std::path::Path;

use crate::common::error::ConfigError;
use crate::config::types::Config;
use hocon::HoconLoader;

/// Load configuration from a HOCON file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    let loader = HoconLoader::new()
        .load_file(path)
        .map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
        })?;
    resolve(loader)
}

/// Load configuration from a HOCON string.
pub fn load_config_str(content: &str) -> Result<Config, ConfigError> {
    let loader = HoconLoader::new()
        .load_str(content)
        .map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
    resolve(loader)
}

/// Deserialize loaded HOCON into a [`Config`].
///
/// Missing or mistyped fields are parse errors for file and string sources
/// alike; `ValidationError` is reserved for values that parsed but are unusable.
fn resolve(loader: HoconLoader) -> Result<Config, ConfigError> {
    loader.resolve().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::validate::validate_config;

    const SAMPLE: &str = r#"
        skype {
            username = "alice"
            password = "hunter2"
        }
        matrix {
            homeserver_url = "https://matrix.example.org"
            server_name = "example.org"
            puppet {
                user_id = "@alice:example.org"
                access_token = "puppet_token"
            }
            appservice {
                token = "as_token"
            }
        }
    "#;

    #[test]
    fn test_load_minimal_config() {
        let config = load_config_str(SAMPLE).unwrap();
        assert_eq!(config.skype.username, "alice");
        assert!(config.skype.token.is_none());
        assert_eq!(config.matrix.puppet.user_id, "@alice:example.org");
        assert!(config.matrix.status_room.is_none());
        assert!(config.relay.is_none());
    }

    #[test]
    fn test_appservice_defaults() {
        let config = load_config_str(SAMPLE).unwrap();
        assert_eq!(config.matrix.appservice.localpart, "skypebot");
        assert_eq!(config.matrix.appservice.prefix, "skype_");
    }

    #[test]
    fn test_relay_overrides() {
        let content = format!(
            "{}\nrelay {{\n avatar_url_template = \"https://a.example/%user\"\n sync_timeout_ms = 5000\n}}",
            SAMPLE
        );
        let config = load_config_str(&content).unwrap();
        assert_eq!(config.avatar_url_template(), "https://a.example/%user");
        assert_eq!(config.sync_timeout_ms(), 5000);
    }

    #[test]
    fn test_missing_section_fails() {
        let result = load_config_str("skype { username = \"a\", password = \"b\" }");
        assert!(matches!(result, Err(ConfigError::ParseError { .. })));
    }

    #[test]
    fn test_token_only_config() {
        let content = SAMPLE.replace("password = \"hunter2\"", "token = \"skypetoken\"");

        let config = load_config_str(&content).unwrap();

        assert!(config.skype.password.is_empty());
        assert_eq!(config.skype.token(), Some("skypetoken"));
        tokio_test::assert_ok!(validate_config(&config));
    }

    #[test]
    fn test_empty_token_falls_back_to_password() {
        let content = SAMPLE.replace(
            "password = \"hunter2\"",
            "password = \"hunter2\"\n            token = \"\"",
        );

        let config = load_config_str(&content).unwrap();

        assert_eq!(config.skype.token(), None);
        tokio_test::assert_ok!(validate_config(&config));
    }
}
