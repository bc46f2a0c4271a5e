//! Environment variable overrides for configuration.
//!
//! Supports overriding config values with environment variables:
//! - `SKYPE_PUPPET_SKYPE_USERNAME` - Skype account username
//! - `SKYPE_PUPPET_SKYPE_PASSWORD` - Skype account password
//! - `SKYPE_PUPPET_SKYPE_TOKEN` - Pre-issued skype token
//! - `SKYPE_PUPPET_MATRIX_ACCESS_TOKEN` - Puppet user's access token
//! - `SKYPE_PUPPET_MATRIX_AS_TOKEN` - Application service token

use std::env;

use crate::config::types::Config;

/// Environment variable prefix for all config overrides.
const ENV_PREFIX: &str = "SKYPE_PUPPET";

/// Apply environment variable overrides to a config.
///
/// This allows credentials to be provided via environment variables
/// instead of the config file.
pub fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(username) = env::var(format!("{}_SKYPE_USERNAME", ENV_PREFIX)) {
        config.skype.username = username;
    }
    if let Ok(password) = env::var(format!("{}_SKYPE_PASSWORD", ENV_PREFIX)) {
        config.skype.password = password;
    }
    if let Ok(token) = env::var(format!("{}_SKYPE_TOKEN", ENV_PREFIX)) {
        if !token.is_empty() {
            config.skype.token = Some(token);
        }
    }

    if let Ok(token) = env::var(format!("{}_MATRIX_ACCESS_TOKEN", ENV_PREFIX)) {
        config.matrix.puppet.access_token = token;
    }
    if let Ok(token) = env::var(format!("{}_MATRIX_AS_TOKEN", ENV_PREFIX)) {
        config.matrix.appservice.token = token;
    }

    config
}

/// Returns override variables that are set but empty.
pub fn check_empty_env_vars() -> Vec<String> {
    let vars = [
        format!("{}_SKYPE_USERNAME", ENV_PREFIX),
        format!("{}_SKYPE_PASSWORD", ENV_PREFIX),
        format!("{}_MATRIX_ACCESS_TOKEN", ENV_PREFIX),
        format!("{}_MATRIX_AS_TOKEN", ENV_PREFIX),
    ];

    vars.into_iter()
        .filter(|var| env::var(var).map(|v| v.is_empty()).unwrap_or(false))
        .collect()
}

/// Get the config file path from environment or use default.
///
/// Checks `SKYPE_PUPPET_CONFIG`, otherwise returns "skype-puppet.conf".
pub fn get_config_path() -> String {
    env::var(format!("{}_CONFIG", ENV_PREFIX)).unwrap_or_else(|_| "skype-puppet.conf".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::*;

    fn make_test_config() -> Config {
        Config {
            skype: SkypeConfig {
                username: "alice".to_string(),
                password: "secret".to_string(),
                token: None,
            },
            matrix: MatrixConfig {
                homeserver_url: "https://matrix.example.org".to_string(),
                server_name: "example.org".to_string(),
                puppet: PuppetConfig {
                    user_id: "@alice:example.org".to_string(),
                    access_token: "original_token".to_string(),
                },
                appservice: AppServiceConfig {
                    token: "as_token".to_string(),
                    localpart: "skypebot".to_string(),
                    prefix: "skype_".to_string(),
                },
                status_room: None,
            },
            relay: None,
        }
    }

    #[test]
    fn test_env_prefix() {
        assert_eq!(ENV_PREFIX, "SKYPE_PUPPET");
    }

    #[test]
    fn test_get_config_path_default() {
        env::remove_var("SKYPE_PUPPET_CONFIG");
        assert_eq!(get_config_path(), "skype-puppet.conf");
    }

    #[test]
    fn test_apply_env_overrides_no_vars() {
        env::remove_var("SKYPE_PUPPET_SKYPE_USERNAME");
        env::remove_var("SKYPE_PUPPET_MATRIX_ACCESS_TOKEN");

        let result = apply_env_overrides(make_test_config());

        assert_eq!(result.skype.username, "alice");
        assert_eq!(result.matrix.puppet.access_token, "original_token");
    }

    #[test]
    fn test_apply_env_overrides_as_token() {
        env::set_var("SKYPE_PUPPET_MATRIX_AS_TOKEN", "from_env");

        let result = apply_env_overrides(make_test_config());
        env::remove_var("SKYPE_PUPPET_MATRIX_AS_TOKEN");

        assert_eq!(result.matrix.appservice.token, "from_env");
    }
}
