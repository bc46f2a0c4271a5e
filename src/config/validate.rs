//! Configuration validation.
//!
//! Validates configuration values and provides helpful error messages.

use crate::common::error::ConfigError;
use crate::config::types::Config;

/// Validate a configuration and return detailed errors.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let mut errors = Vec::new();

    // Skype credentials: a token replaces the password login
    if config.skype.username.is_empty() {
        errors.push("skype.username is required".to_string());
    }
    if config.skype.password.is_empty() && config.skype.token().is_none() {
        errors.push("skype.password is required unless skype.token is set".to_string());
    }

    // Matrix config
    let matrix = &config.matrix;
    if !matrix.homeserver_url.starts_with("http://") && !matrix.homeserver_url.starts_with("https://")
    {
        errors.push(format!(
            "matrix.homeserver_url must be an http(s) URL (got '{}')",
            matrix.homeserver_url
        ));
    }
    if matrix.server_name.is_empty() {
        errors.push("matrix.server_name is required".to_string());
    }
    if !is_user_id(&matrix.puppet.user_id) {
        errors.push(format!(
            "matrix.puppet.user_id must look like @user:server (got '{}')",
            matrix.puppet.user_id
        ));
    }
    if matrix.puppet.access_token.is_empty() {
        errors.push("matrix.puppet.access_token is required".to_string());
    }
    if matrix.appservice.token.is_empty() {
        errors.push("matrix.appservice.token is required".to_string());
    }
    if matrix.appservice.token == "YOUR_AS_TOKEN_HERE" {
        errors.push("matrix.appservice.token has not been configured (still using placeholder)".to_string());
    }
    if matrix.appservice.localpart.is_empty() {
        errors.push("matrix.appservice.localpart must not be empty".to_string());
    }
    if let Some(ref room) = matrix.status_room {
        if !room.starts_with('!') && !room.starts_with('#') {
            errors.push(format!(
                "matrix.status_room must be a room id or alias (got '{}')",
                room
            ));
        }
    }

    if !config.avatar_url_template().contains("%user") {
        errors.push("relay.avatar_url_template must contain %user".to_string());
    }
    if config.sync_timeout_ms() == 0 {
        errors.push("relay.sync_timeout_ms must be non-zero".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError {
            message: errors.join("\n"),
        })
    }
}

fn is_user_id(id: &str) -> bool {
    id.strip_prefix('@')
        .and_then(|rest| rest.split_once(':'))
        .is_some_and(|(local, server)| !local.is_empty() && !server.is_empty())
}
