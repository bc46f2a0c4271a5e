//! Skype account login.
//!
//! Flow:
//! 1. Exchange username and password for a Microsoft account ticket (SOAP)
//! 2. Exchange the ticket for a skype token
//!
//! A pre-issued skype token from the config skips both steps.

use fancy_regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::common::error::{SkypeError, SkypeResult};

const LOGIN_URL: &str = "https://login.live.com/RST.srf";
const SKYPE_TOKEN_URL: &str = "https://edge.skype.com/rps/v1/rps/skypetoken";
const CLIENT_VERSION: &str = "0/7.4.85.102/259/";

#[derive(Debug, Deserialize)]
struct SkypeTokenResponse {
    skypetoken: String,
    #[serde(rename = "expiresIn")]
    expires_in: Option<u64>,
}

/// Log in with account credentials and return a skype token.
pub async fn login(http: &reqwest::Client, username: &str, password: &str) -> SkypeResult<String> {
    info!("Logging in to Skype as {}...", username);

    let response = http
        .post(LOGIN_URL)
        .header("Content-Type", "text/xml; charset=UTF-8")
        .body(security_token_request(username, password))
        .send()
        .await?;
    let body = response.text().await?;
    let ticket = parse_security_token(&body)?;
    debug!("Obtained account ticket");

    let response = http
        .post(SKYPE_TOKEN_URL)
        .form(&[
            ("scopes", "client"),
            ("clientVersion", CLIENT_VERSION),
            ("access_token", ticket.as_str()),
        ])
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(SkypeError::Login {
            reason: format!("skype token exchange returned HTTP {}", response.status().as_u16()),
        });
    }

    let token: SkypeTokenResponse = response.json().await?;
    info!(
        expires_in = token.expires_in.unwrap_or_default(),
        "Skype login successful"
    );
    Ok(token.skypetoken)
}

fn security_token_request(username: &str, password: &str) -> String {
    format!(
        concat!(
            r#"<Envelope xmlns="http://schemas.xmlsoap.org/soap/envelope/" "#,
            r#"xmlns:wsse="http://schemas.xmlsoap.org/ws/2003/06/secext" "#,
            r#"xmlns:wsp="http://schemas.xmlsoap.org/ws/2002/12/policy" "#,
            r#"xmlns:wsa="http://schemas.xmlsoap.org/ws/2004/03/addressing" "#,
            r#"xmlns:wst="http://schemas.xmlsoap.org/ws/2004/04/trust" "#,
            r#"xmlns:ps="http://schemas.microsoft.com/Passport/SoapServices/PPCRL">"#,
            "<Header><wsse:Security><wsse:UsernameToken Id=\"user\">",
            "<wsse:Username>{}</wsse:Username><wsse:Password>{}</wsse:Password>",
            "</wsse:UsernameToken></wsse:Security></Header>",
            "<Body><ps:RequestMultipleSecurityTokens Id=\"RSTS\">",
            "<wst:RequestSecurityToken Id=\"RST0\">",
            "<wst:RequestType>http://schemas.xmlsoap.org/ws/2004/04/security/trust/Issue</wst:RequestType>",
            "<wsp:AppliesTo><wsa:EndpointReference><wsa:Address>wl.skype.com</wsa:Address>",
            "</wsa:EndpointReference></wsp:AppliesTo>",
            "<wsse:PolicyReference URI=\"MBI_SSL\"></wsse:PolicyReference>",
            "</wst:RequestSecurityToken></ps:RequestMultipleSecurityTokens></Body></Envelope>"
        ),
        xml_escape(username),
        xml_escape(password)
    )
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Extract the ticket from a SOAP response, or the fault text as an error.
fn parse_security_token(body: &str) -> SkypeResult<String> {
    let token_re = Regex::new(
        r"<wsse:BinarySecurityToken[^>]*>([^<]+)</wsse:BinarySecurityToken>",
    )
    .map_err(|e| SkypeError::Login {
        reason: e.to_string(),
    })?;
    if let Ok(Some(caps)) = token_re.captures(body) {
        if let Some(token) = caps.get(1) {
            return Ok(token.as_str().replace("&amp;", "&"));
        }
    }

    let fault = Regex::new(r"<psf:text>([^<]*)</psf:text>")
        .ok()
        .and_then(|re| re.captures(body).ok().flatten())
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| "no security token in response".to_string());

    Err(SkypeError::Login { reason: fault })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_escapes_credentials() {
        let body = security_token_request("me@example.com", "p<&>ss");
        assert!(body.contains("<wsse:Username>me@example.com</wsse:Username>"));
        assert!(body.contains("<wsse:Password>p&lt;&amp;&gt;ss</wsse:Password>"));
        assert!(body.contains("wl.skype.com"));
    }

    #[test]
    fn test_parse_token() {
        let body = r#"<S:Envelope><wst:RequestedSecurityToken><wsse:BinarySecurityToken Id="Compact0">t=EwCAAq+abc&amp;p=</wsse:BinarySecurityToken></wst:RequestedSecurityToken></S:Envelope>"#;
        assert_eq!(parse_security_token(body).unwrap(), "t=EwCAAq+abc&p=");
    }

    #[test]
    fn test_parse_fault() {
        let body = "<S:Fault><psf:error><psf:text>The entered and stored passwords do not match.</psf:text></psf:error></S:Fault>";
        match parse_security_token(body) {
            Err(SkypeError::Login { reason }) => {
                assert_eq!(reason, "The entered and stored passwords do not match.")
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_parse_garbage() {
        assert!(matches!(
            parse_security_token("<html/>"),
            Err(SkypeError::Login { .. })
        ));
    }
}
