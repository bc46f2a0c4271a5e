//! Reversible encoding of Skype identifiers into bridge tokens.
//!
//! Conversation ids (`19:abc@thread.skype`) and user ids (`8:live:alice`)
//! contain characters the bridge framework does not accept in its ids, so
//! every raw identifier crosses the boundary as base64. Tokens are opaque:
//! they are only ever round-tripped, never interpreted.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::common::error::IdentityError;

/// Encode a raw Skype identifier into a token.
pub fn encode(raw: &str) -> String {
    STANDARD.encode(raw.as_bytes())
}

/// Decode a token produced by [`encode`].
pub fn decode(token: &str) -> Result<String, IdentityError> {
    let bytes = STANDARD.decode(token)?;
    Ok(String::from_utf8(bytes)?)
}

/// Room key shown on the framework's third-party room id surface.
///
/// One-way: never passed back into [`decode`].
pub fn display_key(token: &str) -> String {
    token.replace(':', "^")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for raw in [
            "19:convo@thread.skype",
            "8:live:alice",
            "8:bob.smith",
            "28:concierge",
            "",
            "caf\u{e9} \u{1f600}",
        ] {
            assert_eq!(decode(&encode(raw)).unwrap(), raw);
        }
    }

    #[test]
    fn test_token_charset() {
        let token = encode("19:convo@thread.skype");
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')));
    }

    #[test]
    fn test_display_key_substitutes_colons() {
        assert_eq!(display_key("a:b:c"), "a^b^c");
        let token = encode("8:live:alice");
        assert_eq!(display_key(&token), token);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode("not base64!"), Err(IdentityError::InvalidBase64(_))));
        // 0xff 0xfe is valid base64 but not UTF-8
        assert!(matches!(decode("//4="), Err(IdentityError::InvalidUtf8(_))));
    }
}
