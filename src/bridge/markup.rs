//! Conversion between Skype rich text and plain Matrix text.
//!
//! Skype message content is an HTML-like dialect (`<b>`, `<ss>`, `<at>`,
//! `<e_m/>`, entities). Matrix receives plain text with light markdown.

use fancy_regex::{Captures, Regex};

/// Trailing marker on text sent by this bridge.
///
/// Self-sent text that ends with it is our own relay coming back and is
/// dropped; self-sent text without it came from another Skype client.
pub const ECHO_MARKER: char = '\u{feff}';

/// Converts message bodies between the two dialects.
#[derive(Debug, Clone)]
pub struct MarkupConverter {
    /// Edit markers (`<e_m .../>`).
    edit_pattern: Regex,
    /// Original-message block inside quotes.
    legacy_quote_pattern: Regex,
    /// Quotes with an author.
    quote_pattern: Regex,
    /// Emoticons (`<ss type="smile">:)</ss>`).
    emoticon_pattern: Regex,
    /// Mentions (`<at id="8:bob">Bob</at>`).
    mention_pattern: Regex,
    /// Hyperlinks.
    link_pattern: Regex,
    /// Inline styles: (pattern, markdown delimiter).
    style_patterns: Vec<(Regex, &'static str)>,
    /// Any tag left over.
    tag_pattern: Regex,
    /// Numeric character references.
    numeric_entity_pattern: Regex,
}

impl Default for MarkupConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkupConverter {
    pub fn new() -> Self {
        Self {
            edit_pattern: Regex::new(r"<e_m\b[^>]*>(?:</e_m>)?").unwrap(),
            legacy_quote_pattern: Regex::new(r"(?s)<legacyquote>.*?</legacyquote>").unwrap(),
            quote_pattern: Regex::new(r#"(?s)<quote\b[^>]*?authorname="([^"]*)"[^>]*>(.*?)</quote>"#)
                .unwrap(),
            emoticon_pattern: Regex::new(r"(?s)<ss\b[^>]*>(.*?)</ss>").unwrap(),
            mention_pattern: Regex::new(r"(?s)<at\b[^>]*>(.*?)</at>").unwrap(),
            link_pattern: Regex::new(r#"(?s)<a\b[^>]*?href="([^"]*)"[^>]*>(.*?)</a>"#).unwrap(),
            style_patterns: vec![
                (Regex::new(r"(?s)<b\b[^>]*>(.*?)</b>").unwrap(), "*"),
                (Regex::new(r"(?s)<i\b[^>]*>(.*?)</i>").unwrap(), "_"),
                (Regex::new(r"(?s)<s\b[^>]*>(.*?)</s>").unwrap(), "~"),
                (Regex::new(r"(?s)<pre\b[^>]*>(.*?)</pre>").unwrap(), "```"),
            ],
            tag_pattern: Regex::new(r"</?[A-Za-z][A-Za-z0-9_]*\b[^>]*>").unwrap(),
            numeric_entity_pattern: Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").unwrap(),
        }
    }

    /// Convert Matrix text into Skype rich text, tagged as sent by the bridge.
    pub fn to_third_party_markup(&self, text: &str) -> String {
        let mut content = escape_html(text);
        content.push(ECHO_MARKER);
        content
    }

    /// Convert Skype rich text into plain text.
    pub fn from_third_party_markup(&self, content: &str) -> String {
        let mut text = self.edit_pattern.replace_all(content, "").to_string();
        text = self.legacy_quote_pattern.replace_all(&text, "").to_string();
        text = self
            .quote_pattern
            .replace_all(&text, |caps: &Captures| -> String {
                format!("> {}: {}\n", &caps[1], caps[2].trim())
            })
            .to_string();
        text = self.emoticon_pattern.replace_all(&text, "$1").to_string();
        text = self.mention_pattern.replace_all(&text, "@$1").to_string();
        text = self
            .link_pattern
            .replace_all(&text, |caps: &Captures| -> String {
                let href = &caps[1];
                let label = &caps[2];
                if label.is_empty() || label == href {
                    href.to_string()
                } else {
                    format!("{} ({})", label, href)
                }
            })
            .to_string();
        for (pattern, delimiter) in &self.style_patterns {
            text = pattern
                .replace_all(&text, |caps: &Captures| -> String {
                    format!("{}{}{}", delimiter, &caps[1], delimiter)
                })
                .to_string();
        }
        text = self.tag_pattern.replace_all(&text, "").to_string();

        let text = self
            .numeric_entity_pattern
            .replace_all(&text, |caps: &Captures| -> String {
                let code = &caps[1];
                let value = match code.strip_prefix('x') {
                    Some(hex) => u32::from_str_radix(hex, 16).ok(),
                    None => code.parse().ok(),
                };
                value
                    .and_then(char::from_u32)
                    .map(String::from)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .to_string();

        decode_named_entities(&text)
    }
}

/// Escape text for embedding in Skype markup or HTML attributes.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Decode the named entities Skype emits. `&amp;` goes last.
pub fn decode_named_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        let converter = MarkupConverter::new();
        assert_eq!(converter.from_third_party_markup("hi"), "hi");
    }

    #[test]
    fn test_styles_become_markdown() {
        let converter = MarkupConverter::new();
        assert_eq!(
            converter.from_third_party_markup("<b raw_pre=\"*\">bold</b> and <i>it</i> <s>gone</s>"),
            "*bold* and _it_ ~gone~"
        );
    }

    #[test]
    fn test_entities_decoded() {
        let converter = MarkupConverter::new();
        assert_eq!(
            converter.from_third_party_markup("a &lt;b&gt; &amp;lt; &#39;q&#x27;"),
            "a <b> &lt; 'q'"
        );
    }

    #[test]
    fn test_emoticons_mentions_and_edits() {
        let converter = MarkupConverter::new();
        assert_eq!(
            converter.from_third_party_markup(
                "<at id=\"8:bob\">Bob</at> <ss type=\"smile\">:)</ss><e_m a=\"alice\" ts_ms=\"1\" t=\"61\"></e_m>"
            ),
            "@Bob :)"
        );
    }

    #[test]
    fn test_links() {
        let converter = MarkupConverter::new();
        assert_eq!(
            converter.from_third_party_markup("<a href=\"https://x.io\">https://x.io</a>"),
            "https://x.io"
        );
        assert_eq!(
            converter.from_third_party_markup("<a href=\"https://x.io\">site</a>"),
            "site (https://x.io)"
        );
    }

    #[test]
    fn test_quote() {
        let converter = MarkupConverter::new();
        let content = "<quote authorname=\"Bob\" author=\"8:bob\"><legacyquote>[1:00] Bob: </legacyquote>old<legacyquote>\n\n&lt;&lt;&lt; </legacyquote></quote>new";
        assert_eq!(converter.from_third_party_markup(content), "> Bob: old\nnew");
    }

    #[test]
    fn test_to_markup_escapes_and_tags() {
        let converter = MarkupConverter::new();
        let content = converter.to_third_party_markup("1 < 2 & \"x\"");
        assert_eq!(content, "1 &lt; 2 &amp; &quot;x&quot;\u{feff}");
        assert!(content.ends_with(ECHO_MARKER));
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href='x'>&</a>"),
            "&lt;a href=&apos;x&apos;&gt;&amp;&lt;/a&gt;"
        );
    }
}
