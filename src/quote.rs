//! Turning a chat-completion reply into the proverb block's text.

use serde::Deserialize;
use serde_json::Value;

/// Bilingual quote as the model is asked to return it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Quote {
    #[serde(default)]
    pub english: String,
    #[serde(default)]
    pub chinese: String,
    #[serde(default)]
    pub source: String,
}

impl Quote {
    /// `english\nchinese`, plus `\n—— source` when a usable source survived.
    pub fn into_content(self) -> String {
        let source = clean_source(&self.source);
        match source {
            Some(s) => format!("{}\n{}\n—— {}", self.english, self.chinese, s),
            None => format!("{}\n{}", self.english, self.chinese),
        }
    }
}

/// Models like to attribute quotes to "Chinese proverb"; that's noise, not a source.
fn clean_source(source: &str) -> Option<&str> {
    let s = source.trim();
    let lower = s.to_lowercase();
    if s.is_empty() || lower.contains("proverb") || lower.contains("chinese") {
        return None;
    }
    Some(s)
}

fn parse_json_object(text: &str) -> Option<Quote> {
    match serde_json::from_str::<Value>(text) {
        Ok(v @ Value::Object(_)) => serde_json::from_value(v).ok(),
        _ => None,
    }
}

/// Parse the model's text. JSON first (whole text, then the outermost `{...}`
/// slice); otherwise the first two non-empty lines with no source.
pub fn parse_quote(text: &str) -> Quote {
    if let Some(q) = parse_json_object(text.trim()) {
        return q;
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Some(q) = parse_json_object(&text[start..=end]) {
                return q;
            }
        }
    }
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
    Quote {
        english: lines.next().unwrap_or_default().to_string(),
        chinese: lines.next().unwrap_or_default().to_string(),
        source: String::new(),
    }
}

/// Text out of a chat-completion body: `choices[0].message.content` as a
/// string or an array of parts, else `choices[0].delta.content`.
pub fn message_text(body: &Value) -> String {
    let choice = &body["choices"][0];
    match &choice["message"]["content"] {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(|p| match p {
                Value::String(s) => s.as_str(),
                other => other["text"].as_str().unwrap_or(""),
            })
            .collect(),
        _ => choice["delta"]["content"].as_str().unwrap_or("").to_string(),
    }
}

/// Body → final proverb content in one step.
pub fn content_from_response(body: &Value) -> String {
    parse_quote(&message_text(body)).into_content()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_reply_without_source() {
        let q = parse_quote(r#"{"english":"Rise","chinese":"起","source":""}"#);
        assert_eq!(q.into_content(), "Rise\n起");
    }

    #[test]
    fn plain_text_falls_back_to_lines() {
        let q = parse_quote("Rise\n起\nfoo");
        assert_eq!(q, Quote { english: "Rise".into(), chinese: "起".into(), source: String::new() });
        assert_eq!(q.into_content(), "Rise\n起");
    }

    #[test]
    fn fenced_json_is_found_inside_chatter() {
        let text = "Sure!\n```json\n{\"english\":\"Go\",\"chinese\":\"走\",\"source\":\"Laozi\"}\n```";
        assert_eq!(parse_quote(text).into_content(), "Go\n走\n—— Laozi");
    }

    #[test]
    fn proverb_like_sources_are_dropped() {
        for source in ["Chinese Proverb", "an old PROVERB", "chinese wisdom"] {
            let q = Quote { english: "a".into(), chinese: "b".into(), source: source.into() };
            assert_eq!(q.into_content(), "a\nb");
        }
    }

    #[test]
    fn message_text_handles_every_shape() {
        assert_eq!(message_text(&json!({"choices":[{"message":{"content":"hi"}}]})), "hi");
        let parts = json!({"choices":[{"message":{"content":["a", {"text":"b"}, {"type":"x"}]}}]});
        assert_eq!(message_text(&parts), "ab");
        assert_eq!(message_text(&json!({"choices":[{"delta":{"content":"d"}}]})), "d");
        assert_eq!(message_text(&json!({})), "");
    }

    #[test]
    fn empty_reply_gives_empty_lines() {
        assert_eq!(content_from_response(&json!({})), "\n");
    }
}
