//! core::frontmatter
//!
//! Serialization of frontmatter + body into a single file blob.
//!
//! # Format
//!
//! ```text
//! ---
//! title: Hello
//! tags:
//! - intro
//! ---
//! Body text starts here.
//! ```
//!
//! An empty frontmatter map serializes to the bare body. Text without a
//! leading `---` line parses as an empty map plus the whole text as body.

use serde_json::{Map, Value};
use thiserror::Error;

/// Structured key/value metadata attached to a document.
pub type Frontmatter = Map<String, Value>;

const FENCE: &str = "---";

/// Errors from front-block encoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize frontmatter: {0}")]
    Serialize(String),

    #[error("failed to parse frontmatter: {0}")]
    Parse(String),

    #[error("frontmatter block is not terminated")]
    Unterminated,

    #[error("frontmatter must be a mapping")]
    NotAMapping,
}

/// Converts between `{frontmatter, body}` and file contents.
pub trait FrontBlockCodec: Send + Sync {
    fn serialize(&self, frontmatter: &Frontmatter, body: &str) -> Result<String, CodecError>;

    fn parse(&self, text: &str) -> Result<(Frontmatter, String), CodecError>;
}

/// YAML front-block codec.
///
/// # Example
///
/// ```
/// use inkpress::core::frontmatter::{FrontBlockCodec, Frontmatter, YamlFrontBlock};
///
/// let mut fm = Frontmatter::new();
/// fm.insert("title".into(), "Hello".into());
///
/// let text = YamlFrontBlock.serialize(&fm, "Body\n").unwrap();
/// assert_eq!(text, "---\ntitle: Hello\n---\nBody\n");
///
/// let (parsed, body) = YamlFrontBlock.parse(&text).unwrap();
/// assert_eq!(parsed, fm);
/// assert_eq!(body, "Body\n");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct YamlFrontBlock;

impl FrontBlockCodec for YamlFrontBlock {
    fn serialize(&self, frontmatter: &Frontmatter, body: &str) -> Result<String, CodecError> {
        if frontmatter.is_empty() {
            return Ok(body.to_string());
        }
        let yaml =
            serde_yaml::to_string(frontmatter).map_err(|e| CodecError::Serialize(e.to_string()))?;
        let mut out = String::with_capacity(yaml.len() + body.len() + 8);
        out.push_str(FENCE);
        out.push('\n');
        out.push_str(&yaml);
        if !yaml.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(FENCE);
        out.push('\n');
        out.push_str(body);
        Ok(out)
    }

    fn parse(&self, text: &str) -> Result<(Frontmatter, String), CodecError> {
        let Some(rest) = text.strip_prefix("---\n") else {
            return Ok((Frontmatter::new(), text.to_string()));
        };

        let (yaml, body) = split_at_fence(rest).ok_or(CodecError::Unterminated)?;
        if yaml.trim().is_empty() {
            return Ok((Frontmatter::new(), body.to_string()));
        }

        let value: Value =
            serde_yaml::from_str(yaml).map_err(|e| CodecError::Parse(e.to_string()))?;
        match value {
            Value::Object(map) => Ok((map, body.to_string())),
            Value::Null => Ok((Frontmatter::new(), body.to_string())),
            _ => Err(CodecError::NotAMapping),
        }
    }
}

/// Split after the closing fence line, returning `(yaml, body)`.
fn split_at_fence(rest: &str) -> Option<(&str, &str)> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == FENCE {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fm(value: Value) -> Frontmatter {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn empty_frontmatter_serializes_to_body() {
        let text = YamlFrontBlock.serialize(&Frontmatter::new(), "just body").unwrap();
        assert_eq!(text, "just body");
    }

    #[test]
    fn plain_text_has_no_frontmatter() {
        let (map, body) = YamlFrontBlock.parse("# Heading\n").unwrap();
        assert!(map.is_empty());
        assert_eq!(body, "# Heading\n");
    }

    #[test]
    fn nested_values_roundtrip() {
        let original = fm(json!({
            "title": "Launch",
            "draft": false,
            "tags": ["a", "b"],
            "author": {"name": "Sam"}
        }));
        let text = YamlFrontBlock.serialize(&original, "text").unwrap();
        let (parsed, body) = YamlFrontBlock.parse(&text).unwrap();
        assert_eq!(parsed, original);
        assert_eq!(body, "text");
    }

    #[test]
    fn empty_block_parses_to_empty_map() {
        let (map, body) = YamlFrontBlock.parse("---\n---\nbody").unwrap();
        assert!(map.is_empty());
        assert_eq!(body, "body");
    }

    #[test]
    fn unterminated_block_is_an_error() {
        let result = YamlFrontBlock.parse("---\ntitle: x\nbody");
        assert!(matches!(result, Err(CodecError::Unterminated)));
    }

    #[test]
    fn scalar_block_is_rejected() {
        let result = YamlFrontBlock.parse("---\njust a string\n---\n");
        assert!(matches!(result, Err(CodecError::NotAMapping)));
    }

    #[test]
    fn body_may_contain_fences() {
        let original = fm(json!({"title": "x"}));
        let body = "intro\n---\nafter rule\n";
        let text = YamlFrontBlock.serialize(&original, body).unwrap();
        let (_, parsed_body) = YamlFrontBlock.parse(&text).unwrap();
        assert_eq!(parsed_body, body);
    }
}
