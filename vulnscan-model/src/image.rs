use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    error::{ModelError, Result},
    ids::ImageId,
};

/// Tag recorded when the submitted reference carries none (or when tags are
/// not parsed at all).
pub const DEFAULT_TAG: &str = "latest";

/// An `images` row. Identity is `(name, tag)` but duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    pub name: String,
    pub tag: String,
}

/// How the dispatcher derives the stored tag from a submitted image name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPolicy {
    /// Store the whole submitted string as the name and `latest` as the tag.
    #[default]
    Latest,
    /// Split `name:tag` when a tag is present.
    Parse,
}

impl TagPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagPolicy::Latest => "latest",
            TagPolicy::Parse => "parse",
        }
    }
}

impl fmt::Display for TagPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagPolicy {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "latest" => Ok(TagPolicy::Latest),
            "parse" => Ok(TagPolicy::Parse),
            other => Err(ModelError::InvalidImageReference(format!(
                "unknown tag policy `{other}`"
            ))),
        }
    }
}

/// A submitted image reference split into the columns of the `images` table.
///
/// `raw` is what the caller sent and what the scanning engine receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    raw: String,
    name: String,
    tag: String,
}

impl ImageReference {
    pub fn resolve(raw: &str, policy: TagPolicy) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ModelError::InvalidImageReference(
                "image name must not be empty".into(),
            ));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(ModelError::InvalidImageReference(format!(
                "image name `{raw}` contains whitespace"
            )));
        }

        let (name, tag) = match policy {
            TagPolicy::Latest => (raw.to_string(), DEFAULT_TAG.to_string()),
            TagPolicy::Parse => split_tag(raw)?,
        };

        Ok(Self {
            raw: raw.to_string(),
            name,
            tag,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_tag(raw: &str) -> Result<(String, String)> {
    // Digest references keep their digest in the name.
    if raw.contains('@') {
        return Ok((raw.to_string(), DEFAULT_TAG.to_string()));
    }

    let last_segment = raw.rfind('/').map(|idx| idx + 1).unwrap_or(0);
    match raw[last_segment..].rfind(':') {
        Some(offset) => {
            let split = last_segment + offset;
            let (name, tag) = (&raw[..split], &raw[split + 1..]);
            if name.is_empty() || tag.is_empty() {
                return Err(ModelError::InvalidImageReference(format!(
                    "`{raw}` is not a valid name:tag reference"
                )));
            }
            Ok((name.to_string(), tag.to_string()))
        }
        None => Ok((raw.to_string(), DEFAULT_TAG.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_policy_keeps_the_whole_reference_as_name() {
        let reference =
            ImageReference::resolve("nginx:1.25", TagPolicy::Latest).unwrap();
        assert_eq!(reference.name(), "nginx:1.25");
        assert_eq!(reference.tag(), "latest");
        assert_eq!(reference.raw(), "nginx:1.25");
    }

    #[test]
    fn parse_policy_splits_tags_but_not_registry_ports() {
        let cases = [
            ("nginx", "nginx", "latest"),
            ("nginx:1.25", "nginx", "1.25"),
            ("localhost:5000/app", "localhost:5000/app", "latest"),
            ("localhost:5000/app:v2", "localhost:5000/app", "v2"),
            (
                "alpine@sha256:abcd",
                "alpine@sha256:abcd",
                "latest",
            ),
        ];
        for (raw, name, tag) in cases {
            let reference =
                ImageReference::resolve(raw, TagPolicy::Parse).unwrap();
            assert_eq!(reference.name(), name, "{raw}");
            assert_eq!(reference.tag(), tag, "{raw}");
        }
    }

    #[test]
    fn empty_and_whitespace_references_are_rejected() {
        assert!(ImageReference::resolve("   ", TagPolicy::Latest).is_err());
        assert!(
            ImageReference::resolve("ng inx", TagPolicy::Latest).is_err()
        );
        assert!(ImageReference::resolve("nginx:", TagPolicy::Parse).is_err());
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        let reference =
            ImageReference::resolve("  nginx ", TagPolicy::Latest).unwrap();
        assert_eq!(reference.raw(), "nginx");
    }
}
