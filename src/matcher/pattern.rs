//! Path pattern matching
//!
//! Segment syntax over `/`-separated paths: `*` matches exactly one
//! segment, `**` matches any remaining segments (including none, and also
//! mid-pattern), `{name}` matches one segment and captures it under `name`.

use std::collections::HashMap;

use crate::error::{AuthzError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Single,
    Capture(String),
    Rest,
}

/// A parsed path pattern
#[derive(Debug, Clone)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Parse a pattern, rejecting malformed segments at configuration time
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for part in split(pattern) {
            let segment = match part {
                "**" => Segment::Rest,
                "*" => Segment::Single,
                _ if part.starts_with('{') && part.ends_with('}') => {
                    let name = &part[1..part.len() - 1];
                    if name.is_empty() || name.contains(['{', '}']) {
                        return Err(AuthzError::InvalidConfiguration(format!(
                            "malformed capture segment '{}' in pattern '{}'",
                            part, pattern
                        )));
                    }
                    Segment::Capture(name.to_string())
                }
                _ if part.contains(['{', '}']) => {
                    return Err(AuthzError::InvalidConfiguration(format!(
                        "malformed segment '{}' in pattern '{}'",
                        part, pattern
                    )));
                }
                _ => Segment::Literal(part.to_string()),
            };
            segments.push(segment);
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    /// The pattern source text
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the path matches this pattern
    pub fn matches(&self, path: &str) -> bool {
        match_segments(&self.segments, &split(path), None)
    }

    /// Match and extract captured variables; `None` when the path does not
    /// match
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let mut captured = HashMap::new();
        if match_segments(&self.segments, &split(path), Some(&mut captured)) {
            Some(captured)
        } else {
            None
        }
    }
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn match_segments(
    pattern: &[Segment],
    path: &[&str],
    mut captured: Option<&mut HashMap<String, String>>,
) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Rest, rest)) => {
            // try every suffix, shortest swallow first
            for start in 0..=path.len() {
                // reborrow so each branch attempt sees the map
                let attempt = captured.as_deref_mut();
                if match_segments(rest, &path[start..], attempt) {
                    return true;
                }
            }
            false
        }
        Some((head, rest)) => {
            let Some((segment, tail)) = path.split_first() else {
                return false;
            };
            let head_matches = match head {
                Segment::Literal(literal) => literal == segment,
                Segment::Single => true,
                Segment::Capture(name) => {
                    if let Some(map) = captured.as_deref_mut() {
                        map.insert(name.clone(), (*segment).to_string());
                    }
                    true
                }
                Segment::Rest => false,
            };
            head_matches && match_segments(rest, tail, captured)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_literal_pattern() {
        let pattern = PathPattern::parse("/admin/users").unwrap();
        assert!(pattern.matches("/admin/users"));
        assert!(!pattern.matches("/admin"));
        assert!(!pattern.matches("/admin/users/1"));
    }

    #[test]
    fn test_single_segment_wildcard() {
        let pattern = PathPattern::parse("/users/*/orders").unwrap();
        assert!(pattern.matches("/users/42/orders"));
        assert!(!pattern.matches("/users/orders"));
        assert!(!pattern.matches("/users/42/43/orders"));
    }

    #[test]
    fn test_rest_wildcard() {
        let pattern = PathPattern::parse("/admin/**").unwrap();
        assert!(pattern.matches("/admin"));
        assert!(pattern.matches("/admin/x"));
        assert!(pattern.matches("/admin/x/y/z"));
        assert!(!pattern.matches("/public"));
    }

    #[test]
    fn test_rest_wildcard_mid_pattern() {
        let pattern = PathPattern::parse("/api/**/health").unwrap();
        assert!(pattern.matches("/api/health"));
        assert!(pattern.matches("/api/v1/internal/health"));
        assert!(!pattern.matches("/api/v1/status"));
    }

    #[test]
    fn test_capture_segment() {
        let pattern = PathPattern::parse("/users/{id}/orders/{order}").unwrap();
        let captured = pattern.captures("/users/42/orders/7").unwrap();
        assert_eq!(captured.get("id").map(String::as_str), Some("42"));
        assert_eq!(captured.get("order").map(String::as_str), Some("7"));
        assert!(pattern.captures("/users/42").is_none());
    }

    #[test]
    fn test_malformed_patterns_rejected() {
        assert!(PathPattern::parse("/users/{}").is_err());
        assert!(PathPattern::parse("/users/{id").is_err());
        assert!(PathPattern::parse("/users/i}d").is_err());
    }

    #[test]
    fn test_trailing_slash_is_insignificant() {
        let pattern = PathPattern::parse("/admin/users").unwrap();
        assert!(pattern.matches("/admin/users/"));
    }

    proptest! {
        #[test]
        fn prop_match_all_matches_every_path(segments in prop::collection::vec("[a-z0-9]{1,8}", 0..6)) {
            let path = format!("/{}", segments.join("/"));
            let pattern = PathPattern::parse("/**").unwrap();
            prop_assert!(pattern.matches(&path));
        }

        #[test]
        fn prop_literal_pattern_matches_itself(segments in prop::collection::vec("[a-z0-9]{1,8}", 1..6)) {
            let path = format!("/{}", segments.join("/"));
            let pattern = PathPattern::parse(&path).unwrap();
            prop_assert!(pattern.matches(&path));
        }

        #[test]
        fn prop_single_wildcard_preserves_segment_count(segments in prop::collection::vec("[a-z0-9]{1,8}", 1..6)) {
            let path = format!("/{}", segments.join("/"));
            let stars = vec!["*"; segments.len()];
            let pattern = PathPattern::parse(&format!("/{}", stars.join("/"))).unwrap();
            prop_assert!(pattern.matches(&path));
            let longer = format!("{}/extra", path);
            prop_assert!(!pattern.matches(&longer));
        }
    }
}
