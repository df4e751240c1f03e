//! Metric path construction.
//!
//! Every hierarchical counter key is built through this module so the
//! sanitization invariant holds uniformly: no segment ever contains the
//! path separator, an `@`, or whitespace, and an absent attribute always
//! maps to a fixed placeholder instead of breaking path construction.

use std::fmt;

/// Placeholder segment for absent attributes.
pub const PLACEHOLDER: &str = "undef";

/// Sanitizes a raw attribute value into a safe path segment.
///
/// Replaces `.`, `@`, and space with `_`. `None` maps to [`PLACEHOLDER`].
/// Sanitization is idempotent.
#[must_use]
pub fn sanitize(segment: Option<&str>) -> String {
    match segment {
        None => PLACEHOLDER.to_string(),
        Some(s) => s
            .chars()
            .map(|c| if c == '.' || c == '@' || c == ' ' { '_' } else { c })
            .collect(),
    }
}

/// An ordered sequence of sanitized segments, joined with `.` on render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricPath {
    segments: Vec<String>,
}

impl MetricPath {
    /// Creates an empty path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a path from raw segments, sanitizing each.
    #[must_use]
    pub fn from_segments<'a, I: IntoIterator<Item = &'a str>>(segments: I) -> Self {
        let mut path = Self::new();
        for s in segments {
            path.push(Some(s));
        }
        path
    }

    /// Appends a sanitized segment.
    pub fn push(&mut self, segment: Option<&str>) {
        self.segments.push(sanitize(segment));
    }

    /// Returns a new path with the segment appended.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut path = self.clone();
        path.push(Some(segment));
        path
    }

    /// Number of segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True if the path has no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Renders the dotted key, optionally with extra trailing segments.
    ///
    /// The extra segments are trusted (metric leaf names chosen by the
    /// classifier, not attribute values) and are not re-sanitized.
    #[must_use]
    pub fn join_with(&self, extra: &[&str]) -> String {
        let mut parts: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        parts.extend_from_slice(extra);
        parts.join(".")
    }
}

impl fmt::Display for MetricPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case(Some("a.b"), "a_b" ; "dot replaced")]
    #[test_case(Some("user@host"), "user_host" ; "at replaced")]
    #[test_case(Some("two words"), "two_words" ; "space replaced")]
    #[test_case(Some("x.y@z w"), "x_y_z_w" ; "all three replaced")]
    #[test_case(Some(""), "" ; "empty passes through")]
    #[test_case(None, "undef" ; "absent maps to placeholder")]
    fn sanitize_cases(input: Option<&str>, expected: &str) {
        assert_eq!(sanitize(input), expected);
    }

    #[test]
    fn path_joins_with_dots() {
        let mut path = MetricPath::new();
        path.push(Some("Dynamic"));
        path.push(Some("Claimed"));
        path.push(Some("group_one.prod"));
        assert_eq!(path.to_string(), "Dynamic.Claimed.group_one_prod");
        assert_eq!(
            path.join_with(&["Memory"]),
            "Dynamic.Claimed.group_one_prod.Memory"
        );
    }

    #[test]
    fn child_does_not_mutate_parent() {
        let base = MetricPath::from_segments(["Static", "Claimed"]);
        let leaf = base.child("owner@node");
        assert_eq!(base.to_string(), "Static.Claimed");
        assert_eq!(leaf.to_string(), "Static.Claimed.owner_node");
    }

    proptest! {
        #[test]
        fn sanitize_is_idempotent(s in ".*") {
            let once = sanitize(Some(&s));
            let twice = sanitize(Some(&once));
            prop_assert_eq!(&once, &twice);
        }

        #[test]
        fn sanitize_output_has_no_reserved_chars(s in ".*") {
            let out = sanitize(Some(&s));
            prop_assert!(!out.contains('.'));
            prop_assert!(!out.contains('@'));
            prop_assert!(!out.contains(' '));
        }
    }
}
