//! Predicate evaluation for relationship elements.

use crate::document::Element;
use crate::project::find_direct_child;

/// Default element whose text the prefix/suffix predicates test.
pub const DEFAULT_SEARCH_FIELD: &str = "ReferencingAttributeName";

/// The fixed predicate set of a query, normalized once per query.
///
/// Keywords and suffix exclusions are compared case-insensitively and are
/// lowercased on construction; prefixes are case-sensitive and kept as given.
#[derive(Debug, Clone)]
pub struct Predicates {
    keywords: Vec<String>,
    startings: Vec<String>,
    not_endings: Vec<String>,
    search_field: String,
}

impl Predicates {
    pub fn new(
        keywords: &[String],
        startings: &[String],
        not_endings: &[String],
        search_field: impl Into<String>,
    ) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
            startings: startings.to_vec(),
            not_endings: not_endings.iter().map(|s| s.to_lowercase()).collect(),
            search_field: search_field.into(),
        }
    }

    pub fn search_field(&self) -> &str {
        &self.search_field
    }

    /// Runs the predicates in order and stops at the first rejection.
    pub fn matches(&self, element: &Element) -> bool {
        if !self.keywords.is_empty() {
            let haystack = element.to_xml().to_lowercase();
            if !self.keywords.iter().all(|kw| haystack.contains(kw.as_str())) {
                return false;
            }
        }

        let Some(value) = find_direct_child(element, &self.search_field).and_then(Element::text)
        else {
            return false;
        };

        if !self.startings.is_empty() && !self.startings.iter().any(|p| value.starts_with(p.as_str())) {
            return false;
        }

        if !self.not_endings.is_empty() {
            let lowered = value.to_lowercase();
            if self.not_endings.iter().any(|s| lowered.ends_with(s.as_str())) {
                return false;
            }
        }

        true
    }
}

/// One-shot form of [`Predicates::matches`].
pub fn matches(
    element: &Element,
    keywords: &[String],
    startings: &[String],
    not_endings: &[String],
    search_field: &str,
) -> bool {
    Predicates::new(keywords, startings, not_endings, search_field).matches(element)
}
