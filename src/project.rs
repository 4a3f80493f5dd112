//! Field projection: turning a matched element into a [`ResultRecord`].

use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::document::Element;

/// Fields included in every record when the caller does not override them.
pub const DEFAULT_FIELDS: [&str; 3] = [
    "ReferencingAttributeName",
    "ReferencedEntityName",
    "ReferencingEntityName",
];

/// First direct child of `element` named `name`.
pub fn find_direct_child<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    element.children.iter().find(|c| c.name == name)
}

/// First element named `name` anywhere below `element`, in document order.
pub fn find_first_descendant<'a>(element: &'a Element, name: &str) -> Option<&'a Element> {
    element.descendants().find(|c| c.name == name)
}

/// Resolves `field` to a text value, trying the direct child first and then
/// the whole subtree. Missing and empty both resolve to `""`.
pub fn resolve_field(element: &Element, field: &str) -> String {
    find_direct_child(element, field)
        .and_then(Element::text)
        .or_else(|| find_first_descendant(element, field).and_then(Element::text))
        .unwrap_or_default()
        .to_string()
}

/// Builds the ordered, de-duplicated list of fields projected into each record.
///
/// An explicit `return_fields` replaces the defaults entirely; otherwise
/// `attributes` are merged with `default_fields`. The `search_field` is
/// always present.
pub fn effective_fields(
    attributes: &[String],
    return_fields: Option<&[String]>,
    default_fields: &[String],
    search_field: &str,
) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !fields.iter().any(|f| f == name) {
            fields.push(name.to_string());
        }
    };

    match return_fields {
        Some(explicit) => explicit.iter().for_each(|f| push(f.as_str())),
        None => {
            attributes.iter().for_each(|f| push(f.as_str()));
            default_fields.iter().for_each(|f| push(f.as_str()));
        }
    }
    push(search_field);
    fields
}

/// One matched relationship, as returned to the caller.
///
/// Serializes as a flat JSON object: one key per projected field, in
/// projection order, then `file`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub file: String,
    pub fields: Vec<(String, String)>,
}

impl ResultRecord {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }

    /// Projected field names, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for ResultRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let extra = usize::from(self.get("file").is_none());
        let mut map = serializer.serialize_map(Some(self.fields.len() + extra))?;
        for (key, value) in self.fields.iter().filter(|(k, _)| k.as_str() != "file") {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("file", &self.file)?;
        map.end()
    }
}

/// Projects `fields` out of a matched element.
pub fn project(
    element: &Element,
    file_path: &Path,
    extract_path: &Path,
    fields: &[String],
) -> ResultRecord {
    ResultRecord {
        file: relative_display(file_path, extract_path),
        fields: fields
            .iter()
            .map(|f| (f.clone(), resolve_field(element, f)))
            .collect(),
    }
}

/// `path` relative to `base`, joined with `/` regardless of platform.
pub fn relative_display(path: &Path, base: &Path) -> String {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
