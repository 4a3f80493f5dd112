//! The query pipeline: locate documents, extract relationships, filter, and
//! project.
//!
//! ```text
//! search root ──▶ DocumentLocator ──▶ extract_elements ──▶ Predicates ──▶ project
//!                  (*.xml, sorted)     (fail-soft)          (in order)     (records)
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{Config, SearchConfig};
use crate::document::{self, DocumentRelationships};
use crate::error::EngineError;
use crate::filter::Predicates;
use crate::locate::DocumentLocator;
use crate::project::{effective_fields, project, ResultRecord};

/// A search request, as received on `POST /search`.
///
/// `extract_path` and `folder` are optional here so that a missing value is
/// reported as [`EngineError::MissingQueryParameter`] rather than a JSON
/// decoding failure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueryDescriptor {
    #[serde(default)]
    pub extract_path: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<String>,
    #[serde(default)]
    pub not_endings: Vec<String>,
    #[serde(default)]
    pub startings: Vec<String>,
    #[serde(default)]
    pub search_field: Option<String>,
    #[serde(default)]
    pub return_fields: Option<Vec<String>>,
}

impl QueryDescriptor {
    /// The directory a query scans: `folder` inside `extract_path`.
    pub fn search_root(&self) -> Result<PathBuf, EngineError> {
        let extract_path = required(&self.extract_path, "extract_path")?;
        let folder = required(&self.folder, "folder")?;
        Ok(Path::new(extract_path).join(folder))
    }
}

fn required<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, EngineError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(EngineError::MissingQueryParameter(name))
}

/// Response body for `POST /search` and `relsearch search`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ResultRecord>,
}

/// Counters for a finished query, used for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub documents: usize,
    pub skipped: usize,
    pub elements: usize,
    pub matches: usize,
}

/// Runs queries with the defaults taken from `[search]`.
#[derive(Debug, Clone)]
pub struct SearchEngine {
    locator: DocumentLocator,
    element: String,
    search_field: String,
    default_fields: Vec<String>,
}

impl SearchEngine {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        Ok(Self {
            locator: DocumentLocator::new(&config.include_globs)?,
            element: config.element.clone(),
            search_field: config.search_field.clone(),
            default_fields: config.default_fields.clone(),
        })
    }

    /// Runs `query` and returns matching records, ordered by document path and
    /// then by position within each document.
    pub fn search(&self, query: &QueryDescriptor) -> Result<Vec<ResultRecord>, EngineError> {
        self.search_with_stats(query).map(|(records, _)| records)
    }

    pub fn search_with_stats(
        &self,
        query: &QueryDescriptor,
    ) -> Result<(Vec<ResultRecord>, SearchStats), EngineError> {
        let search_root = query.search_root()?;
        let extract_path = Path::new(required(&query.extract_path, "extract_path")?);

        let search_field = query
            .search_field
            .as_deref()
            .filter(|f| !f.is_empty())
            .unwrap_or(self.search_field.as_str());
        let predicates = Predicates::new(
            &query.keywords,
            &query.startings,
            &query.not_endings,
            search_field,
        );
        let fields = effective_fields(
            &query.attributes,
            query.return_fields.as_deref(),
            &self.default_fields,
            search_field,
        );

        let mut stats = SearchStats::default();
        let mut records = Vec::new();

        for path in self.locator.locate(&search_root) {
            stats.documents += 1;
            match document::extract_elements(&path, &self.element) {
                DocumentRelationships::Found(elements) => {
                    debug!(file = %path.display(), elements = elements.len(), "scanned document");
                    stats.elements += elements.len();
                    records.extend(
                        elements
                            .iter()
                            .filter(|e| predicates.matches(e))
                            .map(|e| project(e, &path, extract_path, &fields)),
                    );
                }
                DocumentRelationships::Skipped { reason } => {
                    warn!(file = %path.display(), %reason, "skipping unparseable document");
                    stats.skipped += 1;
                }
            }
        }
        stats.matches = records.len();

        info!(
            root = %search_root.display(),
            documents = stats.documents,
            skipped = stats.skipped,
            matches = stats.matches,
            "search complete"
        );
        Ok((records, stats))
    }
}

/// Runs a query once with the given configuration and prints the JSON
/// response on stdout.
pub fn run_search(config: &Config, query: &QueryDescriptor) -> Result<()> {
    let engine = SearchEngine::new(&config.search)?;
    let results = engine.search(query)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&SearchResponse { results })?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn relationship(attr: &str, referenced: &str) -> String {
        format!(
            "<EntityRelationship Name=\"{attr}\">\
               <EntityRelationshipType>OneToMany</EntityRelationshipType>\
               <ReferencingEntityName>mmpl_Application</ReferencingEntityName>\
               <ReferencedEntityName>{referenced}</ReferencedEntityName>\
               <ReferencingAttributeName>{attr}</ReferencingAttributeName>\
               <EntityRelationshipRoles>\
                 <EntityRelationshipRole><NavPaneDisplayOption>UseCollectionName</NavPaneDisplayOption></EntityRelationshipRole>\
               </EntityRelationshipRoles>\
             </EntityRelationship>"
        )
    }

    fn customizations(relationships: &[String]) -> String {
        format!(
            "<?xml version=\"1.0\"?>\n<ImportExportXml><EntityRelationships>{}</EntityRelationships></ImportExportXml>",
            relationships.concat()
        )
    }

    fn setup() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let other = tmp.path().join("solution/Other");
        fs::create_dir_all(&other).unwrap();
        fs::write(
            other.join("Customizations.xml"),
            customizations(&[
                relationship("mmpl_Contact", "contact"),
                relationship("mmpl_ContactId", "contact"),
                relationship("mmpl_EmployerId", "account"),
            ]),
        )
        .unwrap();
        tmp
    }

    fn engine() -> SearchEngine {
        SearchEngine::new(&SearchConfig::default()).unwrap()
    }

    fn query(tmp: &TempDir, folder: &str) -> QueryDescriptor {
        QueryDescriptor {
            extract_path: Some(tmp.path().to_string_lossy().to_string()),
            folder: Some(folder.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn prefix_and_suffix_filters_end_to_end() {
        let tmp = setup();
        let mut q = query(&tmp, "solution");
        q.not_endings = vec!["Id".to_string()];
        q.startings = vec!["mmpl_".to_string()];

        let results = engine().search(&q).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("ReferencingAttributeName"), Some("mmpl_Contact"));
        assert_eq!(results[0].file, "solution/Other/Customizations.xml");
    }

    #[test]
    fn default_fields_are_projected() {
        let tmp = setup();
        let results = engine().search(&query(&tmp, "solution")).unwrap();
        assert_eq!(results.len(), 3);
        let keys: Vec<&str> = results[0].keys().collect();
        assert_eq!(
            keys,
            vec!["ReferencingAttributeName", "ReferencedEntityName", "ReferencingEntityName"]
        );
        assert_eq!(results[2].get("ReferencedEntityName"), Some("account"));
    }

    #[test]
    fn keywords_filter_on_whole_element() {
        let tmp = setup();
        let mut q = query(&tmp, "solution");
        q.keywords = vec!["ACCOUNT".to_string()];
        let results = engine().search(&q).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].get("ReferencingAttributeName"), Some("mmpl_EmployerId"));
    }

    #[test]
    fn return_fields_override_uses_descendant_fallback() {
        let tmp = setup();
        let mut q = query(&tmp, "solution");
        q.return_fields = Some(vec!["NavPaneDisplayOption".to_string()]);
        q.attributes = vec!["Ignored".to_string()];

        let results = engine().search(&q).unwrap();
        let keys: Vec<&str> = results[0].keys().collect();
        assert_eq!(keys, vec!["NavPaneDisplayOption", "ReferencingAttributeName"]);
        assert_eq!(results[0].get("NavPaneDisplayOption"), Some("UseCollectionName"));
    }

    #[test]
    fn empty_search_field_falls_back_to_default() {
        let tmp = setup();
        let mut q = query(&tmp, "solution");
        q.search_field = Some(String::new());
        q.startings = vec!["mmpl_Employer".to_string()];
        assert_eq!(engine().search(&q).unwrap().len(), 1);
    }

    #[test]
    fn malformed_documents_are_skipped() {
        let tmp = setup();
        fs::write(tmp.path().join("solution/broken.xml"), "<EntityRelationship>").unwrap();

        let (results, stats) = engine().search_with_stats(&query(&tmp, "solution")).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(stats.documents, 2);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn folder_without_documents_is_empty_not_error() {
        let tmp = setup();
        fs::create_dir_all(tmp.path().join("empty")).unwrap();
        assert!(engine().search(&query(&tmp, "empty")).unwrap().is_empty());
        assert!(engine().search(&query(&tmp, "missing")).unwrap().is_empty());
    }

    #[test]
    fn repeated_queries_are_identical() {
        let tmp = setup();
        let q = query(&tmp, "solution");
        assert_eq!(engine().search(&q).unwrap(), engine().search(&q).unwrap());
    }

    #[test]
    fn missing_parameters_are_reported() {
        let tmp = setup();
        let mut q = query(&tmp, "solution");
        q.folder = None;
        assert!(matches!(
            engine().search(&q).unwrap_err(),
            EngineError::MissingQueryParameter("folder")
        ));

        q.folder = Some("solution".into());
        q.extract_path = Some(String::new());
        assert!(matches!(
            engine().search(&q).unwrap_err(),
            EngineError::MissingQueryParameter("extract_path")
        ));
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let q: QueryDescriptor =
            serde_json::from_str(r#"{"extract_path": "/x", "folder": "."}"#).unwrap();
        assert!(q.keywords.is_empty() && q.startings.is_empty());
        assert!(q.search_field.is_none() && q.return_fields.is_none());
    }
}
