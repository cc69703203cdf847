//! Input loading: locate the feature's source documents by filename convention.

use crate::error::{Result, TaskforgeError};
use crate::paths;
use crate::types::DocumentKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub kind: DocumentKind,
    pub path: PathBuf,
    pub raw_text: String,
}

impl SourceDocument {
    /// Placeholder for an optional document that was not found.
    pub fn empty(kind: DocumentKind, path: PathBuf) -> Self {
        Self {
            kind,
            path,
            raw_text: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw_text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadedDocuments {
    pub feature: String,
    /// Always one entry per `DocumentKind`, in `DocumentKind::all()` order.
    pub documents: Vec<SourceDocument>,
    pub warnings: Vec<String>,
}

impl LoadedDocuments {
    pub fn get(&self, kind: DocumentKind) -> Option<&SourceDocument> {
        self.documents.iter().find(|d| d.kind == kind)
    }

    pub fn non_empty(&self) -> impl Iterator<Item = &SourceDocument> {
        self.documents.iter().filter(|d| !d.is_empty())
    }
}

/// Load the documents for `feature` from `dir`.
///
/// Missing PRD or architecture documents fail the run; missing optional
/// documents load as empty and add a warning.
pub fn load(dir: &Path, feature: &str) -> Result<LoadedDocuments> {
    paths::validate_feature(feature)?;

    let mut documents = Vec::with_capacity(DocumentKind::all().len());
    let mut warnings = Vec::new();

    for &kind in DocumentKind::all() {
        let file_name = paths::input_file_name(kind, feature);
        let path = dir.join(&file_name);
        match crate::io::read_optional(&path)? {
            Some(raw_text) => {
                tracing::debug!(kind = %kind, path = %path.display(), "loaded source document");
                documents.push(SourceDocument {
                    kind,
                    path,
                    raw_text,
                });
            }
            None if kind.is_required() => {
                return Err(TaskforgeError::MissingRequiredDocument {
                    kind: kind.to_string(),
                    expected: path.display().to_string(),
                });
            }
            None => {
                let warning = format!("optional {kind} document not found: {file_name}");
                tracing::warn!("{warning}");
                warnings.push(warning);
                documents.push(SourceDocument::empty(kind, path));
            }
        }
    }

    Ok(LoadedDocuments {
        feature: feature.to_string(),
        documents,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) {
        std::fs::write(dir.path().join(name), body).unwrap();
    }

    #[test]
    fn loads_all_four_documents() {
        let dir = TempDir::new().unwrap();
        write(&dir, "prd-checkout.md", "# PRD");
        write(&dir, "architecture-checkout.md", "# Arch");
        write(&dir, "techreq-checkout.md", "# Tech");
        write(&dir, "context-checkout.md", "# Ctx");

        let loaded = load(dir.path(), "checkout").unwrap();
        assert_eq!(loaded.documents.len(), 4);
        assert!(loaded.warnings.is_empty());
        assert_eq!(loaded.get(DocumentKind::TechReq).unwrap().raw_text, "# Tech");
    }

    #[test]
    fn missing_techreq_degrades_to_warning() {
        let dir = TempDir::new().unwrap();
        write(&dir, "prd-checkout.md", "# PRD");
        write(&dir, "architecture-checkout.md", "# Arch");

        let loaded = load(dir.path(), "checkout").unwrap();
        assert_eq!(loaded.warnings.len(), 2);
        assert!(loaded.warnings[0].contains("techreq-checkout.md"));
        assert!(loaded.get(DocumentKind::TechReq).unwrap().is_empty());
        assert_eq!(loaded.non_empty().count(), 2);
    }

    #[test]
    fn missing_prd_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "architecture-checkout.md", "# Arch");

        let err = load(dir.path(), "checkout").unwrap_err();
        assert!(matches!(
            err,
            TaskforgeError::MissingRequiredDocument { ref kind, .. } if kind == "PRD"
        ));
    }

    #[test]
    fn missing_architecture_is_fatal() {
        let dir = TempDir::new().unwrap();
        write(&dir, "prd-checkout.md", "# PRD");

        let err = load(dir.path(), "checkout").unwrap_err();
        assert!(err.to_string().contains("architecture-checkout.md"));
    }

    #[test]
    fn other_features_are_ignored() {
        let dir = TempDir::new().unwrap();
        write(&dir, "prd-search.md", "# PRD");
        write(&dir, "architecture-search.md", "# Arch");

        assert!(load(dir.path(), "checkout").is_err());
    }

    #[test]
    fn rejects_invalid_feature_name() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load(dir.path(), "../etc").unwrap_err(),
            TaskforgeError::InvalidSlug(_)
        ));
    }
}
