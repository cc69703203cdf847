//! Requirement extraction: turn loaded documents into discrete, identifiable
//! requirements.
//!
//! The reasoning behind extraction belongs to a collaborator; the core only
//! enforces the output schema (non-empty, unique ids, non-empty text).

use crate::collaborator::{ExternalCommand, Stage};
use crate::error::{Result, TaskforgeError};
use crate::loader::{LoadedDocuments, SourceDocument};
use crate::types::DocumentKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::OnceLock;

pub const CROSS_CUTTING_MARKER: &str = "[cross-cutting]";

// ---------------------------------------------------------------------------
// Requirement
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub text: String,
    pub source: DocumentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// May be listed under more than one task group.
    #[serde(default)]
    pub cross_cutting: bool,
}

impl Requirement {
    pub fn new(id: impl Into<String>, text: impl Into<String>, source: DocumentKind) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            source,
            location: None,
            cross_cutting: false,
        }
    }

    pub fn section(&self) -> Option<&str> {
        self.location.as_ref().and_then(|l| l.section.as_deref())
    }
}

/// Stable id for an untagged requirement, derived from its normalized text.
pub fn content_id(text: &str) -> String {
    let normalized = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("REQ-{}", &digest[..8])
}

/// Enforce the extractor output schema.
pub fn validate_requirements(requirements: &[Requirement]) -> Result<()> {
    if requirements.is_empty() {
        return Err(TaskforgeError::EmptyRequirementSet);
    }
    let mut seen = HashSet::new();
    for req in requirements {
        if req.id.trim().is_empty() {
            return Err(TaskforgeError::InvalidRequirement {
                id: req.id.clone(),
                reason: "empty id".to_string(),
            });
        }
        if req.id.chars().any(|c| c.is_whitespace() || c == '|') {
            return Err(TaskforgeError::InvalidRequirement {
                id: req.id.clone(),
                reason: "id must not contain whitespace or '|'".to_string(),
            });
        }
        if req.text.trim().is_empty() {
            return Err(TaskforgeError::InvalidRequirement {
                id: req.id.clone(),
                reason: "empty text".to_string(),
            });
        }
        if !seen.insert(req.id.as_str()) {
            return Err(TaskforgeError::DuplicateRequirement(req.id.clone()));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

pub trait Extractor {
    fn extract(&self, docs: &LoadedDocuments) -> Result<Vec<Requirement>>;
}

/// Run `extractor` and enforce the output schema.
pub fn extract_requirements(
    extractor: &dyn Extractor,
    docs: &LoadedDocuments,
) -> Result<Vec<Requirement>> {
    let requirements = extractor.extract(docs)?;
    validate_requirements(&requirements)?;
    tracing::info!(count = requirements.len(), "extracted requirements");
    Ok(requirements)
}

// ---------------------------------------------------------------------------
// RuleExtractor
// ---------------------------------------------------------------------------

/// Deterministic extractor for documents that tag their requirements.
///
/// A line whose content starts with `REQ-<token>` defines that requirement.
/// Untagged bullets under a heading mentioning "requirement" get a content-hash id.
#[derive(Debug, Default, Clone)]
pub struct RuleExtractor;

static TAG_RE: OnceLock<Regex> = OnceLock::new();
static HEADING_RE: OnceLock<Regex> = OnceLock::new();
static BULLET_RE: OnceLock<Regex> = OnceLock::new();

pub(crate) fn tag_re() -> &'static Regex {
    TAG_RE.get_or_init(|| Regex::new(r"\bREQ-[A-Za-z0-9][A-Za-z0-9_\-]*").unwrap())
}

fn heading_re() -> &'static Regex {
    HEADING_RE.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").unwrap())
}

fn bullet_re() -> &'static Regex {
    BULLET_RE.get_or_init(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(?:\[[ xX]\]\s+)?(.*)$").unwrap())
}

fn strip_emphasis(s: &str) -> &str {
    s.trim().trim_matches(|c| c == '*' || c == '_' || c == '`').trim()
}

fn clean_text(s: &str) -> (String, bool) {
    let cross_cutting = s.contains(CROSS_CUTTING_MARKER);
    let text = s.replace(CROSS_CUTTING_MARKER, "");
    let text = text
        .trim()
        .trim_start_matches(|c: char| c == ':' || c == '-' || c == '*' || c == '_' || c.is_whitespace())
        .trim();
    (text.split_whitespace().collect::<Vec<_>>().join(" "), cross_cutting)
}

impl RuleExtractor {
    fn scan(&self, doc: &SourceDocument, out: &mut Vec<Requirement>, seen: &mut HashSet<String>) {
        let mut section: Option<String> = None;
        let mut requirement_level: Option<usize> = None;

        for (idx, line) in doc.raw_text.lines().enumerate() {
            if let Some(caps) = heading_re().captures(line) {
                let level = caps[1].len();
                let title = caps[2].to_string();
                if title.to_lowercase().contains("requirement") {
                    requirement_level = Some(level);
                } else if requirement_level.is_some_and(|r| level <= r) {
                    requirement_level = None;
                }
                section = Some(title);
                continue;
            }

            let bullet = bullet_re().captures(line).map(|c| c[1].to_string());
            let content = bullet.as_deref().unwrap_or(line);
            let stripped = strip_emphasis(content);

            let defined = tag_re()
                .find(stripped)
                .filter(|m| m.start() == 0)
                .map(|m| (m.as_str().to_string(), m.end()));

            let (id, raw_text) = match defined {
                Some((id, end)) => (id, &stripped[end..]),
                None if bullet.is_some() && requirement_level.is_some() => {
                    (String::new(), stripped)
                }
                None => continue,
            };

            let (text, cross_cutting) = clean_text(raw_text);
            if text.is_empty() {
                continue;
            }
            let id = if id.is_empty() { content_id(&text) } else { id };
            if !seen.insert(id.clone()) {
                tracing::debug!(id = %id, "requirement already defined; keeping first definition");
                continue;
            }

            out.push(Requirement {
                id,
                text,
                source: doc.kind,
                location: Some(SourceLocation {
                    section: section.clone(),
                    line: idx + 1,
                }),
                cross_cutting,
            });
        }
    }
}

impl Extractor for RuleExtractor {
    fn extract(&self, docs: &LoadedDocuments) -> Result<Vec<Requirement>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for doc in docs.non_empty() {
            self.scan(doc, &mut out, &mut seen);
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// CommandExtractor
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct ExtractRequest<'a> {
    feature: &'a str,
    documents: Vec<ExtractDocument<'a>>,
}

#[derive(Serialize)]
struct ExtractDocument<'a> {
    kind: DocumentKind,
    path: String,
    text: &'a str,
}

#[derive(Deserialize)]
struct ExtractResponse {
    requirements: Vec<Requirement>,
}

/// Delegates extraction to an external program.
pub struct CommandExtractor {
    command: ExternalCommand,
}

impl CommandExtractor {
    pub fn new(command: ExternalCommand) -> Self {
        Self { command }
    }
}

impl Extractor for CommandExtractor {
    fn extract(&self, docs: &LoadedDocuments) -> Result<Vec<Requirement>> {
        let request = ExtractRequest {
            feature: &docs.feature,
            documents: docs
                .non_empty()
                .map(|d| ExtractDocument {
                    kind: d.kind,
                    path: d.path.display().to_string(),
                    text: &d.raw_text,
                })
                .collect(),
        };
        let response: ExtractResponse = self.command.call(Stage::Extract, &request)?;
        Ok(response.requirements)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn docs(prd: &str, arch: &str) -> LoadedDocuments {
        LoadedDocuments {
            feature: "checkout".to_string(),
            documents: vec![
                SourceDocument {
                    kind: DocumentKind::Prd,
                    path: PathBuf::from("prd-checkout.md"),
                    raw_text: prd.to_string(),
                },
                SourceDocument {
                    kind: DocumentKind::Architecture,
                    path: PathBuf::from("architecture-checkout.md"),
                    raw_text: arch.to_string(),
                },
                SourceDocument::empty(DocumentKind::TechReq, PathBuf::from("techreq-checkout.md")),
            ],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn extracts_tagged_requirements() {
        let prd = "# Checkout\n\n## Cart\n- **REQ-1**: Users can add items to the cart\n- REQ-2 - Cart total updates live\n\nSome prose mentioning REQ-1.\n";
        let reqs = RuleExtractor.extract(&docs(prd, "")).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].id, "REQ-1");
        assert_eq!(reqs[0].text, "Users can add items to the cart");
        assert_eq!(reqs[0].section(), Some("Cart"));
        assert_eq!(reqs[0].location.as_ref().unwrap().line, 4);
        assert_eq!(reqs[1].text, "Cart total updates live");
    }

    #[test]
    fn untagged_bullets_under_requirement_heading_get_content_ids() {
        let prd = "## Functional Requirements\n- Users can pay with a card\n### Details\n- Receipts are emailed\n## Notes\n- not a requirement\n";
        let reqs = RuleExtractor.extract(&docs(prd, "")).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].id, content_id("Users can pay with a card"));
        assert_eq!(reqs[1].section(), Some("Details"));
    }

    #[test]
    fn content_id_ignores_whitespace_and_case() {
        assert_eq!(
            content_id("Users  can pay"),
            content_id("users can pay")
        );
        assert_ne!(content_id("a"), content_id("b"));
        assert!(content_id("a").starts_with("REQ-"));
        assert_eq!(content_id("a").len(), "REQ-".len() + 8);
    }

    #[test]
    fn cross_cutting_marker_sets_flag() {
        let prd = "- REQ-9: [cross-cutting] All endpoints log request ids\n";
        let reqs = RuleExtractor.extract(&docs(prd, "")).unwrap();
        assert!(reqs[0].cross_cutting);
        assert_eq!(reqs[0].text, "All endpoints log request ids");
    }

    #[test]
    fn first_definition_wins_across_documents() {
        let prd = "- REQ-1: From the PRD\n";
        let arch = "- REQ-1: Restated in architecture\n- REQ-A1: Use a queue\n";
        let reqs = RuleExtractor.extract(&docs(prd, arch)).unwrap();
        assert_eq!(reqs.len(), 2);
        assert_eq!(reqs[0].text, "From the PRD");
        assert_eq!(reqs[1].source, DocumentKind::Architecture);
    }

    #[test]
    fn empty_extraction_is_rejected() {
        let err = extract_requirements(&RuleExtractor, &docs("# Nothing here\n", "")).unwrap_err();
        assert!(matches!(err, TaskforgeError::EmptyRequirementSet));
    }

    #[test]
    fn schema_rejects_duplicates_and_blank_text() {
        let dup = vec![
            Requirement::new("REQ-1", "a", DocumentKind::Prd),
            Requirement::new("REQ-1", "b", DocumentKind::Prd),
        ];
        assert!(matches!(
            validate_requirements(&dup).unwrap_err(),
            TaskforgeError::DuplicateRequirement(id) if id == "REQ-1"
        ));

        let blank = vec![Requirement::new("REQ-1", "  ", DocumentKind::Prd)];
        assert!(matches!(
            validate_requirements(&blank).unwrap_err(),
            TaskforgeError::InvalidRequirement { .. }
        ));

        let spaced = vec![Requirement::new("REQ 1", "text", DocumentKind::Prd)];
        assert!(validate_requirements(&spaced).is_err());
    }

    #[test]
    fn requirement_yaml_defaults() {
        let yaml = "id: REQ-1\ntext: Sign in\nsource: prd\n";
        let req: Requirement = serde_yaml::from_str(yaml).unwrap();
        assert!(!req.cross_cutting);
        assert!(req.location.is_none());
    }
}
