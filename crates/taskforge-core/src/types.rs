use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// DocumentKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Prd,
    Architecture,
    TechReq,
    Context,
}

impl DocumentKind {
    pub fn all() -> &'static [DocumentKind] {
        &[
            DocumentKind::Prd,
            DocumentKind::Architecture,
            DocumentKind::TechReq,
            DocumentKind::Context,
        ]
    }

    /// Filename prefix: `<prefix>-<feature>.md`.
    pub fn prefix(self) -> &'static str {
        match self {
            DocumentKind::Prd => "prd",
            DocumentKind::Architecture => "architecture",
            DocumentKind::TechReq => "techreq",
            DocumentKind::Context => "context",
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, DocumentKind::Prd | DocumentKind::Architecture)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::Prd => "PRD",
            DocumentKind::Architecture => "architecture",
            DocumentKind::TechReq => "technical requirements",
            DocumentKind::Context => "context",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TestKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestKind {
    Unit,
    Integration,
    E2e,
    Performance,
    Security,
    ErrorHandling,
}

impl TestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TestKind::Unit => "Unit",
            TestKind::Integration => "Integration",
            TestKind::E2e => "E2E",
            TestKind::Performance => "Performance",
            TestKind::Security => "Security",
            TestKind::ErrorHandling => "Error handling",
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SubtaskStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

impl SubtaskStatus {
    /// Checkbox marker inside `- [ ]`.
    pub fn checkbox(self) -> char {
        match self {
            SubtaskStatus::Pending => ' ',
            SubtaskStatus::InProgress => '~',
            SubtaskStatus::Done => 'x',
        }
    }

    pub fn from_checkbox(c: char) -> Option<Self> {
        match c {
            ' ' => Some(SubtaskStatus::Pending),
            '~' => Some(SubtaskStatus::InProgress),
            'x' | 'X' => Some(SubtaskStatus::Done),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SubtaskStatus::Pending => "pending",
            SubtaskStatus::InProgress => "in_progress",
            SubtaskStatus::Done => "done",
        }
    }
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubtaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubtaskStatus::Pending),
            "in_progress" | "in-progress" => Ok(SubtaskStatus::InProgress),
            "done" => Ok(SubtaskStatus::Done),
            _ => Err(format!("unknown subtask status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn only_prd_and_architecture_are_required() {
        let required: Vec<_> = DocumentKind::all()
            .iter()
            .filter(|k| k.is_required())
            .collect();
        assert_eq!(required, [&DocumentKind::Prd, &DocumentKind::Architecture]);
    }

    #[test]
    fn checkbox_markers_roundtrip() {
        for status in [
            SubtaskStatus::Pending,
            SubtaskStatus::InProgress,
            SubtaskStatus::Done,
        ] {
            assert_eq!(SubtaskStatus::from_checkbox(status.checkbox()), Some(status));
        }
        assert_eq!(SubtaskStatus::from_checkbox('?'), None);
    }

    #[test]
    fn status_parses_both_spellings() {
        assert_eq!(
            SubtaskStatus::from_str("in-progress").unwrap(),
            SubtaskStatus::InProgress
        );
        assert!(SubtaskStatus::from_str("blocked").is_err());
    }

    #[test]
    fn test_kind_yaml_is_snake_case() {
        let yaml = serde_yaml::to_string(&TestKind::ErrorHandling).unwrap();
        assert_eq!(yaml.trim(), "error_handling");
    }
}
