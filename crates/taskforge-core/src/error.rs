use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskforgeError {
    #[error("missing required {kind} document: expected {expected}")]
    MissingRequiredDocument { kind: String, expected: String },

    #[error("requirement extraction produced no requirements")]
    EmptyRequirementSet,

    #[error("invalid requirement '{id}': {reason}")]
    InvalidRequirement { id: String, reason: String },

    #[error("duplicate requirement id: {0}")]
    DuplicateRequirement(String),

    #[error("requirements not covered by any task group: {}", .0.join(", "))]
    UncoveredRequirement(Vec<String>),

    #[error("requirement '{id}' listed in groups {} but not marked cross-cutting", .groups.join(", "))]
    DuplicateCoverage { id: String, groups: Vec<String> },

    #[error("unknown requirement '{id}' referenced by {owner}")]
    UnknownRequirement { id: String, owner: String },

    #[error("task group '{0}' has no requirements")]
    EmptyGroup(String),

    #[error("subtasks without testing requirements: {}", .0.join(", "))]
    IncompleteTestCoverage(Vec<String>),

    #[error("requirements not referenced by any subtask: {}", .0.join(", "))]
    OrphanedRequirement(Vec<String>),

    #[error("invalid ordinal '{0}'")]
    InvalidOrdinal(String),

    #[error("task group not found: {0}")]
    GroupNotFound(String),

    #[error("subtask not found: {0}")]
    SubtaskNotFound(String),

    #[error("another run for feature '{feature}' is in progress (lock: {lock})")]
    ConcurrentRunDetected { feature: String, lock: String },

    #[error("grouping abandoned by operator after {attempts} proposal(s)")]
    Abandoned { attempts: u32 },

    #[error("no batch generated yet for feature '{0}': run 'taskforge generate {0}'")]
    NoBatch(String),

    #[error("invalid feature name '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidSlug(String),

    #[error("document integrity check failed: {}", .0.join("; "))]
    DocumentMismatch(Vec<String>),

    #[error("collaborator program not found: {0}")]
    CollaboratorNotFound(String),

    #[error("collaborator failed to start: {0}")]
    CollaboratorSpawnFailed(String),

    #[error("collaborator exited with an error: {0}")]
    CollaboratorFailed(String),

    #[error("backend '{backend}' cannot serve the {stage} stage")]
    UnsupportedBackend { backend: String, stage: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl TaskforgeError {
    /// True for errors raised by batch validation rather than by I/O or input loading.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TaskforgeError::EmptyRequirementSet
                | TaskforgeError::InvalidRequirement { .. }
                | TaskforgeError::DuplicateRequirement(_)
                | TaskforgeError::UncoveredRequirement(_)
                | TaskforgeError::DuplicateCoverage { .. }
                | TaskforgeError::UnknownRequirement { .. }
                | TaskforgeError::EmptyGroup(_)
                | TaskforgeError::IncompleteTestCoverage(_)
                | TaskforgeError::OrphanedRequirement(_)
                | TaskforgeError::InvalidOrdinal(_)
                | TaskforgeError::DocumentMismatch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TaskforgeError>;
