use crate::error::{Result, TaskforgeError};
use crate::types::DocumentKind;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const TASKFORGE_DIR: &str = ".taskforge";
pub const FEATURES_DIR: &str = ".taskforge/features";
pub const LOCKS_DIR: &str = ".taskforge/locks";
pub const CONFIG_FILE: &str = ".taskforge/config.yaml";

pub const BATCHES_DIR: &str = "batches";
pub const TASKS_PREFIX: &str = "tasks";
pub const TRACMAT_PREFIX: &str = "tracmat";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

pub fn taskforge_dir(root: &Path) -> PathBuf {
    root.join(TASKFORGE_DIR)
}

pub fn lock_path(root: &Path, feature: &str) -> PathBuf {
    root.join(LOCKS_DIR).join(format!("{feature}.lock"))
}

pub fn batches_dir(root: &Path, feature: &str) -> PathBuf {
    root.join(FEATURES_DIR).join(feature).join(BATCHES_DIR)
}

pub fn batch_path(root: &Path, feature: &str, number: u32) -> PathBuf {
    batches_dir(root, feature).join(format!("{number:04}.yaml"))
}

/// `prd-checkout.md`, `architecture-checkout.md`, ...
pub fn input_file_name(kind: DocumentKind, feature: &str) -> String {
    format!("{}-{feature}.md", kind.prefix())
}

/// Chunks are always suffixed, starting at 1: `tasks-checkout-1.md`.
pub fn tasks_file_name(feature: &str, chunk: usize) -> String {
    format!("{TASKS_PREFIX}-{feature}-{chunk}.md")
}

pub fn tracmat_file_name(feature: &str) -> String {
    format!("{TRACMAT_PREFIX}-{feature}.md")
}

// ---------------------------------------------------------------------------
// Slug validation
// ---------------------------------------------------------------------------

static SLUG_RE: OnceLock<Regex> = OnceLock::new();

fn slug_re() -> &'static Regex {
    SLUG_RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9\-]*[a-z0-9]$|^[a-z0-9]$").unwrap())
}

pub fn validate_feature(feature: &str) -> Result<()> {
    if feature.is_empty() || feature.len() > 64 || !slug_re().is_match(feature) {
        return Err(TaskforgeError::InvalidSlug(feature.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_features() {
        for feature in ["checkout", "a", "user-auth-2", "x1"] {
            validate_feature(feature).unwrap_or_else(|_| panic!("expected valid: {feature}"));
        }
    }

    #[test]
    fn invalid_features() {
        for feature in ["", "-lead", "trail-", "has spaces", "UPPER", "a_b", "../up"] {
            assert!(
                validate_feature(feature).is_err(),
                "expected invalid: {feature}"
            );
        }
    }

    #[test]
    fn file_names_follow_conventions() {
        assert_eq!(
            input_file_name(DocumentKind::Prd, "checkout"),
            "prd-checkout.md"
        );
        assert_eq!(
            input_file_name(DocumentKind::TechReq, "checkout"),
            "techreq-checkout.md"
        );
        assert_eq!(tasks_file_name("checkout", 2), "tasks-checkout-2.md");
        assert_eq!(tracmat_file_name("checkout"), "tracmat-checkout.md");
    }

    #[test]
    fn state_paths() {
        let root = Path::new("/tmp/proj");
        assert_eq!(
            batch_path(root, "checkout", 3),
            PathBuf::from("/tmp/proj/.taskforge/features/checkout/batches/0003.yaml")
        );
        assert_eq!(
            lock_path(root, "checkout"),
            PathBuf::from("/tmp/proj/.taskforge/locks/checkout.lock")
        );
    }
}
