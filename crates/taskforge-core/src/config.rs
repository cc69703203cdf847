use crate::collaborator::ExternalCommand;
use crate::error::{Result, TaskforgeError};
use crate::grouping::{CommandGrouper, Grouper, RuleGrouper};
use crate::paths;
use crate::requirement::{CommandExtractor, Extractor, RuleExtractor};
use crate::subtask::{CommandExpander, Expander, PlanExpander, RuleExpander};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// InputsConfig / OutputsConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsConfig {
    /// Directory holding `prd-*.md` and friends, relative to the project root.
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputsConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// A task-list chunk is closed before a group would push it past this.
    #[serde(default = "default_max_lines")]
    pub max_lines_per_chunk: usize,
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_lines() -> usize {
    400
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self { dir: default_dir() }
    }
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            max_lines_per_chunk: default_max_lines(),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Backend {
    #[default]
    Rules,
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    /// Human-authored YAML plan; expansion only.
    Plan { path: PathBuf },
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Rules => "rules",
            Backend::Command { .. } => "command",
            Backend::Plan { .. } => "plan",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default)]
    pub extractor: Backend,
    #[serde(default)]
    pub grouper: Backend,
    #[serde(default)]
    pub expander: Backend,
}

impl CollaboratorsConfig {
    pub fn extractor(&self, root: &Path) -> Result<Box<dyn Extractor>> {
        match &self.extractor {
            Backend::Rules => Ok(Box::new(RuleExtractor)),
            Backend::Command { program, args } => Ok(Box::new(CommandExtractor::new(
                ExternalCommand::new(program.clone(), args.clone(), root),
            ))),
            b => Err(TaskforgeError::UnsupportedBackend {
                backend: b.name().to_string(),
                stage: "extract".to_string(),
            }),
        }
    }

    pub fn grouper(&self, root: &Path) -> Result<Box<dyn Grouper>> {
        match &self.grouper {
            Backend::Rules => Ok(Box::new(RuleGrouper)),
            Backend::Command { program, args } => Ok(Box::new(CommandGrouper::new(
                ExternalCommand::new(program.clone(), args.clone(), root),
            ))),
            b => Err(TaskforgeError::UnsupportedBackend {
                backend: b.name().to_string(),
                stage: "group".to_string(),
            }),
        }
    }

    pub fn expander(&self, root: &Path) -> Result<Box<dyn Expander>> {
        match &self.expander {
            Backend::Rules => Ok(Box::new(RuleExpander)),
            Backend::Command { program, args } => Ok(Box::new(CommandExpander::new(
                ExternalCommand::new(program.clone(), args.clone(), root),
            ))),
            Backend::Plan { path } => Ok(Box::new(PlanExpander::load(&root.join(path))?)),
        }
    }
}

// ---------------------------------------------------------------------------
// ApprovalConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApprovalConfig {
    /// Unset means wait indefinitely for the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl ApprovalConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub collaborators: CollaboratorsConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
}

fn default_version() -> u32 {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            inputs: InputsConfig::default(),
            outputs: OutputsConfig::default(),
            collaborators: CollaboratorsConfig::default(),
            approval: ApprovalConfig::default(),
        }
    }
}

impl Config {
    /// Load `.taskforge/config.yaml`; a missing file yields the defaults.
    pub fn load(root: &Path) -> Result<Self> {
        match crate::io::read_optional(&paths::config_path(root))? {
            Some(data) => Ok(serde_yaml::from_str(&data)?),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn inputs_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.inputs.dir)
    }

    pub fn outputs_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.outputs.dir)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.outputs.max_lines_per_chunk == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "outputs.max_lines_per_chunk must be greater than zero".to_string(),
            });
        } else if self.outputs.max_lines_per_chunk < 50 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "outputs.max_lines_per_chunk={} puts nearly every group in its own file",
                    self.outputs.max_lines_per_chunk
                ),
            });
        }

        let stages = [
            ("extractor", &self.collaborators.extractor),
            ("grouper", &self.collaborators.grouper),
            ("expander", &self.collaborators.expander),
        ];
        for (stage, backend) in stages {
            match backend {
                Backend::Command { program, .. } if program.trim().is_empty() => {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("collaborators.{stage} has an empty program"),
                    });
                }
                Backend::Plan { .. } if stage != "expander" => {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("collaborators.{stage} cannot use a plan backend"),
                    });
                }
                _ => {}
            }
        }

        if self.approval.timeout_seconds == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "approval.timeout_seconds=0 abandons every interactive run".to_string(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_roundtrip() {
        let cfg = Config::default();
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.outputs.max_lines_per_chunk, 400);
        assert_eq!(parsed.collaborators.grouper, Backend::Rules);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert!(cfg.approval.timeout().is_none());
        assert_eq!(cfg.inputs_dir(dir.path()), dir.path().join("."));
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "outputs:\n  dir: docs/tasks\ncollaborators:\n  expander:\n    type: plan\n    path: plan.yaml\n";
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.outputs.dir, PathBuf::from("docs/tasks"));
        assert_eq!(cfg.outputs.max_lines_per_chunk, 400);
        assert_eq!(
            cfg.collaborators.expander,
            Backend::Plan {
                path: PathBuf::from("plan.yaml")
            }
        );
        assert_eq!(cfg.collaborators.extractor, Backend::Rules);
    }

    #[test]
    fn command_backend_yaml_tagged() {
        let backend = Backend::Command {
            program: "llm-extract".to_string(),
            args: vec!["--model".to_string(), "large".to_string()],
        };
        let yaml = serde_yaml::to_string(&backend).unwrap();
        assert!(yaml.contains("type: command"));
        let parsed: Backend = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, backend);
    }

    #[test]
    fn save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.approval.timeout_seconds = Some(600);
        cfg.save(dir.path()).unwrap();
        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.approval.timeout(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn validate_flags_bad_settings() {
        let mut cfg = Config::default();
        assert!(cfg.validate().is_empty());

        cfg.outputs.max_lines_per_chunk = 0;
        cfg.collaborators.grouper = Backend::Plan {
            path: PathBuf::from("p.yaml"),
        };
        cfg.collaborators.extractor = Backend::Command {
            program: " ".to_string(),
            args: vec![],
        };
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().all(|w| w.level == WarnLevel::Error));
    }

    #[test]
    fn plan_backend_rejected_for_grouper() {
        let dir = TempDir::new().unwrap();
        let cfg = CollaboratorsConfig {
            grouper: Backend::Plan {
                path: PathBuf::from("p.yaml"),
            },
            ..Default::default()
        };
        assert!(matches!(
            cfg.grouper(dir.path()).err().unwrap(),
            TaskforgeError::UnsupportedBackend { .. }
        ));
    }
}
