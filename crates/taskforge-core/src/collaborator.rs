//! Subprocess invocation for external collaborators.
//!
//! An external collaborator is any program that speaks a JSON stdin/stdout
//! protocol. The core appends `--stage <stage>` to the configured arguments,
//! writes the stage request as JSON to stdin, and reads the stage response as
//! JSON from stdout. Stderr passes through so the program can log.
//!
//! # Stages
//! - `extract`: `{feature, documents}` → `{requirements}`
//! - `group`:   `{requirements, feedback}` → `{groups}`
//! - `expand`:  `{group, requirements}` → `{shared_context, subtasks}`

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, TaskforgeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Group,
    Expand,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Group => "group",
            Stage::Expand => "expand",
        }
    }
}

/// A configured external program.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, also exported as `TASKFORGE_ROOT`.
    pub root: PathBuf,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>, root: &Path) -> Self {
        Self {
            program: program.into(),
            args,
            root: root.to_path_buf(),
        }
    }

    /// Serialize `request`, run the program for `stage`, and parse its stdout.
    pub fn call<Req, Resp>(&self, stage: Stage, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let input = serde_json::to_string(request)?;
        let stdout = self.run(stage, &input)?;
        let response = serde_json::from_str(stdout.trim())?;
        Ok(response)
    }

    fn run(&self, stage: Stage, stdin_json: &str) -> Result<String> {
        let program = which::which(&self.program)
            .map_err(|_| TaskforgeError::CollaboratorNotFound(self.program.clone()))?;

        let mut cmd = Command::new(program);
        cmd.args(&self.args);
        cmd.args(["--stage", stage.as_str()]);
        cmd.env("TASKFORGE_ROOT", &self.root);
        cmd.current_dir(&self.root);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::inherit());

        tracing::info!(program = %self.program, stage = stage.as_str(), "invoking collaborator");

        let mut child = cmd
            .spawn()
            .map_err(|e| TaskforgeError::CollaboratorSpawnFailed(e.to_string()))?;

        // Feed stdin from a second thread while this one drains stdout, so a
        // program that writes before it finishes reading cannot deadlock us.
        let stdin = child.stdin.take();
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => write_request(&mut stdin, stdin_json),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer.join().unwrap_or_else(|_| {
                Err(TaskforgeError::CollaboratorSpawnFailed(
                    "stdin writer panicked".to_string(),
                ))
            });
            (written, output)
        });
        let output = output.map_err(|e| TaskforgeError::CollaboratorSpawnFailed(e.to_string()))?;
        written?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let hint = stdout.chars().take(500).collect::<String>();
            return Err(TaskforgeError::CollaboratorFailed(format!(
                "{} ({}): {hint}",
                self.program, output.status
            )));
        }
        Ok(stdout)
    }
}

/// Write the request and close the pipe so the program sees EOF.
fn write_request(stdin: &mut ChildStdin, json: &str) -> Result<()> {
    match stdin.write_all(json.as_bytes()) {
        Ok(()) => Ok(()),
        // The program exited without reading; its exit status decides.
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(e) => Err(TaskforgeError::CollaboratorSpawnFailed(format!(
            "failed to write stdin: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tempfile::TempDir;

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(Stage::Extract.as_str(), "extract");
        assert_eq!(Stage::Group.as_str(), "group");
        assert_eq!(Stage::Expand.as_str(), "expand");
    }

    #[test]
    fn missing_program_is_reported() {
        let dir = TempDir::new().unwrap();
        let cmd = ExternalCommand::new("taskforge-no-such-program-xyz", vec![], dir.path());
        let err = cmd
            .call::<_, Value>(Stage::Extract, &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, TaskforgeError::CollaboratorNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn echoes_json_through_cat() {
        let dir = TempDir::new().unwrap();
        // `sh -c` binds the appended stage flags to $0 and $1.
        let cmd = ExternalCommand::new(
            "sh",
            vec!["-c".to_string(), "cat".to_string()],
            dir.path(),
        );
        let out: Value = cmd
            .call(Stage::Group, &serde_json::json!({"groups": []}))
            .unwrap();
        assert_eq!(out, serde_json::json!({"groups": []}));
    }

    #[cfg(unix)]
    #[test]
    fn large_payload_does_not_deadlock() {
        let dir = TempDir::new().unwrap();
        let cmd = ExternalCommand::new(
            "sh",
            vec!["-c".to_string(), "cat".to_string()],
            dir.path(),
        );
        let text = "x".repeat(1 << 20);
        let request = serde_json::json!({"documents": [{"text": text}]});

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let _ = tx.send(cmd.call::<_, Value>(Stage::Extract, &request));
        });
        let out = rx
            .recv_timeout(std::time::Duration::from_secs(30))
            .expect("collaborator call hung")
            .unwrap();
        assert_eq!(out["documents"][0]["text"].as_str().map(str::len), Some(1 << 20));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_an_error() {
        let dir = TempDir::new().unwrap();
        let cmd = ExternalCommand::new(
            "sh",
            vec!["-c".to_string(), "echo oops; exit 3".to_string()],
            dir.path(),
        );
        let err = cmd
            .call::<_, Value>(Stage::Expand, &serde_json::json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("oops"));
    }
}
