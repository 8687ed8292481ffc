// Ports - capabilities the core consumes from its surroundings

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tally_shared::{BuildResult, JobName, ServerName};

use crate::events::ReviewEvent;
use crate::jobs::{BuildRef, BuildRun};
use crate::shared_kernel::{DomainError, Result};

// ============================================================================
// Environment expansion
// ============================================================================

/// Expands `$VAR` / `${VAR}` references with a build's environment
pub trait EnvironmentExpander: Send + Sync {
    /// Remember the environment of a run that started or completed
    fn record(&self, _run: &BuildRun) {}

    /// The build's environment is no longer needed
    fn release(&self, _build: &BuildRef) {}

    /// Every build of a removed job
    fn release_job(&self, _job: &JobName) {}

    fn expand(&self, build: &BuildRef, text: &str) -> Result<String>;
}

/// Environments keyed by build, on top of a process-wide base environment
#[derive(Debug, Default)]
pub struct BuildEnvironments {
    global: HashMap<String, String>,
    builds: DashMap<(JobName, u64), HashMap<String, String>>,
}

impl BuildEnvironments {
    pub fn new(global: HashMap<String, String>) -> Self {
        Self {
            global,
            builds: DashMap::new(),
        }
    }

    pub fn tracked_builds(&self) -> usize {
        self.builds.len()
    }
}

impl EnvironmentExpander for BuildEnvironments {
    fn record(&self, run: &BuildRun) {
        if let Some(number) = run.build.number {
            self.builds
                .insert((run.build.job.clone(), number), run.environment.clone());
        }
    }

    fn release(&self, build: &BuildRef) {
        if let Some(number) = build.number {
            self.builds.remove(&(build.job.clone(), number));
        }
    }

    fn release_job(&self, job: &JobName) {
        self.builds.retain(|(name, _), _| name != job);
    }

    fn expand(&self, build: &BuildRef, text: &str) -> Result<String> {
        let vars = build
            .number
            .and_then(|number| self.builds.get(&(build.job.clone(), number)));
        let number = build.number.map(|n| n.to_string());

        Ok(expand_variables(text, |name| {
            if let Some(value) = vars.as_ref().and_then(|v| v.value().get(name)) {
                return Some(value.clone());
            }
            match name {
                "JOB_NAME" => Some(build.job.to_string()),
                "BUILD_NUMBER" => number.clone(),
                _ => self.global.get(name).cloned(),
            }
        }))
    }
}

/// Replace `$NAME` and `${NAME}` using `lookup`; unknown names stay literal
pub fn expand_variables<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, literal_len) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 3),
                None => ("", 1),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end + 1)
        };

        match (!name.is_empty()).then(|| lookup(name)).flatten() {
            Some(value) => out.push_str(&value),
            None if name.is_empty() => {
                out.push('$');
                rest = after;
                continue;
            }
            None => out.push_str(&rest[pos..pos + literal_len]),
        }
        rest = &rest[pos + literal_len..];
    }

    out.push_str(rest);
    out
}

// ============================================================================
// Workspace access
// ============================================================================

/// Best-effort access to files a build left in its workspace
pub trait WorkspaceReader: Send + Sync {
    /// Content of the first file (in path order) matching `pattern` under
    /// `workspace`, or `None` when nothing matches
    fn read_first_match(&self, workspace: &Path, pattern: &str) -> Result<Option<String>>;
}

/// Reads workspaces from the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsWorkspaceReader;

impl WorkspaceReader for FsWorkspaceReader {
    fn read_first_match(&self, workspace: &Path, pattern: &str) -> Result<Option<String>> {
        let full = workspace.join(pattern);
        let paths = glob::glob(&full.to_string_lossy()).map_err(|e| DomainError::Workspace {
            message: format!("invalid pattern {}: {}", pattern, e),
        })?;

        let mut matches: Vec<_> = paths
            .filter_map(std::result::Result::ok)
            .filter(|p| p.is_file())
            .collect();
        matches.sort();

        let Some(first) = matches.first() else {
            return Ok(None);
        };
        std::fs::read_to_string(first)
            .map(Some)
            .map_err(|e| DomainError::Workspace {
                message: format!("failed to read {}: {}", first.display(), e),
            })
    }
}

// ============================================================================
// Extension points
// ============================================================================

/// Contributes extra text to feedback messages
pub trait MessageProvider: Send + Sync {
    fn build_started_message(&self, _build: &BuildRef) -> Option<String> {
        None
    }

    fn build_completed_message(&self, _build: &BuildRef) -> Option<String> {
        None
    }
}

/// Observes the lifecycle of an event's builds
pub trait EventLifecycleListener: Send + Sync {
    fn project_triggered(&self, _event: &ReviewEvent, _job: &JobName) {}

    fn build_started(&self, _event: &ReviewEvent, _build: &BuildRef) {}

    fn build_completed(&self, _event: &ReviewEvent, _build: &BuildRef, _result: BuildResult) {}

    fn all_builds_completed(&self, _event: &ReviewEvent) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Started,
    Completed,
}

/// Told about every command handed to the transport
pub trait FeedbackObserver: Send + Sync {
    fn feedback_sent(&self, server: &ServerName, kind: FeedbackKind, command: &str);
}

// ============================================================================
// Command transport
// ============================================================================

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Review server {server} unreachable: {message}")]
    Unreachable { server: ServerName, message: String },

    #[error("Review server {server} rejected command: {message}")]
    Rejected { server: ServerName, message: String },
}

/// Sends a literal command to a review server
#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn send_command(
        &self,
        server: &ServerName,
        command: &str,
    ) -> std::result::Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "BRANCH" => Some("main".to_string()),
            "N" => Some("7".to_string()),
            _ => None,
        }
    }

    #[rstest]
    #[case("on $BRANCH now", "on main now")]
    #[case("${BRANCH}-${N}", "main-7")]
    #[case("$UNKNOWN and ${ALSO}", "$UNKNOWN and ${ALSO}")]
    #[case("cost: $ 5", "cost: $ 5")]
    #[case("open ${BRANCH", "open ${BRANCH")]
    #[case("trailing $", "trailing $")]
    fn test_expand_variables(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(expand_variables(input, lookup), expected);
    }

    #[test]
    fn test_build_environments_prefer_build_vars() {
        let envs = BuildEnvironments::new(HashMap::from([
            ("SITE".to_string(), "ci".to_string()),
            ("MODE".to_string(), "global".to_string()),
        ]));
        let mut run = BuildRun::new(BuildRef::new("verify", 3), vec![]);
        run.environment.insert("MODE".to_string(), "local".to_string());
        envs.record(&run);

        let expanded = envs
            .expand(&run.build, "$SITE/$MODE/$JOB_NAME/$BUILD_NUMBER")
            .unwrap();
        assert_eq!(expanded, "ci/local/verify/3");

        envs.release(&run.build);
        assert_eq!(envs.tracked_builds(), 0);
        assert_eq!(envs.expand(&run.build, "$MODE").unwrap(), "global");
    }

    #[test]
    fn test_release_job_drops_only_that_job() {
        let envs = BuildEnvironments::new(HashMap::new());
        envs.record(&BuildRun::new(BuildRef::new("verify", 3), vec![]));
        envs.record(&BuildRun::new(BuildRef::new("verify", 4), vec![]));
        envs.record(&BuildRun::new(BuildRef::new("lint", 1), vec![]));

        envs.release_job(&JobName::from("verify"));
        assert_eq!(envs.tracked_builds(), 1);
    }

    #[test]
    fn test_workspace_reader_reads_first_match() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("out")).unwrap();
        let mut b = std::fs::File::create(dir.path().join("out/b.txt")).unwrap();
        writeln!(b, "second").unwrap();
        let mut a = std::fs::File::create(dir.path().join("out/a.txt")).unwrap();
        writeln!(a, "first").unwrap();

        let content = FsWorkspaceReader
            .read_first_match(dir.path(), "out/*.txt")
            .unwrap();
        assert_eq!(content.as_deref(), Some("first\n"));

        let none = FsWorkspaceReader
            .read_first_match(dir.path(), "missing/*.log")
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_workspace_reader_rejects_bad_pattern() {
        let dir = tempfile::tempdir().unwrap();
        let result = FsWorkspaceReader.read_first_match(dir.path(), "[");
        assert!(matches!(result, Err(DomainError::Workspace { .. })));
    }
}
