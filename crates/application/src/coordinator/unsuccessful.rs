//! Explanation text a failed build leaves in its workspace

use std::sync::Arc;
use tally_domain::{BuildRun, EnvironmentExpander, JobPolicy, Result, WorkspaceReader};

/// Content of the first workspace file matching the job's configured
/// pattern, with both pattern and content expanded in the build's
/// environment. `None` when nothing is configured or nothing matches.
pub fn read_unsuccessful_message(
    run: &BuildRun,
    policy: &JobPolicy,
    environment: &Arc<dyn EnvironmentExpander>,
    reader: &Arc<dyn WorkspaceReader>,
) -> Result<Option<String>> {
    let Some(pattern) = policy.unsuccessful_filepath() else {
        return Ok(None);
    };
    let Some(workspace) = run.workspace.as_deref() else {
        return Ok(None);
    };

    let pattern = environment.expand(&run.build, pattern)?;
    match reader.read_first_match(workspace, &pattern)? {
        Some(content) => Ok(Some(environment.expand(&run.build, &content)?)),
        None => Ok(None),
    }
}
