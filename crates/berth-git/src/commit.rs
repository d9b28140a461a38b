//! Creating commits.

use std::path::Path;

use crate::error::{Error, Result};
use crate::exec::{git, ExecutionOptions};

/// Create a commit from whatever is currently staged, reading the message
/// from stdin (`commit -F -`) so it may contain anything.
///
/// Staging is the caller's concern. Failures are wrapped as
/// [`Error::CommitFailed`] with the hook output preserved, since rejections
/// commonly come from a pre-commit hook and deserve more context than a
/// bare exit code.
pub async fn create_commit(repository: &Path, message: &str) -> Result<()> {
    let options = ExecutionOptions {
        stdin: Some(message.to_string()),
        ..Default::default()
    };

    match git(&["commit", "-F", "-"], repository, "create_commit", options).await {
        Ok(_) => Ok(()),
        Err(Error::Command(inner)) => Err(Error::CommitFailed {
            exit_code: inner.result.exit_code,
            stderr: inner.result.stderr.trim().to_string(),
        }),
        Err(other) => Err(other),
    }
}
