//! Fetch from a remote, optionally reporting progress.

use std::path::Path;

use crate::auth::{env_for_authentication, expected_authentication_errors, git_network_arguments, Account};
use crate::error::{Error, GitCommandError, Result};
use crate::exec::{git, git_with_progress, ExecutionOptions};
use crate::progress::{
    is_forwardable_context, GitProgress, StepProgressParser, TransferKind, TransferProgress,
    FETCH_STEPS,
};

/// Fetch from the given remote, pruning refs that no longer exist there.
///
/// Progress semantics match [`pull`](crate::pull::pull): the callback
/// enables `--progress`, receives a synthetic 0% event up front, and must
/// not block.
pub async fn fetch(
    repository: &Path,
    account: Option<&Account>,
    remote: &str,
    on_progress: Option<&mut (dyn FnMut(TransferProgress) + Send)>,
) -> Result<()> {
    let options = ExecutionOptions {
        env: env_for_authentication(account),
        expected_errors: expected_authentication_errors(),
        ..Default::default()
    };

    let [flag, value] = git_network_arguments();

    let (result, args) = match on_progress {
        Some(on_progress) => {
            let title = format!("Fetching {remote}");
            let kind = TransferKind::Fetch;

            on_progress(TransferProgress {
                kind,
                title: title.clone(),
                description: String::new(),
                value: 0.0,
                remote: remote.to_string(),
            });

            let args = [flag, value, "fetch", "--progress", "--prune", remote];
            let mut parser = StepProgressParser::new(FETCH_STEPS);
            let result = git_with_progress(&args, repository, "fetch", options, |line| {
                let description = match parser.parse(line) {
                    GitProgress::Step { details, .. } => details.text,
                    GitProgress::Context { text } => {
                        if !is_forwardable_context(&text) {
                            return;
                        }
                        text
                    }
                };

                on_progress(TransferProgress {
                    kind,
                    title: title.clone(),
                    description,
                    value: parser.percent(),
                    remote: remote.to_string(),
                });
            })
            .await?;
            (result, args.to_vec())
        }
        None => {
            let args = [flag, value, "fetch", "--prune", remote];
            let result = git(&args, repository, "fetch", options).await?;
            (result, args.to_vec())
        }
    };

    if result.error_description.is_some() {
        return Err(Error::from(GitCommandError {
            result,
            args: args.into_iter().map(str::to_string).collect(),
        }));
    }

    Ok(())
}
