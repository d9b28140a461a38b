//! Pull from a remote, optionally reporting progress.

use std::path::Path;

use crate::auth::{env_for_authentication, expected_authentication_errors, git_network_arguments, Account};
use crate::error::{Error, GitCommandError, Result};
use crate::exec::{git, git_with_progress, ExecutionOptions};
use crate::progress::{
    is_forwardable_context, GitProgress, StepProgressParser, TransferKind, TransferProgress,
    PULL_STEPS,
};

/// Pull from the given remote.
///
/// Providing `on_progress` enables `--progress` on the command line; the
/// callback then receives a synthetic 0% event before the operation starts
/// and a monotonic stream of [`TransferProgress`] updates while it runs.
/// The callback runs on the output read loop and must not block.
///
/// A recognized git error (conflicts, rejected push targets, failed
/// authentication, ...) surfaces as [`Error::Command`] carrying the
/// classified result.
pub async fn pull(
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
            let title = format!("Pulling {remote}");
            let kind = TransferKind::Pull;

            // Initial progress, so observers always see a starting state.
            on_progress(TransferProgress {
                kind,
                title: title.clone(),
                description: String::new(),
                value: 0.0,
                remote: remote.to_string(),
            });

            let args = [flag, value, "pull", "--progress", remote];
            let mut parser = StepProgressParser::new(PULL_STEPS);
            let result = git_with_progress(&args, repository, "pull", options, |line| {
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
            let args = [flag, value, "pull", remote];
            let result = git(&args, repository, "pull", options).await?;
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
