//! berth-git: git subprocess integration for desktop clients.
//!
//! Shells out to the external `git` binary and turns its untyped output
//! into structured results: every invocation goes through [`exec::git`],
//! which captures stdout/stderr/exit code/duration and classifies failures
//! against a fixed signature table. On top of that sit the commit-history
//! parser ([`log`]), the network operations with progress tracking
//! ([`pull`], [`fetch`]) and commit creation ([`commit`]).
//!
//! Errors follow a two-tier model: recognized
//! [`GitErrorKind`](error::GitErrorKind)s a caller opted into come back as
//! values inside [`GitResult`](exec::GitResult) for explicit branching;
//! everything else is fatal and carries the full output and argument
//! vector. No retries happen at this layer.

pub mod auth;
pub mod commit;
pub mod error;
pub mod exec;
pub mod fetch;
pub mod log;
pub mod progress;
pub mod pull;
pub mod telemetry;

pub use auth::{
    env_for_authentication, expected_authentication_errors, git_network_arguments, Account,
};
pub use commit::create_commit;
pub use error::{Error, GitCommandError, GitErrorKind, Result};
pub use exec::{git, git_with_progress, ExecutionOptions, GitResult};
pub use fetch::fetch;
pub use log::{
    get_changed_files, get_commit, get_commits, parse_changed_files, parse_commits, Commit,
    CommitIdentity, FileChange, FileStatus,
};
pub use pull::pull;
pub use progress::{
    GitProgress, ProgressDetails, ProgressStep, StepProgressParser, TransferKind,
    TransferProgress, FETCH_STEPS, PULL_STEPS,
};
pub use telemetry::{init_tracing, LogFormat};
