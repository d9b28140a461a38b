//! Error taxonomy for git invocations.
//!
//! Failed invocations are classified by matching stderr (then stdout)
//! against an ordered table of known failure signatures. Each recognized
//! [`GitErrorKind`] maps 1:1 to a fixed user-facing description. Matching
//! is stringly-typed and brittle across git versions, so it lives entirely
//! behind [`parse_error`]; swapping the strategy for structured output
//! later must not touch callers.

use std::sync::LazyLock;

use regex::Regex;

use crate::exec::GitResult;

/// Recognized, named failure categories for a git invocation.
///
/// Closed enumeration: unrecognized failures carry no kind and surface the
/// raw tool output instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum GitErrorKind {
    AuthenticationFailed,
    RepositoryNotFound,
    NotARepository,
    RemoteDisconnected,
    HostUnreachable,
    MergeConflicts,
    RebaseConflicts,
    NonFastForwardPush,
    ProtectedBranchRejected,
    NothingToCommit,
    BadRevision,
    InvalidSubmoduleReference,
    LockFileExists,
}

impl GitErrorKind {
    /// The fixed user-facing description for this kind.
    pub fn description(self) -> &'static str {
        match self {
            Self::AuthenticationFailed => {
                "Authentication failed. You may not have permission to access the repository."
            }
            Self::RepositoryNotFound => {
                "The repository does not seem to exist anymore. You may not have access, or it may have been deleted or renamed."
            }
            Self::NotARepository => "This is not a git repository.",
            Self::RemoteDisconnected => {
                "The remote disconnected. Check your Internet connection and try again."
            }
            Self::HostUnreachable => {
                "The host is down. Check your Internet connection and try again."
            }
            Self::MergeConflicts => {
                "We found some conflicts while trying to merge. Please resolve the conflicts and commit the changes."
            }
            Self::RebaseConflicts => {
                "We found some conflicts while trying to rebase. Please resolve the conflicts before continuing."
            }
            Self::NonFastForwardPush => {
                "The repository has been updated since you last pulled. Try pulling before pushing."
            }
            Self::ProtectedBranchRejected => {
                "The branch is protected and rejected the push."
            }
            Self::NothingToCommit => "There are no changes to commit.",
            Self::BadRevision => "Bad revision.",
            Self::InvalidSubmoduleReference => {
                "A submodule points to a commit which does not exist."
            }
            Self::LockFileExists => {
                "Another git process seems to be running in this repository. Wait for it to finish and try again."
            }
        }
    }
}

struct Signature {
    pattern: Regex,
    kind: GitErrorKind,
}

impl Signature {
    fn new(pattern: &str, kind: GitErrorKind) -> Self {
        Self {
            pattern: Regex::new(pattern).expect("constant signature pattern is valid"),
            kind,
        }
    }
}

/// Known failure signatures, evaluated in order, first match wins.
///
/// Entries higher in the table are more specific; keep broad catch-alls
/// (like `NotARepository`) below them.
static SIGNATURES: LazyLock<Vec<Signature>> = LazyLock::new(|| {
    use GitErrorKind::*;
    vec![
        Signature::new(r"fatal: Authentication failed", AuthenticationFailed),
        Signature::new(r"Permission denied \(publickey", AuthenticationFailed),
        Signature::new(r"fatal: Could not read from remote repository\.", AuthenticationFailed),
        Signature::new(r"ERROR: Repository not found", RepositoryNotFound),
        Signature::new(r"fatal: repository '.+' not found", RepositoryNotFound),
        Signature::new(r"fatal: [Tt]he remote end hung up unexpectedly", RemoteDisconnected),
        Signature::new(r"Could not resolve host", HostUnreachable),
        Signature::new(r"ssh: connect to host .+ port \d+:", HostUnreachable),
        Signature::new(
            r"Automatic merge failed; fix conflicts and then commit the result",
            MergeConflicts,
        ),
        Signature::new(
            r"Resolve all conflicts manually, mark them as resolved",
            RebaseConflicts,
        ),
        Signature::new(r"\(non-fast-forward\)", NonFastForwardPush),
        Signature::new(
            r"Updates were rejected because the tip of your current branch is behind",
            NonFastForwardPush,
        ),
        Signature::new(r"protected branch hook declined", ProtectedBranchRejected),
        Signature::new(r"nothing to commit", NothingToCommit),
        Signature::new(r"fatal: [Bb]ad revision '", BadRevision),
        Signature::new(
            r"Fetched in submodule path '.+', but it did not contain",
            InvalidSubmoduleReference,
        ),
        Signature::new(r"Unable to create '.*\.lock': File exists", LockFileExists),
        Signature::new(r"fatal: [Nn]ot a git repository", NotARepository),
    ]
});

/// Match tool output against the signature table.
///
/// The single translation point between raw output and [`GitErrorKind`].
/// Returns `None` when no signature matches.
pub fn parse_error(output: &str) -> Option<GitErrorKind> {
    SIGNATURES
        .iter()
        .find(|sig| sig.pattern.is_match(output))
        .map(|sig| sig.kind)
}

/// A git invocation that failed fatally: unrecognized exit code, or a
/// recognized error the caller did not opt into.
///
/// Carries the full classified result and the original argument vector so
/// callers (and logs) can reconstruct exactly what ran.
#[derive(Debug, Clone)]
pub struct GitCommandError {
    /// The classified result of the failed command.
    pub result: GitResult,

    /// The arguments the command ran with.
    pub args: Vec<String>,
}

impl GitCommandError {
    fn message(&self) -> &str {
        if let Some(description) = self.result.error_description {
            description
        } else if !self.result.stderr.is_empty() {
            &self.result.stderr
        } else if !self.result.stdout.is_empty() {
            &self.result.stdout
        } else {
            "Unknown error"
        }
    }
}

impl std::fmt::Display for GitCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for GitCommandError {}

/// berth-git errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fatal invocation failure (boxed: the payload carries full output).
    #[error(transparent)]
    Command(Box<GitCommandError>),

    /// The author identity string did not match the
    /// `name <email> epoch-seconds tz-offset` grammar. Signals a git
    /// version mismatch the caller must not silently ignore.
    #[error("could not parse author identity '{0}'")]
    MalformedAuthorIdentity(String),

    /// A log record did not have the expected five delimited fields.
    #[error("malformed commit record: expected 5 fields, got {fields}")]
    MalformedCommitRecord { fields: usize },

    /// A `--name-status` entry ended mid-record.
    #[error("truncated changed-files record after status '{status}'")]
    TruncatedFileRecord { status: String },

    /// Commit failures get extra context since they may come from a
    /// pre-commit hook rejection.
    #[error("Commit failed - exit code {exit_code} received{}", format_hook_output(.stderr))]
    CommitFailed { exit_code: i32, stderr: String },

    /// Spawning or talking to the git process failed. Deliberately not
    /// distinguished from protocol failures; the raw message is surfaced.
    #[error("failed to run git: {0}")]
    Io(#[from] std::io::Error),
}

impl From<GitCommandError> for Error {
    fn from(err: GitCommandError) -> Self {
        Self::Command(Box::new(err))
    }
}

fn format_hook_output(stderr: &str) -> String {
    let output = stderr.trim();
    if output.is_empty() {
        String::new()
    } else {
        format!(", with output: '{output}'")
    }
}

/// Result type for berth-git operations.
pub type Result<T> = std::result::Result<T, Error>;
