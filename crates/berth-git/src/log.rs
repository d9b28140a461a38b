//! Commit history queries and their wire-format parsers.
//!
//! History output uses a single-byte field delimiter (`0x1F`, guaranteed
//! absent from commit metadata) and NUL as the record separator, so records
//! are split positionally rather than with a regex: summaries and bodies
//! may contain anything except the reserved bytes.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, TimeZone};
use regex::Regex;

use crate::error::{Error, Result};
use crate::exec::{git, ExecutionOptions};

/// The field delimiter inside one commit record.
const FIELD_DELIMITER: char = '\u{1f}';

/// The record separator between commits (`log -z`).
const RECORD_SEPARATOR: char = '\0';

/// Exit code signalling an unborn HEAD (a repository with no commits yet).
const UNBORN_HEAD_EXIT_CODE: i32 = 128;

/// A commit author or committer identity.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
    pub timestamp: DateTime<FixedOffset>,
}

static IDENTITY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // name <email> epoch-seconds tz-offset, matching GIT_AUTHOR_IDENT
    // under `--date=raw`.
    Regex::new(r"^(.*?) <(.*?)> (\d+) ([+-])(\d{2})(\d{2})$")
        .expect("constant identity pattern is valid")
});

impl CommitIdentity {
    /// Parse an identity string of the form
    /// `Jane Doe <jane@example.com> 1600000000 +0200`.
    ///
    /// A failure here means the tool emitted a format this version of the
    /// parser does not understand, which callers must not silently ignore.
    pub fn parse(identity: &str) -> Result<Self> {
        let captures = IDENTITY_PATTERN
            .captures(identity)
            .ok_or_else(|| Error::MalformedAuthorIdentity(identity.to_string()))?;

        let name = captures[1].to_string();
        let email = captures[2].to_string();
        let seconds: i64 = captures[3]
            .parse()
            .map_err(|_| Error::MalformedAuthorIdentity(identity.to_string()))?;

        let hours: i32 = captures[5]
            .parse()
            .map_err(|_| Error::MalformedAuthorIdentity(identity.to_string()))?;
        let minutes: i32 = captures[6]
            .parse()
            .map_err(|_| Error::MalformedAuthorIdentity(identity.to_string()))?;
        let mut offset_seconds = (hours * 60 + minutes) * 60;
        if &captures[4] == "-" {
            offset_seconds = -offset_seconds;
        }

        let offset = FixedOffset::east_opt(offset_seconds)
            .ok_or_else(|| Error::MalformedAuthorIdentity(identity.to_string()))?;
        let timestamp = offset
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::MalformedAuthorIdentity(identity.to_string()))?;

        Ok(Self {
            name,
            email,
            timestamp,
        })
    }
}

/// An immutable commit record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Commit {
    /// The commit id (SHA).
    pub id: String,

    /// The first line of the commit message.
    pub summary: String,

    /// The rest of the commit message.
    pub body: String,

    /// The author identity.
    pub author: CommitIdentity,

    /// Parent commit ids, in order: empty for a root commit, one for an
    /// ordinary commit, two or more for a merge.
    pub parents: Vec<String>,
}

/// The state of a file reported by a changed-files query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FileStatus {
    New,
    Modified,
    Deleted,
    Renamed,
    Copied,
    Conflicted,
}

/// A file changed in a commit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileChange {
    /// The path after the change.
    pub path: String,

    pub status: FileStatus,

    /// The previous path, present only for renames and copies.
    pub old_path: Option<String>,
}

fn map_status(status: &str) -> FileStatus {
    if status.starts_with('R') {
        return FileStatus::Renamed;
    }
    if status.starts_with('C') {
        return FileStatus::Copied;
    }
    match status {
        "A" => FileStatus::New,
        "D" => FileStatus::Deleted,
        "U" => FileStatus::Conflicted,
        // "M", plus anything a newer git might emit.
        _ => FileStatus::Modified,
    }
}

/// Parse raw `git log` output produced with the berth pretty format into
/// ordered commit records.
pub fn parse_commits(stdout: &str) -> Result<Vec<Commit>> {
    let mut records: Vec<&str> = stdout.split(RECORD_SEPARATOR).collect();
    // Drop the trailing empty record after the final separator.
    if records.last() == Some(&"") {
        records.pop();
    }

    records
        .into_iter()
        .map(|record| {
            let pieces: Vec<&str> = record.split(FIELD_DELIMITER).collect();
            if pieces.len() != 5 {
                return Err(Error::MalformedCommitRecord {
                    fields: pieces.len(),
                });
            }

            let author = CommitIdentity::parse(pieces[3])?;
            let parents = if pieces[4].is_empty() {
                Vec::new()
            } else {
                pieces[4].split(' ').map(str::to_string).collect()
            };

            Ok(Commit {
                id: pieces[0].to_string(),
                summary: pieces[1].to_string(),
                body: pieces[2].to_string(),
                author,
                parents,
            })
        })
        .collect()
}

/// Get the repository's commits for `revision_range`, newest first,
/// limited to `limit`.
///
/// An unborn HEAD yields an empty history rather than an error.
pub async fn get_commits(
    repository: &Path,
    revision_range: &str,
    limit: u32,
) -> Result<Vec<Commit>> {
    let pretty_format = [
        "%H", // SHA
        "%s", // summary
        "%b", // body
        // author identity, date raw: name <email> seconds offset
        "%an <%ae> %ad",
        "%P", // parent SHAs
    ]
    .join("%x1f");

    let max_count = format!("--max-count={limit}");
    let pretty = format!("--pretty={pretty_format}");
    let args = [
        "log",
        revision_range,
        "--date=raw",
        &max_count,
        &pretty,
        "-z",
        "--no-color",
    ];

    let options = ExecutionOptions {
        success_exit_codes: HashSet::from([0, UNBORN_HEAD_EXIT_CODE]),
        ..Default::default()
    };
    let result = git(&args, repository, "get_commits", options).await?;

    if result.exit_code == UNBORN_HEAD_EXIT_CODE {
        return Ok(Vec::new());
    }

    parse_commits(&result.stdout)
}

/// Get the commit for the given ref, or `None` if it has no history.
pub async fn get_commit(repository: &Path, reference: &str) -> Result<Option<Commit>> {
    let mut commits = get_commits(repository, reference, 1).await?;
    if commits.is_empty() {
        Ok(None)
    } else {
        Ok(Some(commits.remove(0)))
    }
}

/// Parse NUL-separated `--name-status -z` output into file changes.
///
/// Each entry is a status code, then exactly one old-path entry iff the
/// status is a rename or copy, then the new path. The tokenizer consumes
/// exactly the entries the status code implies.
pub fn parse_changed_files(stdout: &str) -> Result<Vec<FileChange>> {
    let mut entries: Vec<&str> = stdout.split(RECORD_SEPARATOR).collect();
    if entries.last() == Some(&"") {
        entries.pop();
    }

    let mut files = Vec::new();
    let mut tokens = entries.into_iter();
    while let Some(status_text) = tokens.next() {
        let status = map_status(status_text);

        let old_path = if matches!(status, FileStatus::Renamed | FileStatus::Copied) {
            Some(
                tokens
                    .next()
                    .ok_or_else(|| Error::TruncatedFileRecord {
                        status: status_text.to_string(),
                    })?
                    .to_string(),
            )
        } else {
            None
        };

        let path = tokens
            .next()
            .ok_or_else(|| Error::TruncatedFileRecord {
                status: status_text.to_string(),
            })?
            .to_string();

        files.push(FileChange {
            path,
            status,
            old_path,
        });
    }

    Ok(files)
}

/// Get the files that were changed in the given commit.
pub async fn get_changed_files(repository: &Path, sha: &str) -> Result<Vec<FileChange>> {
    // Opt in to rename (-M) and copy (-C) detection. Order matters: -C
    // before -M, or copies are not detected.
    let args = [
        "log",
        sha,
        "-C",
        "-M",
        "-m",
        "-1",
        "--first-parent",
        "--name-status",
        "--format=format:",
        "-z",
    ];
    let result = git(&args, repository, "get_changed_files", ExecutionOptions::default()).await?;

    parse_changed_files(&result.stdout)
}
