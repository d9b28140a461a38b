//! Integration tests against real temporary git repositories.

use std::path::Path;
use std::process::Command;

use berth_git::{
    create_commit, fetch, get_changed_files, get_commit, get_commits, pull, Error, ExecutionOptions,
    FileStatus, TransferProgress,
};

fn run_git(repo_dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

fn make_git_repo() -> tempfile::TempDir {
    berth_git::init_tracing(berth_git::LogFormat::Text, tracing::Level::DEBUG);
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
    dir
}

#[tokio::test]
async fn commit_then_log_round_trips() {
    let repo = make_git_repo();

    std::fs::write(repo.path().join("file.txt"), "contents\n").unwrap();
    run_git(repo.path(), &["add", "file.txt"]);
    create_commit(repo.path(), "add a file\n\nwith a body line")
        .await
        .unwrap();

    let commits = get_commits(repo.path(), "HEAD", 10).await.unwrap();
    assert_eq!(commits.len(), 2);

    let head = &commits[0];
    assert_eq!(head.summary, "add a file");
    assert_eq!(head.body.trim(), "with a body line");
    assert_eq!(head.author.name, "test-user");
    assert_eq!(head.author.email, "test@example.com");
    assert_eq!(head.parents, vec![commits[1].id.clone()]);
    assert!(commits[1].parents.is_empty(), "first commit is a root");
}

#[tokio::test]
async fn get_commit_returns_head() {
    let repo = make_git_repo();
    let commit = get_commit(repo.path(), "HEAD").await.unwrap().unwrap();
    assert_eq!(commit.summary, "initial");
    assert_eq!(commit.id.len(), 40);
}

#[tokio::test]
async fn unborn_head_yields_empty_history() {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init"]);

    let commits = get_commits(dir.path(), "HEAD", 10).await.unwrap();
    assert!(commits.is_empty());
}

#[tokio::test]
async fn changed_files_reports_renames_with_old_path() {
    let repo = make_git_repo();

    std::fs::write(repo.path().join("original.txt"), "stable contents\n").unwrap();
    run_git(repo.path(), &["add", "original.txt"]);
    run_git(repo.path(), &["commit", "-m", "add original"]);

    run_git(repo.path(), &["mv", "original.txt", "renamed.txt"]);
    run_git(repo.path(), &["commit", "-m", "rename it"]);

    let head = get_commit(repo.path(), "HEAD").await.unwrap().unwrap();
    let files = get_changed_files(repo.path(), &head.id).await.unwrap();

    assert_eq!(files.len(), 1);
    assert_eq!(files[0].status, FileStatus::Renamed);
    assert_eq!(files[0].old_path.as_deref(), Some("original.txt"));
    assert_eq!(files[0].path, "renamed.txt");
}

#[tokio::test]
async fn failed_commit_maps_to_commit_failed() {
    let repo = make_git_repo();

    // Nothing staged, so the commit exits non-zero.
    let err = create_commit(repo.path(), "empty").await.unwrap_err();
    assert!(matches!(err, Error::CommitFailed { .. }));
}

#[tokio::test]
async fn log_outside_a_repository_is_fatal_with_raw_message() {
    let dir = tempfile::tempdir().unwrap();

    // Plain default options: exit 128 is not accepted here.
    let err = berth_git::git(&["status"], dir.path(), "status", ExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not a git repository"));
}

fn make_clone(upstream: &Path) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let clone_path = dir.path().join("clone");
    let output = Command::new("git")
        .args([
            "clone",
            upstream.to_str().unwrap(),
            clone_path.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "clone failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    run_git(&clone_path, &["config", "user.name", "clone-user"]);
    run_git(&clone_path, &["config", "user.email", "clone@example.com"]);
    dir
}

#[tokio::test]
async fn pull_fast_forwards_a_local_clone() {
    let upstream = make_git_repo();
    let workdir = make_clone(upstream.path());
    let clone = workdir.path().join("clone");

    run_git(
        upstream.path(),
        &["commit", "--allow-empty", "-m", "upstream change"],
    );

    pull(&clone, None, "origin", None).await.unwrap();

    let head = get_commit(&clone, "HEAD").await.unwrap().unwrap();
    assert_eq!(head.summary, "upstream change");
}

#[tokio::test]
async fn fetch_with_progress_emits_initial_zero_and_stays_monotonic() {
    let upstream = make_git_repo();
    let workdir = make_clone(upstream.path());
    let clone = workdir.path().join("clone");

    run_git(
        upstream.path(),
        &["commit", "--allow-empty", "-m", "to be fetched"],
    );

    let mut events: Vec<TransferProgress> = Vec::new();
    let mut on_progress = |progress: TransferProgress| events.push(progress);
    fetch(&clone, None, "origin", Some(&mut on_progress))
        .await
        .unwrap();

    assert!(!events.is_empty());
    assert_eq!(events[0].value, 0.0, "synthetic initial event comes first");
    assert_eq!(events[0].remote, "origin");
    for pair in events.windows(2) {
        assert!(pair[1].value >= pair[0].value);
    }
}
