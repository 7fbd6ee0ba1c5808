use crate::common::command::{
    commit_all, init_repository_dir, repository_dir, resolve, run_graft_command, stdout_of,
};
use crate::common::file::{FileSpec, read_file, write_file};
use assert_fs::TempDir;
use predicates::prelude::predicate;
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::path::Path;

mod common;

/// An empty repository at `upstream` registered as `origin` of `local`,
/// with `local`'s master pushed to it.
fn publish(local: &Path, upstream: &Path) {
    run_graft_command(upstream, &["init"]).assert().success();
    let url = upstream.canonicalize().unwrap().display().to_string();
    run_graft_command(local, &["remote", "add", "origin", &url])
        .assert()
        .success();

    run_graft_command(local, &["push", "origin", "master"])
        .assert()
        .success()
        .stdout(predicate::str::contains(" * [new branch]      master -> master"));
}

/// A commit made directly in `upstream` on top of what was pushed there.
fn commit_upstream(upstream: &Path, file: &str, content: &str) {
    run_graft_command(upstream, &["reset", "--hard"]).assert().success();
    write_file(FileSpec::new(upstream.join(file), content.to_string()));
    commit_all(upstream, "Upstream work");
}

#[rstest]
fn push_publishes_history(init_repository_dir: TempDir, repository_dir: TempDir) {
    let local = init_repository_dir.path();
    let upstream = repository_dir.path();

    publish(local, upstream);

    assert_eq!(resolve(upstream, "master"), resolve(local, "master"));
    assert_eq!(resolve(local, "origin/master"), resolve(local, "master"));
    run_graft_command(local, &["push"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Everything up-to-date"));
}

#[rstest]
fn fetch_then_merge_picks_up_upstream_work(init_repository_dir: TempDir, repository_dir: TempDir) {
    let local = init_repository_dir.path();
    let upstream = repository_dir.path();
    publish(local, upstream);
    let before = resolve(local, "master");
    commit_upstream(upstream, "upstream.txt", "from upstream");
    let after = resolve(upstream, "master");

    let output = stdout_of(local, &["fetch"]);
    assert!(output.starts_with("From "));
    assert!(output.contains(&format!("{}..{}", &before[..7], &after[..7])));
    assert!(output.contains("master -> origin/master"));
    assert_eq!(resolve(local, "origin/master"), after);

    run_graft_command(local, &["merge", "origin/master"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Fast-forward"));
    assert_eq!(read_file(&local.join("upstream.txt")), "from upstream");
    assert_eq!(read_file(&local.join("1.txt")), "one");
}

#[rstest]
fn diverged_push_is_rejected_unless_forced(init_repository_dir: TempDir, repository_dir: TempDir) {
    let local = init_repository_dir.path();
    let upstream = repository_dir.path();
    publish(local, upstream);
    commit_upstream(upstream, "upstream.txt", "from upstream");
    write_file(FileSpec::new(local.join("local.txt"), "from local".to_string()));
    commit_all(local, "Local work");
    let ours = resolve(local, "master");

    run_graft_command(local, &["push"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            " ! [rejected]        master -> master (fetch first)",
        ))
        .stderr(predicate::str::contains("failed to push some refs"));
    assert_ne!(resolve(upstream, "master"), ours);

    run_graft_command(local, &["fetch"]).assert().success();
    run_graft_command(local, &["push"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("(non-fast-forward)"));

    run_graft_command(local, &["push", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(forced update)"));
    assert_eq!(resolve(upstream, "master"), ours);
}

#[rstest]
fn server_can_refuse_non_fast_forwards(init_repository_dir: TempDir, repository_dir: TempDir) {
    let local = init_repository_dir.path();
    let upstream = repository_dir.path();
    publish(local, upstream);
    run_graft_command(upstream, &["config", "receive.deny_non_fast_forwards", "true"])
        .assert()
        .success();
    commit_upstream(upstream, "upstream.txt", "from upstream");
    let theirs = resolve(upstream, "master");
    write_file(FileSpec::new(local.join("local.txt"), "from local".to_string()));
    commit_all(local, "Local work");

    run_graft_command(local, &["push", "--force"])
        .assert()
        .failure()
        .stdout(predicate::str::contains(
            " ! [remote rejected] master -> master (non-fast-forward)",
        ));
    assert_eq!(resolve(upstream, "master"), theirs);
}

#[rstest]
fn unknown_remote_is_reported(init_repository_dir: TempDir) {
    run_graft_command(init_repository_dir.path(), &["fetch", "nowhere"])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "'nowhere' does not appear to be a git repository",
        ));
}
