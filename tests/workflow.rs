use crate::common::command::{
    commit_all, graft_commit, init_repository_dir, repository_dir, run_graft_command, stdout_of,
};
use crate::common::file::{FileSpec, delete_path, write_file, write_generated_files};
use assert_fs::TempDir;
use predicates::prelude::predicate;
use pretty_assertions::assert_eq;
use rstest::rstest;

mod common;

#[rstest]
fn init_creates_the_git_directory(repository_dir: TempDir) -> Result<(), Box<dyn std::error::Error>> {
    let git_dir = repository_dir.path().canonicalize()?.join(".git");

    run_graft_command(repository_dir.path(), &["init"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Initialized empty Graft repository in"))
        .stdout(predicate::str::contains(git_dir.display().to_string()));

    assert!(git_dir.join("objects").is_dir());
    assert!(git_dir.join("refs/heads").is_dir());
    assert_eq!(std::fs::read_to_string(git_dir.join("HEAD"))?, "ref: refs/heads/master\n");

    Ok(())
}

#[rstest]
fn first_commit_is_a_root_commit(repository_dir: TempDir) {
    let dir = repository_dir.path();
    run_graft_command(dir, &["init"]).assert().success();
    write_generated_files(dir, 3);
    run_graft_command(dir, &["add", "."]).assert().success();

    graft_commit(dir, "Initial commit")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\[master \(root-commit\) [0-9a-f]{7}\] Initial commit\n$").unwrap());
}

#[rstest]
fn status_reports_every_kind_of_change(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    write_file(FileSpec::new(dir.join("1.txt"), "changed".to_string()));
    delete_path(&dir.join("a").join("2.txt"));
    write_file(FileSpec::new(dir.join("new.txt"), "new".to_string()));
    write_file(FileSpec::new(dir.join("staged.txt"), "staged".to_string()));
    run_graft_command(dir, &["add", "staged.txt"]).assert().success();

    assert_eq!(
        stdout_of(dir, &["status", "--porcelain"]),
        " M 1.txt\n D a/2.txt\nA  staged.txt\n?? new.txt\n"
    );
}

#[rstest]
fn nothing_to_report_after_commit(init_repository_dir: TempDir) {
    assert_eq!(stdout_of(init_repository_dir.path(), &["status", "--porcelain"]), "");
}

#[rstest]
fn diff_shows_unstaged_then_staged_changes(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    write_file(FileSpec::new(dir.join("1.txt"), "uno\n".to_string()));

    let unstaged = stdout_of(dir, &["diff"]);
    assert!(unstaged.starts_with("diff --git a/1.txt b/1.txt\n"));
    assert!(unstaged.contains("--- a/1.txt\n+++ b/1.txt\n"));
    assert!(unstaged.contains("-one\n"));
    assert!(unstaged.contains("+uno\n"));

    run_graft_command(dir, &["add", "1.txt"]).assert().success();
    assert_eq!(stdout_of(dir, &["diff"]), "");
    assert_eq!(stdout_of(dir, &["diff", "--cached"]), unstaged);
}

#[rstest]
fn log_lists_commits_newest_first(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    write_file(FileSpec::new(dir.join("1.txt"), "second".to_string()));
    commit_all(dir, "Second commit");

    let log = stdout_of(dir, &["log", "--oneline"]);
    let titles = log
        .lines()
        .map(|line| line.split_once(' ').map(|(_, rest)| rest).unwrap_or(line))
        .collect::<Vec<_>>();

    assert_eq!(titles.len(), 2);
    assert!(titles[0].ends_with("Second commit"));
    assert!(titles[1].ends_with("Initial commit"));
}

fn commit_dated(dir: &std::path::Path, file: &str, message: &str, date: &str) {
    write_file(FileSpec::new(dir.join(file), message.to_string()));
    run_graft_command(dir, &["add", file]).assert().success();
    run_graft_command(dir, &["commit", "-m", message])
        .env("GIT_AUTHOR_DATE", date)
        .assert()
        .success();
}

#[rstest]
fn log_keeps_children_ahead_of_a_skewed_parent(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    commit_dated(dir, "x.txt", "fork point", "2023-01-05 12:00:00 +0000");
    run_graft_command(dir, &["branch", "create", "topic"]).assert().success();
    commit_dated(dir, "a.txt", "later child", "2023-01-10 12:00:00 +0000");
    run_graft_command(dir, &["checkout", "topic"]).assert().success();
    commit_dated(dir, "b.txt", "earlier child", "2023-01-02 12:00:00 +0000");

    let log = stdout_of(dir, &["log", "--oneline", "master", "topic"]);
    let titles = log
        .lines()
        .map(|line| line.rsplit_once(") ").map(|(_, rest)| rest).unwrap_or(&line[8..]))
        .collect::<Vec<_>>();

    assert_eq!(titles, vec!["later child", "earlier child", "fork point", "Initial commit"]);
}

#[rstest]
fn log_patch_shows_what_each_commit_changed(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    write_file(FileSpec::new(dir.join("1.txt"), "uno\n".to_string()));
    commit_all(dir, "Translate");

    let log = stdout_of(dir, &["log", "-p", "--oneline"]);
    let lines = log.lines().collect::<Vec<_>>();

    assert!(lines[0].ends_with(" Translate"));
    assert_eq!(lines[1], "diff --git a/1.txt b/1.txt");
    assert!(log.contains("-one\n+uno\n"));
    assert!(log.contains(" Initial commit\ndiff --git a/1.txt b/1.txt\nnew file mode 100644\n"));
    assert!(log.contains("+++ b/a/b/3.txt\n"));
}

#[rstest]
fn rm_untracks_and_deletes(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();

    run_graft_command(dir, &["rm", "--cached", "1.txt"]).assert().success();
    assert!(dir.join("1.txt").exists());
    assert_eq!(
        stdout_of(dir, &["status", "--porcelain"]),
        "D  1.txt\n?? 1.txt\n"
    );

    run_graft_command(dir, &["rm", "a/2.txt"]).assert().success();
    assert!(!dir.join("a").join("2.txt").exists());
}

#[rstest]
fn branches_and_checkout(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    run_graft_command(dir, &["branch", "create", "topic"]).assert().success();
    run_graft_command(dir, &["checkout", "topic"]).assert().success();
    write_file(FileSpec::new(dir.join("topic.txt"), "topic".to_string()));
    commit_all(dir, "Topic work");

    run_graft_command(dir, &["checkout", "master"]).assert().success();
    assert!(!dir.join("topic.txt").exists());

    let branches = stdout_of(dir, &["branch", "list"]);
    assert!(branches.contains("* master"));
    assert!(branches.contains("  topic"));
}

#[rstest]
fn checkout_refuses_to_overwrite_local_changes(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    run_graft_command(dir, &["branch", "create", "topic"]).assert().success();
    write_file(FileSpec::new(dir.join("1.txt"), "on master".to_string()));
    commit_all(dir, "Master change");
    run_graft_command(dir, &["checkout", "topic"]).assert().success();
    write_file(FileSpec::new(dir.join("1.txt"), "local edit".to_string()));

    run_graft_command(dir, &["checkout", "master"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("1.txt"))
        .stderr(predicate::str::contains("Aborting"));
}

#[rstest]
fn config_round_trip(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();

    run_graft_command(dir, &["config", "user.name", "Ada"]).assert().success();
    assert_eq!(stdout_of(dir, &["config", "user.name"]), "Ada\n");

    run_graft_command(dir, &["config", "--unset", "user.name"]).assert().success();
    run_graft_command(dir, &["config", "user.name"]).assert().failure();
}

#[rstest]
fn same_size_edits_are_detected(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    let path = dir.join("1.txt");
    write_file(FileSpec::new(path.clone(), "uno".to_string()));
    filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(2_000_000_000, 0)).unwrap();

    assert_eq!(stdout_of(dir, &["status", "--porcelain"]), " M 1.txt\n");
}

#[rstest]
fn touched_files_are_not_reported(init_repository_dir: TempDir) {
    let dir = init_repository_dir.path();
    filetime::set_file_mtime(
        dir.join("1.txt"),
        filetime::FileTime::from_unix_time(2_000_000_000, 0),
    )
    .unwrap();

    assert_eq!(stdout_of(dir, &["status", "--porcelain"]), "");
}
