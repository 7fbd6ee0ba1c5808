use crate::common::file::{FileSpec, write_file};
use assert_cmd::Command;
use assert_fs::TempDir;
use rstest::fixture;
use std::path::Path;

const AUTHOR_NAME: &str = "fake_user";
const AUTHOR_EMAIL: &str = "fake_email@email.com";
const AUTHOR_DATE: &str = "2023-01-01 12:00:00 +0000";

#[fixture]
pub fn repository_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp dir")
}

/// A repository with one commit holding `1.txt`, `a/2.txt` and `a/b/3.txt`.
#[fixture]
pub fn init_repository_dir(repository_dir: TempDir) -> TempDir {
    run_graft_command(repository_dir.path(), &["init"])
        .assert()
        .success();

    write_file(FileSpec::new(repository_dir.path().join("1.txt"), "one".to_string()));
    write_file(FileSpec::new(
        repository_dir.path().join("a").join("2.txt"),
        "two".to_string(),
    ));
    write_file(FileSpec::new(
        repository_dir.path().join("a").join("b").join("3.txt"),
        "three".to_string(),
    ));

    run_graft_command(repository_dir.path(), &["add", "."])
        .assert()
        .success();
    graft_commit(repository_dir.path(), "Initial commit")
        .assert()
        .success();

    repository_dir
}

pub fn run_graft_command(dir: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::cargo_bin("graft").expect("Failed to find graft binary");
    cmd.current_dir(dir);
    cmd.envs(vec![
        ("GIT_AUTHOR_NAME", AUTHOR_NAME),
        ("GIT_AUTHOR_EMAIL", AUTHOR_EMAIL),
        ("GIT_AUTHOR_DATE", AUTHOR_DATE),
        ("NO_COLOR", "1"),
    ]);
    cmd.env_remove("GRAFT_LOG");
    for arg in args {
        cmd.arg(arg);
    }
    cmd
}

pub fn graft_commit(dir: &Path, message: &str) -> Command {
    run_graft_command(dir, &["commit", "-m", message])
}

/// Stage everything and commit it.
pub fn commit_all(dir: &Path, message: &str) {
    run_graft_command(dir, &["add", "."]).assert().success();
    graft_commit(dir, message).assert().success();
}

pub fn stdout_of(dir: &Path, args: &[&str]) -> String {
    let output = run_graft_command(dir, args).assert().success();
    String::from_utf8(output.get_output().stdout.clone()).expect("stdout is not UTF-8")
}

/// The full id HEAD resolves to.
pub fn head_oid(dir: &Path) -> String {
    resolve(dir, "HEAD")
}

/// The full id `revision` resolves to, read with `merge-base`.
pub fn resolve(dir: &Path, revision: &str) -> String {
    stdout_of(dir, &["merge-base", revision, revision]).trim().to_string()
}
