//! Three-way status classification.

mod common;

use common::{init_repo, random_file_name, write_file};
use kit::{Author, FileStatus, StatusEntry};
use pretty_assertions::assert_eq;
use std::path::Path;

fn sample_author() -> Author {
    Author::try_from("S <s@x> 1700000000 +0000").unwrap()
}

fn statuses_for<'r>(report: &'r [StatusEntry], path: &str) -> Vec<FileStatus> {
    report
        .iter()
        .filter(|entry| entry.path == Path::new(path))
        .map(|entry| entry.status)
        .collect()
}

#[test]
fn clean_repository_reports_nothing() {
    let (dir, mut repo) = init_repo();
    write_file(dir.path(), "a.txt", b"hello\n");
    repo.add(&["a.txt"]).unwrap();
    repo.commit("clean", sample_author()).unwrap();

    assert_eq!(repo.status().unwrap(), vec![]);
}

#[test]
fn untracked_files_are_reported_without_an_oid() {
    let (dir, mut repo) = init_repo();
    write_file(dir.path(), "tracked.txt", b"in\n");
    repo.add(&["tracked.txt"]).unwrap();
    let loose_name = random_file_name();
    write_file(dir.path(), &loose_name, b"out\n");
    write_file(dir.path(), "dir/nested.txt", b"out too\n");

    let report = repo.status().unwrap();

    assert_eq!(
        statuses_for(&report, &loose_name),
        vec![FileStatus::Untracked]
    );
    assert_eq!(
        statuses_for(&report, "dir/nested.txt"),
        vec![FileStatus::Untracked]
    );
    let loose = report
        .iter()
        .find(|entry| entry.path == Path::new(&loose_name))
        .unwrap();
    assert_eq!(loose.oid, None);
}

#[test]
fn workspace_edits_show_as_modified() {
    let (dir, mut repo) = init_repo();
    write_file(dir.path(), "a.txt", b"before\n");
    repo.add(&["a.txt"]).unwrap();
    repo.commit("base", sample_author()).unwrap();

    write_file(dir.path(), "a.txt", b"after!\n");

    let report = repo.status().unwrap();
    assert!(statuses_for(&report, "a.txt").contains(&FileStatus::Modified));
}

#[test]
fn same_size_edits_are_still_caught_by_hashing() {
    let (dir, mut repo) = init_repo();
    write_file(dir.path(), "a.txt", b"aaaa\n");
    repo.add(&["a.txt"]).unwrap();
    repo.commit("base", sample_author()).unwrap();

    // same byte length, different content
    write_file(dir.path(), "a.txt", b"bbbb\n");

    let report = repo.status().unwrap();
    assert!(statuses_for(&report, "a.txt").contains(&FileStatus::Modified));
}

#[test]
fn deleted_working_files_show_as_removed() {
    let (dir, mut repo) = init_repo();
    write_file(dir.path(), "gone.txt", b"bye\n");
    repo.add(&["gone.txt"]).unwrap();

    std::fs::remove_file(dir.path().join("gone.txt")).unwrap();

    let report = repo.status().unwrap();
    assert!(statuses_for(&report, "gone.txt").contains(&FileStatus::Removed));
}

#[test]
fn staged_changes_compare_against_head() {
    let (dir, mut repo) = init_repo();
    write_file(dir.path(), "kept.txt", b"kept\n");
    write_file(dir.path(), "edited.txt", b"v1\n");
    write_file(dir.path(), "dropped.txt", b"drop\n");
    repo.add(&["kept.txt", "edited.txt", "dropped.txt"]).unwrap();
    repo.commit("base", sample_author()).unwrap();

    write_file(dir.path(), "edited.txt", b"v2\n");
    write_file(dir.path(), "fresh.txt", b"new\n");
    repo.add(&["edited.txt", "fresh.txt"]).unwrap();
    repo.remove(Path::new("dropped.txt")).unwrap();

    let report = repo.status().unwrap();

    assert_eq!(
        statuses_for(&report, "fresh.txt"),
        vec![FileStatus::StagedAdded]
    );
    assert_eq!(
        statuses_for(&report, "edited.txt"),
        vec![FileStatus::StagedModified]
    );
    // still on disk, so it is simultaneously untracked
    assert_eq!(
        statuses_for(&report, "dropped.txt"),
        vec![FileStatus::Untracked, FileStatus::StagedRemoved]
    );
    assert_eq!(statuses_for(&report, "kept.txt"), vec![]);

    // staged_removed entries carry the HEAD-side object name
    let dropped = report
        .iter()
        .find(|entry| entry.path == Path::new("dropped.txt"))
        .unwrap();
    assert!(dropped.oid.is_some());
}

#[test]
fn report_is_sorted_by_path() {
    let (dir, mut repo) = init_repo();
    for name in ["zz.txt", "aa.txt", "mm.txt"] {
        write_file(dir.path(), name, b"u\n");
    }

    let report = repo.status().unwrap();
    let paths: Vec<&Path> = report.iter().map(|entry| entry.path.as_path()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
}

#[test]
fn status_is_stable_across_runs() {
    let (dir, mut repo) = init_repo();
    write_file(dir.path(), "committed.txt", b"c\n");
    repo.add(&["committed.txt"]).unwrap();
    repo.commit("base", sample_author()).unwrap();
    write_file(dir.path(), "committed.txt", b"d\n");
    write_file(dir.path(), "wild.txt", b"w\n");
    write_file(dir.path(), "staged.txt", b"s\n");
    repo.add(&["staged.txt"]).unwrap();

    let first = repo.status().unwrap();
    let second = repo.status().unwrap();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}
