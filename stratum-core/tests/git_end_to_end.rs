//! End-to-end: index a real git repository through the subprocess source.

use std::fs;
use std::path::Path;
use std::process::Command;

use stratum_core::{search, GitRepo, Indexer, SqliteStore, TreeSitterExtractor};
use tempfile::TempDir;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args([
            "-c",
            "user.name=stratum-test",
            "-c",
            "user.email=stratum-test@example.com",
        ])
        .args(args)
        .current_dir(dir)
        .status()
        .expect("failed to spawn git");
    assert!(status.success(), "git {:?} failed", args);
}

fn rev_parse(dir: &Path, rev: &str) -> String {
    let output = Command::new("git")
        .args(["rev-parse", rev])
        .current_dir(dir)
        .output()
        .expect("failed to spawn git");
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn test_index_and_search_a_real_repository() {
    if !git_available() {
        eprintln!("git not available, skipping");
        return;
    }

    let dir = TempDir::new().unwrap();
    let root = dir.path();
    git(root, &["init", "-q"]);

    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(
        root.join("src/lib.rs"),
        "pub fn alpha() {}\npub struct Beta;\n",
    )
    .unwrap();
    fs::write(root.join("notes.py"), "def first():\n    pass\n").unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "one"]);

    fs::write(
        root.join("src/lib.rs"),
        "pub fn gamma() {}\npub struct Beta;\n",
    )
    .unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "two"]);

    git(root, &["rm", "-q", "notes.py"]);
    git(root, &["commit", "-q", "-m", "three"]);

    let repo = GitRepo::open(root);
    let head = repo.head().unwrap();
    let extractor = TreeSitterExtractor::default();
    let mut store = SqliteStore::open_in_memory().unwrap();

    let stats = Indexer::new(&repo, &extractor)
        .run(&mut store, &head)
        .unwrap();
    assert_eq!(stats.commits_indexed, 3);

    // Tip state: gamma exists, alpha was overwritten, notes.py is gone.
    let gamma = search(&store, &head, Some("gamma")).unwrap();
    assert_eq!(gamma.len(), 1);
    assert_eq!(gamma[0].path, "src/lib.rs");
    assert!(search(&store, &head, Some("alpha")).unwrap().is_empty());
    assert!(search(&store, &head, Some("first")).unwrap().is_empty());

    // Past states stay queryable.
    let first_commit = rev_parse(root, "HEAD~2");
    let alpha = search(&store, &first_commit, Some("alpha")).unwrap();
    assert_eq!(alpha.len(), 1);
    let notes = search(&store, &first_commit, Some("first")).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].path, "notes.py");

    let second_commit = rev_parse(root, "HEAD~1");
    assert!(search(&store, &second_commit, Some("alpha"))
        .unwrap()
        .is_empty());
    assert_eq!(
        search(&store, &second_commit, None).unwrap().len(),
        2,
        "lib.rs and notes.py visible before the delete"
    );

    // A second pass over the same tip resumes cleanly and changes nothing.
    let again = Indexer::new(&repo, &extractor)
        .run(&mut store, &head)
        .unwrap();
    assert_eq!(again.commits_indexed, 0);

    // Extending the history indexes only the new commit.
    fs::write(root.join("src/extra.rs"), "pub fn delta() {}\n").unwrap();
    git(root, &["add", "-A"]);
    git(root, &["commit", "-q", "-m", "four"]);
    let new_head = repo.head().unwrap();

    let extended = Indexer::new(&repo, &extractor)
        .run(&mut store, &new_head)
        .unwrap();
    assert_eq!(extended.commits_indexed, 1);
    assert_eq!(
        search(&store, &new_head, Some("delta")).unwrap()[0].path,
        "src/extra.rs"
    );
}
