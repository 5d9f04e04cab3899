use std::sync::Arc;

use overseer::actions::file_manager::FileManager;
use overseer::actions::ErrorKind;
use overseer::exec::LocalSandbox;
use tempfile::TempDir;

fn setup() -> (FileManager, TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let sandbox = Arc::new(LocalSandbox::new(tmp.path()));
    (FileManager::new(sandbox), tmp)
}

fn abs(tmp: &TempDir, name: &str) -> String {
    tmp.path().join(name).to_str().unwrap().to_string()
}

// ============================================================
// read
// ============================================================

#[tokio::test]
async fn read_numbers_lines_cat_n_style() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "hello.txt");
    std::fs::write(&path, "alpha\nbeta\ngamma\n").unwrap();

    let output = files.read(&path, None, None).await.unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], format!("{:>6}\talpha", 1));
    assert_eq!(lines[2], format!("{:>6}\tgamma", 3));
}

#[tokio::test]
async fn read_honors_offset_and_limit() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "numbers.txt");
    let content: String = (1..=10).map(|i| format!("line {i}\n")).collect();
    std::fs::write(&path, content).unwrap();

    let output = files.read(&path, Some(4), Some(2)).await.unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("line 4"));
    assert!(lines[1].contains("line 5"));
    // Numbering stays absolute.
    assert!(lines[0].starts_with(&format!("{:>6}", 4)));
}

#[tokio::test]
async fn read_missing_file_is_not_found() {
    let (files, tmp) = setup();
    let err = files
        .read(&abs(&tmp, "ghost.txt"), None, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn read_directory_is_not_a_file() {
    let (files, tmp) = setup();
    let dir = abs(&tmp, "subdir");
    std::fs::create_dir(&dir).unwrap();
    let err = files.read(&dir, None, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotAFile);
}

#[tokio::test]
async fn relative_path_is_invalid() {
    let (files, _tmp) = setup();
    let err = files.read("relative/path.txt", None, None).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidPath);
}

// ============================================================
// write
// ============================================================

#[tokio::test]
async fn write_then_read_round_trips_bytes() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "script.sh");
    let content = "#!/bin/sh\necho \"$1\" && printf 'tab\\there'\n# quote: ' double: \"\n";

    files.write(&path, content).await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), content);
}

#[tokio::test]
async fn write_without_parent_is_missing_parent() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "no/such/dir/file.txt");
    let err = files.write(&path, "content").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::MissingParent);
    assert!(!tmp.path().join("no").exists(), "no implicit mkdir");
}

#[tokio::test]
async fn write_overwrites_existing_file() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "twice.txt");
    files.write(&path, "first").await.unwrap();
    files.write(&path, "second").await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
}

// ============================================================
// edit
// ============================================================

#[tokio::test]
async fn edit_replaces_unique_occurrence() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "main.rs");
    std::fs::write(&path, "fn main() {\n    println!(\"hello\");\n}\n").unwrap();

    files.edit(&path, "hello", "goodbye", false).await.unwrap();
    assert!(std::fs::read_to_string(&path).unwrap().contains("goodbye"));
}

#[tokio::test]
async fn edit_missing_old_string_is_not_found() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "a.txt");
    std::fs::write(&path, "content").unwrap();
    let err = files.edit(&path, "absent", "x", false).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "content");
}

#[tokio::test]
async fn edit_ambiguous_without_replace_all() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "b.txt");
    std::fs::write(&path, "dup dup dup").unwrap();
    let err = files.edit(&path, "dup", "x", false).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::AmbiguousEdit);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "dup dup dup");
}

#[tokio::test]
async fn edit_replace_all_rewrites_every_occurrence() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "c.txt");
    std::fs::write(&path, "dup dup dup").unwrap();
    let message = files.edit(&path, "dup", "x", true).await.unwrap();
    assert!(message.contains("3 occurrence"));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "x x x");
}

#[tokio::test]
async fn inverse_edit_restores_file_byte_for_byte() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "roundtrip.txt");
    let original = "one\n\ttwo with tabs\n  spaced\nfour\n";
    std::fs::write(&path, original).unwrap();

    files
        .edit(&path, "\ttwo with tabs", "\tTWO with tabs", false)
        .await
        .unwrap();
    files
        .edit(&path, "\tTWO with tabs", "\ttwo with tabs", false)
        .await
        .unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
}

// ============================================================
// multi_edit
// ============================================================

#[tokio::test]
async fn multi_edit_applies_sequentially() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "seq.txt");
    std::fs::write(&path, "aaa").unwrap();

    // The second edit only matches because the first ran.
    let edits = vec![
        ("aaa".to_string(), "bbb".to_string(), false),
        ("bbb".to_string(), "ccc".to_string(), false),
    ];
    files.multi_edit(&path, &edits).await.unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "ccc");
}

#[tokio::test]
async fn multi_edit_aborts_atomically_on_failure() {
    let (files, tmp) = setup();
    let path = abs(&tmp, "atomic.txt");
    let original = "alpha beta gamma";
    std::fs::write(&path, original).unwrap();

    let edits = vec![
        ("alpha".to_string(), "ALPHA".to_string(), false),
        ("missing".to_string(), "x".to_string(), false),
        ("gamma".to_string(), "GAMMA".to_string(), false),
    ];
    let err = files.multi_edit(&path, &edits).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert!(err.message.contains("Edit 2"));
    // No partial mutation is observable on disk.
    assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
}

// ============================================================
// metadata
// ============================================================

#[tokio::test]
async fn metadata_reports_existing_and_missing_inline() {
    let (files, tmp) = setup();
    let present = abs(&tmp, "present.txt");
    std::fs::write(&present, "12345").unwrap();
    let missing = abs(&tmp, "missing.txt");

    let output = files
        .metadata(&[present.clone(), missing.clone()])
        .await
        .unwrap();
    assert!(output.contains("Size: 5 bytes"));
    assert!(output.contains(&format!("{missing}: not found")));
}
