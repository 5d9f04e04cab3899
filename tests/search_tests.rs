use std::sync::Arc;

use overseer::actions::search_manager::SearchManager;
use overseer::exec::LocalSandbox;
use tempfile::TempDir;

fn setup(max_results: usize) -> (SearchManager, TempDir) {
    let tmp = tempfile::tempdir().expect("tempdir");
    let sandbox = Arc::new(LocalSandbox::new(tmp.path()));
    (SearchManager::new(sandbox, max_results), tmp)
}

fn path_str(tmp: &TempDir) -> String {
    tmp.path().to_str().unwrap().to_string()
}

// ============================================================
// grep
// ============================================================

#[tokio::test]
async fn grep_returns_file_line_rows() {
    let (search, tmp) = setup(100);
    std::fs::write(tmp.path().join("a.rs"), "fn main() {}\nfn helper() {}\n").unwrap();
    std::fs::write(tmp.path().join("b.txt"), "no functions here\n").unwrap();

    let output = search
        .grep("fn ", Some(&path_str(&tmp)), None)
        .await
        .unwrap();
    assert!(output.contains("a.rs:1:fn main() {}"));
    assert!(output.contains("a.rs:2:fn helper() {}"));
    assert!(!output.contains("b.txt"));
}

#[tokio::test]
async fn grep_include_filters_by_filename_glob() {
    let (search, tmp) = setup(100);
    std::fs::write(tmp.path().join("code.rs"), "needle\n").unwrap();
    std::fs::write(tmp.path().join("notes.md"), "needle\n").unwrap();

    let output = search
        .grep("needle", Some(&path_str(&tmp)), Some("*.rs"))
        .await
        .unwrap();
    assert!(output.contains("code.rs"));
    assert!(!output.contains("notes.md"));
}

#[tokio::test]
async fn grep_no_matches_is_not_an_error() {
    let (search, tmp) = setup(100);
    std::fs::write(tmp.path().join("a.txt"), "nothing relevant\n").unwrap();
    let output = search
        .grep("zzz_absent", Some(&path_str(&tmp)), None)
        .await
        .unwrap();
    assert_eq!(output, "No matches found");
}

#[tokio::test]
async fn grep_truncates_only_past_the_cap() {
    let (search, tmp) = setup(5);
    let many: String = (0..5).map(|i| format!("hit {i}\n")).collect();
    std::fs::write(tmp.path().join("exact.txt"), many).unwrap();

    let output = search.grep("hit", Some(&path_str(&tmp)), None).await.unwrap();
    assert!(!output.contains("truncated"), "exactly at cap: no marker");

    let more: String = (0..6).map(|i| format!("hit {i}\n")).collect();
    std::fs::write(tmp.path().join("exact.txt"), more).unwrap();
    let output = search.grep("hit", Some(&path_str(&tmp)), None).await.unwrap();
    assert!(output.contains("[results truncated to 5 matches]"));
}

// ============================================================
// glob
// ============================================================

#[tokio::test]
async fn glob_finds_files_by_name_pattern() {
    let (search, tmp) = setup(100);
    std::fs::create_dir(tmp.path().join("src")).unwrap();
    std::fs::write(tmp.path().join("src/lib.rs"), "").unwrap();
    std::fs::write(tmp.path().join("src/main.rs"), "").unwrap();
    std::fs::write(tmp.path().join("readme.md"), "").unwrap();

    let output = search.glob("*.rs", Some(&path_str(&tmp))).await.unwrap();
    assert!(output.contains("lib.rs"));
    assert!(output.contains("main.rs"));
    assert!(!output.contains("readme.md"));
}

#[tokio::test]
async fn glob_results_are_sorted() {
    let (search, tmp) = setup(100);
    std::fs::write(tmp.path().join("zeta.rs"), "").unwrap();
    std::fs::write(tmp.path().join("alpha.rs"), "").unwrap();

    let output = search.glob("*.rs", Some(&path_str(&tmp))).await.unwrap();
    let alpha = output.find("alpha.rs").unwrap();
    let zeta = output.find("zeta.rs").unwrap();
    assert!(alpha < zeta);
}

#[tokio::test]
async fn glob_with_no_matches_says_so() {
    let (search, tmp) = setup(100);
    let output = search.glob("*.xyz", Some(&path_str(&tmp))).await.unwrap();
    assert_eq!(output, "No files found matching pattern");
}

#[tokio::test]
async fn glob_slash_pattern_matches_paths() {
    let (search, tmp) = setup(100);
    std::fs::create_dir_all(tmp.path().join("a/b")).unwrap();
    std::fs::write(tmp.path().join("a/b/deep.rs"), "").unwrap();
    std::fs::write(tmp.path().join("top.rs"), "").unwrap();

    let output = search
        .glob("**/b/*.rs", Some(&path_str(&tmp)))
        .await
        .unwrap();
    assert!(output.contains("deep.rs"));
    assert!(!output.contains("top.rs"));
}

// ============================================================
// list_dir
// ============================================================

#[tokio::test]
async fn list_dir_shows_entries() {
    let (search, tmp) = setup(100);
    std::fs::write(tmp.path().join("visible.txt"), "x").unwrap();
    let output = search.list_dir(&path_str(&tmp)).await.unwrap();
    assert!(output.contains("visible.txt"));
}

#[tokio::test]
async fn list_dir_missing_path_errors() {
    let (search, tmp) = setup(100);
    let missing = format!("{}/absent", path_str(&tmp));
    let err = search.list_dir(&missing).await.unwrap_err();
    assert_eq!(err.kind, overseer::actions::ErrorKind::NotFound);
}
