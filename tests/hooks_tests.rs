use std::path::Path;

use droopy::hooks::{HookChain, IndexCommand, PostUploadHook, ScriptTagFilter, SCRIPT_MARKER};
use droopy::models::StoredFile;

fn stored(path: &Path) -> StoredFile {
    StoredFile {
        name: path.file_name().unwrap().to_string_lossy().into_owned(),
        path: path.to_path_buf(),
        size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
    }
}

#[test]
fn test_script_filter_only_touches_html() {
    let dir = tempfile::tempdir().unwrap();
    let content = "<script src=\"main.js\"></script>\n";

    let html = dir.path().join("index.HTML");
    std::fs::write(&html, content).unwrap();
    let txt = dir.path().join("notes.txt");
    std::fs::write(&txt, content).unwrap();

    let filter = ScriptTagFilter::new(SCRIPT_MARKER).unwrap();
    filter.run(&stored(&html)).unwrap();
    filter.run(&stored(&txt)).unwrap();

    assert_eq!(std::fs::read_to_string(&html).unwrap(), "\n");
    assert_eq!(std::fs::read_to_string(&txt).unwrap(), content);
}

#[test]
fn test_marker_is_matched_literally() {
    let filter = ScriptTagFilter::new("app.min.js").unwrap();
    assert!(filter.find_span(b"<script src=\"app.min.js\"></script>").is_some());
    assert!(filter.find_span(b"<script src=\"appxminxjs\"></script>").is_none());
    assert!(filter.find_span(b"<SCRIPT src=\"app.min.js\"></SCRIPT>").is_none());
}

#[test]
fn test_index_command_parse() {
    assert!(IndexCommand::parse("").is_none());
    assert!(IndexCommand::parse("   ").is_none());
    assert!(IndexCommand::parse("make-index --quiet").is_some());
}

#[cfg(unix)]
#[test]
fn test_index_command_runs() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("upload.txt");
    std::fs::write(&file, "x").unwrap();

    let ok = IndexCommand::parse("true").unwrap();
    assert!(ok.run(&stored(&file)).is_ok());

    let failing = IndexCommand::parse("false").unwrap();
    assert!(failing.run(&stored(&file)).is_err());

    let missing = IndexCommand::parse("/definitely/not/a/command").unwrap();
    assert!(missing.run(&stored(&file)).is_err());
}

#[cfg(unix)]
#[test]
fn test_chain_counts_failures() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("upload.txt");
    std::fs::write(&file, "x").unwrap();

    let chain = HookChain::new()
        .with(ScriptTagFilter::new(SCRIPT_MARKER).unwrap())
        .with(IndexCommand::parse("false").unwrap());
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.run(&stored(&file)), 1);

    assert!(HookChain::default().is_empty());
}
