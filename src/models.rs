use std::path::PathBuf;

// a file promoted into the destination directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

// the fixed set of html pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Main,
    Success,
    Error,
}
