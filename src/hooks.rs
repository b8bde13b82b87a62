use std::ops::Range;
use std::path::Path;
use std::process::Command;

use regex::bytes::Regex;
use thiserror::Error;

use crate::models::StoredFile;

/// script source stripped from html uploads by default
pub const SCRIPT_MARKER: &str = "main.js";
const HTML_EXTENSIONS: &[&str] = &["html", "htm", "xhtml"];

#[derive(Debug, Error)]
pub enum HookError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` exited with {status}")]
    Failed { command: String, status: String },
    #[error("invalid script pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// work done on a file right after it is stored
pub trait PostUploadHook: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, file: &StoredFile) -> Result<(), HookError>;
}

/// strips the first `<script ... marker ... </script>` span from html uploads
pub struct ScriptTagFilter {
    pattern: Regex,
}

impl ScriptTagFilter {
    // byte-wise and line-bounded; greedy to the last closing tag on the line
    pub fn new(marker: &str) -> Result<Self, HookError> {
        let pattern = Regex::new(&format!(
            r"(?-su)<script.*{}.*</script>",
            regex::escape(marker)
        ))?;
        Ok(Self { pattern })
    }

    pub fn find_span(&self, text: &[u8]) -> Option<Range<usize>> {
        self.pattern.find(text).map(|m| m.range())
    }
}

impl PostUploadHook for ScriptTagFilter {
    fn name(&self) -> &str {
        "script-filter"
    }

    fn run(&self, file: &StoredFile) -> Result<(), HookError> {
        if !is_html(&file.path) {
            return Ok(());
        }
        let io_err = |source| HookError::Io {
            path: file.path.display().to_string(),
            source,
        };
        let mut text = std::fs::read(&file.path).map_err(io_err)?;
        if let Some(span) = self.find_span(&text) {
            text.drain(span);
            std::fs::write(&file.path, &text).map_err(io_err)?;
            tracing::info!("Script tag removed from {}", file.name);
        }
        Ok(())
    }
}

fn is_html(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| HTML_EXTENSIONS.iter().any(|h| e.eq_ignore_ascii_case(h)))
}

/// runs an external index generator with the stored path as last argument
pub struct IndexCommand {
    program: String,
    args: Vec<String>,
}

impl IndexCommand {
    /// split on whitespace; no shell is involved. `None` for a blank command
    pub fn parse(command: &str) -> Option<Self> {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next()?;
        Some(Self {
            program,
            args: words.collect(),
        })
    }

    fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl PostUploadHook for IndexCommand {
    fn name(&self) -> &str {
        "index-command"
    }

    fn run(&self, file: &StoredFile) -> Result<(), HookError> {
        tracing::debug!("Updating index page via `{}`", self.display());
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&file.path)
            .status()
            .map_err(|source| HookError::Spawn {
                command: self.display(),
                source,
            })?;
        if !status.success() {
            return Err(HookError::Failed {
                command: self.display(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// hooks run in order; a failing hook is logged and the rest still run
#[derive(Default)]
pub struct HookChain {
    hooks: Vec<Box<dyn PostUploadHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, hook: impl PostUploadHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// returns how many hooks failed
    pub fn run(&self, file: &StoredFile) -> usize {
        let mut failures = 0;
        for hook in &self.hooks {
            if let Err(e) = hook.run(file) {
                failures += 1;
                tracing::warn!("Post-upload hook {} failed for {}: {}", hook.name(), file.name, e);
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_span() {
        let filter = ScriptTagFilter::new(SCRIPT_MARKER).unwrap();

        let text = b"<p>hi</p>\n<script src=\"main.js\"></script> tail\n";
        let span = filter.find_span(text).unwrap();
        assert_eq!(&text[span], b"<script src=\"main.js\"></script>");

        // stays on one line
        assert!(filter.find_span(b"<script>\nmain.js</script>").is_none());

        // greedy to the last closing tag on the line
        let two = b"<script src=main.js></script><script></script>!";
        let span = filter.find_span(two).unwrap();
        assert_eq!(span, 0..two.len() - 1);

        // the dot in the marker is literal
        assert!(filter.find_span(b"<script src=mainxjs></script>").is_none());

        // unrelated scripts survive
        assert!(filter.find_span(b"<script src=\"other.js\"></script>").is_none());

        // invalid utf-8 around the tag
        let binary = b"\xff<script \xfe main.js></script>\xff";
        assert_eq!(filter.find_span(binary), Some(1..binary.len() - 1));
    }
}
