use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::io;

/// prefix carried by every in-progress upload inside the destination directory
pub const TEMP_PREFIX: &str = "tmpdroopy";

// same safe set as a classic url quote: alphanumerics plus -_.~
const HREF_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// reduce a client-submitted filename to its last path component.
///
/// browsers may send a full path, so anything up to the last POSIX (`/`),
/// Windows (`\`), or classic Mac / drive (`:`) separator is dropped.
/// `.` and `..` collapse to an empty name, which callers skip.
pub fn client_basename(submitted: &str) -> &str {
    let name = match submitted.rfind(['/', '\\', ':']) {
        Some(idx) => &submitted[idx + 1..],
        None => submitted,
    };
    match name {
        "." | ".." => "",
        other => other,
    }
}

/// split a basename into stem and extension (extension keeps its dot).
///
/// leading dots never start an extension, so `.bashrc` has none.
pub fn split_extension(name: &str) -> (&str, &str) {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(idx) => name.split_at(leading + idx),
        None => (name, ""),
    }
}

/// escape text for display inside html
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// percent-encode a filename for use in an href
pub fn href_encode(name: &str) -> String {
    utf8_percent_encode(name, HREF_SET).to_string()
}

pub fn is_temp_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

/// socket-level failures that just mean the client went away
pub fn is_socket_abort(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::TimedOut
            | io::ErrorKind::UnexpectedEof
            | io::ErrorKind::NotConnected
    )
}

/// classify a hyper connection error as an expected abort
pub fn is_hyper_abort(err: &hyper::Error) -> bool {
    if err.is_incomplete_message() || err.is_canceled() || err.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(inner) = source {
        if let Some(io_err) = inner.downcast_ref::<io::Error>() {
            return is_socket_abort(io_err);
        }
        source = inner.source();
    }
    false
}
