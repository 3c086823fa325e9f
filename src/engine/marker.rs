//! Parser for the engine's completion marker.
//!
//! The conversion engine has no structured completion signal; it reports the
//! file it wrote with a verbose log line on stdout:
//!
//! ```text
//! marker   := "Output file: file://" path EOL
//! path     := one or more non-newline characters (percent-escapes decoded)
//! EOL      := "\n" | "\r\n" | end-of-output
//! ```
//!
//! Only the first marker in the whole output counts.

use std::path::PathBuf;

use once_cell::sync::Lazy;
use regex::Regex;

static OUTPUT_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Output file: file://(.+?)\r?$").unwrap());

/// The converted document announced by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFile {
    pub path: PathBuf,
    /// Extension without the dot; empty if the path has none.
    pub extension: String,
}

impl ConvertedFile {
    fn from_marker_path(raw: &str) -> Self {
        let decoded = urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| raw.to_string());
        let path = PathBuf::from(decoded);
        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, extension }
    }
}

/// Parse a single output line (without its `\n`).
pub fn parse_marker(line: &str) -> Option<ConvertedFile> {
    OUTPUT_MARKER
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| ConvertedFile::from_marker_path(m.as_str()))
}

/// Scan a complete output buffer.
pub fn scan_output(output: &str) -> Option<ConvertedFile> {
    let mut scanner = OutputScanner::new();
    for line in output.split('\n') {
        scanner.feed_line(line);
    }
    scanner.finish()
}

/// Incremental scanner fed line by line while the engine runs.
#[derive(Debug, Default)]
pub struct OutputScanner {
    found: Option<ConvertedFile>,
}

impl OutputScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if this line carried the first marker.
    pub fn feed_line(&mut self, line: &str) -> bool {
        if self.found.is_some() {
            return false;
        }
        self.found = parse_marker(line);
        self.found.is_some()
    }

    pub fn found(&self) -> Option<&ConvertedFile> {
        self.found.as_ref()
    }

    pub fn finish(self) -> Option<ConvertedFile> {
        self.found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_marker() {
        let f = parse_marker("Output file: file:///tmp/docconv-a1/doc.pdf").unwrap();
        assert_eq!(f.path, PathBuf::from("/tmp/docconv-a1/doc.pdf"));
        assert_eq!(f.extension, "pdf");
    }

    #[test]
    fn tolerates_crlf_and_end_of_output() {
        let f = scan_output("Input file: /tmp/a.txt\r\nOutput file: file:///tmp/a.pdf\r\n").unwrap();
        assert_eq!(f.path, PathBuf::from("/tmp/a.pdf"));

        let f = scan_output("Output file: file:///tmp/b.odt").unwrap();
        assert_eq!(f.extension, "odt");
    }

    #[test]
    fn marker_may_follow_a_prefix() {
        let f = parse_marker("[verbose] Output file: file:///x/y.docx").unwrap();
        assert_eq!(f.path, PathBuf::from("/x/y.docx"));
    }

    #[test]
    fn decodes_percent_escapes() {
        let f = parse_marker("Output file: file:///tmp/my%20report.pdf").unwrap();
        assert_eq!(f.path, PathBuf::from("/tmp/my report.pdf"));
    }

    #[test]
    fn only_first_marker_counts() {
        let out = "Output file: file:///one.pdf\nOutput file: file:///two.pdf\n";
        assert_eq!(scan_output(out).unwrap().path, PathBuf::from("/one.pdf"));

        let mut scanner = OutputScanner::new();
        assert!(scanner.feed_line("Output file: file:///first.html"));
        assert!(!scanner.feed_line("Output file: file:///second.html"));
        assert_eq!(scanner.found().unwrap().extension, "html");
    }

    #[test]
    fn no_marker_no_file() {
        assert!(scan_output("").is_none());
        assert!(scan_output("Input file: /tmp/a.txt\nOutput file: file://\n").is_none());
        assert!(parse_marker("output file: file:///lower.pdf").is_none());
    }

    #[test]
    fn path_without_extension() {
        let f = parse_marker("Output file: file:///tmp/noext").unwrap();
        assert_eq!(f.extension, "");
    }
}
