//! Request validation: `/<bucket>/<key...>?format=..&dbucket=..&dkey=..`.

use docconv_store::ObjectLocation;
use serde::Deserialize;

use crate::error::RequestError;

/// Query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConversionParams {
    /// Target format identifier, passed to the engine as `-f<format>`.
    pub format: Option<String>,
    /// Destination bucket override.
    pub dbucket: Option<String>,
    /// Destination key override.
    pub dkey: Option<String>,
}

impl ConversionParams {
    pub fn with_format(format: impl Into<String>) -> Self {
        Self {
            format: Some(format.into()),
            ..Self::default()
        }
    }
}

/// A validated conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    pub source: ObjectLocation,
    /// Extension of the source key, without the dot (may be empty).
    pub extension: String,
    pub target_format: String,
    pub dest_bucket: Option<String>,
    pub dest_key: Option<String>,
}

impl ConversionRequest {
    /// Validate a raw (still percent-encoded) request path and its query.
    ///
    /// The whole path is decoded first and then split on `/`: the first
    /// segment is the bucket, the rest joined by `/` is the key.
    pub fn validate(raw_path: &str, params: ConversionParams) -> Result<Self, RequestError> {
        let source = parse_source_path(raw_path).ok_or(RequestError::MissingSourcePath)?;

        let target_format = non_empty(params.format).ok_or(RequestError::MissingFormat)?;

        Ok(Self {
            extension: extension_of(&source.key).to_string(),
            source,
            target_format,
            dest_bucket: non_empty(params.dbucket),
            dest_key: non_empty(params.dkey),
        })
    }
}

/// `/<bucket>/<key...>` → location; `None` if either part is missing.
pub fn parse_source_path(raw_path: &str) -> Option<ObjectLocation> {
    let decoded = urlencoding::decode(raw_path).ok()?;
    let mut parts = decoded.split('/');

    // A path always starts with `/`; anything before it is not a bucket.
    if !parts.next()?.is_empty() {
        return None;
    }
    let bucket = parts.next()?;
    let key = parts.collect::<Vec<_>>().join("/");

    if bucket.is_empty() || key.is_empty() {
        return None;
    }
    Some(ObjectLocation::new(bucket, key))
}

/// Extension of the last path segment, without the dot.
///
/// A leading dot does not start an extension (`.profile` has none), and a
/// trailing dot yields an empty one.
pub fn extension_of(key: &str) -> &str {
    split_extension(key).1
}

/// Replace (or append) the extension of `name`.
///
/// `replace_extension("a/b.txt", "pdf") == "a/b.pdf"`,
/// `replace_extension("README", "pdf") == "README.pdf"`.
pub fn replace_extension(name: &str, extension: &str) -> String {
    let (stem, _) = split_extension(name);
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

/// `(stem, extension)` where `stem` excludes the dot.
fn split_extension(name: &str) -> (&str, &str) {
    let base_start = name.rfind('/').map_or(0, |i| i + 1);
    let base = &name[base_start..];
    match base.rfind('.') {
        Some(0) | None => (name, ""),
        Some(dot) => {
            let at = base_start + dot;
            (&name[..at], &name[at + 1..])
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(path: &str, params: ConversionParams) -> i64 {
        ConversionRequest::validate(path, params)
            .unwrap_err()
            .code()
            .as_i64()
    }

    #[test]
    fn parses_bucket_and_nested_key() {
        let req = ConversionRequest::validate("/docs/reports/2024/q1.docx", ConversionParams::with_format("pdf"))
            .unwrap();
        assert_eq!(req.source, ObjectLocation::new("docs", "reports/2024/q1.docx"));
        assert_eq!(req.extension, "docx");
        assert_eq!(req.target_format, "pdf");
        assert_eq!(req.dest_bucket, None);
    }

    #[test]
    fn decodes_before_splitting() {
        let req = ConversionRequest::validate("/docs/my%20file%2Fpart.odt", ConversionParams::with_format("pdf"))
            .unwrap();
        assert_eq!(req.source.key, "my file/part.odt");
    }

    #[test]
    fn missing_bucket_or_key_is_code_1() {
        for path in ["", "/", "/docs", "/docs/", "//a.txt", "/%FF/a.txt"] {
            assert_eq!(code_of(path, ConversionParams::with_format("pdf")), 1, "path {path:?}");
        }
    }

    #[test]
    fn path_check_wins_over_format_check() {
        assert_eq!(code_of("/docs", ConversionParams::default()), 1);
    }

    #[test]
    fn missing_or_empty_format_is_code_2() {
        assert_eq!(code_of("/docs/a.txt", ConversionParams::default()), 2);
        assert_eq!(code_of("/docs/a.txt", ConversionParams::with_format("")), 2);
    }

    #[test]
    fn empty_destination_overrides_are_ignored() {
        let params = ConversionParams {
            format: Some("pdf".into()),
            dbucket: Some(String::new()),
            dkey: Some("final.pdf".into()),
        };
        let req = ConversionRequest::validate("/docs/a.txt", params).unwrap();
        assert_eq!(req.dest_bucket, None);
        assert_eq!(req.dest_key.as_deref(), Some("final.pdf"));
    }

    #[test]
    fn extension_rules() {
        assert_eq!(extension_of("a/b.txt"), "txt");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of(".profile"), "");
        assert_eq!(extension_of("dir.v2/file"), "");
        assert_eq!(extension_of("trailing."), "");
    }

    #[test]
    fn replace_extension_rules() {
        assert_eq!(replace_extension("a/b.txt", "pdf"), "a/b.pdf");
        assert_eq!(replace_extension("README", "pdf"), "README.pdf");
        assert_eq!(replace_extension("dir.v2/file", "pdf"), "dir.v2/file.pdf");
        assert_eq!(replace_extension(".profile", "pdf"), ".profile.pdf");
        assert_eq!(replace_extension("doc.txt", ""), "doc");
    }
}
