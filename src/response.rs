//! Structured response model: one JSON envelope per request.
//!
//! A request starts by stamping a [`PendingResponse`] and ends with exactly
//! one call to [`PendingResponse::send`], which consumes it and produces the
//! immutable [`ResponseEnvelope`]. Taking `self` by value means a second
//! send cannot compile, so the timing fields are stamped once.
//!
//! ## Code table
//!
//! | code | HTTP | text |
//! |------|------|------|
//! | 0  | 200 | conversion complete |
//! | 1  | 400 | missing source object path |
//! | 2  | 400 | missing destination format |
//! | 3  | 404 | source object not found |
//! | 4  | 400 | source object unavailable |
//! | 5  | 500 | temporary data can't be instantiated |
//! | 6  | 500 | source datablock can't be retrieved |
//! | 7  | 500 | converted datablock can't be read |
//! | 8  | 500 | conversion process can't be started |
//! | 9  | 500 | conversion process didn't create a converted document |
//! | 10 | 500 | converted datablock can't be stored |
//! | *  | 500 | unexpected result |

use std::collections::HashMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use docconv_store::PutReceipt;
use serde::{Deserialize, Serialize};
use tracing::error;

/// Content type of every envelope.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// Outcome code of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Complete,
    MissingSourcePath,
    MissingFormat,
    SourceNotFound,
    SourceUnavailable,
    TempUnavailable,
    SourceFetchFailed,
    ConvertedReadFailed,
    EngineNotStarted,
    NoConvertedDocument,
    StoreFailed,
    /// Any code outside the table.
    Unexpected(i64),
}

impl ResultCode {
    pub fn from_i64(code: i64) -> Self {
        match code {
            0 => ResultCode::Complete,
            1 => ResultCode::MissingSourcePath,
            2 => ResultCode::MissingFormat,
            3 => ResultCode::SourceNotFound,
            4 => ResultCode::SourceUnavailable,
            5 => ResultCode::TempUnavailable,
            6 => ResultCode::SourceFetchFailed,
            7 => ResultCode::ConvertedReadFailed,
            8 => ResultCode::EngineNotStarted,
            9 => ResultCode::NoConvertedDocument,
            10 => ResultCode::StoreFailed,
            other => ResultCode::Unexpected(other),
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            ResultCode::Complete => 0,
            ResultCode::MissingSourcePath => 1,
            ResultCode::MissingFormat => 2,
            ResultCode::SourceNotFound => 3,
            ResultCode::SourceUnavailable => 4,
            ResultCode::TempUnavailable => 5,
            ResultCode::SourceFetchFailed => 6,
            ResultCode::ConvertedReadFailed => 7,
            ResultCode::EngineNotStarted => 8,
            ResultCode::NoConvertedDocument => 9,
            ResultCode::StoreFailed => 10,
            ResultCode::Unexpected(code) => code,
        }
    }

    /// Default HTTP status.
    pub fn html_status(self) -> StatusCode {
        match self {
            ResultCode::Complete => StatusCode::OK,
            ResultCode::MissingSourcePath
            | ResultCode::MissingFormat
            | ResultCode::SourceUnavailable => StatusCode::BAD_REQUEST,
            ResultCode::SourceNotFound => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Default human-readable text.
    pub fn text(self) -> &'static str {
        match self {
            ResultCode::Complete => "conversion complete",
            ResultCode::MissingSourcePath => "missing source object path",
            ResultCode::MissingFormat => "missing destination format",
            ResultCode::SourceNotFound => "source object not found",
            ResultCode::SourceUnavailable => "source object unavailable",
            ResultCode::TempUnavailable => "temporary data can't be instantiated",
            ResultCode::SourceFetchFailed => "source datablock can't be retrieved",
            ResultCode::ConvertedReadFailed => "converted datablock can't be read",
            ResultCode::EngineNotStarted => "conversion process can't be started",
            ResultCode::NoConvertedDocument => {
                "conversion process didn't create a converted document"
            }
            ResultCode::StoreFailed => "converted datablock can't be stored",
            ResultCode::Unexpected(_) => "unexpected result",
        }
    }
}

/// Optional values layered over the code-derived defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    /// Replaces the default HTTP status (ignored if not a valid status).
    pub status: Option<u16>,
    /// Appended to the default text as `"<text>: <status_text>"`.
    pub status_text: Option<String>,
    /// Sent as the envelope's `message` field.
    pub message: Option<String>,
}

/// Payload of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub key: String,
    pub bucket: String,
    /// Provider response to the store request.
    pub data: PutReceipt,
    /// Metadata stored with the converted object.
    pub metadata: HashMap<String, String>,
}

/// A response whose clock is running.
#[derive(Debug)]
pub struct PendingResponse {
    begin_time: f64,
    started: Instant,
}

impl PendingResponse {
    /// Stamp `beginTime` now.
    pub fn begin() -> Self {
        Self {
            begin_time: unix_now(),
            started: Instant::now(),
        }
    }

    pub fn begin_time(&self) -> f64 {
        self.begin_time
    }

    /// Finish the response.
    ///
    /// `endTime` is derived from the monotonic clock, so
    /// `endTime == beginTime + execTime` and `endTime >= beginTime` hold even
    /// if the wall clock steps backwards mid-request. `result` is recorded
    /// only for [`ResultCode::Complete`].
    pub fn send(
        self,
        code: ResultCode,
        overrides: Overrides,
        result: Option<ConversionResult>,
    ) -> ResponseEnvelope {
        let exec_time = self.started.elapsed().as_secs_f64();
        let end_time = self.begin_time + exec_time;

        let status = overrides
            .status
            .and_then(|s| StatusCode::from_u16(s).ok())
            .unwrap_or_else(|| code.html_status());

        let text = match overrides.status_text {
            Some(extra) => format!("{}: {}", code.text(), extra),
            None => code.text().to_string(),
        };

        ResponseEnvelope {
            code: code.as_i64(),
            text,
            begin_time: self.begin_time,
            end_time,
            exec_time,
            message: overrides.message,
            result: if code == ResultCode::Complete { result } else { None },
            status: status.as_u16(),
        }
    }
}

/// The JSON body returned for every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub code: i64,
    pub text: String,
    pub begin_time: f64,
    pub end_time: f64,
    pub exec_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ConversionResult>,
    #[serde(skip)]
    status: u16,
}

impl ResponseEnvelope {
    pub fn result_code(&self) -> ResultCode {
        ResultCode::from_i64(self.code)
    }

    /// HTTP status the envelope is sent with.
    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ResponseEnvelope {
    fn into_response(self) -> Response {
        let status = self.status();
        match serde_json::to_vec(&self) {
            Ok(body) => (
                status,
                [(header::CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))],
                body,
            )
                .into_response(),
            Err(e) => {
                error!("Failed to serialise response envelope: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_defaults() {
        let expected = [
            (0, 200, "conversion complete"),
            (1, 400, "missing source object path"),
            (2, 400, "missing destination format"),
            (3, 404, "source object not found"),
            (4, 400, "source object unavailable"),
            (5, 500, "temporary data can't be instantiated"),
            (6, 500, "source datablock can't be retrieved"),
            (7, 500, "converted datablock can't be read"),
            (8, 500, "conversion process can't be started"),
            (9, 500, "conversion process didn't create a converted document"),
            (10, 500, "converted datablock can't be stored"),
            (42, 500, "unexpected result"),
            (-1, 500, "unexpected result"),
        ];
        for (code, status, text) in expected {
            let rc = ResultCode::from_i64(code);
            assert_eq!(rc.as_i64(), code);
            assert_eq!(rc.html_status().as_u16(), status, "code {code}");
            assert_eq!(rc.text(), text, "code {code}");
        }
    }

    #[test]
    fn send_stamps_consistent_timing() {
        let pending = PendingResponse::begin();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let begin = pending.begin_time();
        let env = pending.send(ResultCode::MissingFormat, Overrides::default(), None);

        assert_eq!(env.begin_time, begin);
        assert!(env.end_time >= env.begin_time);
        assert!(env.exec_time >= 0.005);
        assert!((env.end_time - env.begin_time - env.exec_time).abs() < 1e-6);
    }

    #[test]
    fn overrides_layer_on_defaults() {
        let env = PendingResponse::begin().send(
            ResultCode::SourceUnavailable,
            Overrides {
                status: Some(403),
                status_text: Some("AccessDenied".into()),
                message: Some("Access Denied".into()),
            },
            None,
        );
        assert_eq!(env.status(), StatusCode::FORBIDDEN);
        assert_eq!(env.text, "source object unavailable: AccessDenied");
        assert_eq!(env.message.as_deref(), Some("Access Denied"));
        assert_eq!(env.code, 4);
    }

    #[test]
    fn invalid_status_override_falls_back_to_default() {
        let env = PendingResponse::begin().send(
            ResultCode::SourceNotFound,
            Overrides {
                status: Some(42),
                ..Overrides::default()
            },
            None,
        );
        assert_eq!(env.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn result_is_only_kept_on_success() {
        let result = ConversionResult {
            key: "a.pdf".into(),
            bucket: "b".into(),
            data: PutReceipt::default(),
            metadata: HashMap::new(),
        };
        let failed = PendingResponse::begin().send(
            ResultCode::StoreFailed,
            Overrides::default(),
            Some(result.clone()),
        );
        assert!(failed.result.is_none());

        let ok = PendingResponse::begin().send(ResultCode::Complete, Overrides::default(), Some(result));
        assert_eq!(ok.result.as_ref().map(|r| r.key.as_str()), Some("a.pdf"));
    }

    #[test]
    fn serialises_with_camel_case_fields() {
        let env = PendingResponse::begin().send(ResultCode::MissingSourcePath, Overrides::default(), None);
        let json: serde_json::Value = serde_json::to_value(&env).unwrap();
        let obj = json.as_object().unwrap();
        for field in ["code", "text", "beginTime", "endTime", "execTime"] {
            assert!(obj.contains_key(field), "missing {field}");
        }
        assert!(!obj.contains_key("message"));
        assert!(!obj.contains_key("result"));
        assert!(!obj.contains_key("status"));
    }

    #[tokio::test]
    async fn into_response_sets_status_and_content_type() {
        let env = PendingResponse::begin().send(ResultCode::SourceNotFound, Overrides::default(), None);
        let response = env.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_CONTENT_TYPE
        );
    }
}
