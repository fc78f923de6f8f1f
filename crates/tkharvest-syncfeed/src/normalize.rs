//! Payload → plain text
//!
//! The response `Content-Type` is resolved once into a [`MediaKind`] and
//! dispatched exhaustively. The type declared in the feed's enclosure link
//! is not consulted.

use encoding_rs::{Encoding, UTF_8};
use tkharvest_core::HttpResponse;

use crate::extract::TextExtractor;

/// Fetched enclosure body and its declared type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

impl From<HttpResponse> for RawPayload {
    fn from(response: HttpResponse) -> Self {
        Self {
            bytes: response.body,
            content_type: response.content_type,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Pdf,
    Text,
    UnsupportedOffice,
    Unrecognized,
}

impl MediaKind {
    /// Classify a raw `Content-Type` header value (parameters ignored)
    pub fn from_content_type(header: Option<&str>) -> Self {
        let Some(header) = header else {
            return Self::Unrecognized;
        };
        let essence = mime_essence(header);
        match essence.as_str() {
            "application/pdf" => Self::Pdf,
            "application/xml" => Self::Text,
            "application/msword" | "application/rtf" => Self::UnsupportedOffice,
            s if s.starts_with("text/") => Self::Text,
            s if s.starts_with("application/vnd.openxmlformats-officedocument.wordprocessingml")
                || s.starts_with("application/vnd.ms-word") =>
            {
                Self::UnsupportedOffice
            }
            _ => Self::Unrecognized,
        }
    }
}

/// Why an entry's payload produced no document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SkipReason {
    EmptyPdf,
    EmptyText,
    UnsupportedFormat,
    UnrecognizedType,
    ConversionFailed,
}

impl SkipReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::EmptyPdf => "empty-pdf",
            Self::EmptyText => "empty-text",
            Self::UnsupportedFormat => "unsupported-format",
            Self::UnrecognizedType => "unrecognized-type",
            Self::ConversionFailed => "conversion-failed",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Normalization declined, with a human-readable detail for the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skip {
    pub reason: SkipReason,
    pub detail: String,
}

impl Skip {
    pub fn new(reason: SkipReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for Skip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.detail)
    }
}

impl std::error::Error for Skip {}

/// Convert a payload to plain text or explain why not
pub fn normalize(payload: &RawPayload, extractor: &dyn TextExtractor) -> Result<String, Skip> {
    let declared = payload.content_type.as_deref();
    match MediaKind::from_content_type(declared) {
        MediaKind::Pdf => {
            let text = extractor
                .extract(&payload.bytes)
                .map_err(|e| Skip::new(SkipReason::ConversionFailed, e.to_string()))?;
            if text.trim().is_empty() {
                return Err(Skip::new(SkipReason::EmptyPdf, "no extractable text"));
            }
            Ok(text)
        }
        MediaKind::Text => {
            let text = decode_text(&payload.bytes, declared);
            if text.trim().is_empty() {
                return Err(Skip::new(SkipReason::EmptyText, "empty body"));
            }
            Ok(text)
        }
        MediaKind::UnsupportedOffice => Err(Skip::new(
            SkipReason::UnsupportedFormat,
            declared.unwrap_or_default(),
        )),
        MediaKind::Unrecognized => Err(Skip::new(
            SkipReason::UnrecognizedType,
            declared.unwrap_or("missing content-type"),
        )),
    }
}

/// Decode leniently: BOM, then header charset, then UTF-8.
/// Malformed sequences become U+FFFD instead of failing.
pub fn decode_text(bytes: &[u8], content_type: Option<&str>) -> String {
    let encoding = content_type
        .and_then(charset_param)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        log::debug!("replaced invalid {} sequences while decoding", used.name());
    }
    text.into_owned()
}

fn mime_essence(header: &str) -> String {
    header
        .split(';')
        .next()
        .unwrap_or(header)
        .trim()
        .to_ascii_lowercase()
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|part| {
        let (key, value) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(['"', '\'']).to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ConversionFailure;

    struct Canned(Result<&'static str, ()>);

    impl TextExtractor for Canned {
        fn extract(&self, _pdf: &[u8]) -> Result<String, ConversionFailure> {
            self.0.map(str::to_string).map_err(|_| ConversionFailure::Exit {
                code: Some(1),
                stderr: "boom".to_string(),
            })
        }
    }

    fn payload(bytes: &[u8], content_type: Option<&str>) -> RawPayload {
        RawPayload {
            bytes: bytes.to_vec(),
            content_type: content_type.map(str::to_string),
        }
    }

    fn reason(result: Result<String, Skip>) -> SkipReason {
        result.unwrap_err().reason
    }

    #[test]
    fn media_kind_table() {
        use MediaKind::*;
        let cases = [
            (Some("application/pdf"), Pdf),
            (Some("Application/PDF; qs=0.9"), Pdf),
            (Some("text/plain"), Text),
            (Some("text/html; charset=utf-8"), Text),
            (Some("application/xml"), Text),
            (Some("application/msword"), UnsupportedOffice),
            (
                Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
                UnsupportedOffice,
            ),
            (Some("application/octet-stream"), Unrecognized),
            (Some(""), Unrecognized),
            (None, Unrecognized),
        ];
        for (header, expected) in cases {
            assert_eq!(MediaKind::from_content_type(header), expected, "{header:?}");
        }
    }

    #[test]
    fn text_passes_through() {
        let text = normalize(&payload(b"hello", Some("text/plain")), &Canned(Ok(""))).unwrap();
        assert_eq!(text, "hello");
    }

    #[test]
    fn xml_passes_through_verbatim() {
        let body = b"<doc>\n  <p>a &amp; b</p>\n</doc>";
        let text = normalize(&payload(body, Some("application/xml")), &Canned(Ok(""))).unwrap();
        assert_eq!(text.as_bytes(), body);
    }

    #[test]
    fn pdf_uses_extractor() {
        let text = normalize(
            &payload(b"%PDF", Some("application/pdf")),
            &Canned(Ok("Motie van het lid")),
        )
        .unwrap();
        assert_eq!(text, "Motie van het lid");
    }

    #[test]
    fn empty_pdf_is_skipped() {
        let result = normalize(&payload(b"%PDF", Some("application/pdf")), &Canned(Ok(" \n\x0c")));
        assert_eq!(reason(result), SkipReason::EmptyPdf);
    }

    #[test]
    fn failed_conversion_is_skipped() {
        let result = normalize(&payload(b"%PDF", Some("application/pdf")), &Canned(Err(())));
        assert_eq!(reason(result), SkipReason::ConversionFailed);
    }

    #[test]
    fn word_documents_are_unsupported() {
        let result = normalize(&payload(b"\xd0\xcf", Some("application/msword")), &Canned(Ok("x")));
        assert_eq!(reason(result), SkipReason::UnsupportedFormat);
    }

    #[test]
    fn missing_header_is_unrecognized() {
        let result = normalize(&payload(b"data", None), &Canned(Ok("x")));
        let skip = result.unwrap_err();
        assert_eq!(skip.reason, SkipReason::UnrecognizedType);
        assert_eq!(skip.detail, "missing content-type");
    }

    #[test]
    fn blank_text_is_skipped() {
        let result = normalize(&payload(b"  \r\n", Some("text/plain")), &Canned(Ok("")));
        assert_eq!(reason(result), SkipReason::EmptyText);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(decode_text(b"ok\xff!", Some("text/plain")), "ok\u{FFFD}!");
    }

    #[test]
    fn charset_parameter_selects_decoder() {
        // 0xEB is 'ë' in windows-1252 / latin1
        assert_eq!(
            decode_text(b"Twee\xebde", Some("text/plain; charset=\"ISO-8859-1\"")),
            "Tweeëde"
        );
    }

    #[test]
    fn bom_is_stripped() {
        assert_eq!(decode_text(b"\xef\xbb\xbfhallo", Some("text/plain")), "hallo");
    }

    #[test]
    fn skip_display() {
        let skip = Skip::new(SkipReason::UnsupportedFormat, "application/msword");
        assert_eq!(format!("{skip}"), "unsupported-format: application/msword");
    }
}
