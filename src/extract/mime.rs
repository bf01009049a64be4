//! MIME sniffing and content normalization, step 3 of the
//! boilerplate-extraction pipeline (spec §4.E).

use scraper::{Html, Selector};

/// Our own simplified MIME classification, mirroring
/// `original_source/cc_corpus/mime.py::check_mime`'s `{"txt", "html"}`
/// split (anything else maps to `None` there, `Unknown` here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleMime {
    Txt,
    Html,
}

const SNIFF_LENGTH: usize = 2048;

/// Sniffs the first [`SNIFF_LENGTH`] bytes of `data` with the `infer`
/// crate, classifying into txt/html/unknown. `infer` works off magic
/// bytes rather than regexing a `Content-Type` string, so plain text is
/// detected by the absence of any recognized binary signature plus a
/// UTF-8 check, and HTML by `infer`'s own text matchers.
pub fn sniff_mime(data: &[u8]) -> Option<SimpleMime> {
    let head = &data[..data.len().min(SNIFF_LENGTH)];
    if let Some(kind) = infer::get(head) {
        let mime = kind.mime_type();
        if mime.contains("html") {
            return Some(SimpleMime::Html);
        }
        if mime.starts_with("text/") {
            return Some(SimpleMime::Txt);
        }
        return None;
    }
    // infer returns None for plain text (no magic signature). Treat
    // valid UTF-8 with an HTML-looking opening tag as Html, any other
    // valid UTF-8 as Txt, anything else as Unknown.
    match std::str::from_utf8(head) {
        Ok(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('<') {
                Some(SimpleMime::Html)
            } else {
                Some(SimpleMime::Txt)
            }
        }
        Err(_) => None,
    }
}

/// Normalizes `content` into a full HTML document string, per
/// `original_source/cc_corpus/mime.py::normalize_content`:
/// - HTML content is parsed and re-serialized (picking up whatever
///   `<body>` the parser inferred);
/// - text content is wrapped in a minimal `<html><body>...</body></html>`
///   envelope;
/// - unknown content is dropped (`None`).
pub fn normalize_content(content: &str, mime: Option<SimpleMime>) -> Option<String> {
    match mime {
        Some(SimpleMime::Html) | Some(SimpleMime::Txt) => {
            let wrapped = match mime {
                Some(SimpleMime::Txt) => {
                    format!("<html><body>{content}</body></html>")
                }
                _ => content.to_string(),
            };
            let document = Html::parse_document(&wrapped);
            let body_selector = Selector::parse("body").ok()?;
            if document.select(&body_selector).next().is_some() {
                Some(document.html())
            } else {
                None
            }
        }
        None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_html_from_leading_tag() {
        let data = b"<html><body>hi</body></html>";
        assert_eq!(sniff_mime(data), Some(SimpleMime::Html));
    }

    #[test]
    fn sniffs_plain_text() {
        let data = b"just some plain text, no markup here";
        assert_eq!(sniff_mime(data), Some(SimpleMime::Txt));
    }

    #[test]
    fn wraps_text_in_minimal_envelope() {
        let normalized = normalize_content("hello world", Some(SimpleMime::Txt)).unwrap();
        assert!(normalized.contains("hello world"));
        assert!(normalized.contains("<body"));
    }

    #[test]
    fn drops_unknown_mime() {
        assert_eq!(normalize_content("whatever", None), None);
    }
}
