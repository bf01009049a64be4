//! Boilerplate removal, step 4 of the extraction pipeline (spec §4.E).
//! Two interchangeable implementations behind one trait, mirroring
//! `original_source/cc_corpus/boilerplate.py`'s
//! `JustextRemover`/`TrafilatureRemover` pair.

use scraper::{Html, Selector};

/// Chunks shorter than this (bytes) are dropped outright, per the
/// teacher's own `boilerplate_remove` threshold comment: `'<html></html>'`
/// is 13 characters, the shortest document that could plausibly carry
/// content.
const MIN_CHUNK_LEN: usize = 13;

pub trait BoilerplateRemover: Send + Sync {
    /// Removes boilerplate from an HTML document, returning the
    /// surviving content paragraphs.
    fn remove(&self, html: &str, url: &str) -> Vec<String>;
}

/// Tags whose text content justext-style link-density filtering treats
/// as candidate prose, mirroring the `DATA_TAGS` set in
/// `original_source/cc_corpus/boilerplate.py::TrafilaturaHandler`.
const CONTENT_TAGS: &[&str] = &["p", "li", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote"];

/// A native link-density heuristic in the style of `justext`: walks the
/// content tags, drops any block whose link text makes up too much of
/// its total text (boilerplate like nav menus and footers is almost
/// all anchors), and drops whatever remains under
/// [`MIN_CHUNK_LEN`].
pub struct HeuristicRemover {
    /// Maximum fraction of a block's characters that may live inside an
    /// `<a>` tag before the block is considered a link cluster
    /// (boilerplate) rather than prose.
    pub max_link_density: f32,
}

impl Default for HeuristicRemover {
    fn default() -> Self {
        HeuristicRemover {
            max_link_density: 0.3,
        }
    }
}

impl BoilerplateRemover for HeuristicRemover {
    fn remove(&self, html: &str, url: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        let Ok(selector) = Selector::parse(&CONTENT_TAGS.join(",")) else {
            tracing::warn!("failed to build content selector for {}", url);
            return Vec::new();
        };
        let Ok(link_selector) = Selector::parse("a") else {
            return Vec::new();
        };

        let mut paragraphs = Vec::new();
        for element in document.select(&selector) {
            let text: String = element.text().collect::<Vec<_>>().join(" ");
            let text = text.trim();
            if text.len() < MIN_CHUNK_LEN {
                continue;
            }

            let link_chars: usize = element
                .select(&link_selector)
                .map(|a| a.text().collect::<String>().len())
                .sum();
            let density = link_chars as f32 / text.len() as f32;
            if density > self.max_link_density {
                continue;
            }

            paragraphs.push(text.to_string());
        }
        paragraphs
    }
}

/// Calls out to Python's `trafilatura` package via `pyo3`, following
/// the teacher's own embedded-Python pattern (the `pyo3` dependency and
/// its `trafilatura` wrapper invoked from `worker.rs`). `trafilatura`
/// returns an XML document; it's pulled apart the same way
/// `TrafilaturaHandler` does in the original, just with `quick-xml`'s
/// pull parser instead of a SAX handler with mutable instance state.
pub struct PyTrafilaturaRemover {
    pub language: String,
}

impl BoilerplateRemover for PyTrafilaturaRemover {
    fn remove(&self, html: &str, url: &str) -> Vec<String> {
        let xml = match self.extract_xml(html, url) {
            Ok(Some(xml)) => xml,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!("trafilatura extraction failed for {}: {}", url, err);
                return Vec::new();
            }
        };
        parse_trafilatura_xml(&xml)
            .into_iter()
            .filter(|p| p.len() >= MIN_CHUNK_LEN)
            .collect()
    }
}

impl PyTrafilaturaRemover {
    fn extract_xml(&self, html: &str, url: &str) -> pyo3::PyResult<Option<String>> {
        use pyo3::prelude::*;
        use pyo3::types::PyDict;

        Python::with_gil(|py| {
            let trafilatura = py.import_bound("trafilatura")?;
            let kwargs = PyDict::new_bound(py);
            kwargs.set_item("output_format", "xml")?;
            kwargs.set_item("target_language", &self.language)?;
            kwargs.set_item("include_tables", false)?;
            let result = trafilatura.call_method("extract", (html, url), Some(&kwargs))?;
            if result.is_none() {
                Ok(None)
            } else {
                Ok(Some(result.extract::<String>()?))
            }
        })
    }
}

/// Pulls content out of trafilatura's XML output using the same
/// `{p, list, head, hi}` tag set the original `TrafilaturaHandler`
/// recognized, joining sibling text nodes within a tag with a space.
fn parse_trafilatura_xml(xml: &str) -> Vec<String> {
    use quick_xml::events::Event;
    use quick_xml::reader::Reader;

    const DATA_TAGS: &[&str] = &["p", "list", "head", "hi"];

    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let mut tag_content: Vec<String> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                stack.push(String::from_utf8_lossy(e.name().as_ref()).into_owned());
                tag_content.clear();
            }
            Ok(Event::End(e)) => {
                let closing = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if stack.last().map(|t| t.as_str()) != Some(closing.as_str()) {
                    // Mismatched tags in trafilatura's output: log and stop,
                    // rather than panic on malformed XML we don't control.
                    tracing::warn!("mismatched closing tag {} in trafilatura output", closing);
                    break;
                }
                if !tag_content.is_empty() {
                    paragraphs.push(tag_content.join(" "));
                }
                stack.pop();
            }
            Ok(Event::Text(e)) => {
                if let Some(top) = stack.last() {
                    if DATA_TAGS.contains(&top.as_str()) {
                        if let Ok(text) = e.unescape() {
                            let trimmed = text.trim();
                            if !trimmed.is_empty() {
                                tag_content.push(trimmed.to_string());
                            }
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                tracing::warn!("trafilatura XML parse error: {}", err);
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    paragraphs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_prose_paragraphs_and_drops_link_clusters() {
        let html = r#"
            <html><body>
                <p>This is a real paragraph with enough content to survive the length check.</p>
                <nav><a href="/a">link one</a><a href="/b">link two</a><a href="/c">link three</a></nav>
            </body></html>
        "#;
        let remover = HeuristicRemover::default();
        let kept = remover.remove(html, "http://example.com/");
        assert_eq!(kept.len(), 1);
        assert!(kept[0].contains("real paragraph"));
    }

    #[test]
    fn drops_short_fragments() {
        let html = "<html><body><p>hi</p></body></html>";
        let remover = HeuristicRemover::default();
        assert!(remover.remove(html, "http://example.com/").is_empty());
    }

    #[test]
    fn parses_trafilatura_style_xml_into_paragraphs() {
        let xml = "<doc><p>Hello there, this is a paragraph.</p><head>Section title</head></doc>";
        let paragraphs = parse_trafilatura_xml(xml);
        assert_eq!(paragraphs.len(), 2);
        assert!(paragraphs[0].contains("Hello there"));
    }
}
