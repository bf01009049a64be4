//! Document model and semi-XML corpus serialization (spec §3/§6).
//!
//! `Document` generalizes the teacher's plain structs (and the Python
//! original's `OrderedDict`-based records) into an order-preserving
//! map so attribute and header order survive a round trip. `Display`
//! serializes to the §6 format; [`CorpusReader`] re-parses it, raising
//! [`CoreError::Parse`] on mismatched or unclosed tags (spec §8
//! invariant 7 / scenario S6).

use std::fmt;

use indexmap::IndexMap;
use quick_xml::escape::{escape, unescape};

use crate::error::CoreError;

/// A parsed corpus record: `{attrs, meta, paragraphs}` per spec §3.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    /// `url, domain, warc-file, offset, length, status, mime-type`,
    /// in insertion order (serialized as the `<doc>` tag's attributes).
    pub attrs: IndexMap<String, String>,
    /// Original request/response headers, keyed by section name
    /// (`request`, `response`).
    pub meta: IndexMap<String, String>,
    pub paragraphs: Vec<String>,
}

impl Document {
    pub fn new() -> Document {
        Document::default()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<doc")?;
        for (key, value) in &self.attrs {
            write!(f, " {}=\"{}\"", key, escape(value))?;
        }
        writeln!(f, ">")?;

        writeln!(f, "<meta>")?;
        for (section, body) in &self.meta {
            writeln!(f, "<{section}>")?;
            writeln!(f, "{body}")?;
            writeln!(f, "</{section}>")?;
        }
        writeln!(f, "</meta>")?;

        for paragraph in &self.paragraphs {
            writeln!(f, "<p>")?;
            writeln!(f, "{}", escape(paragraph))?;
            writeln!(f, "</p>")?;
            writeln!(f)?;
        }

        write!(f, "</doc>")?;
        Ok(())
    }
}

/// A pull-parser for the semi-XML corpus format (spec §9 redesign
/// note: replaces the Python SAX handler and its mutable globals with
/// an explicit tag stack). Recognizes tags only on lines that are
/// exactly `<tag ...>` or `</tag>`, per spec §6; anything else is body
/// text belonging to the innermost open leaf tag (`request`,
/// `response`, or `p`).
pub struct CorpusReader;

struct InProgressDoc {
    attrs: IndexMap<String, String>,
    meta: IndexMap<String, String>,
    paragraphs: Vec<String>,
}

impl CorpusReader {
    /// Parses the whole contents of one corpus file into its
    /// documents. `file` is used only to label errors.
    pub fn parse(file: &str, contents: &str) -> Result<Vec<Document>, CoreError> {
        let mut documents = Vec::new();
        let mut stack: Vec<String> = Vec::new();
        let mut doc: Option<InProgressDoc> = None;
        let mut body: Vec<String> = Vec::new();

        for (lineno, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim_end();
            let lineno = lineno + 1;

            if let Some(tag) = closing_tag(line) {
                let expected = stack.pop().ok_or_else(|| CoreError::Parse {
                    file: file.to_string(),
                    line: lineno,
                    message: format!("unmatched closing tag </{tag}>"),
                })?;
                if expected != tag {
                    return Err(CoreError::Parse {
                        file: file.to_string(),
                        line: lineno,
                        message: format!("closing tag </{tag}> does not match open <{expected}>"),
                    });
                }

                match tag.as_str() {
                    "doc" => {
                        let finished = doc.take().ok_or_else(|| CoreError::Parse {
                            file: file.to_string(),
                            line: lineno,
                            message: "</doc> with no open document".to_string(),
                        })?;
                        documents.push(Document {
                            attrs: finished.attrs,
                            meta: finished.meta,
                            paragraphs: finished.paragraphs,
                        });
                    }
                    "meta" => {}
                    "p" => {
                        let current = doc.as_mut().ok_or_else(|| CoreError::Parse {
                            file: file.to_string(),
                            line: lineno,
                            message: "</p> outside a document".to_string(),
                        })?;
                        let text = unescape(body.join("\n").trim())
                            .map_err(|e| CoreError::Parse {
                                file: file.to_string(),
                                line: lineno,
                                message: format!("bad escape in paragraph: {e}"),
                            })?
                            .into_owned();
                        current.paragraphs.push(text);
                        body.clear();
                    }
                    section => {
                        let current = doc.as_mut().ok_or_else(|| CoreError::Parse {
                            file: file.to_string(),
                            line: lineno,
                            message: format!("</{section}> outside a document"),
                        })?;
                        current
                            .meta
                            .insert(section.to_string(), body.join("\n").trim().to_string());
                        body.clear();
                    }
                }
                continue;
            }

            if let Some((tag, attrs_str)) = opening_tag(line) {
                stack.push(tag.clone());
                match tag.as_str() {
                    "doc" => {
                        let attrs = parse_attrs(&attrs_str).map_err(|message| CoreError::Parse {
                            file: file.to_string(),
                            line: lineno,
                            message,
                        })?;
                        doc = Some(InProgressDoc {
                            attrs,
                            meta: IndexMap::new(),
                            paragraphs: Vec::new(),
                        });
                    }
                    "meta" | "request" | "response" | "p" => {
                        body.clear();
                    }
                    other => {
                        return Err(CoreError::Parse {
                            file: file.to_string(),
                            line: lineno,
                            message: format!("unrecognized tag <{other}>"),
                        });
                    }
                }
                continue;
            }

            // Ignorable whitespace between paragraphs is dropped; any
            // other non-tag line is body text for the innermost leaf.
            if line.is_empty() {
                if matches!(stack.last().map(|s| s.as_str()), Some("request" | "response" | "p")) {
                    body.push(String::new());
                }
                continue;
            }
            body.push(line.to_string());
        }

        if !stack.is_empty() {
            return Err(CoreError::Parse {
                file: file.to_string(),
                line: contents.lines().count(),
                message: format!("unclosed tags at end of file: {stack:?}"),
            });
        }

        Ok(documents)
    }
}

fn opening_tag(line: &str) -> Option<(String, String)> {
    if !line.starts_with('<') || line.starts_with("</") || !line.ends_with('>') {
        return None;
    }
    let inner = &line[1..line.len() - 1];
    let tag = inner.split_whitespace().next()?.to_string();
    let attrs_str = inner[tag.len()..].trim().to_string();
    Some((tag, attrs_str))
}

fn closing_tag(line: &str) -> Option<String> {
    if !line.starts_with("</") || !line.ends_with('>') {
        return None;
    }
    Some(line[2..line.len() - 1].to_string())
}

/// Parses `key="value"` pairs out of a start tag's attribute string.
/// Values are XML-unescaped.
fn parse_attrs(attrs_str: &str) -> Result<IndexMap<String, String>, String> {
    let mut attrs = IndexMap::new();
    let mut rest = attrs_str;
    while !rest.trim().is_empty() {
        rest = rest.trim_start();
        let eq = rest.find('=').ok_or_else(|| format!("malformed attributes: {attrs_str}"))?;
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];
        rest = rest.trim_start();
        if !rest.starts_with('"') {
            return Err(format!("malformed attribute value: {attrs_str}"));
        }
        rest = &rest[1..];
        let close = rest.find('"').ok_or_else(|| format!("unterminated attribute value: {attrs_str}"))?;
        let value = unescape(&rest[..close])
            .map_err(|e| format!("bad escape in attribute {key}: {e}"))?
            .into_owned();
        attrs.insert(key, value);
        rest = &rest[close + 1..];
    }
    Ok(attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        let mut attrs = IndexMap::new();
        attrs.insert("url".to_string(), "http://x/".to_string());
        attrs.insert("domain".to_string(), "x".to_string());
        let mut meta = IndexMap::new();
        meta.insert("request".to_string(), "GET /".to_string());
        meta.insert("response".to_string(), "200 OK".to_string());
        Document {
            attrs,
            meta,
            paragraphs: vec!["hi <you>".to_string()],
        }
    }

    #[test]
    fn serializes_escaped_paragraph_inside_doc_tag() {
        let doc = sample_document();
        let text = doc.to_string();
        assert!(text.starts_with("<doc url=\"http://x/\" domain=\"x\">"));
        assert!(text.contains("hi &lt;you&gt;"));
        assert!(text.trim_end().ends_with("</doc>"));
    }

    #[test]
    fn round_trips_through_display_and_parse() {
        let doc = sample_document();
        let serialized = doc.to_string();
        let parsed = CorpusReader::parse("test.corpus", &serialized).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0], doc);
    }

    #[test]
    fn mismatched_closing_tag_is_a_parse_error() {
        let bad = "<doc url=\"http://x/\">\n<meta>\n</meta>\n</p>\n</doc>";
        let err = CorpusReader::parse("bad.corpus", bad).unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }

    #[test]
    fn unclosed_tag_is_a_parse_error() {
        let bad = "<doc url=\"http://x/\">\n<meta>\n</meta>";
        let err = CorpusReader::parse("bad.corpus", bad).unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }
}
