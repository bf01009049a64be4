//! Content conversion, step 2 of the boilerplate-extraction pipeline
//! (spec §4.E), keyed on `WARC-Identified-Payload-Type`. Generalizes
//! `original_source/cc_corpus/content_conversion.py`'s
//! `convert_atom`/`convert_rss`/`convert` into a tagged enum (spec §9's
//! redesign note: replaces the original's duck-typed dispatch).

use atom_syndication::Feed as AtomFeed;
use rss::Channel as RssChannel;

/// Which converter a record's declared payload type selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentConverter {
    Atom,
    Rss,
    Html,
    Text,
}

impl ContentConverter {
    pub fn for_payload_type(payload_type: &str) -> ContentConverter {
        match payload_type {
            "application/atom+xml" => ContentConverter::Atom,
            "application/rss+xml" => ContentConverter::Rss,
            "text/html" | "application/xhtml+xml" => ContentConverter::Html,
            _ => ContentConverter::Text,
        }
    }

    /// Converts `payload` into a list of text chunks ready for mime
    /// normalization. `Html`/`Text` pass the payload through unchanged
    /// (normalization and boilerplate removal do the real work on
    /// those); `Atom`/`Rss` expand the feed into per-entry chunks,
    /// dropping entries with no meaningful text, exactly as the
    /// original's `convert_atom`/`convert_rss` do.
    pub fn convert(&self, payload: &[u8]) -> Vec<String> {
        let chunks = match self {
            ContentConverter::Atom => convert_atom(payload),
            ContentConverter::Rss => convert_rss(payload),
            ContentConverter::Html | ContentConverter::Text => {
                vec![String::from_utf8_lossy(payload).into_owned()]
            }
        };
        chunks
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect()
    }
}

fn is_empty(s: &str) -> bool {
    s.trim().is_empty()
}

fn convert_atom(payload: &[u8]) -> Vec<String> {
    let Ok(feed) = AtomFeed::read_from(payload) else {
        return Vec::new();
    };
    let mut chunks = Vec::new();
    for entry in feed.entries() {
        let summary = entry.summary().map(|s| s.value.as_str()).filter(|s| !is_empty(s));
        let content = entry
            .content()
            .and_then(|c| c.value())
            .filter(|s| !is_empty(s));
        if summary.is_none() || content.is_none() {
            continue;
        }
        let mut pieces = Vec::new();
        let title = entry.title().value.as_str();
        if !is_empty(title) {
            pieces.push(format!("<p>{title}</p>"));
        }
        if let Some(summary) = summary {
            pieces.push(summary.to_string());
        }
        if let Some(content) = content {
            pieces.push(content.to_string());
        }
        if !pieces.is_empty() {
            chunks.push(pieces.join("\n\n"));
        }
    }
    chunks
}

fn compose_chunk(pieces: &[Option<&str>]) -> String {
    pieces
        .iter()
        .flatten()
        .filter(|p| !is_empty(p))
        .map(|p| format!("<p>{p}</p>"))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn convert_rss(payload: &[u8]) -> Vec<String> {
    let Ok(channel) = RssChannel::read_from(payload) else {
        return Vec::new();
    };
    let item_chunks: Vec<String> = channel
        .items()
        .iter()
        .filter(|item| !is_empty(item.title().unwrap_or("")) && !is_empty(item.description().unwrap_or("")))
        .map(|item| compose_chunk(&[item.title(), item.description()]))
        .collect();

    if !item_chunks.is_empty() || !is_empty(channel.description()) {
        let mut chunks = vec![compose_chunk(&[Some(channel.title()), Some(channel.description())])];
        chunks.extend(item_chunks);
        chunks
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_by_payload_type() {
        assert_eq!(
            ContentConverter::for_payload_type("application/atom+xml"),
            ContentConverter::Atom
        );
        assert_eq!(
            ContentConverter::for_payload_type("application/rss+xml"),
            ContentConverter::Rss
        );
        assert_eq!(
            ContentConverter::for_payload_type("text/html"),
            ContentConverter::Html
        );
        assert_eq!(
            ContentConverter::for_payload_type("application/pdf"),
            ContentConverter::Text
        );
    }

    #[test]
    fn html_and_text_pass_through_unchanged() {
        let chunks = ContentConverter::Html.convert(b"<p>hi</p>");
        assert_eq!(chunks, vec!["<p>hi</p>".to_string()]);
    }

    #[test]
    fn malformed_feed_yields_no_chunks() {
        assert!(ContentConverter::Atom.convert(b"not xml at all").is_empty());
    }
}
