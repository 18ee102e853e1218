//! Push notification feed parsing
//!
//! The hub delivers new-video notifications as Atom feeds. Entries mix
//! namespaced (`yt:videoId`, `yt:channelId`) and plain Atom elements and may
//! carry several `<link>` elements, so the document is walked as a token
//! stream rather than deserialized structurally. Unknown elements are skipped.

use crate::core::NotificationEntry;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("unsupported payload: expected an Atom feed")]
    UnsupportedPayload,

    #[error("malformed feed: {0}")]
    Malformed(String),
}

/// Checks that a payload is an Atom feed.
///
/// The payload is accepted when the content type names an Atom document, or
/// when the body, after an optional BOM and XML declaration, starts with a
/// `feed` root element.
pub fn classify(content_type: Option<&str>, body: &[u8]) -> Result<(), FeedError> {
    let declared_atom = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("atom+xml"))
        .unwrap_or(false);
    if declared_atom || starts_with_feed_root(body) {
        Ok(())
    } else {
        Err(FeedError::UnsupportedPayload)
    }
}

fn starts_with_feed_root(body: &[u8]) -> bool {
    let mut rest = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    rest = trim_ascii_start(rest);

    if rest.starts_with(b"<?xml") {
        match find(rest, b"?>") {
            Some(end) => rest = trim_ascii_start(&rest[end + 2..]),
            None => return false,
        }
    }

    let Some(tag) = rest.strip_prefix(b"<") else {
        return false;
    };
    let name_len = tag
        .iter()
        .position(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
        .unwrap_or(tag.len());
    let name = &tag[..name_len];
    let local = match name.iter().rposition(|b| *b == b':') {
        Some(colon) => &name[colon + 1..],
        None => name,
    };
    local == b"feed"
}

fn trim_ascii_start(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// The entry field currently receiving text.
#[derive(Debug, Clone, Copy)]
enum Field {
    VideoId,
    ChannelId,
    Title,
    Published,
    Updated,
}

impl Field {
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name {
            b"videoId" => Some(Field::VideoId),
            b"channelId" => Some(Field::ChannelId),
            b"title" => Some(Field::Title),
            b"published" => Some(Field::Published),
            b"updated" => Some(Field::Updated),
            _ => None,
        }
    }

    fn slot<'a>(&self, entry: &'a mut NotificationEntry) -> &'a mut String {
        match self {
            Field::VideoId => &mut entry.video_id,
            Field::ChannelId => &mut entry.channel_id,
            Field::Title => &mut entry.title,
            Field::Published => &mut entry.published,
            Field::Updated => &mut entry.updated,
        }
    }
}

/// Parses every `<entry>` of an Atom feed.
///
/// Malformed XML fails the whole parse. A feed without entries yields an
/// empty list.
pub fn parse_feed(body: &[u8]) -> Result<Vec<NotificationEntry>, FeedError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;
    let mut saw_root = false;
    // Depth of the open <entry> element, if any.
    let mut entry_depth: Option<usize> = None;
    let mut entry = NotificationEntry::default();
    let mut field: Option<Field> = None;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| FeedError::Malformed(format!("at byte {}: {}", reader.error_position(), e)))?;

        match event {
            Event::Start(ref e) => {
                depth += 1;
                saw_root = true;
                let local = e.local_name();
                match entry_depth {
                    None if local.as_ref() == b"entry" => {
                        entry_depth = Some(depth);
                        entry = NotificationEntry::default();
                    }
                    Some(d) if depth == d + 1 => {
                        if local.as_ref() == b"link" {
                            capture_link(e, &mut entry)?;
                        } else {
                            field = Field::from_local_name(local.as_ref());
                        }
                    }
                    _ => {}
                }
            }
            Event::Empty(ref e) => {
                saw_root = true;
                match entry_depth {
                    Some(d) if depth == d && e.local_name().as_ref() == b"link" => {
                        capture_link(e, &mut entry)?;
                    }
                    None if e.local_name().as_ref() == b"entry" => {
                        entries.push(NotificationEntry::default());
                    }
                    _ => {}
                }
            }
            Event::Text(ref t) => {
                if let Some(f) = field {
                    let text = t
                        .unescape()
                        .map_err(|e| FeedError::Malformed(e.to_string()))?;
                    f.slot(&mut entry).push_str(&text);
                }
            }
            Event::CData(ref t) => {
                if let Some(f) = field {
                    f.slot(&mut entry).push_str(&String::from_utf8_lossy(t));
                }
            }
            Event::End(_) => {
                if entry_depth == Some(depth) {
                    entries.push(std::mem::take(&mut entry));
                    entry_depth = None;
                }
                field = None;
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(FeedError::Malformed("document has no root element".to_string()));
    }
    if depth != 0 {
        return Err(FeedError::Malformed("unexpected end of document".to_string()));
    }
    Ok(entries)
}

fn capture_link(element: &BytesStart<'_>, entry: &mut NotificationEntry) -> Result<(), FeedError> {
    if entry.alternate_link.is_some() {
        return Ok(());
    }

    let mut rel = None;
    let mut href = None;
    for attr in element.attributes() {
        let attr = attr.map_err(|e| FeedError::Malformed(e.to_string()))?;
        let value = attr
            .unescape_value()
            .map_err(|e| FeedError::Malformed(e.to_string()))?
            .into_owned();
        match attr.key.local_name().as_ref() {
            b"rel" => rel = Some(value),
            b"href" => href = Some(value),
            _ => {}
        }
    }

    // A link without `rel` is an alternate link in Atom.
    if rel.as_deref().unwrap_or("alternate") == "alternate" {
        entry.alternate_link = href;
    }
    Ok(())
}
