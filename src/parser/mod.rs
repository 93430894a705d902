//! Structural event source.
//!
//! Turns tag soup into a flat stream of open/close/text events delivered to a
//! [`Handler`]. The stream is always balanced: void elements are closed right
//! after they open, stray end tags are ignored, misnested end tags close the
//! elements opened after their match, and whatever is still open at the end of
//! input is closed. No DTD, external entity or include is ever resolved; only
//! the built-in HTML named and numeric character references are decoded.

use std::borrow::Cow;

use quick_xml::escape::{resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::{FilterError, FilterResult};
use crate::model::Attributes;

/// Elements that never have content or an end tag.
pub const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

pub fn is_void_tag(name: &str) -> bool {
    VOID_TAGS.contains(&name)
}

/// Receiver of structural events. Tag and attribute names arrive lowercased;
/// text arrives with character references already decoded.
pub trait Handler {
    fn open_tag(&mut self, name: &str, attributes: Attributes) -> FilterResult<()>;
    fn close_tag(&mut self, name: &str) -> FilterResult<()>;
    fn text(&mut self, content: &str) -> FilterResult<()>;
}

/// Feed `markup` to `handler` in document order.
///
/// Stops at the first error, either from the tokenizer or from the handler.
/// Events already delivered stay delivered.
pub fn parse<H: Handler>(markup: &str, handler: &mut H) -> FilterResult<()> {
    let normalized = normalize(markup);
    let mut reader = Reader::from_str(&normalized);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = false;
    }

    let mut open: Vec<String> = Vec::with_capacity(16);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = tag_name(&reader, e.name().as_ref())?;
                handler.open_tag(&name, read_attributes(&reader, &e))?;
                if is_void_tag(&name) {
                    handler.close_tag(&name)?;
                } else {
                    open.push(name);
                }
            }
            Ok(Event::Empty(e)) => {
                let name = tag_name(&reader, e.name().as_ref())?;
                handler.open_tag(&name, read_attributes(&reader, &e))?;
                handler.close_tag(&name)?;
            }
            Ok(Event::End(e)) => {
                let name = tag_name(&reader, e.name().as_ref())?;
                if is_void_tag(&name) {
                    continue;
                }
                if let Some(pos) = open.iter().rposition(|n| *n == name) {
                    while open.len() > pos {
                        if let Some(inner) = open.pop() {
                            handler.close_tag(&inner)?;
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| FilterError::malformed(reader.buffer_position() as u64, err))?;
                handler.text(&text)?;
            }
            Ok(Event::CData(e)) => {
                let text = reader
                    .decoder()
                    .decode(&e)
                    .map_err(|err| FilterError::malformed(reader.buffer_position() as u64, err))?;
                handler.text(&text)?;
            }
            Ok(Event::GeneralRef(e)) => {
                let entity = e
                    .decode()
                    .map_err(|err| FilterError::malformed(reader.buffer_position() as u64, err))?;
                handler.text(&resolve_reference(&entity))?;
            }
            Ok(Event::Eof) => break,
            // comments, doctype, processing instructions
            Ok(_) => {}
            Err(err) => {
                return Err(FilterError::malformed(reader.buffer_position() as u64, err));
            }
        }
    }

    while let Some(name) = open.pop() {
        handler.close_tag(&name)?;
    }

    Ok(())
}

fn tag_name(reader: &Reader<&[u8]>, raw: &[u8]) -> FilterResult<String> {
    let decoded = reader
        .decoder()
        .decode(raw)
        .map_err(|err| FilterError::malformed(reader.buffer_position() as u64, err))?;
    Ok(decoded.to_ascii_lowercase())
}

fn read_attributes(reader: &Reader<&[u8]>, e: &BytesStart<'_>) -> Attributes {
    let mut attributes = Attributes::new();
    for attr in e.html_attributes().with_checks(false).flatten() {
        let key = match reader.decoder().decode(attr.key.as_ref()) {
            Ok(v) => v.to_ascii_lowercase(),
            Err(_) => continue,
        };
        let value = match reader.decoder().decode(&attr.value) {
            Ok(v) => decode_references(&v).into_owned(),
            Err(_) => continue,
        };
        attributes.insert(key, value);
    }
    attributes
}

fn resolve_reference(entity: &str) -> String {
    let raw = format!("&{};", entity);
    match unescape_with(&raw, resolve_html5_entity) {
        Ok(resolved) => resolved.into_owned(),
        Err(_) => raw,
    }
}

fn decode_references(raw: &str) -> Cow<'_, str> {
    unescape_with(raw, resolve_html5_entity).unwrap_or(Cow::Borrowed(raw))
}

/// Escape the characters tag soup leaves bare so the tokenizer accepts them:
/// `&` that does not start a character reference and `<` that does not start markup.
pub fn normalize(markup: &str) -> Cow<'_, str> {
    if !markup.contains(['<', '&']) {
        return Cow::Borrowed(markup);
    }

    let mut out = String::with_capacity(markup.len() + 16);
    for (index, ch) in markup.char_indices() {
        let rest = &markup[index + ch.len_utf8()..];
        match ch {
            '&' if !starts_with_reference(rest) => out.push_str("&amp;"),
            '<' if !starts_with_markup(rest) => out.push_str("&lt;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

fn starts_with_reference(rest: &str) -> bool {
    let body = rest.strip_prefix('#').unwrap_or(rest);
    let len = body.bytes().take_while(|b| b.is_ascii_alphanumeric()).count();
    len > 0 && len <= 32 && body.as_bytes().get(len) == Some(&b';')
}

fn starts_with_markup(rest: &str) -> bool {
    matches!(rest.as_bytes().first(), Some(b) if b.is_ascii_alphabetic() || matches!(b, b'/' | b'!' | b'?'))
}
