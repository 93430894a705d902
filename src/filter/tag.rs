//! Tag-level policy. Tag names arrive lowercased from the parser and are compared as-is.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::{config::FilterConfig, model::Attributes, parser::is_void_tag, util::html};

/// Elements whose meaning comes from the resource they reference, kept even when empty.
const EMBED_TAGS: &[&str] = &["iframe", "video", "audio"];

static EMPTY_ELEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<([a-zA-Z][a-zA-Z0-9-]*)((?:\s[^<>]*)?)>\s*</([a-zA-Z][a-zA-Z0-9-]*)\s*>")
        .expect("EMPTY_ELEMENT_RE: hardcoded regex is valid")
});

static BREAK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:<br\s*/?>\s*){2,}").expect("BREAK_RUN_RE: hardcoded regex is valid")
});

/// Tag-level decisions and rendering.
pub struct TagPolicy<'a> {
    config: &'a FilterConfig,
}

impl<'a> TagPolicy<'a> {
    pub fn new(config: &'a FilterConfig) -> Self {
        Self { config }
    }

    /// Whether an element may be emitted given its raw attributes.
    pub fn is_allowed(&self, name: &str, attributes: &Attributes) -> bool {
        self.is_allowed_tag(name) && !is_pixel_tracker(name, attributes)
    }

    pub fn is_allowed_tag(&self, name: &str) -> bool {
        self.config.whitelisted_tags.contains_key(name) && !self.is_blacklisted(name)
    }

    fn is_blacklisted(&self, name: &str) -> bool {
        self.config
            .blacklisted_tags
            .iter()
            .any(|tag| tag.eq_ignore_ascii_case(name))
    }

    pub fn open_html_tag(&self, name: &str, attributes: &str) -> String {
        if attributes.is_empty() {
            format!("<{}>", name)
        } else {
            format!("<{} {}>", name, attributes)
        }
    }

    pub fn close_html_tag(&self, name: &str) -> String {
        if is_void_tag(name) {
            String::new()
        } else {
            format!("</{}>", name)
        }
    }

    /// Strip blacklisted tags and everything inside them from raw markup.
    pub fn remove_blacklisted_tags(&self, markup: &str) -> String {
        html::remove_blocks(markup, &self.config.blacklisted_tags)
    }

    /// Remove elements without content until nothing changes, so parents emptied
    /// by removing their children go too. Embed elements stay.
    pub fn remove_empty_tags(&self, output: &str) -> String {
        let mut current = output.to_string();
        loop {
            let next = EMPTY_ELEMENT_RE
                .replace_all(&current, |caps: &Captures<'_>| {
                    let open = &caps[1];
                    let removable = open.eq_ignore_ascii_case(&caps[3])
                        && !EMBED_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(open));
                    if removable {
                        String::new()
                    } else {
                        caps[0].to_string()
                    }
                })
                .into_owned();
            if next == current {
                return current;
            }
            current = next;
        }
    }

    /// Collapse runs of two or more line breaks into one.
    pub fn remove_multiple_break_tags(&self, output: &str) -> String {
        BREAK_RUN_RE.replace_all(output, "<br>").into_owned()
    }
}

/// 1x1 (or smaller) images are tracking beacons.
fn is_pixel_tracker(name: &str, attributes: &Attributes) -> bool {
    if name != "img" {
        return false;
    }
    let tiny = |attr: &str| {
        attributes
            .get(attr)
            .map(|v| v.trim().trim_end_matches("px").trim())
            .and_then(|v| v.parse::<u32>().ok())
            .is_some_and(|v| v <= 1)
    };
    tiny("width") && tiny("height")
}
