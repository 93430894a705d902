//! The sanitizing pipeline: pre-filter, structural pass, post-filter.

pub mod attribute;
pub mod tag;

use tracing::{debug, warn};

use crate::{
    config::FilterConfig,
    error::{FilterError, FilterResult},
    model::{Attributes, ElementFrame},
    parser::{self, Handler},
    rules::{RuleRepository, SiteRuleEngine},
    util::html::escape,
};

use self::{attribute::AttributePolicy, tag::TagPolicy};

/// Sanitize `html` from `site_url` with `config`, drawing site rules from
/// `config.site_rules`. Never fails; the worst case is an empty string.
pub fn sanitize(html: &str, site_url: &str, config: &FilterConfig) -> String {
    Sanitizer::new(config).sanitize(html, site_url)
}

pub struct Sanitizer<'a> {
    config: &'a FilterConfig,
    rules: &'a dyn RuleRepository,
}

impl<'a> Sanitizer<'a> {
    pub fn new(config: &'a FilterConfig) -> Self {
        Self {
            config,
            rules: &config.site_rules,
        }
    }

    /// Use another rule repository instead of the one embedded in the config.
    pub fn with_rules(mut self, rules: &'a dyn RuleRepository) -> Self {
        self.rules = rules;
        self
    }

    pub fn sanitize(&self, html: &str, site_url: &str) -> String {
        if html.trim().is_empty() {
            return String::new();
        }

        let tags = TagPolicy::new(self.config);
        let input = tags.remove_blacklisted_tags(html);

        let mut pipeline = Pipeline {
            tags,
            attributes: AttributePolicy::new(self.config, site_url),
            max_depth: self.config.max_depth,
            frames: Vec::with_capacity(16),
            output: String::with_capacity(input.len()),
        };

        if let Err(err) = parser::parse(&input, &mut pipeline) {
            match err {
                FilterError::DepthExceeded(max_depth) => {
                    warn!(site_url, max_depth, "markup nested too deeply; output truncated");
                }
                other => {
                    warn!(error = %other, site_url, "markup parse stopped; output truncated");
                }
            }
            pipeline.close_open_frames();
        }

        let Pipeline { tags, output, .. } = pipeline;
        let output = tags.remove_empty_tags(&output);
        let output = SiteRuleEngine::new(self.rules).apply(output, site_url);
        let output = tags.remove_multiple_break_tags(&output);
        let output = output.trim().to_string();

        debug!(site_url, input_len = html.len(), output_len = output.len(), "markup sanitized");
        output
    }
}

/// Per-call state of the structural pass.
struct Pipeline<'a> {
    tags: TagPolicy<'a>,
    attributes: AttributePolicy<'a>,
    max_depth: usize,
    frames: Vec<ElementFrame>,
    output: String,
}

impl Pipeline<'_> {
    /// Close every open tag that reached the output, innermost first.
    fn close_open_frames(&mut self) {
        while let Some(frame) = self.frames.pop() {
            if frame.emitted {
                self.output.push_str(&self.tags.close_html_tag(&frame.name));
            }
        }
    }
}

impl Handler for Pipeline<'_> {
    fn open_tag(&mut self, name: &str, attributes: Attributes) -> FilterResult<()> {
        if self.frames.len() >= self.max_depth {
            return Err(FilterError::DepthExceeded(self.max_depth));
        }

        let mut frame = ElementFrame {
            name: name.to_string(),
            emitted: false,
        };

        if self.tags.is_allowed(name, &attributes) {
            if let Some(filtered) = self.attributes.filter(name, attributes) {
                if self.attributes.has_required_attributes(name, &filtered) {
                    let filtered = self.attributes.add_overrides(name, filtered);
                    let rendered = self.attributes.to_html(&filtered);
                    self.output.push_str(&self.tags.open_html_tag(name, &rendered));
                    frame.emitted = true;
                } else {
                    debug!(tag = name, "element missing required attributes");
                }
            }
        }

        self.frames.push(frame);
        Ok(())
    }

    fn close_tag(&mut self, name: &str) -> FilterResult<()> {
        if let Some(frame) = self.frames.pop() {
            if frame.emitted && self.tags.is_allowed_tag(name) {
                self.output.push_str(&self.tags.close_html_tag(name));
            }
        }
        Ok(())
    }

    fn text(&mut self, content: &str) -> FilterResult<()> {
        let content = content.replace('\u{a0}', " ");
        self.output.push_str(&escape(&content));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SiteRule;
    use crate::rules::RuleBook;

    #[test]
    fn unwraps_disallowed_tags_but_keeps_their_text() {
        let config = FilterConfig::default();
        assert_eq!(
            sanitize("<div><span>hello</span> <blink>world</blink></div>", "http://example.com", &config),
            "hello world"
        );
    }

    #[test]
    fn rejected_parent_does_not_close() {
        let config = FilterConfig::default();
        assert_eq!(
            sanitize(r#"<a href="javascript:x()"><b>bold</b></a>"#, "http://example.com", &config),
            "<b>bold</b>"
        );
    }

    #[test]
    fn replaces_non_breaking_spaces_and_escapes_text() {
        let config = FilterConfig::default();
        assert_eq!(
            sanitize("<p>a&nbsp;b\u{a0}c &lt;script&gt;</p>", "http://example.com", &config),
            "<p>a b c &lt;script&gt;</p>"
        );
    }

    #[test]
    fn depth_limit_truncates_and_closes() {
        let config = FilterConfig {
            max_depth: 3,
            ..FilterConfig::default()
        };
        let html = "<p><b><i><u>deep</u></i></b></p><p>after</p>";
        assert_eq!(sanitize(html, "http://example.com", &config), "");

        let html = "<p>top<b><i><u>deep</u></i></b></p><p>after</p>";
        assert_eq!(sanitize(html, "http://example.com", &config), "<p>top</p>");
    }

    #[test]
    fn malformed_markup_keeps_only_the_sanitized_prefix() {
        let config = FilterConfig::default();
        let html = r#"<p>kept</p><p>also <a href="http://x.org/>broken"#;
        assert_eq!(sanitize(html, "http://example.com", &config), "<p>kept</p><p>also </p>");
    }

    #[test]
    fn rules_from_another_repository() {
        let config = FilterConfig::default();
        let mut book = RuleBook::new();
        book.insert("example.com", vec![SiteRule::new(".*").substitute("<p>ad</p>", "")]);

        let output = Sanitizer::new(&config)
            .with_rules(&book)
            .sanitize("<p>story</p><p>ad</p>", "http://example.com/");
        assert_eq!(output, "<p>story</p>");
    }

    #[test]
    fn rules_embedded_in_the_config() {
        let mut book = RuleBook::new();
        book.insert("example.com", vec![SiteRule::new("/news/").substitute("teaser", "story")]);
        let config = FilterConfig::default().with_site_rules(book);

        assert_eq!(
            sanitize("<p>teaser</p>", "http://www.example.com/news/1", &config),
            "<p>story</p>"
        );
        assert_eq!(
            sanitize("<p>teaser</p>", "http://www.example.com/sports/1", &config),
            "<p>teaser</p>"
        );
    }
}
