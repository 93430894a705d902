use tracing::debug;
use url::Url;

use crate::{
    config::{FilterConfig, ImageProxy},
    model::Attributes,
    util::url_norm::{host_matches, resolve, strip_query_params},
};

/// Attributes that hold a URL besides the configured media attributes.
const URL_ATTRIBUTES: &[&str] = &["cite", "longdesc", "background", "action", "formaction"];

const IFRAME_TAGS: &[&str] = &["iframe"];

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtube-nocookie.com"];

/// Outcome of filtering a single attribute.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Keep(String),
    Drop,
    /// The whole element must not be emitted.
    RejectTag,
}

/// Filters and rewrites the attributes of allowed tags.
pub struct AttributePolicy<'a> {
    config: &'a FilterConfig,
    base: Option<Url>,
}

impl<'a> AttributePolicy<'a> {
    pub fn new(config: &'a FilterConfig, site_url: &str) -> Self {
        let base = Url::parse(site_url.trim()).ok();
        if base.is_none() && !site_url.trim().is_empty() {
            debug!(site_url, "site url is not absolute; relative links will be dropped");
        }
        Self { config, base }
    }

    /// Filter `attributes` of `tag`. `None` means the element is rejected outright
    /// (blacklisted media, iframe without a source from a listed host).
    pub fn filter(&self, tag: &str, attributes: Attributes) -> Option<Attributes> {
        let mut filtered = Attributes::new();
        for (name, value) in attributes {
            match self.filter_attribute(tag, &name, value) {
                Verdict::Keep(value) => {
                    filtered.insert(name, value);
                }
                Verdict::Drop => {
                    debug!(tag, attribute = %name, "attribute dropped");
                }
                Verdict::RejectTag => {
                    debug!(tag, attribute = %name, "element rejected by attribute policy");
                    return None;
                }
            }
        }

        // a kept iframe src has already passed the host whitelist
        if IFRAME_TAGS.contains(&tag) && !filtered.contains("src") {
            debug!(tag, "embed rejected without an allowed source");
            return None;
        }
        Some(filtered)
    }

    pub fn has_required_attributes(&self, tag: &str, attributes: &Attributes) -> bool {
        self.config
            .required_attributes
            .get(tag)
            .map_or(true, |required| required.iter().all(|attr| attributes.contains(attr)))
    }

    /// Force the configured values for `tag`, replacing filtered ones.
    pub fn add_overrides(&self, tag: &str, mut attributes: Attributes) -> Attributes {
        if let Some(overrides) = self.config.attribute_overrides.get(tag) {
            for (name, value) in overrides {
                attributes.set(name.as_str(), value.as_str());
            }
        }
        attributes
    }

    pub fn to_html(&self, attributes: &Attributes) -> String {
        attributes.to_string()
    }

    fn filter_attribute(&self, tag: &str, name: &str, value: String) -> Verdict {
        if !self.is_whitelisted(tag, name) {
            return Verdict::Drop;
        }

        if self.config.integer_attributes.contains(name) {
            return match value.trim().parse::<u32>() {
                Ok(number) => Verdict::Keep(number.to_string()),
                Err(_) => Verdict::Drop,
            };
        }

        if !self.is_url_attribute(name) {
            return Verdict::Keep(value);
        }

        let Some(mut url) = resolve(self.base.as_ref(), &value) else {
            return Verdict::Drop;
        };

        if !self.is_allowed_scheme(url.scheme()) {
            return Verdict::Drop;
        }

        if self.config.media_attributes.contains(name) && self.is_blacklisted_media(url.as_str()) {
            return Verdict::RejectTag;
        }

        if IFRAME_TAGS.contains(&tag) && name == "src" {
            if !self.is_allowed_iframe(&url) {
                return Verdict::RejectTag;
            }
            secure_iframe_src(&mut url);
        }

        if tag == "img" && name == "src" {
            if let Some(proxied) = self.rewrite_image_proxy(&url, &value) {
                return match resolve(self.base.as_ref(), &proxied) {
                    Some(proxied) if self.is_allowed_scheme(proxied.scheme()) => {
                        Verdict::Keep(proxied.to_string())
                    }
                    _ => {
                        debug!(tag, proxied = %proxied, "proxied image url is not usable");
                        Verdict::Drop
                    }
                };
            }
        }

        Verdict::Keep(url.to_string())
    }

    fn is_whitelisted(&self, tag: &str, name: &str) -> bool {
        self.config
            .whitelisted_tags
            .get(tag)
            .is_some_and(|attrs| attrs.contains(name))
    }

    fn is_url_attribute(&self, name: &str) -> bool {
        self.config.media_attributes.contains(name) || URL_ATTRIBUTES.contains(&name)
    }

    fn is_allowed_scheme(&self, scheme: &str) -> bool {
        self.config.scheme_whitelist.iter().any(|allowed| {
            allowed
                .trim()
                .trim_end_matches('/')
                .trim_end_matches(':')
                .eq_ignore_ascii_case(scheme)
        })
    }

    fn is_blacklisted_media(&self, url: &str) -> bool {
        let url = url.to_ascii_lowercase();
        self.config
            .media_blacklist
            .iter()
            .map(|pattern| pattern.trim().to_ascii_lowercase())
            .any(|pattern| !pattern.is_empty() && url.contains(&pattern))
    }

    fn is_allowed_iframe(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.config
            .iframe_whitelist
            .iter()
            .any(|pattern| host_matches(host, pattern))
    }

    fn proxies_scheme(&self, scheme: &str) -> bool {
        match self.config.image_proxy_protocol.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(protocol) => protocol.eq_ignore_ascii_case(scheme),
        }
    }

    /// Route an image URL through the configured proxy. `raw` is the attribute value as
    /// written; values already pointing at the proxy are left alone. The result may be
    /// relative to the site and still has to be resolved.
    fn rewrite_image_proxy(&self, url: &Url, raw: &str) -> Option<String> {
        if !self.proxies_scheme(url.scheme()) {
            return None;
        }

        match &self.config.image_proxy {
            ImageProxy::Disabled => None,
            ImageProxy::Url(template) => {
                let prefix = template.split("%s").next().unwrap_or_default().trim();
                if self.is_proxied(prefix, url, raw) {
                    return None;
                }
                let encoded: String = form_urlencoded::byte_serialize(url.as_str().as_bytes()).collect();
                if template.contains("%s") {
                    Some(template.replacen("%s", &encoded, 1))
                } else {
                    Some(format!("{template}{encoded}"))
                }
            }
            ImageProxy::Callback(callback) => Some(callback(url.as_str())),
        }
    }

    fn is_proxied(&self, prefix: &str, url: &Url, raw: &str) -> bool {
        if prefix.is_empty() {
            return false;
        }
        raw.trim().starts_with(prefix)
            || resolve(self.base.as_ref(), prefix)
                .is_some_and(|resolved| url.as_str().starts_with(resolved.as_str()))
    }
}

/// Upgrade plain-http embeds and stop YouTube players from starting on their own.
fn secure_iframe_src(url: &mut Url) {
    if url.scheme() == "http" {
        url.set_scheme("https").ok();
    }

    let is_youtube = url
        .host_str()
        .is_some_and(|host| YOUTUBE_HOSTS.iter().any(|yt| host_matches(host, yt)));
    if is_youtube {
        strip_query_params(url, |key| key.eq_ignore_ascii_case("autoplay"));
    }
}
