use url::{ParseError, Url};

/// Resolve an attribute value against the site URL.
/// Returns `None` when the value is empty or cannot become an absolute URL.
pub fn resolve(base: Option<&Url>, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    match Url::parse(raw) {
        Ok(url) => Some(url),
        Err(ParseError::RelativeUrlWithoutBase) => base?.join(raw).ok(),
        Err(_) => None,
    }
}

/// Path and query of the site URL, the part site rules are matched against.
pub fn base_path(site_url: &str) -> String {
    match Url::parse(site_url.trim()) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => site_url.trim().to_string(),
    }
}

/// Keys to look site rules up by, most specific first:
/// `www.example.com`, `example.com`, `.example.com`.
pub fn site_keys(site_url: &str) -> Vec<String> {
    let Some(host) = Url::parse(site_url.trim())
        .ok()
        .and_then(|url| url.host_str().map(|h| h.to_ascii_lowercase()))
    else {
        return Vec::new();
    };

    let mut keys = vec![host.clone()];
    if let Some(stripped) = host.strip_prefix("www.") {
        keys.push(stripped.to_string());
    }
    if let Some(pos) = host.find('.') {
        let parent = &host[pos..];
        if parent.len() > 1 && !keys.iter().any(|k| k == parent) {
            keys.push(parent.to_string());
        }
    }
    keys
}

/// True when `host` equals `pattern` or is one of its subdomains.
/// Patterns may carry a scheme (`https://www.youtube.com`); only the host part counts.
pub fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern_host(pattern);
    if pattern.is_empty() {
        return false;
    }
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == pattern
        || host
            .strip_suffix(pattern.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn pattern_host(pattern: &str) -> String {
    let pattern = pattern.trim();
    let without_scheme = pattern
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(pattern);
    without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('.')
        .to_ascii_lowercase()
}

/// Drop query parameters matching `remove`, keeping the order of the others.
pub fn strip_query_params(url: &mut Url, remove: impl Fn(&str) -> bool) {
    if url.query().is_none() {
        return;
    }

    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !remove(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut encoded = url.query_pairs_mut();
        encoded.clear();
        for (k, v) in pairs {
            encoded.append_pair(&k, &v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_relative_and_protocol_relative_values() {
        let base = Url::parse("http://example.com/blog/post.html").ok();
        let resolve_str = |raw: &str| resolve(base.as_ref(), raw).map(|u| u.to_string());

        assert_eq!(resolve_str("/foo.jpg").as_deref(), Some("http://example.com/foo.jpg"));
        assert_eq!(resolve_str("img/a.png").as_deref(), Some("http://example.com/blog/img/a.png"));
        assert_eq!(resolve_str("//cdn.example.org/x").as_deref(), Some("http://cdn.example.org/x"));
        assert_eq!(resolve_str("  "), None);
        assert_eq!(resolve(None, "/foo.jpg"), None);
    }

    #[test]
    fn scheme_of_obfuscated_javascript_is_detected() {
        let url = resolve(None, "java\tscript:alert(1)").map(|u| u.scheme().to_string());
        assert_eq!(url.as_deref(), Some("javascript"));
    }

    #[test]
    fn base_path_includes_query() {
        assert_eq!(base_path("https://example.com/news/1?page=2"), "/news/1?page=2");
        assert_eq!(base_path("https://example.com"), "/");
    }

    #[test]
    fn site_keys_cover_www_and_parent_domain() {
        assert_eq!(
            site_keys("https://www.example.com/a"),
            vec!["www.example.com", "example.com", ".example.com"]
        );
        assert_eq!(site_keys("http://blog.example.com"), vec!["blog.example.com", ".example.com"]);
        assert!(site_keys("not a url").is_empty());
    }

    #[test]
    fn host_matching_accepts_subdomains_only() {
        assert!(host_matches("www.youtube.com", "youtube.com"));
        assert!(host_matches("youtube.com", "youtube.com"));
        assert!(host_matches("www.youtube.com", "https://www.youtube.com"));
        assert!(!host_matches("notyoutube.com", "youtube.com"));
        assert!(!host_matches("evil.example", "youtube.com"));
    }

    #[test]
    fn strips_selected_query_params() {
        let mut url = Url::parse("https://www.youtube.com/embed/x?autoplay=1&rel=0").unwrap();
        strip_query_params(&mut url, |k| k == "autoplay");
        assert_eq!(url.as_str(), "https://www.youtube.com/embed/x?rel=0");

        let mut url = Url::parse("https://www.youtube.com/embed/x?autoplay=1").unwrap();
        strip_query_params(&mut url, |k| k == "autoplay");
        assert_eq!(url.as_str(), "https://www.youtube.com/embed/x");
    }
}
