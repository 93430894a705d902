use anyhow::{anyhow, Context};
use serde::{Deserialize, Deserializer};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt, fs,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use crate::rules::RuleBook;

const WHITELISTED_TAGS: &[(&str, &[&str])] = &[
    ("audio", &["controls", "src"]),
    ("video", &["poster", "controls", "height", "width", "src"]),
    ("source", &["src", "type"]),
    ("dt", &[]),
    ("dd", &[]),
    ("dl", &[]),
    ("table", &[]),
    ("caption", &[]),
    ("tr", &[]),
    ("th", &[]),
    ("td", &[]),
    ("tbody", &[]),
    ("thead", &[]),
    ("tfoot", &[]),
    ("h1", &[]),
    ("h2", &[]),
    ("h3", &[]),
    ("h4", &[]),
    ("h5", &[]),
    ("h6", &[]),
    ("strong", &[]),
    ("em", &[]),
    ("b", &[]),
    ("i", &[]),
    ("u", &[]),
    ("s", &[]),
    ("sub", &[]),
    ("sup", &[]),
    ("small", &[]),
    ("mark", &[]),
    ("code", &[]),
    ("pre", &[]),
    ("blockquote", &[]),
    ("p", &[]),
    ("ul", &[]),
    ("ol", &[]),
    ("li", &[]),
    ("br", &[]),
    ("hr", &[]),
    ("del", &[]),
    ("ins", &[]),
    ("a", &["href"]),
    ("img", &["src", "title", "alt"]),
    ("figure", &[]),
    ("figcaption", &[]),
    ("cite", &[]),
    ("time", &["datetime"]),
    ("abbr", &["title"]),
    (
        "iframe",
        &["width", "height", "frameborder", "src", "allowfullscreen"],
    ),
    ("q", &["cite"]),
];

const BLACKLISTED_TAGS: &[&str] = &["script", "style"];

const SCHEME_WHITELIST: &[&str] = &[
    "bitcoin", "callto", "ed2k", "facetime", "feed", "ftp", "geo", "git", "http", "https",
    "irc", "irc6", "ircs", "jabber", "magnet", "mailto", "nntp", "rtmp", "sftp", "sip", "sips",
    "skype", "smb", "sms", "spotify", "ssh", "steam", "svn", "tel",
];

const INTEGER_ATTRIBUTES: &[&str] = &["width", "height", "frameborder"];

const ATTRIBUTE_OVERRIDES: &[(&str, &[(&str, &str)])] = &[
    ("a", &[("rel", "noreferrer"), ("target", "_blank")]),
    ("video", &[("controls", "true")]),
];

const REQUIRED_ATTRIBUTES: &[(&str, &[&str])] = &[
    ("a", &["href"]),
    ("img", &["src"]),
    ("iframe", &["src"]),
    ("audio", &["src"]),
    ("source", &["src"]),
];

const MEDIA_BLACKLIST: &[&str] = &[
    "feeds.feedburner.com",
    "share.feedsportal.com",
    "da.feedsportal.com",
    "rc.feedsportal.com",
    "rss.feedsportal.com",
    "res.feedsportal.com",
    "res1.feedsportal.com",
    "res2.feedsportal.com",
    "res3.feedsportal.com",
    "pi.feedsportal.com",
    "rss.nytimes.com",
    "feeds.wordpress.com",
    "stats.wordpress.com",
    "rss.cnn.com",
    "twitter.com/home?status=",
    "twitter.com/share",
    "twitter_icon_large.png",
    "www.facebook.com/sharer.php",
    "facebook_icon_large.png",
    "plus.google.com/share",
    "www.gstatic.com/images/icons/gplus-16.png",
    "www.gstatic.com/images/icons/gplus-32.png",
    "www.gstatic.com/images/icons/gplus-64.png",
];

const MEDIA_ATTRIBUTES: &[&str] = &["src", "href", "poster"];

const IFRAME_WHITELIST: &[&str] = &[
    "www.youtube.com",
    "www.youtube-nocookie.com",
    "player.vimeo.com",
    "www.dailymotion.com",
    "vk.com",
];

const DEFAULT_MAX_DEPTH: usize = 512;

/// The canonical default policy.
pub static DEFAULT_FILTER_CONFIG: LazyLock<FilterConfig> = LazyLock::new(FilterConfig::default);

pub type ImageProxyCallback = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// How `img` sources are routed through an image proxy.
#[derive(Clone, Default)]
pub enum ImageProxy {
    #[default]
    Disabled,
    /// URL template; `%s` is replaced by the encoded image URL, otherwise it is appended.
    Url(String),
    Callback(ImageProxyCallback),
}

impl fmt::Debug for ImageProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageProxy::Disabled => f.write_str("Disabled"),
            ImageProxy::Url(url) => f.debug_tuple("Url").field(url).finish(),
            ImageProxy::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

fn deserialize_image_proxy<'de, D>(deserializer: D) -> Result<ImageProxy, D::Error>
where
    D: Deserializer<'de>,
{
    let url = Option::<String>::deserialize(deserializer)?;
    Ok(url
        .filter(|u| !u.trim().is_empty())
        .map(ImageProxy::Url)
        .unwrap_or_default())
}

/// Read-only policy snapshot for one sanitization call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Allowed tags and, per tag, the attributes it may keep.
    pub whitelisted_tags: BTreeMap<String, BTreeSet<String>>,
    /// Tags removed together with their content before parsing.
    pub blacklisted_tags: Vec<String>,
    pub scheme_whitelist: BTreeSet<String>,
    pub integer_attributes: BTreeSet<String>,
    /// Per tag, attribute values forced onto every emitted instance.
    pub attribute_overrides: BTreeMap<String, BTreeMap<String, String>>,
    pub required_attributes: BTreeMap<String, BTreeSet<String>>,
    pub media_blacklist: Vec<String>,
    pub media_attributes: BTreeSet<String>,
    pub iframe_whitelist: Vec<String>,
    #[serde(rename = "image_proxy_url", deserialize_with = "deserialize_image_proxy")]
    pub image_proxy: ImageProxy,
    /// Only proxy images served over this scheme; `None` proxies all of them.
    pub image_proxy_protocol: Option<String>,
    pub max_depth: usize,
    pub site_rules: RuleBook,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            whitelisted_tags: WHITELISTED_TAGS
                .iter()
                .map(|(tag, attrs)| (tag.to_string(), to_set(attrs)))
                .collect(),
            blacklisted_tags: to_vec(BLACKLISTED_TAGS),
            scheme_whitelist: to_set(SCHEME_WHITELIST),
            integer_attributes: to_set(INTEGER_ATTRIBUTES),
            attribute_overrides: ATTRIBUTE_OVERRIDES
                .iter()
                .map(|(tag, values)| {
                    let values = values
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    (tag.to_string(), values)
                })
                .collect(),
            required_attributes: REQUIRED_ATTRIBUTES
                .iter()
                .map(|(tag, attrs)| (tag.to_string(), to_set(attrs)))
                .collect(),
            media_blacklist: to_vec(MEDIA_BLACKLIST),
            media_attributes: to_set(MEDIA_ATTRIBUTES),
            iframe_whitelist: to_vec(IFRAME_WHITELIST),
            image_proxy: ImageProxy::Disabled,
            image_proxy_protocol: None,
            max_depth: DEFAULT_MAX_DEPTH,
            site_rules: RuleBook::default(),
        }
    }
}

impl FilterConfig {
    pub fn with_image_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.image_proxy = ImageProxy::Url(url.into());
        self
    }

    pub fn with_image_proxy_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.image_proxy = ImageProxy::Callback(Arc::new(callback));
        self
    }

    pub fn with_site_rules(mut self, rules: RuleBook) -> Self {
        self.site_rules = rules;
        self
    }
}

fn to_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn to_vec(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Directory of `<site>.yaml` rule files.
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub file: String,
    pub level: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: "logs/feed-sanitizer.log".to_string(),
            level: Some("info".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub filter: FilterConfig,
    pub rules: RulesConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let explicit_path = std::env::var("CONFIG_FILE").ok();
        let config = if let Some(path) = explicit_path {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(anyhow!("config file {:?} not found", path));
            }
            Self::load_from_file(&path)?
        } else {
            let path = locate_default_config();
            if let Some(path) = path {
                Self::load_from_file(&path)?
            } else {
                AppConfig::default()
            }
        };

        Self::apply_env_overrides(config)
    }

    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// The filter policy with the rule directory, if any, merged into its site rules.
    pub fn filter_config(&self) -> anyhow::Result<FilterConfig> {
        let mut filter = self.filter.clone();
        if let Some(dir) = self.rules.dir.as_deref().filter(|d| !d.trim().is_empty()) {
            let loaded = RuleBook::from_dir(Path::new(dir))
                .with_context(|| format!("failed to load site rules from {dir:?}"))?;
            filter.site_rules.merge(loaded);
        }
        Ok(filter)
    }

    fn apply_env_overrides(mut config: AppConfig) -> anyhow::Result<AppConfig> {
        if let Ok(url) = std::env::var("FILTER_IMAGE_PROXY_URL") {
            config.filter.image_proxy = if url.trim().is_empty() {
                ImageProxy::Disabled
            } else {
                ImageProxy::Url(url)
            };
        }

        if let Ok(protocol) = std::env::var("FILTER_IMAGE_PROXY_PROTOCOL") {
            config.filter.image_proxy_protocol = Some(protocol).filter(|p| !p.trim().is_empty());
        }

        if let Some(max_depth) = parse_optional_env("FILTER_MAX_DEPTH")? {
            config.filter.max_depth = max_depth;
        }

        if let Ok(dir) = std::env::var("SITE_RULES_DIR") {
            config.rules.dir = Some(dir);
        }

        if let Ok(log_file) = std::env::var("LOG_FILE_PATH") {
            config.logging.file = log_file;
        }

        if let Ok(log_level) = std::env::var("LOG_LEVEL") {
            config.logging.level = Some(log_level);
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.filter.max_depth == 0 {
            return Err(anyhow!("filter.max_depth must be greater than zero"));
        }

        if let Some(protocol) = self.filter.image_proxy_protocol.as_deref() {
            let protocol = protocol.trim().to_ascii_lowercase();
            if protocol != "http" && protocol != "https" {
                return Err(anyhow!(
                    "filter.image_proxy_protocol must be http or https, got {protocol:?}"
                ));
            }
        }

        Ok(())
    }
}

fn parse_optional_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => Ok(Some(
            v.parse::<T>()
                .with_context(|| format!("{key} must be a valid value"))?,
        )),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn locate_default_config() -> Option<PathBuf> {
    let candidates = [
        PathBuf::from("config/config.yaml"),
        PathBuf::from("../config/config.yaml"),
    ];

    candidates.into_iter().find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn default_policy_is_shared() {
        assert!(DEFAULT_FILTER_CONFIG.whitelisted_tags.contains_key("p"));
        assert!(!DEFAULT_FILTER_CONFIG.whitelisted_tags.contains_key("script"));
        assert!(DEFAULT_FILTER_CONFIG.scheme_whitelist.contains("https"));
        assert!(matches!(DEFAULT_FILTER_CONFIG.image_proxy, ImageProxy::Disabled));
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let file = write_config(
            r#"
filter:
  image_proxy_url: "https://proxy.example/?u="
  iframe_whitelist: ["youtube.com"]
logging:
  level: debug
"#,
        );
        let config = AppConfig::load_from_file(file.path()).expect("config loads");

        assert!(matches!(
            config.filter.image_proxy,
            ImageProxy::Url(ref url) if url == "https://proxy.example/?u="
        ));
        assert_eq!(config.filter.iframe_whitelist, vec!["youtube.com"]);
        assert_eq!(config.filter.max_depth, DEFAULT_MAX_DEPTH);
        assert!(config.filter.required_attributes.contains_key("img"));
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
        assert_eq!(config.logging.file, "logs/feed-sanitizer.log");
    }

    #[test]
    fn explicit_empty_whitelist_strips_everything() {
        let file = write_config("filter:\n  whitelisted_tags: {}\n");
        let config = AppConfig::load_from_file(file.path()).expect("config loads");
        assert!(config.filter.whitelisted_tags.is_empty());
    }

    #[test]
    fn rejects_unknown_proxy_protocol() {
        let file = write_config("filter:\n  image_proxy_protocol: ftp\n");
        assert!(AppConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn site_rules_inline_in_config() {
        let file = write_config(
            r#"
filter:
  site_rules:
    example.com:
      - pattern: "^/news"
        substitutions:
          - search: "<p>Advertisement</p>"
"#,
        );
        let config = AppConfig::load_from_file(file.path()).expect("config loads");
        let rules = config.filter.site_rules.get("example.com").expect("rules for site");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].substitutions[0].replace, "");
    }

    #[test]
    fn builder_methods_switch_proxy_kind() {
        let config = FilterConfig::default()
            .with_image_proxy_url("https://proxy/?u=")
            .with_image_proxy_callback(|url| format!("https://cb/{url}"));
        match config.image_proxy {
            ImageProxy::Callback(cb) => assert_eq!(cb("x"), "https://cb/x"),
            other => panic!("unexpected proxy {other:?}"),
        }
    }
}
