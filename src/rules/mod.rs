//! Per-site regex substitutions applied to the finished output.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::Context;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    error::{FilterError, FilterResult},
    model::SiteRule,
    util::url_norm::{base_path, site_keys},
};

/// Source of site rules, keyed by site URL.
pub trait RuleRepository {
    fn rules_for_site(&self, site_url: &str) -> Vec<SiteRule>;
}

/// In-memory rule repository: site key (`example.com`, `www.example.com`,
/// `.example.com` for every subdomain) to ordered rule sets.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RuleBook {
    sites: BTreeMap<String, Vec<SiteRule>>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `rules` after any rules already stored for `site`.
    pub fn insert(&mut self, site: impl Into<String>, rules: Vec<SiteRule>) {
        let site = site.into().to_ascii_lowercase();
        self.sites.entry(site).or_default().extend(rules);
    }

    pub fn get(&self, site: &str) -> Option<&[SiteRule]> {
        self.sites
            .get(&site.to_ascii_lowercase())
            .map(|rules| rules.as_slice())
    }

    pub fn merge(&mut self, other: RuleBook) {
        for (site, rules) in other.sites {
            self.insert(site, rules);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    /// Load every `<site>.yaml` / `<site>.yml` file of `dir`; the file stem is the site key.
    pub fn from_dir(dir: &Path) -> anyhow::Result<Self> {
        let mut book = RuleBook::new();
        let entries = fs::read_dir(dir)
            .with_context(|| format!("failed to read rules directory {:?}", dir))?;

        for entry in entries {
            let path = entry?.path();
            let is_yaml = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("yaml" | "yml")
            );
            if !is_yaml {
                continue;
            }
            let Some(site) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };

            let contents = fs::read_to_string(&path)
                .with_context(|| format!("failed to read rule file {:?}", path))?;
            let rules: Vec<SiteRule> = serde_yaml::from_str(&contents)
                .with_context(|| format!("failed to parse rule file {:?}", path))?;

            debug!(site, count = rules.len(), "loaded site rules");
            book.insert(site, rules);
        }

        if book.is_empty() {
            warn!(dir = ?dir, "rules directory holds no rule files");
        }
        Ok(book)
    }
}

impl RuleRepository for RuleBook {
    /// Rules of the most specific key that has any; see [`site_keys`].
    fn rules_for_site(&self, site_url: &str) -> Vec<SiteRule> {
        site_keys(site_url)
            .iter()
            .find_map(|key| self.sites.get(key))
            .cloned()
            .unwrap_or_default()
    }
}

pub struct SiteRuleEngine<'a> {
    repository: &'a dyn RuleRepository,
}

impl<'a> SiteRuleEngine<'a> {
    pub fn new(repository: &'a dyn RuleRepository) -> Self {
        Self { repository }
    }

    pub fn rules_for(&self, site_url: &str) -> Vec<SiteRule> {
        self.repository.rules_for_site(site_url)
    }

    /// Every rule set whose pattern matches the site's base path applies, in
    /// declared order, each substitution in turn over the whole content.
    pub fn apply(&self, content: String, site_url: &str) -> String {
        let rules = self.rules_for(site_url);
        if rules.is_empty() {
            return content;
        }
        apply_rules(content, &base_path(site_url), &rules)
    }
}

fn apply_rules(mut content: String, path: &str, rules: &[SiteRule]) -> String {
    for rule in rules {
        let url_pattern = match compile(&rule.url_pattern) {
            Ok(re) => re,
            Err(err) => {
                warn!(error = %err, "skipping site rule with invalid url pattern");
                continue;
            }
        };
        if !url_pattern.is_match(path) {
            continue;
        }

        for substitution in &rule.substitutions {
            match compile(&substitution.search) {
                Ok(search) => {
                    content = search
                        .replace_all(&content, substitution.replace.as_str())
                        .into_owned();
                }
                Err(err) => {
                    warn!(error = %err, "skipping invalid site substitution");
                }
            }
        }
    }

    content
}

fn compile(pattern: &str) -> FilterResult<Regex> {
    Regex::new(pattern).map_err(|source| FilterError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}
