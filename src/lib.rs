//! Allow-list sanitizer for feed and article HTML.
//!
//! ```
//! use feed_sanitizer::{sanitize, DEFAULT_FILTER_CONFIG};
//!
//! let html = r#"<p onclick="x()">Hello <script>alert(1)</script><b>world</b></p>"#;
//! let clean = sanitize(html, "https://example.com/post", &DEFAULT_FILTER_CONFIG);
//! assert_eq!(clean, "<p>Hello <b>world</b></p>");
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod parser;
pub mod rules;
pub mod util;

pub use config::{FilterConfig, ImageProxy, DEFAULT_FILTER_CONFIG};
pub use error::{FilterError, FilterResult};
pub use filter::{sanitize, Sanitizer};
pub use model::{Attributes, SiteRule, Substitution};
pub use rules::{RuleBook, RuleRepository, SiteRuleEngine};
