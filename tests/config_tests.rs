use std::fs;

use feed_sanitizer::config::AppConfig;
use feed_sanitizer::sanitize;

#[test]
fn rule_directory_feeds_site_rules() {
    let dir = tempfile::tempdir().expect("temp dir");
    let rules_dir = dir.path().join("rules");
    fs::create_dir(&rules_dir).expect("rules dir");
    fs::write(
        rules_dir.join(".example.com.yaml"),
        r#"
- pattern: "^/news/"
  substitutions:
    - search: "<p>Advertisement</p>"
      replace: ""
    - search: "(?i)\\bfollow us\\b"
      replace: "follow them"
- pattern: "^/sports/"
  substitutions:
    - search: "Story"
      replace: "Match"
"#,
    )
    .expect("rule file");

    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        format!(
            "rules:\n  dir: {:?}\nfilter:\n  image_proxy_protocol: https\n",
            rules_dir.display().to_string()
        ),
    )
    .expect("config file");

    let config = AppConfig::load_from_file(&config_path).expect("config loads");
    let filter = config.filter_config().expect("rules load");

    let html = "<p>Story</p><p>Advertisement</p><p>Follow us</p>";
    assert_eq!(
        sanitize(html, "https://www.example.com/news/42", &filter),
        "<p>Story</p><p>follow them</p>"
    );
    assert_eq!(
        sanitize(html, "https://www.example.com/sports/7", &filter),
        "<p>Match</p><p>Advertisement</p><p>Follow us</p>"
    );
    assert_eq!(
        sanitize(html, "https://other.org/news/42", &filter),
        "<p>Story</p><p>Advertisement</p><p>Follow us</p>"
    );
}

#[test]
fn missing_rule_directory_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config_path = dir.path().join("config.yaml");
    fs::write(&config_path, "rules:\n  dir: /definitely/not/here\n").expect("config file");

    let config = AppConfig::load_from_file(&config_path).expect("config loads");
    assert!(config.filter_config().is_err());
}
