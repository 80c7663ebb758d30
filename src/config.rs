use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://roadmap.sh";
const DEFAULT_DB_PATH: &str = "data/roadmaps.sqlite";

/// Runtime settings. Defaults come from constants, environment variables override them,
/// and CLI flags override both (see `main.rs`).
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub db_path: String,
    /// Budget for roadmap and list pages.
    pub navigation_timeout: Duration,
    /// Shorter budget for speculative dedicated-page probes.
    pub probe_timeout: Duration,
    /// Lists with at least this many items become learning paths.
    pub learning_path_min_items: usize,
    /// Sibling budget after a text-matched heading.
    pub fallback_sibling_limit: usize,
    pub detail_page_patterns: Vec<String>,
    pub marker_attributes: Vec<String>,
    pub root_selectors: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            db_path: DEFAULT_DB_PATH.to_string(),
            navigation_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(20),
            learning_path_min_items: 3,
            fallback_sibling_limit: 20,
            detail_page_patterns: to_strings(&["/guides/", "/videos/", "/best-practices/"]),
            marker_attributes: to_strings(&["data-id", "data-node-id", "data-key"]),
            root_selectors: to_strings(&[".container", "main", "article"]),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("ROADMAP_BASE_URL") {
            config.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(path) = lookup("ROADMAP_DB") {
            config.db_path = path;
        }
        if let Some(secs) = lookup("ROADMAP_NAV_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.navigation_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup("ROADMAP_PROBE_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            config.probe_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = lookup("ROADMAP_LEARNING_PATH_MIN").and_then(|s| s.parse().ok()) {
            config.learning_path_min_items = n;
        }
        config
    }

    pub fn list_url(&self) -> String {
        format!("{}/roadmaps", self.base_url)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.list_url(), "https://roadmap.sh/roadmaps");
        assert_eq!(c.learning_path_min_items, 3);
        assert_eq!(c.fallback_sibling_limit, 20);
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("ROADMAP_BASE_URL", "http://localhost:8080/"),
            ("ROADMAP_NAV_TIMEOUT_SECS", "5"),
            ("ROADMAP_LEARNING_PATH_MIN", "4"),
            ("ROADMAP_PROBE_TIMEOUT_SECS", "not a number"),
        ]
        .into_iter()
        .collect();
        let c = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.base_url, "http://localhost:8080");
        assert_eq!(c.navigation_timeout, Duration::from_secs(5));
        assert_eq!(c.learning_path_min_items, 4);
        assert_eq!(c.probe_timeout, Duration::from_secs(20));
    }
}
