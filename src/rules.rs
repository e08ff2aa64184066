//! Strategy classification for intercepted requests.
//!
//! A `RuleSet` is an immutable ordered list of (pattern, strategy) pairs.
//! Classification is substring containment on the request path; the first
//! matching rule wins, and paths matching no rule default to network-first.

use serde::Deserialize;

/// Serving strategy for an intercepted GET request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
  /// Serve from cache if present, only then hit the network
  CacheFirst,
  /// Hit the network first, fall back to cache on failure
  NetworkFirst,
  /// Serve stale cache immediately, refresh in the background
  StaleWhileRevalidate,
}

impl std::fmt::Display for Strategy {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Strategy::CacheFirst => "cache-first",
      Strategy::NetworkFirst => "network-first",
      Strategy::StaleWhileRevalidate => "stale-while-revalidate",
    };
    write!(f, "{}", s)
  }
}

/// A single classification rule.
#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
  /// Substring matched against the request path
  pub pattern: String,
  pub strategy: Strategy,
}

impl Rule {
  pub fn new(pattern: impl Into<String>, strategy: Strategy) -> Self {
    Self {
      pattern: pattern.into(),
      strategy,
    }
  }
}

/// Ordered, immutable rule list.
///
/// Built once at startup and handed to the dispatcher, so classification
/// can be unit tested without any global state.
#[derive(Debug, Clone)]
pub struct RuleSet {
  rules: Vec<Rule>,
}

impl RuleSet {
  pub fn new(rules: Vec<Rule>) -> Self {
    Self { rules }
  }

  /// Classify a request path. First matching rule wins; paths matching
  /// nothing get `NetworkFirst`.
  pub fn classify(&self, path: &str) -> Strategy {
    self
      .rules
      .iter()
      .find(|rule| path.contains(&rule.pattern))
      .map(|rule| rule.strategy)
      .unwrap_or(Strategy::NetworkFirst)
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }
}

impl Default for RuleSet {
  /// Default rules mirroring the shipped asset layout: long-lived static
  /// assets are cache-first, API data is network-first, page documents
  /// revalidate in the background.
  fn default() -> Self {
    Self::new(vec![
      Rule::new("/icons/", Strategy::CacheFirst),
      Rule::new("/images/", Strategy::CacheFirst),
      Rule::new("/fonts/", Strategy::CacheFirst),
      Rule::new("/static/", Strategy::CacheFirst),
      Rule::new("/api/", Strategy::NetworkFirst),
      Rule::new("/questions/", Strategy::StaleWhileRevalidate),
      Rule::new("/tests/", Strategy::StaleWhileRevalidate),
      Rule::new("/pyq/", Strategy::StaleWhileRevalidate),
    ])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_first_match_wins() {
    let rules = RuleSet::new(vec![
      Rule::new("/api/", Strategy::NetworkFirst),
      Rule::new("/api/static/", Strategy::CacheFirst),
    ]);

    // Both patterns match, but the first rule in order wins
    assert_eq!(
      rules.classify("/api/static/logo.png"),
      Strategy::NetworkFirst
    );
  }

  #[test]
  fn test_configured_pattern_matches() {
    let rules = RuleSet::default();
    assert_eq!(rules.classify("/icons/logo.png"), Strategy::CacheFirst);
    assert_eq!(
      rules.classify("/questions/physics/q42"),
      Strategy::StaleWhileRevalidate
    );
  }

  #[test]
  fn test_unmatched_path_defaults_to_network_first() {
    let rules = RuleSet::default();
    assert_eq!(rules.classify("/leaderboard"), Strategy::NetworkFirst);
  }

  #[test]
  fn test_containment_not_prefix() {
    let rules = RuleSet::new(vec![Rule::new("/icons/", Strategy::CacheFirst)]);
    // Substring containment, so a nested path still matches
    assert_eq!(
      rules.classify("/assets/v2/icons/badge.svg"),
      Strategy::CacheFirst
    );
  }

  #[test]
  fn test_empty_ruleset_defaults() {
    let rules = RuleSet::new(vec![]);
    assert!(rules.is_empty());
    assert_eq!(rules.classify("/anything"), Strategy::NetworkFirst);
  }
}
