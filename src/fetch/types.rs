//! Request and response types for the dispatch layer.
//!
//! These are deliberately minimal: enough of an HTTP shape for the cache to
//! store and replay responses byte-for-byte, without dragging a full HTTP
//! framework into the strategy logic.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// What the request is for, as declared by the requesting context.
///
/// Determines which offline fallback applies when neither cache nor network
/// can satisfy the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  /// A page navigation (HTML document)
  Navigate,
  /// An image resource
  Image,
  /// Everything else (scripts, styles, data fetches)
  Other,
}

/// An intercepted GET request.
#[derive(Debug, Clone)]
pub struct Request {
  url: String,
  destination: Destination,
}

impl Request {
  pub fn new(url: impl Into<String>, destination: Destination) -> Self {
    Self {
      url: url.into(),
      destination,
    }
  }

  /// Convenience constructor for non-navigation, non-image requests.
  pub fn get(url: impl Into<String>) -> Self {
    Self::new(url, Destination::Other)
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  pub fn destination(&self) -> Destination {
    self.destination
  }

  /// The path component used for strategy classification.
  ///
  /// Absolute URLs are parsed; anything else is treated as an
  /// already-relative path.
  pub fn path(&self) -> String {
    match Url::parse(&self.url) {
      Ok(parsed) => parsed.path().to_string(),
      Err(_) => self.url.clone(),
    }
  }

  /// Parse the URL, failing on clearly malformed absolute URLs.
  pub fn parsed_url(&self) -> Result<Url> {
    Url::parse(&self.url).map_err(|e| eyre!("Invalid request URL {}: {}", self.url, e))
  }
}

/// A response as stored and replayed by the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  /// Header pairs in arrival order
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// HTTP 2xx. Only successful responses are ever written to the cache.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn content_type(&self) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
      .map(|(_, value)| value.as_str())
  }

  fn with_content_type(status: u16, content_type: &str, body: Vec<u8>) -> Self {
    Self::new(
      status,
      vec![("content-type".to_string(), content_type.to_string())],
      body,
    )
  }

  /// Synthetic offline page for navigations with nothing cached.
  pub fn offline_page() -> Self {
    Self::with_content_type(
      503,
      "text/html; charset=utf-8",
      OFFLINE_PAGE_HTML.as_bytes().to_vec(),
    )
  }

  /// Inline SVG placeholder served for images while offline.
  pub fn image_placeholder() -> Self {
    Self::with_content_type(200, "image/svg+xml", IMAGE_PLACEHOLDER_SVG.as_bytes().to_vec())
  }

  /// Plain-text 503 for everything else.
  pub fn service_unavailable() -> Self {
    Self::with_content_type(503, "text/plain", b"Offline - request could not be served".to_vec())
  }
}

const OFFLINE_PAGE_HTML: &str = "<!doctype html>\n<html>\n<head><meta charset=\"utf-8\"><title>Offline</title></head>\n<body>\n<h1>You are offline</h1>\n<p>This page is not available offline. Reconnect and try again.</p>\n</body>\n</html>\n";

const IMAGE_PLACEHOLDER_SVG: &str = "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"200\" height=\"200\" viewBox=\"0 0 200 200\"><rect width=\"200\" height=\"200\" fill=\"#e2e8f0\"/><text x=\"100\" y=\"104\" text-anchor=\"middle\" font-family=\"sans-serif\" font-size=\"14\" fill=\"#64748b\">offline</text></svg>";
