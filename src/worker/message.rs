//! Typed messages into the worker: page messages, push payloads, sync tags.

use serde::Deserialize;

/// Messages sent by the hosting page over the message channel.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ClientMessage {
  /// Force immediate activation of a pending update
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  /// Eagerly warm the dynamic partition with these URLs
  #[serde(rename = "CACHE_URLS")]
  CacheUrls { urls: Vec<String> },
}

/// Optional JSON body of a push event. Missing fields get defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub url: Option<String>,
}

/// Background sync tags registered by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTag {
  /// Reconcile locally recorded study progress with the backend
  Progress,
  /// Reconcile locally recorded bookmarks with the backend
  Bookmarks,
}

impl SyncTag {
  pub fn parse(tag: &str) -> Option<Self> {
    match tag {
      "sync-progress" => Some(Self::Progress),
      "sync-bookmarks" => Some(Self::Bookmarks),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Progress => "sync-progress",
      Self::Bookmarks => "sync-bookmarks",
    }
  }
}

/// A user action attached to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
  pub action: &'static str,
  pub title: &'static str,
}

/// A rendered platform notification.
#[derive(Debug, Clone)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// URL opened when the notification (or its "open" action) is clicked
  pub url: String,
  pub actions: Vec<NotificationAction>,
}

impl Notification {
  /// Build a notification from an optional push payload, filling defaults.
  pub fn from_payload(payload: Option<PushPayload>) -> Self {
    let payload = payload.unwrap_or_default();
    Self {
      title: payload.title.unwrap_or_else(|| "Exam Prep".to_string()),
      body: payload
        .body
        .unwrap_or_else(|| "You have a new update".to_string()),
      icon: "/icons/icon-192.png".to_string(),
      badge: "/icons/badge-72.png".to_string(),
      url: payload.url.unwrap_or_else(|| "/".to_string()),
      actions: vec![
        NotificationAction {
          action: "open",
          title: "Open",
        },
        NotificationAction {
          action: "dismiss",
          title: "Dismiss",
        },
      ],
    }
  }

  /// URL to open for a click, or None when the click dismisses.
  ///
  /// Clicking the notification body counts as "open".
  pub fn click(&self, action: Option<&str>) -> Option<&str> {
    match action {
      None | Some("open") => Some(self.url.as_str()),
      _ => None,
    }
  }
}
