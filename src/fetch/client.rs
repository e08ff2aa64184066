//! Network fetching behind a trait so strategies can be tested offline.

use color_eyre::{eyre::eyre, Result};
use std::future::Future;
use std::time::Duration;

use super::types::{Request, Response};

/// Trait for the network side of the dispatcher.
///
/// Production uses [`HttpFetcher`]; tests use scripted fakes that count
/// calls and fail on demand.
pub trait Fetcher: Send + Sync + 'static {
  /// Perform the GET request. Rejection here is what the strategies treat
  /// as "network failure".
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Real network fetcher over reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
}

impl HttpFetcher {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.parsed_url()?;

    let response = self
      .client
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Fetch failed for {}: {}", request.url(), e))?;

    let status = response.status().as_u16();
    let headers = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body for {}: {}", request.url(), e))?
      .to_vec();

    Ok(Response::new(status, headers, body))
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! Scripted fetcher fakes shared by strategy and lifecycle tests.

  use super::*;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;

  /// In-memory fetcher that serves canned responses and counts calls.
  pub struct ScriptedFetcher {
    responses: Mutex<HashMap<String, Response>>,
    calls: AtomicUsize,
    /// When set, every fetch rejects as if the network were down
    offline: bool,
  }

  impl ScriptedFetcher {
    pub fn new() -> Self {
      Self {
        responses: Mutex::new(HashMap::new()),
        calls: AtomicUsize::new(0),
        offline: false,
      }
    }

    pub fn offline() -> Self {
      Self {
        offline: true,
        ..Self::new()
      }
    }

    pub fn with_response(self, url: &str, response: Response) -> Self {
      self
        .responses
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
      self
    }

    pub fn set_response(&self, url: &str, response: Response) {
      self
        .responses
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    pub fn calls(&self) -> usize {
      self.calls.load(Ordering::SeqCst)
    }
  }

  impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
      self.calls.fetch_add(1, Ordering::SeqCst);

      if self.offline {
        return Err(eyre!("network unavailable"));
      }

      self
        .responses
        .lock()
        .unwrap()
        .get(request.url())
        .cloned()
        .ok_or_else(|| eyre!("no scripted response for {}", request.url()))
    }
  }

  pub fn ok_response(body: &str) -> Response {
    Response::new(
      200,
      vec![("content-type".to_string(), "text/plain".to_string())],
      body.as_bytes().to_vec(),
    )
  }
}
