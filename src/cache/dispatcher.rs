//! Strategy dispatch: picks and executes exactly one serving strategy per
//! intercepted request.
//!
//! All three strategies degrade locally: network errors, cache misses and
//! storage failures end in an offline fallback response, never in an error
//! surfaced to the caller.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::traits::{CachedResponse, CacheStore, Partitions};
use crate::fetch::{Destination, Fetcher, Request, Response};
use crate::rules::{RuleSet, Strategy};

/// Outcome of dispatching one request.
pub struct Served {
  pub response: Response,
  /// Background cache refresh started by stale-while-revalidate. Await it
  /// to observe the updated cache entry; dropping it is fine, the task
  /// keeps running.
  pub revalidate: Option<JoinHandle<()>>,
}

impl Served {
  fn immediate(response: Response) -> Self {
    Self {
      response,
      revalidate: None,
    }
  }
}

/// Classifies each GET request and serves it from cache or network.
///
/// Rules and partition names are injected at construction; the dispatcher
/// holds no other state, so concurrent requests only share the store.
pub struct Dispatcher<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  rules: RuleSet,
  partitions: Partitions,
  /// URL of the precached offline page served to navigations
  offline_url: String,
}

impl<S: CacheStore, F: Fetcher> Dispatcher<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>, rules: RuleSet, partitions: Partitions) -> Self {
    Self {
      store,
      fetcher,
      rules,
      partitions,
      offline_url: "/offline.html".to_string(),
    }
  }

  pub fn with_offline_url(mut self, url: impl Into<String>) -> Self {
    self.offline_url = url.into();
    self
  }

  pub fn partitions(&self) -> &Partitions {
    &self.partitions
  }

  pub fn store(&self) -> &Arc<S> {
    &self.store
  }

  /// Serve one request with the strategy its path classifies to.
  pub async fn handle(&self, request: Request) -> Served {
    let strategy = self.rules.classify(&request.path());
    debug!(url = request.url(), %strategy, "dispatching request");

    match strategy {
      Strategy::CacheFirst => self.cache_first(request).await,
      Strategy::NetworkFirst => self.network_first(request).await,
      Strategy::StaleWhileRevalidate => self.stale_while_revalidate(request).await,
    }
  }

  /// Cache wins outright; the network is only consulted on a miss.
  async fn cache_first(&self, request: Request) -> Served {
    if let Some((_, cached)) = self.lookup(request.url()) {
      return Served::immediate(cached.response);
    }

    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        self.store_copy(request.url(), &response);
        Served::immediate(response)
      }
      Err(e) => {
        debug!(url = request.url(), error = %e, "network failed with cold cache");
        Served::immediate(self.offline_fallback(request.destination()))
      }
    }
  }

  /// Network wins when reachable; the cache is the offline fallback.
  async fn network_first(&self, request: Request) -> Served {
    match self.fetcher.fetch(&request).await {
      Ok(response) => {
        self.store_copy(request.url(), &response);
        Served::immediate(response)
      }
      Err(e) => {
        debug!(url = request.url(), error = %e, "network failed, trying cache");
        match self.lookup(request.url()) {
          Some((_, cached)) => Served::immediate(cached.response),
          None => Served::immediate(self.offline_fallback(request.destination())),
        }
      }
    }
  }

  /// Serve stale cache immediately and refresh it in the background.
  ///
  /// The refresh overwrites the entry in the partition it was served from,
  /// so a hit precached into the static partition does not stay pinned to
  /// its install-time bytes. With a cold cache this waits on the network
  /// instead of racing it; the fallback only applies when both cache and
  /// network come up empty.
  async fn stale_while_revalidate(&self, request: Request) -> Served {
    match self.lookup(request.url()) {
      Some((partition, cached)) => {
        let store = Arc::clone(&self.store);
        let fetcher = Arc::clone(&self.fetcher);
        let partition = partition.to_string();

        let handle = tokio::spawn(async move {
          match fetcher.fetch(&request).await {
            Ok(response) if response.is_success() => {
              if let Err(e) = store.put(&partition, request.url(), &response) {
                warn!(url = request.url(), error = %e, "background cache update failed");
              }
            }
            Ok(response) => {
              debug!(
                url = request.url(),
                status = response.status,
                "revalidation returned non-success, keeping cached entry"
              );
            }
            Err(e) => {
              debug!(url = request.url(), error = %e, "revalidation fetch failed");
            }
          }
        });

        Served {
          response: cached.response,
          revalidate: Some(handle),
        }
      }
      None => {
        match self.fetcher.fetch(&request).await {
          Ok(response) => {
            self.store_copy(request.url(), &response);
            Served::immediate(response)
          }
          Err(e) => {
            debug!(url = request.url(), error = %e, "network failed with cold cache");
            Served::immediate(self.offline_fallback(request.destination()))
          }
        }
      }
    }
  }

  /// Look up a URL across the current partitions, static first, returning
  /// the entry together with the partition it was found in.
  ///
  /// Storage errors degrade to a miss so a broken cache database behaves
  /// like an empty one.
  fn lookup(&self, url: &str) -> Option<(&str, CachedResponse)> {
    for partition in [
      self.partitions.static_name(),
      self.partitions.dynamic_name(),
    ] {
      match self.store.get(partition, url) {
        Ok(Some(cached)) => return Some((partition, cached)),
        Ok(None) => {}
        Err(e) => {
          warn!(url, partition, error = %e, "cache read failed, treating as miss");
        }
      }
    }
    None
  }

  /// Store a copy of a successful response in the dynamic partition.
  /// Non-2xx responses pass through uncached.
  fn store_copy(&self, url: &str, response: &Response) {
    if !response.is_success() {
      return;
    }
    if let Err(e) = self
      .store
      .put(self.partitions.dynamic_name(), url, response)
    {
      warn!(url, error = %e, "cache write failed");
    }
  }

  /// Substitute response when neither cache nor network can serve.
  fn offline_fallback(&self, destination: Destination) -> Response {
    match destination {
      Destination::Navigate => match self
        .store
        .get(self.partitions.static_name(), &self.offline_url)
      {
        Ok(Some(cached)) => cached.response,
        _ => Response::offline_page(),
      },
      Destination::Image => Response::image_placeholder(),
      Destination::Other => Response::service_unavailable(),
    }
  }
}

impl<S: CacheStore, F: Fetcher> Clone for Dispatcher<S, F> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      fetcher: Arc::clone(&self.fetcher),
      rules: self.rules.clone(),
      partitions: self.partitions.clone(),
      offline_url: self.offline_url.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::fetch::testing::{ok_response, ScriptedFetcher};

  fn dispatcher(fetcher: ScriptedFetcher) -> Dispatcher<MemoryStorage, ScriptedFetcher> {
    Dispatcher::new(
      Arc::new(MemoryStorage::new()),
      Arc::new(fetcher),
      RuleSet::default(),
      Partitions::new("v1"),
    )
  }

  #[tokio::test]
  async fn test_cache_first_skips_network_on_warm_cache() {
    let d = dispatcher(ScriptedFetcher::new().with_response("/icons/logo.png", ok_response("png")));

    // First call: one fetch, result stored
    let served = d.handle(Request::get("/icons/logo.png")).await;
    assert_eq!(served.response.body, b"png");
    assert_eq!(d.fetcher.calls(), 1);

    // Second call: served from cache, zero additional fetches
    let served = d.handle(Request::get("/icons/logo.png")).await;
    assert_eq!(served.response.body, b"png");
    assert_eq!(d.fetcher.calls(), 1);
  }

  #[tokio::test]
  async fn test_cache_first_does_not_store_non_success() {
    let d = dispatcher(
      ScriptedFetcher::new().with_response("/icons/missing.png", Response::new(404, vec![], vec![])),
    );

    let served = d.handle(Request::get("/icons/missing.png")).await;
    assert_eq!(served.response.status, 404);

    // Not cached, so the next call fetches again
    d.handle(Request::get("/icons/missing.png")).await;
    assert_eq!(d.fetcher.calls(), 2);
  }

  #[tokio::test]
  async fn test_network_first_prefers_fresh_response() {
    let d = dispatcher(ScriptedFetcher::new().with_response("/api/leaderboard", ok_response("v1")));

    let served = d.handle(Request::get("/api/leaderboard")).await;
    assert_eq!(served.response.body, b"v1");

    d.fetcher.set_response("/api/leaderboard", ok_response("v2"));
    let served = d.handle(Request::get("/api/leaderboard")).await;
    assert_eq!(served.response.body, b"v2");
  }

  #[tokio::test]
  async fn test_network_first_falls_back_to_cache_bytes_unchanged() {
    let body = "cached leaderboard payload";
    let d = dispatcher(ScriptedFetcher::new().with_response("/api/leaderboard", ok_response(body)));

    // Warm the cache over the network
    d.handle(Request::get("/api/leaderboard")).await;

    // Simulate going offline by replacing the dispatcher's fetcher
    let offline = Dispatcher::new(
      Arc::clone(d.store()),
      Arc::new(ScriptedFetcher::offline()),
      RuleSet::default(),
      Partitions::new("v1"),
    );

    let served = offline.handle(Request::get("/api/leaderboard")).await;
    assert_eq!(served.response.body, body.as_bytes());
    assert_eq!(served.response.status, 200);
  }

  #[tokio::test]
  async fn test_swr_serves_stale_then_updates_cache() {
    let d = dispatcher(ScriptedFetcher::new().with_response("/questions/q1", ok_response("old")));

    // Cold cache: waits on the network
    let served = d.handle(Request::get("/questions/q1")).await;
    assert_eq!(served.response.body, b"old");
    assert!(served.revalidate.is_none());

    // Warm cache: stale entry comes back immediately
    d.fetcher.set_response("/questions/q1", ok_response("new"));
    let served = d.handle(Request::get("/questions/q1")).await;
    assert_eq!(served.response.body, b"old");

    // Once the background task settles, the cache holds the new response
    served.revalidate.unwrap().await.unwrap();
    let cached = d
      .store()
      .get(d.partitions().dynamic_name(), "/questions/q1")
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"new");
  }

  #[tokio::test]
  async fn test_swr_refreshes_static_entry_in_place() {
    let d = dispatcher(ScriptedFetcher::new().with_response("/questions/q1", ok_response("new")));
    d.store()
      .put(d.partitions().static_name(), "/questions/q1", &ok_response("old"))
      .unwrap();

    let served = d.handle(Request::get("/questions/q1")).await;
    assert_eq!(served.response.body, b"old");
    served.revalidate.unwrap().await.unwrap();

    // The static entry itself was overwritten, so it cannot keep shadowing
    // the refreshed bytes on later requests
    let cached = d
      .store()
      .get(d.partitions().static_name(), "/questions/q1")
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"new");
    let served = d.handle(Request::get("/questions/q1")).await;
    assert_eq!(served.response.body, b"new");
  }

  #[tokio::test]
  async fn test_swr_keeps_cache_on_failed_revalidation() {
    let d = dispatcher(ScriptedFetcher::new().with_response("/questions/q1", ok_response("old")));
    d.handle(Request::get("/questions/q1")).await;

    let offline = Dispatcher::new(
      Arc::clone(d.store()),
      Arc::new(ScriptedFetcher::offline()),
      RuleSet::default(),
      Partitions::new("v1"),
    );

    let served = offline.handle(Request::get("/questions/q1")).await;
    assert_eq!(served.response.body, b"old");
    served.revalidate.unwrap().await.unwrap();

    let cached = offline
      .store()
      .get(offline.partitions().dynamic_name(), "/questions/q1")
      .unwrap()
      .unwrap();
    assert_eq!(cached.response.body, b"old");
  }

  #[tokio::test]
  async fn test_offline_fallbacks_by_destination() {
    // Cold cache, dead network: every strategy converges on the fallback
    let paths = [
      ("/icons/logo.png", Destination::Image),
      ("/api/leaderboard", Destination::Other),
      ("/questions/q1", Destination::Other),
    ];

    for (url, destination) in paths {
      let d = dispatcher(ScriptedFetcher::offline());
      let served = d.handle(Request::new(url, destination)).await;
      match destination {
        Destination::Image => {
          assert_eq!(served.response.content_type(), Some("image/svg+xml"));
        }
        _ => assert_eq!(served.response.status, 503),
      }
    }

    // Navigation with no cached offline page gets the synthetic one
    let d = dispatcher(ScriptedFetcher::offline());
    let served = d
      .handle(Request::new("/planner", Destination::Navigate))
      .await;
    assert_eq!(served.response.status, 503);
    assert!(served.response.content_type().unwrap().starts_with("text/html"));
  }

  #[tokio::test]
  async fn test_navigation_fallback_prefers_precached_offline_page() {
    let d = dispatcher(ScriptedFetcher::offline());
    let offline_page = ok_response("<h1>offline</h1>");
    d.store()
      .put(d.partitions().static_name(), "/offline.html", &offline_page)
      .unwrap();

    let served = d
      .handle(Request::new("/planner", Destination::Navigate))
      .await;
    assert_eq!(served.response.body, b"<h1>offline</h1>");
  }

  #[tokio::test]
  async fn test_lookup_checks_static_partition_first() {
    let d = dispatcher(ScriptedFetcher::offline());
    d.store()
      .put(d.partitions().static_name(), "/icons/app.svg", &ok_response("static"))
      .unwrap();
    d.store()
      .put(d.partitions().dynamic_name(), "/icons/app.svg", &ok_response("dynamic"))
      .unwrap();

    let served = d.handle(Request::get("/icons/app.svg")).await;
    assert_eq!(served.response.body, b"static");
    // Cache hit, so the dead network was never touched
    assert_eq!(d.fetcher.calls(), 0);
  }
}
