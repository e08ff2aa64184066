//! Worker lifecycle as an explicit state machine.
//!
//! Instead of ambient event listeners, the lifecycle is modeled as named
//! transitions (`Uninstalled -> Installed -> Active`) driven by typed
//! events. Install precaches the static asset list, activate prunes
//! partitions left over from previous versions, and fetch dispatch is only
//! available once active.

use color_eyre::{eyre::eyre, Result};
use futures::StreamExt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::message::{ClientMessage, Notification, PushPayload, SyncTag};
use crate::cache::{prune_stale, CacheStore, Dispatcher, Partitions, Served};
use crate::fetch::{Fetcher, Request};
use crate::rules::RuleSet;
use crate::store::{LocalStore, StoreName};

/// Concurrent fetches while precaching or warming.
const WARM_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Uninstalled,
  Installed,
  Active,
}

/// Events delivered to the worker.
#[derive(Debug)]
pub enum WorkerEvent {
  Install,
  Activate,
  Message(ClientMessage),
  Push(Option<PushPayload>),
  Sync(SyncTag),
}

/// The offline worker: lifecycle state plus the request dispatcher.
pub struct Worker<S: CacheStore, F: Fetcher> {
  state: WorkerState,
  store: Arc<S>,
  fetcher: Arc<F>,
  dispatcher: Dispatcher<S, F>,
  /// Static asset URLs precached on install
  precache: Vec<String>,
  /// Local record store consulted by sync handlers
  local: Option<Arc<LocalStore>>,
}

impl<S: CacheStore, F: Fetcher> Worker<S, F> {
  pub fn new(
    store: Arc<S>,
    fetcher: Arc<F>,
    rules: RuleSet,
    partitions: Partitions,
    precache: Vec<String>,
  ) -> Self {
    let dispatcher = Dispatcher::new(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      rules,
      partitions,
    );
    Self {
      state: WorkerState::Uninstalled,
      store,
      fetcher,
      dispatcher,
      precache,
      local: None,
    }
  }

  /// Attach the local record store so sync events can see pending records.
  pub fn with_local_store(mut self, local: Arc<LocalStore>) -> Self {
    self.local = Some(local);
    self
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn partitions(&self) -> &Partitions {
    self.dispatcher.partitions()
  }

  /// Handle one lifecycle or channel event.
  ///
  /// Returns a notification to display for push events, None otherwise.
  pub async fn handle_event(&mut self, event: WorkerEvent) -> Result<Option<Notification>> {
    match event {
      WorkerEvent::Install => {
        if self.state != WorkerState::Uninstalled {
          return Err(eyre!("Install event in state {:?}", self.state));
        }
        self.install().await;
        self.state = WorkerState::Installed;
        info!(partition = self.partitions().static_name(), "worker installed");
        Ok(None)
      }
      WorkerEvent::Activate => {
        if self.state != WorkerState::Installed {
          return Err(eyre!("Activate event in state {:?}", self.state));
        }
        self.activate()?;
        Ok(None)
      }
      WorkerEvent::Message(ClientMessage::SkipWaiting) => {
        // Only meaningful for a worker waiting to take over
        if self.state == WorkerState::Installed {
          self.activate()?;
        } else {
          debug!(state = ?self.state, "SKIP_WAITING ignored");
        }
        Ok(None)
      }
      WorkerEvent::Message(ClientMessage::CacheUrls { urls }) => {
        let partition = self.partitions().dynamic_name().to_string();
        self.warm_into(&partition, &urls).await;
        Ok(None)
      }
      WorkerEvent::Push(payload) => Ok(Some(Notification::from_payload(payload))),
      WorkerEvent::Sync(tag) => {
        // TODO: push these records to the backend once the sync endpoints
        // exist; for now only report what is waiting.
        let store_name = match tag {
          SyncTag::Progress => StoreName::Progress,
          SyncTag::Bookmarks => StoreName::Bookmarks,
        };
        let pending = match &self.local {
          Some(local) => local.get_all(store_name)?.len(),
          None => 0,
        };
        info!(tag = tag.as_str(), pending, "background sync requested");
        Ok(None)
      }
    }
  }

  /// Serve an intercepted request.
  ///
  /// Before activation requests bypass the cache entirely and go straight
  /// to the network.
  pub async fn fetch(&self, request: Request) -> Served {
    if self.state != WorkerState::Active {
      let response = match self.fetcher.fetch(&request).await {
        Ok(response) => response,
        Err(e) => {
          debug!(url = request.url(), error = %e, "passthrough fetch failed");
          crate::fetch::Response::service_unavailable()
        }
      };
      return Served {
        response,
        revalidate: None,
      };
    }

    self.dispatcher.handle(request).await
  }

  /// Precache the configured static assets into the static partition.
  /// Best-effort per asset: one failing URL does not fail the install.
  async fn install(&self) {
    let partition = self.partitions().static_name().to_string();
    let urls = self.precache.clone();
    self.warm_into(&partition, &urls).await;
  }

  /// Transition to active, dropping partitions from older versions.
  fn activate(&mut self) -> Result<()> {
    prune_stale(self.store.as_ref(), self.partitions())?;
    self.state = WorkerState::Active;
    info!("worker active");
    Ok(())
  }

  /// Fetch a list of URLs concurrently and store the successful responses.
  async fn warm_into(&self, partition: &str, urls: &[String]) {
    futures::stream::iter(urls.to_vec())
      .map(|url| {
        let fetcher = Arc::clone(&self.fetcher);
        async move {
          let result = fetcher.fetch(&Request::get(url.clone())).await;
          (url, result)
        }
      })
      .buffer_unordered(WARM_CONCURRENCY)
      .for_each(|(url, result)| async move {
        match result {
          Ok(response) if response.is_success() => {
            if let Err(e) = self.store.put(partition, &url, &response) {
              warn!(url = url.as_str(), error = %e, "failed to store warmed response");
            }
          }
          Ok(response) => {
            warn!(
              url = url.as_str(),
              status = response.status,
              "skipping non-success response"
            );
          }
          Err(e) => {
            warn!(url = url.as_str(), error = %e, "warm fetch failed");
          }
        }
      })
      .await;
  }
}
