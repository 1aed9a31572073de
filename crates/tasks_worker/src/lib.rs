//! Background worker for the task list: offline caching, push display and
//! notification click routing, independent of any page being open.

pub mod cache;
pub mod click;
pub mod messages;
pub mod push;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use tasks_domain::notifications::LocalNotification;

pub use cache::{CacheStorage, Destination, Fetcher, MemoryCacheStorage, Request, Response};
pub use click::{ClickResolution, ClientWindow};
pub use messages::ControlMessage;

pub const CACHE_NAME: &str = "tasks-cache-v1";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to precache `{url}`: {reason}")]
    Precache { url: String, reason: String },
    #[error("worker must be installed before it can activate")]
    NotInstalled,
    #[error("malformed control message")]
    Message(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerConfig {
    pub cache_name: String,
    pub precache: Vec<String>,
    /// Windows whose URL contains this are considered ours.
    pub origin: String,
    pub fallback_document: String,
    pub start_url: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            cache_name: CACHE_NAME.to_string(),
            precache: [
                "./",
                "./index.html",
                "./styles.css",
                "./app.js",
                "./manifest.json",
                "./icons/icon-192x192.svg",
                "./icons/icon-512x512.svg",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            origin: "http://localhost:8080".to_string(),
            fallback_document: "./index.html".to_string(),
            start_url: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    #[default]
    Parsed,
    Installed,
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the request goes straight to the network.
    Passthrough,
    Cached(Response),
    Network(Response),
    Fallback(Response),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageEffect {
    Activated { removed: Vec<String> },
    Show(LocalNotification),
}

pub struct BackgroundWorker {
    config: WorkerConfig,
    caches: Arc<dyn CacheStorage>,
    fetcher: Arc<dyn Fetcher>,
    lifecycle: RwLock<Lifecycle>,
}

impl BackgroundWorker {
    pub fn new(
        config: WorkerConfig,
        caches: Arc<dyn CacheStorage>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        Self {
            config,
            caches,
            fetcher,
            lifecycle: RwLock::new(Lifecycle::default()),
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    /// Precaches every configured URL. Any failure aborts the install and
    /// leaves the worker uninstalled.
    #[instrument(skip(self), fields(cache = %self.config.cache_name))]
    pub async fn install(&self) -> Result<usize, WorkerError> {
        let mut fetched = Vec::with_capacity(self.config.precache.len());
        for url in &self.config.precache {
            let response = self
                .fetcher
                .fetch(&Request::get(url.as_str()))
                .await
                .map_err(|err| WorkerError::Precache {
                    url: url.clone(),
                    reason: format!("{err:#}"),
                })?;
            if response.status != 200 {
                return Err(WorkerError::Precache {
                    url: url.clone(),
                    reason: format!("status {}", response.status),
                });
            }
            fetched.push((url, response));
        }

        let count = fetched.len();
        for (url, response) in fetched {
            self.caches.put(&self.config.cache_name, url, response);
        }
        *self.lifecycle.write() = Lifecycle::Installed;
        info!(count, "precached application shell");
        Ok(count)
    }

    /// Drops caches left behind by previous versions.
    #[instrument(skip(self))]
    pub fn activate(&self) -> Result<Vec<String>, WorkerError> {
        if self.lifecycle() == Lifecycle::Parsed {
            return Err(WorkerError::NotInstalled);
        }
        let removed: Vec<String> = self
            .caches
            .cache_names()
            .into_iter()
            .filter(|name| *name != self.config.cache_name)
            .filter(|name| self.caches.delete(name))
            .collect();
        for name in &removed {
            info!(cache = %name, "deleted stale cache");
        }
        *self.lifecycle.write() = Lifecycle::Active;
        Ok(removed)
    }

    #[instrument(skip(self, request), fields(url = %request.url, method = %request.method))]
    pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
        if !request.is_get() {
            return FetchOutcome::Passthrough;
        }
        if let Some(hit) = self.caches.match_any(&request.url) {
            debug!("served from cache");
            return FetchOutcome::Cached(hit);
        }

        match self.fetcher.fetch(request).await {
            Ok(response) => {
                if response.is_cacheable() {
                    self.caches
                        .put(&self.config.cache_name, &request.url, response.clone());
                }
                FetchOutcome::Network(response)
            }
            Err(err) => {
                let message = format!("{err:#}");
                if request.destination == Destination::Document {
                    if let Some(fallback) = self.caches.match_any(&self.config.fallback_document) {
                        warn!(err = %message, "network failed, serving offline document");
                        return FetchOutcome::Fallback(fallback);
                    }
                }
                warn!(err = %message, "fetch failed");
                FetchOutcome::Failed(message)
            }
        }
    }

    pub fn handle_message(&self, raw: &str) -> Result<MessageEffect, WorkerError> {
        match ControlMessage::parse(raw)? {
            ControlMessage::SkipWaiting => {
                let removed = self.activate()?;
                Ok(MessageEffect::Activated { removed })
            }
            ControlMessage::ShowNotification { notification } => {
                Ok(MessageEffect::Show(notification))
            }
        }
    }

    pub fn handle_push(&self, payload: Option<&[u8]>) -> LocalNotification {
        push::notification_from_push(payload)
    }

    pub fn handle_click(&self, action: Option<&str>, clients: &[ClientWindow]) -> ClickResolution {
        let resolution =
            click::resolve_click(action, clients, &self.config.origin, &self.config.start_url);
        debug!(?action, ?resolution, "notification click");
        resolution
    }
}
