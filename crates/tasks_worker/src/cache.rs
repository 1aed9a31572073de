use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// A navigation to a page.
    Document,
    #[default]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Request {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub destination: Destination,
}

impl Request {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            destination: Destination::Other,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self {
            destination: Destination::Document,
            ..Self::get(url)
        }
    }

    pub fn is_get(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response.
    Basic,
    Cors,
    Opaque,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Response {
    pub url: String,
    pub status: u16,
    pub kind: ResponseKind,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            kind: ResponseKind::Basic,
            body: body.into(),
        }
    }

    /// Only complete same-origin responses are worth caching.
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}

/// Named caches of responses keyed by URL.
pub trait CacheStorage: Send + Sync {
    fn cache_names(&self) -> Vec<String>;
    /// Searches every cache, the way an unscoped match does.
    fn match_any(&self, url: &str) -> Option<Response>;
    fn put(&self, cache: &str, url: &str, response: Response);
    fn delete(&self, cache: &str) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<BTreeMap<String, BTreeMap<String, Response>>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn cache_names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    fn match_any(&self, url: &str) -> Option<Response> {
        self.caches
            .read()
            .values()
            .find_map(|entries| entries.get(url).cloned())
    }

    fn put(&self, cache: &str, url: &str, response: Response) {
        self.caches
            .write()
            .entry(cache.to_string())
            .or_default()
            .insert(url.to_string(), response);
    }

    fn delete(&self, cache: &str) -> bool {
        self.caches.write().remove(cache).is_some()
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response>;
}
