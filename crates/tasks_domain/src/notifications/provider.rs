use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::request::NotificationRequest;

/// The three delivery channels, declared in dispatch priority order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Installed push subscription service.
    Subscription,
    /// Third-party hosted web push registration.
    WebPush,
    /// In-process local notification.
    Local,
}

impl ProviderKind {
    pub const PRIORITY: [ProviderKind; 3] = [
        ProviderKind::Subscription,
        ProviderKind::WebPush,
        ProviderKind::Local,
    ];

    pub fn priority(self) -> usize {
        match self {
            ProviderKind::Subscription => 0,
            ProviderKind::WebPush => 1,
            ProviderKind::Local => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Subscription => "subscription",
            ProviderKind::WebPush => "web-push",
            ProviderKind::Local => "local",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderKind::PRIORITY
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown provider `{s}`"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderState {
    pub ready: bool,
    pub permitted: bool,
}

/// Flags written by initialization and permission handling, read by the
/// provider at send time.
#[derive(Debug, Clone, Default)]
pub struct SharedProviderState(Arc<RwLock<ProviderState>>);

impl SharedProviderState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ProviderState {
        *self.0.read()
    }

    pub fn set_ready(&self, ready: bool) {
        self.0.write().ready = ready;
    }

    pub fn set_permitted(&self, permitted: bool) {
        self.0.write().permitted = permitted;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub provider: ProviderKind,
    pub detail: Option<String>,
}

impl Delivery {
    pub fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider is not ready")]
    NotReady,
    #[error("notifications are not supported on this platform")]
    Unsupported,
    #[error("delivery rejected: {0}")]
    Rejected(String),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("payload encoding failed")]
    Payload(#[from] serde_json::Error),
}

impl ProviderError {
    pub fn transport(err: anyhow::Error) -> Self {
        ProviderError::Transport(format!("{err:#}"))
    }
}

#[async_trait]
pub trait NotificationProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn is_ready(&self) -> bool;
    fn is_permitted(&self) -> bool;
    async fn send(&self, request: &NotificationRequest) -> Result<Delivery, ProviderError>;
}
