//! Web push registration backed by a server-side VAPID key.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::provider::{
    Delivery, NotificationProvider, ProviderError, ProviderKind, SharedProviderState,
};
use super::request::{LocalNotification, NotificationRequest};
use crate::store::{LocalStore, PUSH_SUBSCRIPTION_KEY};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub expiration_time: Option<i64>,
    pub keys: PushKeys,
}

#[async_trait]
pub trait PushService: Send + Sync {
    async fn subscribe(&self, vapid_public_key: &str) -> Result<PushSubscription>;
    async fn send(
        &self,
        subscription: &PushSubscription,
        notification: &LocalNotification,
    ) -> Result<()>;
}

pub struct WebPushProvider {
    service: Arc<dyn PushService>,
    store: Arc<dyn LocalStore>,
    vapid_public_key: String,
    subscription: RwLock<Option<PushSubscription>>,
    flags: SharedProviderState,
}

impl WebPushProvider {
    pub fn new(
        service: Arc<dyn PushService>,
        store: Arc<dyn LocalStore>,
        vapid_public_key: impl Into<String>,
        flags: SharedProviderState,
    ) -> Self {
        Self {
            service,
            store,
            vapid_public_key: vapid_public_key.into(),
            subscription: RwLock::new(None),
            flags,
        }
    }

    pub fn subscription(&self) -> Option<PushSubscription> {
        self.subscription.read().clone()
    }

    /// Restores a subscription persisted by an earlier session.
    pub fn restore(&self) -> bool {
        let raw = match self.store.get(PUSH_SUBSCRIPTION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return self.install(None),
            Err(err) => {
                warn!(?err, "unable to read stored push subscription");
                return self.install(None);
            }
        };
        match serde_json::from_str::<PushSubscription>(&raw) {
            Ok(subscription) => {
                info!(endpoint = %subscription.endpoint, "restored push subscription");
                self.install(Some(subscription))
            }
            Err(err) => {
                error!(%err, "discarding malformed push subscription");
                if let Err(err) = self.store.remove(PUSH_SUBSCRIPTION_KEY) {
                    warn!(?err, "unable to remove malformed push subscription");
                }
                self.install(None)
            }
        }
    }

    /// Creates a fresh subscription and persists it. A persistence failure is
    /// logged; the in-memory subscription is still usable this session.
    pub async fn subscribe(&self) -> Result<PushSubscription> {
        anyhow::ensure!(
            !self.vapid_public_key.trim().is_empty(),
            "no VAPID public key configured"
        );
        let subscription = self
            .service
            .subscribe(&self.vapid_public_key)
            .await
            .context("push subscription failed")?;
        match serde_json::to_string(&subscription) {
            Ok(raw) => {
                if let Err(err) = self.store.set(PUSH_SUBSCRIPTION_KEY, &raw) {
                    warn!(?err, "unable to persist push subscription");
                }
            }
            Err(err) => warn!(%err, "unable to encode push subscription"),
        }
        info!(endpoint = %subscription.endpoint, "push subscription created");
        self.install(Some(subscription.clone()));
        Ok(subscription)
    }

    pub fn forget(&self) {
        if let Err(err) = self.store.remove(PUSH_SUBSCRIPTION_KEY) {
            warn!(?err, "unable to remove push subscription");
        }
        self.install(None);
    }

    fn install(&self, subscription: Option<PushSubscription>) -> bool {
        let ready = subscription.is_some();
        *self.subscription.write() = subscription;
        self.flags.set_ready(ready);
        ready
    }
}

#[async_trait]
impl NotificationProvider for WebPushProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::WebPush
    }

    fn is_ready(&self) -> bool {
        self.flags.snapshot().ready
    }

    fn is_permitted(&self) -> bool {
        self.flags.snapshot().permitted
    }

    async fn send(&self, request: &NotificationRequest) -> Result<Delivery, ProviderError> {
        let subscription = self.subscription().ok_or(ProviderError::NotReady)?;
        let notification = LocalNotification::from(request).with_tag("web-push");
        self.service
            .send(&subscription, &notification)
            .await
            .map_err(ProviderError::transport)?;
        Ok(Delivery::new(ProviderKind::WebPush).with_detail(subscription.endpoint))
    }
}
