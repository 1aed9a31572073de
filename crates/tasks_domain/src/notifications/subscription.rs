//! Installed push-subscription service (highest priority channel).

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::permission::{PermissionBackend, PermissionState};
use super::provider::{
    Delivery, NotificationProvider, ProviderError, ProviderKind, SharedProviderState,
};
use super::request::NotificationRequest;

/// Hosted subscription SDK surface used by [`SubscriptionProvider`].
#[async_trait]
pub trait SubscriptionPlatform: Send + Sync {
    async fn init(&self, app_id: &str, key: Option<&str>) -> Result<()>;
    async fn permission(&self) -> Result<PermissionState>;
    async fn request_permission(&self) -> Result<PermissionState>;
    /// Identifier of this installation, used for diagnostics only.
    async fn subscriber_id(&self) -> Result<Option<String>>;
    async fn send(&self, title: &str, body: &str) -> Result<Option<String>>;
}

pub struct SubscriptionProvider {
    platform: Arc<dyn SubscriptionPlatform>,
    flags: SharedProviderState,
}

impl SubscriptionProvider {
    pub fn new(platform: Arc<dyn SubscriptionPlatform>, flags: SharedProviderState) -> Self {
        Self { platform, flags }
    }

    /// Registers the application with the platform. The provider is ready only
    /// after a successful registration.
    pub async fn initialize(&self, app_id: &str, key: Option<&str>) -> bool {
        if app_id.trim().is_empty() {
            debug!("no subscription app id configured");
            self.flags.set_ready(false);
            return false;
        }
        match self.platform.init(app_id, key).await {
            Ok(()) => {
                info!(app_id, "subscription platform initialized");
                self.flags.set_ready(true);
                true
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(app_id, err = %message, "subscription platform unavailable");
                self.flags.set_ready(false);
                false
            }
        }
    }

    pub async fn subscriber_id(&self) -> Option<String> {
        match self.platform.subscriber_id().await {
            Ok(id) => id,
            Err(err) => {
                let message = format!("{err:#}");
                debug!(err = %message, "subscriber id lookup failed");
                None
            }
        }
    }

    /// Permission backend that delegates to the same platform handle.
    pub fn permission_backend(&self) -> Arc<dyn PermissionBackend> {
        Arc::new(SubscriptionPermission {
            platform: Arc::clone(&self.platform),
        })
    }
}

#[async_trait]
impl NotificationProvider for SubscriptionProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Subscription
    }

    fn is_ready(&self) -> bool {
        self.flags.snapshot().ready
    }

    fn is_permitted(&self) -> bool {
        self.flags.snapshot().permitted
    }

    async fn send(&self, request: &NotificationRequest) -> Result<Delivery, ProviderError> {
        let id = self
            .platform
            .send(&request.title, &request.body)
            .await
            .map_err(ProviderError::transport)?;
        let delivery = Delivery::new(ProviderKind::Subscription);
        Ok(match id {
            Some(id) => delivery.with_detail(id),
            None => delivery,
        })
    }
}

struct SubscriptionPermission {
    platform: Arc<dyn SubscriptionPlatform>,
}

#[async_trait]
impl PermissionBackend for SubscriptionPermission {
    async fn query(&self) -> Result<PermissionState> {
        self.platform.permission().await
    }

    async fn request(&self) -> Result<PermissionState> {
        self.platform.request_permission().await
    }
}
