use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::provider::{
    Delivery, NotificationProvider, ProviderError, ProviderKind, SharedProviderState,
};
use super::request::{LocalNotification, NotificationRequest};

/// Host-side notification display.
#[async_trait]
pub trait LocalNotifier: Send + Sync {
    fn is_supported(&self) -> bool;
    async fn show(&self, notification: &LocalNotification) -> Result<()>;
}

/// Lowest-priority channel. Still gated by its permission flag like the others.
pub struct LocalProvider {
    notifier: Arc<dyn LocalNotifier>,
    flags: SharedProviderState,
}

impl LocalProvider {
    pub fn new(notifier: Arc<dyn LocalNotifier>, flags: SharedProviderState) -> Self {
        flags.set_ready(notifier.is_supported());
        Self { notifier, flags }
    }

    pub fn notifier(&self) -> Arc<dyn LocalNotifier> {
        Arc::clone(&self.notifier)
    }
}

#[async_trait]
impl NotificationProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn is_ready(&self) -> bool {
        self.flags.snapshot().ready
    }

    fn is_permitted(&self) -> bool {
        self.flags.snapshot().permitted
    }

    async fn send(&self, request: &NotificationRequest) -> Result<Delivery, ProviderError> {
        if !self.notifier.is_supported() {
            return Err(ProviderError::Unsupported);
        }
        let notification = LocalNotification::from(request);
        self.notifier
            .show(&notification)
            .await
            .map_err(ProviderError::transport)?;
        Ok(Delivery::new(ProviderKind::Local))
    }
}
