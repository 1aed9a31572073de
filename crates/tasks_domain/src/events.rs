//! The single inbound channel through which platform callbacks and domain
//! notifications reach the application context.

use tokio::sync::mpsc;
use tracing::debug;

use crate::notifications::{NotificationRequest, NotificationSink, PermissionState, ProviderKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// A domain event wants a notification delivered.
    Notify(NotificationRequest),
    /// The platform changed a provider's permission outside the app.
    PermissionChanged {
        provider: ProviderKind,
        state: PermissionState,
    },
    /// The push subscription expired or was rotated by the platform.
    SubscriptionChanged,
    /// The platform offered a deferred install prompt.
    InstallPromptAvailable,
    AppInstalled,
}

pub type EventSender = mpsc::UnboundedSender<AppEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AppEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Forwards task notifications onto the event channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: EventSender,
}

impl ChannelSink {
    pub fn new(sender: EventSender) -> Self {
        Self { sender }
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, request: NotificationRequest) {
        if self.sender.send(AppEvent::Notify(request)).is_err() {
            debug!("event channel closed, dropping notification");
        }
    }
}
