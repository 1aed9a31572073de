pub mod dispatcher;
pub mod local;
pub mod permission;
pub mod provider;
pub mod request;
pub mod subscription;
pub mod web_push;

pub use self::dispatcher::{Attempt, AttemptOutcome, DispatchReport, Dispatcher, SkipReason};
pub use self::local::{LocalNotifier, LocalProvider};
pub use self::permission::{PermissionBackend, PermissionMachine, PermissionState, RequestOutcome};
pub use self::provider::{
    Delivery, NotificationProvider, ProviderError, ProviderKind, ProviderState,
    SharedProviderState,
};
pub use self::request::{
    LocalNotification, NotificationError, NotificationRequest, NotificationSink,
};
pub use self::subscription::{SubscriptionPlatform, SubscriptionProvider};
pub use self::web_push::{PushKeys, PushService, PushSubscription, WebPushProvider};
