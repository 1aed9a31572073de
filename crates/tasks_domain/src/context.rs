//! Application context: owns the notification providers, their permission
//! machines and the install prompt, and applies inbound [`AppEvent`]s.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::events::{AppEvent, EventReceiver};
use crate::install::{InstallPrompt, InstallPrompter};
use crate::notifications::{
    DispatchReport, Dispatcher, LocalNotifier, LocalProvider, NotificationProvider,
    NotificationRequest, PermissionBackend, PermissionMachine, PermissionState, ProviderKind,
    PushService, RequestOutcome, SharedProviderState, SubscriptionPlatform, SubscriptionProvider,
    WebPushProvider,
};
use crate::store::LocalStore;
use crate::toast::Toast;

#[derive(Debug, Clone, Default)]
pub struct NotificationConfig {
    pub app_id: String,
    pub subscription_key: Option<String>,
    pub vapid_public_key: String,
}

/// Platform handles for the three providers.
pub struct Platforms {
    pub subscription: Arc<dyn SubscriptionPlatform>,
    pub push: Arc<dyn PushService>,
    pub push_permission: Arc<dyn PermissionBackend>,
    pub notifier: Arc<dyn LocalNotifier>,
    pub local_permission: Arc<dyn PermissionBackend>,
}

/// What handling an event produced for the caller.
#[derive(Debug)]
pub enum EventEffect {
    Dispatched(JoinHandle<DispatchReport>),
    Toast(Toast),
    None,
}

pub struct AppContext {
    config: NotificationConfig,
    dispatcher: Arc<Dispatcher>,
    subscription: Arc<SubscriptionProvider>,
    web_push: Arc<WebPushProvider>,
    local: Arc<LocalProvider>,
    permissions: Vec<PermissionMachine>,
    install: InstallPrompt,
}

impl AppContext {
    pub fn new(
        store: Arc<dyn LocalStore>,
        config: NotificationConfig,
        platforms: Platforms,
    ) -> Self {
        let subscription_flags = SharedProviderState::new();
        let web_push_flags = SharedProviderState::new();
        let local_flags = SharedProviderState::new();

        let subscription = Arc::new(SubscriptionProvider::new(
            platforms.subscription,
            subscription_flags.clone(),
        ));
        let web_push = Arc::new(WebPushProvider::new(
            platforms.push,
            store,
            config.vapid_public_key.clone(),
            web_push_flags.clone(),
        ));
        let local = Arc::new(LocalProvider::new(platforms.notifier, local_flags.clone()));

        let permissions = vec![
            PermissionMachine::new(
                ProviderKind::Subscription,
                subscription.permission_backend(),
                subscription_flags,
            ),
            PermissionMachine::new(
                ProviderKind::WebPush,
                platforms.push_permission,
                web_push_flags,
            ),
            PermissionMachine::new(ProviderKind::Local, platforms.local_permission, local_flags),
        ];

        let dispatcher = Arc::new(Dispatcher::new(vec![
            Arc::clone(&subscription) as Arc<dyn NotificationProvider>,
            Arc::clone(&web_push) as Arc<dyn NotificationProvider>,
            Arc::clone(&local) as Arc<dyn NotificationProvider>,
        ]));

        Self {
            config,
            dispatcher,
            subscription,
            web_push,
            local,
            permissions,
            install: InstallPrompt::new(),
        }
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn local_notifier(&self) -> Arc<dyn LocalNotifier> {
        self.local.notifier()
    }

    pub fn install_prompt(&self) -> &InstallPrompt {
        &self.install
    }

    pub fn permission(&self, provider: ProviderKind) -> Option<PermissionState> {
        self.machine(provider).map(PermissionMachine::state)
    }

    /// Readiness and permission of every provider, in priority order.
    pub fn provider_status(&self) -> Vec<(ProviderKind, bool, PermissionState)> {
        let providers: [&dyn NotificationProvider; 3] =
            [&*self.subscription, &*self.web_push, &*self.local];
        providers
            .into_iter()
            .map(|provider| {
                let kind = provider.kind();
                let state = self.permission(kind).unwrap_or_default();
                (kind, provider.is_ready(), state)
            })
            .collect()
    }

    /// Startup: register with the subscription platform, re-query every
    /// permission and restore a persisted push subscription.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        self.subscription
            .initialize(
                &self.config.app_id,
                self.config.subscription_key.as_deref(),
            )
            .await;
        for machine in &self.permissions {
            machine.initialize().await;
        }
        self.web_push.restore();

        if self.subscription.is_ready() {
            match self.subscription.subscriber_id().await {
                Some(id) => info!(subscriber_id = %id, "subscription platform registered"),
                None => debug!("subscription platform has no subscriber yet"),
            }
        }
    }

    /// User-initiated consent for every usable provider.
    #[instrument(skip(self))]
    pub async fn enable_notifications(&self) -> Vec<Toast> {
        let mut toasts = Vec::new();
        for machine in &self.permissions {
            let kind = machine.provider();
            let usable = match kind {
                ProviderKind::Subscription => self.subscription.is_ready(),
                ProviderKind::WebPush => !self.config.vapid_public_key.trim().is_empty(),
                ProviderKind::Local => self.local.is_ready(),
            };
            if !usable {
                debug!(provider = %kind, "provider unavailable, not requesting permission");
                continue;
            }

            let outcome = machine.request_permission().await;
            toasts.push(permission_toast(kind, &outcome));

            let granted = matches!(
                outcome,
                RequestOutcome::Granted | RequestOutcome::AlreadyGranted
            );
            if kind == ProviderKind::WebPush && granted && self.web_push.subscription().is_none() {
                if let Some(toast) = self.subscribe_web_push().await {
                    toasts.push(toast);
                }
            }
        }
        if toasts.is_empty() {
            toasts.push(Toast::info("No notification channel is available"));
        }
        toasts
    }

    pub async fn dispatch(&self, request: &NotificationRequest) -> DispatchReport {
        self.dispatcher.dispatch(request).await
    }

    pub async fn install(&self, prompter: &dyn InstallPrompter) -> Toast {
        self.install.install(prompter).await
    }

    /// Applies one inbound event. Notification delivery is spawned and never
    /// awaited here.
    pub async fn handle_event(&self, event: AppEvent) -> EventEffect {
        match event {
            AppEvent::Notify(request) => {
                let dispatcher = Arc::clone(&self.dispatcher);
                EventEffect::Dispatched(tokio::spawn(async move {
                    dispatcher.dispatch(&request).await
                }))
            }
            AppEvent::PermissionChanged { provider, state } => match self.machine(provider) {
                Some(machine) => {
                    machine.apply_change(state);
                    if provider == ProviderKind::WebPush && state == PermissionState::Denied {
                        self.web_push.forget();
                    }
                    EventEffect::Toast(Toast::info(format!(
                        "Notifications via {provider}: {state}"
                    )))
                }
                None => EventEffect::None,
            },
            AppEvent::SubscriptionChanged => match self.subscribe_web_push().await {
                Some(toast) => EventEffect::Toast(toast),
                None => EventEffect::None,
            },
            AppEvent::InstallPromptAvailable => {
                self.install.offer();
                EventEffect::None
            }
            AppEvent::AppInstalled => {
                if self.install.mark_installed() {
                    EventEffect::Toast(Toast::success("App installed"))
                } else {
                    EventEffect::None
                }
            }
        }
    }

    /// Drains the channel in arrival order until every sender is gone.
    pub async fn run(&self, mut events: EventReceiver, mut on_toast: impl FnMut(Toast)) {
        while let Some(event) = events.recv().await {
            if let EventEffect::Toast(toast) = self.handle_event(event).await {
                on_toast(toast);
            }
        }
        debug!("event channel closed");
    }

    fn machine(&self, provider: ProviderKind) -> Option<&PermissionMachine> {
        self.permissions
            .iter()
            .find(|machine| machine.provider() == provider)
    }

    async fn subscribe_web_push(&self) -> Option<Toast> {
        match self.web_push.subscribe().await {
            Ok(_) => None,
            Err(err) => {
                let message = format!("{err:#}");
                warn!(err = %message, "web push subscription failed");
                Some(Toast::warning("Push subscription failed"))
            }
        }
    }
}

fn permission_toast(provider: ProviderKind, outcome: &RequestOutcome) -> Toast {
    match outcome {
        RequestOutcome::AlreadyGranted => {
            Toast::info(format!("Notifications via {provider} already enabled"))
        }
        RequestOutcome::Granted => Toast::success(format!("Notifications via {provider} enabled")),
        RequestOutcome::Denied => Toast::warning(format!("Notifications via {provider} denied")),
        RequestOutcome::Dismissed => {
            Toast::info(format!("Notifications via {provider} not decided"))
        }
        RequestOutcome::Failed(_) => Toast::warning(format!(
            "Could not enable notifications via {provider}"
        )),
    }
}
