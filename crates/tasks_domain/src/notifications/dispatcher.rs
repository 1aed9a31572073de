//! Ordered, best-effort delivery across the notification providers.
//!
//! Providers are walked in [`ProviderKind::priority`] order, one at a time.
//! A provider is skipped when it is not ready or not permitted; a failed send
//! falls through to the next one. Running out of providers is not an error:
//! notifications are an enhancement on top of the task operation that
//! triggered them.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::provider::{NotificationProvider, ProviderKind};
use super::request::NotificationRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotReady,
    NotPermitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Skipped(SkipReason),
    Delivered,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub provider: ProviderKind,
    pub outcome: AttemptOutcome,
}

/// Diagnostics for one dispatch. Callers are not expected to branch on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered_by: Option<ProviderKind>,
    pub attempts: Vec<Attempt>,
}

impl DispatchReport {
    pub fn delivered(&self) -> bool {
        self.delivered_by.is_some()
    }

    /// Number of providers whose `send` was actually invoked.
    pub fn send_attempts(&self) -> usize {
        self.attempts
            .iter()
            .filter(|attempt| !matches!(attempt.outcome, AttemptOutcome::Skipped(_)))
            .count()
    }
}

#[derive(Clone, Default)]
pub struct Dispatcher {
    providers: Vec<Arc<dyn NotificationProvider>>,
}

impl Dispatcher {
    /// Providers are reordered by priority; registration order is irrelevant.
    pub fn new(mut providers: Vec<Arc<dyn NotificationProvider>>) -> Self {
        providers.sort_by_key(|provider| provider.kind().priority());
        Self { providers }
    }

    pub fn providers(&self) -> impl Iterator<Item = ProviderKind> + '_ {
        self.providers.iter().map(|provider| provider.kind())
    }

    #[instrument(skip_all, fields(title = %request.title))]
    pub async fn dispatch(&self, request: &NotificationRequest) -> DispatchReport {
        let mut report = DispatchReport::default();

        for provider in &self.providers {
            let kind = provider.kind();
            if !provider.is_ready() {
                debug!(provider = %kind, "skipping provider: not ready");
                report.attempts.push(Attempt {
                    provider: kind,
                    outcome: AttemptOutcome::Skipped(SkipReason::NotReady),
                });
                continue;
            }
            if !provider.is_permitted() {
                debug!(provider = %kind, "skipping provider: not permitted");
                report.attempts.push(Attempt {
                    provider: kind,
                    outcome: AttemptOutcome::Skipped(SkipReason::NotPermitted),
                });
                continue;
            }

            match provider.send(request).await {
                Ok(delivery) => {
                    info!(provider = %kind, detail = ?delivery.detail, "notification delivered");
                    report.attempts.push(Attempt {
                        provider: kind,
                        outcome: AttemptOutcome::Delivered,
                    });
                    report.delivered_by = Some(kind);
                    return report;
                }
                Err(err) => {
                    warn!(provider = %kind, %err, "notification provider failed, falling back");
                    report.attempts.push(Attempt {
                        provider: kind,
                        outcome: AttemptOutcome::Failed(err.to_string()),
                    });
                }
            }
        }

        debug!(
            attempts = report.send_attempts(),
            "no notification provider delivered"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::provider::{Delivery, ProviderError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProvider {
        kind: ProviderKind,
        ready: bool,
        permitted: bool,
        succeed: bool,
        sends: AtomicUsize,
    }

    impl StubProvider {
        fn new(kind: ProviderKind, ready: bool, permitted: bool, succeed: bool) -> Arc<Self> {
            Arc::new(Self {
                kind,
                ready,
                permitted,
                succeed,
                sends: AtomicUsize::new(0),
            })
        }

        fn sends(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NotificationProvider for StubProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn is_permitted(&self) -> bool {
            self.permitted
        }

        async fn send(&self, _request: &NotificationRequest) -> Result<Delivery, ProviderError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(Delivery::new(self.kind))
            } else {
                Err(ProviderError::Transport("connection refused".into()))
            }
        }
    }

    fn request() -> NotificationRequest {
        NotificationRequest::new("Task added", "Buy milk").unwrap()
    }

    fn dispatcher(stubs: &[Arc<StubProvider>]) -> Dispatcher {
        Dispatcher::new(
            stubs
                .iter()
                .map(|stub| Arc::clone(stub) as Arc<dyn NotificationProvider>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn nothing_usable_means_no_sends() {
        let a = StubProvider::new(ProviderKind::Subscription, false, true, true);
        let b = StubProvider::new(ProviderKind::WebPush, true, false, true);
        let c = StubProvider::new(ProviderKind::Local, false, false, true);

        let report = dispatcher(&[a.clone(), b.clone(), c.clone()])
            .dispatch(&request())
            .await;

        assert!(!report.delivered());
        assert_eq!(report.send_attempts(), 0);
        assert_eq!(a.sends() + b.sends() + c.sends(), 0);
        assert_eq!(
            report.attempts[1].outcome,
            AttemptOutcome::Skipped(SkipReason::NotPermitted)
        );
    }

    #[tokio::test]
    async fn first_success_short_circuits() {
        let a = StubProvider::new(ProviderKind::Subscription, true, true, true);
        let b = StubProvider::new(ProviderKind::WebPush, true, true, true);
        let c = StubProvider::new(ProviderKind::Local, true, true, true);

        let report = dispatcher(&[c.clone(), b.clone(), a.clone()])
            .dispatch(&request())
            .await;

        assert_eq!(report.delivered_by, Some(ProviderKind::Subscription));
        assert_eq!(a.sends(), 1);
        assert_eq!(b.sends(), 0);
        assert_eq!(c.sends(), 0);
    }

    #[tokio::test]
    async fn failure_falls_through_to_next_provider() {
        let a = StubProvider::new(ProviderKind::Subscription, true, true, false);
        let b = StubProvider::new(ProviderKind::WebPush, true, true, true);
        let c = StubProvider::new(ProviderKind::Local, true, true, true);

        let report = dispatcher(&[a.clone(), b.clone(), c.clone()])
            .dispatch(&request())
            .await;

        assert_eq!(report.delivered_by, Some(ProviderKind::WebPush));
        assert_eq!(report.send_attempts(), 2);
        assert!(matches!(report.attempts[0].outcome, AttemptOutcome::Failed(_)));
        assert_eq!(c.sends(), 0);
    }

    #[tokio::test]
    async fn exhausting_every_provider_is_silent() {
        let a = StubProvider::new(ProviderKind::Subscription, true, true, false);
        let b = StubProvider::new(ProviderKind::WebPush, true, true, false);
        let c = StubProvider::new(ProviderKind::Local, true, true, false);

        let report = dispatcher(&[a, b, c]).dispatch(&request()).await;

        assert!(!report.delivered());
        assert_eq!(report.send_attempts(), 3);
    }

    #[test]
    fn providers_are_ordered_by_priority() {
        let d = dispatcher(&[
            StubProvider::new(ProviderKind::Local, true, true, true),
            StubProvider::new(ProviderKind::Subscription, true, true, true),
        ]);
        let kinds: Vec<ProviderKind> = d.providers().collect();
        assert_eq!(kinds, vec![ProviderKind::Subscription, ProviderKind::Local]);
    }
}
