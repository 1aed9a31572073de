//! Concrete platform backends for the terminal build: HTTP relays for the
//! two remote channels, a terminal notifier, and permission records kept in
//! the local store.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use tasks_domain::install::{InstallChoice, InstallPrompter};
use tasks_domain::notifications::{
    LocalNotification, LocalNotifier, PermissionBackend, PermissionState, ProviderKind,
    PushService, PushSubscription, SubscriptionPlatform,
};
use tasks_domain::store::LocalStore;
use tasks_worker::{Fetcher, Request, Response};
use tasks_worker::cache::ResponseKind;

pub fn permission_key(provider: ProviderKind) -> String {
    format!("permission:{provider}")
}

/// Consent recorded in the local store. Running `notify on` is the user's
/// answer, so a request always grants.
#[derive(Clone)]
pub struct StoredPermissionBackend {
    store: Arc<dyn LocalStore>,
    provider: ProviderKind,
}

impl StoredPermissionBackend {
    pub fn new(store: Arc<dyn LocalStore>, provider: ProviderKind) -> Self {
        Self { store, provider }
    }

    pub fn record(&self, state: PermissionState) -> Result<()> {
        let encoded = serde_json::to_string(&state)?;
        self.store
            .set(&permission_key(self.provider), &encoded)
            .with_context(|| format!("failed to record {} permission", self.provider))
    }
}

#[async_trait]
impl PermissionBackend for StoredPermissionBackend {
    async fn query(&self) -> Result<PermissionState> {
        match self.store.get(&permission_key(self.provider))? {
            Some(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("unreadable {} permission record", self.provider)),
            None => Ok(PermissionState::Unset),
        }
    }

    async fn request(&self) -> Result<PermissionState> {
        self.record(PermissionState::Granted)?;
        Ok(PermissionState::Granted)
    }

    fn can_reprompt(&self) -> bool {
        true
    }
}

#[derive(Debug, Deserialize)]
struct CreatedNotification {
    id: Option<String>,
}

/// Hosted subscription service reached over its REST API.
pub struct HostedSubscriptionPlatform {
    client: reqwest::Client,
    base_url: String,
    permission: StoredPermissionBackend,
    registration: RwLock<Option<(String, String)>>,
}

impl HostedSubscriptionPlatform {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            permission: StoredPermissionBackend::new(store, ProviderKind::Subscription),
            registration: RwLock::new(None),
        }
    }
}

#[async_trait]
impl SubscriptionPlatform for HostedSubscriptionPlatform {
    async fn init(&self, app_id: &str, key: Option<&str>) -> Result<()> {
        let Some(key) = key.filter(|key| !key.trim().is_empty()) else {
            bail!("subscription service needs an API key");
        };
        *self.registration.write() = Some((app_id.to_string(), key.to_string()));
        Ok(())
    }

    async fn permission(&self) -> Result<PermissionState> {
        self.permission.query().await
    }

    async fn request_permission(&self) -> Result<PermissionState> {
        self.permission.request().await
    }

    async fn subscriber_id(&self) -> Result<Option<String>> {
        Ok(self.registration.read().as_ref().map(|(app_id, _)| format!("cli-{app_id}")))
    }

    async fn send(&self, title: &str, body: &str) -> Result<Option<String>> {
        let registration = self.registration.read().clone();
        let Some((app_id, key)) = registration else {
            bail!("subscription service is not initialized");
        };
        let url = format!("{}/api/v1/notifications", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Basic {key}"))
            .json(&json!({
                "app_id": app_id,
                "headings": { "en": title },
                "contents": { "en": body },
                "included_segments": ["Subscribed Users"],
            }))
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            bail!("subscription service answered {status}");
        }
        let created: CreatedNotification = response
            .json()
            .await
            .context("unreadable subscription service response")?;
        Ok(created.id)
    }
}

/// Web push through the relay server, which owns the private VAPID key.
pub struct RelayPushService {
    client: reqwest::Client,
    relay_url: String,
}

impl RelayPushService {
    pub fn new(client: reqwest::Client, relay_url: impl Into<String>) -> Self {
        Self {
            client,
            relay_url: relay_url.into(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        let base = self.relay_url.trim_end_matches('/');
        if base.is_empty() {
            bail!("no push relay configured");
        }
        Ok(format!("{base}{path}"))
    }
}

#[async_trait]
impl PushService for RelayPushService {
    async fn subscribe(&self, vapid_public_key: &str) -> Result<PushSubscription> {
        let url = self.endpoint("/api/subscribe")?;
        let response = self
            .client
            .post(&url)
            .json(&json!({ "applicationServerKey": vapid_public_key }))
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .context("push relay refused the subscription")?;
        let subscription = response
            .json::<PushSubscription>()
            .await
            .context("push relay returned an unreadable subscription")?;
        info!(endpoint = %subscription.endpoint, "registered push subscription");
        Ok(subscription)
    }

    async fn send(
        &self,
        subscription: &PushSubscription,
        notification: &LocalNotification,
    ) -> Result<()> {
        let url = self.endpoint("/send-web-push")?;
        self.client
            .post(&url)
            .json(&json!({
                "subscription": subscription,
                "notification": notification,
            }))
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .context("push relay rejected the notification")?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TerminalNotifier;

#[async_trait]
impl LocalNotifier for TerminalNotifier {
    fn is_supported(&self) -> bool {
        true
    }

    async fn show(&self, notification: &LocalNotification) -> Result<()> {
        println!("(notification) {}: {}", notification.title, notification.body);
        Ok(())
    }
}

/// Answers the install prompt with the choice typed on the command line.
#[derive(Debug, Clone, Copy)]
pub struct ChoicePrompter(pub InstallChoice);

#[async_trait]
impl InstallPrompter for ChoicePrompter {
    async fn prompt(&self) -> Result<InstallChoice> {
        Ok(self.0)
    }
}

/// Resolves the worker's relative URLs against the app origin.
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: String,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into(),
        }
    }

    pub fn resolve(&self, url: &str) -> Result<reqwest::Url> {
        let base = reqwest::Url::parse(&format!("{}/", self.origin.trim_end_matches('/')))
            .with_context(|| format!("invalid app origin `{}`", self.origin))?;
        base.join(url)
            .with_context(|| format!("invalid request url `{url}`"))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let url = self.resolve(&request.url)?;
        let kind = if url.origin() == self.resolve("/")?.origin() {
            ResponseKind::Basic
        } else {
            ResponseKind::Cors
        };
        debug!(%url, "fetching");
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {url}"))?;
        Ok(Response {
            url: request.url.clone(),
            status,
            kind,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasks_domain::store::MemoryStore;

    #[tokio::test]
    async fn stored_permission_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let backend = StoredPermissionBackend::new(store.clone(), ProviderKind::Local);
        assert_eq!(backend.query().await.unwrap(), PermissionState::Unset);
        assert_eq!(backend.request().await.unwrap(), PermissionState::Granted);

        backend.record(PermissionState::Denied).unwrap();
        assert_eq!(backend.query().await.unwrap(), PermissionState::Denied);
        assert_eq!(
            store.get("permission:local").unwrap().as_deref(),
            Some("\"denied\"")
        );
    }

    #[tokio::test]
    async fn subscription_platform_requires_a_key() {
        let store = Arc::new(MemoryStore::new());
        let platform =
            HostedSubscriptionPlatform::new(reqwest::Client::new(), "http://127.0.0.1:9", store);
        assert!(platform.init("app", None).await.is_err());
        assert!(platform.send("t", "b").await.is_err());
        platform.init("app", Some("secret")).await.unwrap();
        assert_eq!(
            platform.subscriber_id().await.unwrap().as_deref(),
            Some("cli-app")
        );
    }

    #[tokio::test]
    async fn relay_without_url_fails_fast() {
        let relay = RelayPushService::new(reqwest::Client::new(), "");
        let err = relay.subscribe("key").await.unwrap_err();
        assert!(err.to_string().contains("no push relay"));
    }

    #[test]
    fn fetcher_resolves_relative_urls_against_origin() {
        let fetcher = HttpFetcher::new(reqwest::Client::new(), "http://localhost:8080");
        assert_eq!(
            fetcher.resolve("./index.html").unwrap().as_str(),
            "http://localhost:8080/index.html"
        );
        assert_eq!(
            fetcher.resolve("https://cdn.example/lib.js").unwrap().as_str(),
            "https://cdn.example/lib.js"
        );
    }
}
