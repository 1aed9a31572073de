use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("notification title must not be empty")]
    EmptyTitle,
}

/// One message to deliver. Built per dispatch and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
}

impl NotificationRequest {
    pub fn new(
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(NotificationError::EmptyTitle);
        }
        Ok(Self {
            title,
            body: body.into(),
        })
    }
}

/// Receives notification requests from domain services. Implementations must
/// not block: delivery happens elsewhere.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, request: NotificationRequest);
}

pub const DEFAULT_ICON: &str = "./icons/icon-192x192.svg";
pub const DEFAULT_BADGE: &str = "./icons/icon-72x72.svg";
pub const DEFAULT_TAG: &str = "task-notification";
pub const DEFAULT_VIBRATE: [u32; 3] = [200, 100, 200];

/// Fields of a system notification as the host platform renders it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocalNotification {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_badge")]
    pub badge: String,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default)]
    pub require_interaction: bool,
    #[serde(default = "default_vibrate")]
    pub vibrate: Vec<u32>,
    #[serde(default = "empty_data")]
    pub data: Value,
}

impl LocalNotification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: default_icon(),
            badge: default_badge(),
            tag: default_tag(),
            require_interaction: false,
            vibrate: default_vibrate(),
            data: empty_data(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

impl From<&NotificationRequest> for LocalNotification {
    fn from(request: &NotificationRequest) -> Self {
        Self::new(request.title.clone(), request.body.clone())
    }
}

fn default_icon() -> String {
    DEFAULT_ICON.to_string()
}

fn default_badge() -> String {
    DEFAULT_BADGE.to_string()
}

fn default_tag() -> String {
    DEFAULT_TAG.to_string()
}

fn default_vibrate() -> Vec<u32> {
    DEFAULT_VIBRATE.to_vec()
}

fn empty_data() -> Value {
    Value::Object(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_titles_but_allows_empty_body() {
        assert_eq!(
            NotificationRequest::new("  ", "body"),
            Err(NotificationError::EmptyTitle)
        );
        let request = NotificationRequest::new("Task added", "").unwrap();
        assert!(request.body.is_empty());
    }

    #[test]
    fn local_notification_fills_platform_defaults() {
        let parsed: LocalNotification =
            serde_json::from_str(r#"{"title":"Hi","requireInteraction":true}"#).unwrap();
        assert_eq!(parsed.icon, DEFAULT_ICON);
        assert_eq!(parsed.tag, DEFAULT_TAG);
        assert_eq!(parsed.vibrate, vec![200, 100, 200]);
        assert!(parsed.require_interaction);
        assert!(parsed.body.is_empty());
    }
}
