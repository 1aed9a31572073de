use serde_json::{Map, Value};
use tracing::{debug, warn};

use tasks_domain::notifications::LocalNotification;

pub const DEFAULT_TITLE: &str = "Tasks";
pub const DEFAULT_BODY: &str = "New notification";
pub const PUSH_TAG: &str = "default";

/// Builds the notification shown for an incoming push message.
///
/// A JSON object payload overrides the defaults field by field. Anything
/// else keeps the default title and uses the raw text as body.
pub fn notification_from_push(payload: Option<&[u8]>) -> LocalNotification {
    let defaults = LocalNotification::new(DEFAULT_TITLE, DEFAULT_BODY).with_tag(PUSH_TAG);
    let Some(payload) = payload else {
        debug!("push event without payload");
        return defaults;
    };

    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(fields)) => merge(defaults, fields),
        Ok(other) => {
            debug!(payload = %other, "push payload is not an object");
            with_text_body(defaults, payload)
        }
        Err(err) => {
            warn!(%err, "push payload is not JSON");
            with_text_body(defaults, payload)
        }
    }
}

fn merge(defaults: LocalNotification, overrides: Map<String, Value>) -> LocalNotification {
    let mut merged = match serde_json::to_value(&defaults) {
        Ok(Value::Object(fields)) => fields,
        _ => return defaults,
    };
    for (key, value) in overrides {
        if !value.is_null() {
            merged.insert(key, value);
        }
    }
    match serde_json::from_value(Value::Object(merged)) {
        Ok(notification) => notification,
        Err(err) => {
            warn!(%err, "push payload fields have unexpected types, using defaults");
            defaults
        }
    }
}

fn with_text_body(mut notification: LocalNotification, payload: &[u8]) -> LocalNotification {
    let text = String::from_utf8_lossy(payload);
    let text = text.trim();
    if !text.is_empty() {
        notification.body = text.to_string();
    }
    notification
}
