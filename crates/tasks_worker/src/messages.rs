use serde::{Deserialize, Serialize};

use tasks_domain::notifications::LocalNotification;

/// Control messages posted from the page to the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Activate the waiting worker now.
    SkipWaiting,
    ShowNotification { notification: LocalNotification },
}

impl ControlMessage {
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_messages() {
        assert_eq!(
            ControlMessage::parse(r#"{"type":"SKIP_WAITING"}"#).unwrap(),
            ControlMessage::SkipWaiting
        );
        let show = ControlMessage::parse(
            r#"{"type":"SHOW_NOTIFICATION","notification":{"title":"Hi","body":"there"}}"#,
        )
        .unwrap();
        let ControlMessage::ShowNotification { notification } = show else {
            panic!("expected a notification message");
        };
        assert_eq!(notification.title, "Hi");
        assert!(ControlMessage::parse(r#"{"type":"REBOOT"}"#).is_err());
    }
}
