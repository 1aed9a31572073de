use serde::{Deserialize, Serialize};

pub const CLOSE_ACTION: &str = "close";

/// An open window controlled (or not) by the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientWindow {
    pub id: String,
    pub url: String,
    pub focusable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickResolution {
    Dismissed,
    Focus { client_id: String },
    Open { url: String },
}

/// Decides what a notification click does. The notification itself is always
/// closed by the caller.
pub fn resolve_click(
    action: Option<&str>,
    clients: &[ClientWindow],
    origin: &str,
    start_url: &str,
) -> ClickResolution {
    if action == Some(CLOSE_ACTION) {
        return ClickResolution::Dismissed;
    }
    clients
        .iter()
        .find(|client| client.focusable && client.url.contains(origin))
        .map(|client| ClickResolution::Focus {
            client_id: client.id.clone(),
        })
        .unwrap_or_else(|| ClickResolution::Open {
            url: start_url.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(id: &str, url: &str) -> ClientWindow {
        ClientWindow {
            id: id.into(),
            url: url.into(),
            focusable: true,
        }
    }

    #[test]
    fn close_action_dismisses() {
        let clients = [window("1", "https://tasks.example/")];
        assert_eq!(
            resolve_click(Some("close"), &clients, "https://tasks.example", "/"),
            ClickResolution::Dismissed
        );
    }

    #[test]
    fn focuses_matching_window_or_opens_start_url() {
        let clients = [
            window("other", "https://elsewhere.example/"),
            window("mine", "https://tasks.example/index.html"),
        ];
        assert_eq!(
            resolve_click(Some("view"), &clients, "https://tasks.example", "/"),
            ClickResolution::Focus {
                client_id: "mine".into()
            }
        );
        assert_eq!(
            resolve_click(None, &clients[..1], "https://tasks.example", "/"),
            ClickResolution::Open { url: "/".into() }
        );
    }
}
