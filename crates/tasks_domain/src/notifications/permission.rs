//! Per-provider permission tracking.
//!
//! The machine mirrors the platform's consent flag into a [`SharedProviderState`]
//! so providers can check `permitted` without touching the platform at send time.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::provider::{ProviderKind, SharedProviderState};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Unset,
    Granted,
    Denied,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionState::Unset => "unset",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        })
    }
}

/// Provider-specific consent API.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    async fn query(&self) -> Result<PermissionState>;
    async fn request(&self) -> Result<PermissionState>;

    /// Whether the platform lets the app prompt again after a denial.
    fn can_reprompt(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    AlreadyGranted,
    Granted,
    Denied,
    /// The user dismissed the prompt without deciding.
    Dismissed,
    /// The request itself failed; the provider is marked not permitted.
    Failed(String),
}

pub struct PermissionMachine {
    provider: ProviderKind,
    backend: Arc<dyn PermissionBackend>,
    state: RwLock<PermissionState>,
    flags: SharedProviderState,
}

impl PermissionMachine {
    pub fn new(
        provider: ProviderKind,
        backend: Arc<dyn PermissionBackend>,
        flags: SharedProviderState,
    ) -> Self {
        Self {
            provider,
            backend,
            state: RwLock::new(PermissionState::Unset),
            flags,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    pub fn state(&self) -> PermissionState {
        *self.state.read()
    }

    /// Re-reads the platform state. Called at startup; nothing is cached
    /// across restarts.
    pub async fn initialize(&self) -> PermissionState {
        match self.backend.query().await {
            Ok(state) => {
                debug!(provider = %self.provider, %state, "permission state queried");
                self.store(state);
                state
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(provider = %self.provider, err = %message, "permission query failed");
                self.store(PermissionState::Unset);
                PermissionState::Unset
            }
        }
    }

    /// User-initiated consent request.
    pub async fn request_permission(&self) -> RequestOutcome {
        match self.state() {
            PermissionState::Granted => return RequestOutcome::AlreadyGranted,
            PermissionState::Denied if !self.backend.can_reprompt() => {
                debug!(provider = %self.provider, "platform does not allow re-prompting");
                return RequestOutcome::Denied;
            }
            PermissionState::Denied | PermissionState::Unset => {}
        }

        match self.backend.request().await {
            Ok(state) => {
                info!(provider = %self.provider, %state, "permission request answered");
                self.store(state);
                match state {
                    PermissionState::Granted => RequestOutcome::Granted,
                    PermissionState::Denied => RequestOutcome::Denied,
                    PermissionState::Unset => RequestOutcome::Dismissed,
                }
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(provider = %self.provider, err = %message, "permission request failed");
                self.flags.set_permitted(false);
                RequestOutcome::Failed(message)
            }
        }
    }

    /// Platform-driven change, accepted from any state.
    pub fn apply_change(&self, state: PermissionState) {
        let previous = self.state();
        if previous != state {
            info!(provider = %self.provider, from = %previous, to = %state, "permission changed");
        }
        self.store(state);
    }

    fn store(&self, state: PermissionState) {
        *self.state.write() = state;
        self.flags.set_permitted(state == PermissionState::Granted);
    }
}

impl fmt::Debug for PermissionMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionMachine")
            .field("provider", &self.provider)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
