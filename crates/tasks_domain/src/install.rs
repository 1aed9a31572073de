use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::toast::Toast;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallState {
    #[default]
    Unavailable,
    /// The platform handed us a prompt to show later.
    Deferred,
    Installed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallChoice {
    Accepted,
    Dismissed,
}

#[async_trait]
pub trait InstallPrompter: Send + Sync {
    async fn prompt(&self) -> Result<InstallChoice>;
}

#[derive(Debug, Default)]
pub struct InstallPrompt {
    state: RwLock<InstallState>,
}

impl InstallPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InstallState {
        *self.state.read()
    }

    pub fn offer(&self) {
        let mut state = self.state.write();
        if *state != InstallState::Installed {
            *state = InstallState::Deferred;
        }
    }

    /// Returns false when the app was already marked installed.
    pub fn mark_installed(&self) -> bool {
        let mut state = self.state.write();
        let changed = *state != InstallState::Installed;
        *state = InstallState::Installed;
        changed
    }

    /// Shows the deferred prompt. The prompt is single-use whatever the answer.
    pub async fn install(&self, prompter: &dyn InstallPrompter) -> Toast {
        if self.state() != InstallState::Deferred {
            return Toast::info("Installation is not available");
        }
        *self.state.write() = InstallState::Unavailable;

        match prompter.prompt().await {
            Ok(InstallChoice::Accepted) => {
                info!("install prompt accepted");
                self.mark_installed();
                Toast::success("App installed")
            }
            Ok(InstallChoice::Dismissed) => {
                info!("install prompt dismissed");
                Toast::info("Installation cancelled")
            }
            Err(err) => {
                let message = format!("{err:#}");
                warn!(err = %message, "install prompt failed");
                Toast::error("Installation failed")
            }
        }
    }
}
