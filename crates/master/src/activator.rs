// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Co-resident domain scheduler activation.
//!
//! When the tree has no domain with free capacity, the global scheduler can
//! launch a domain scheduler inside its own process. The launcher itself is
//! external; [`DomainActivator`] only sequences start/stop and remembers
//! whether a launch is already in flight.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// Starts and stops the in-process domain scheduler.
#[async_trait]
pub trait DomainLauncher: Send + Sync {
    async fn start(&self) -> Result<(), String>;
    async fn stop(&self) -> Result<(), String>;
}

/// Wrapper around the launcher used by the global scheduler actor.
pub struct DomainActivator {
    launcher: Arc<dyn DomainLauncher>,
}

impl DomainActivator {
    pub fn new(launcher: Arc<dyn DomainLauncher>) -> Self {
        Self { launcher }
    }

    /// Launch the co-resident domain scheduler. The newly started domain
    /// registers through the ordinary path once it is up.
    pub async fn start_domain(&self) -> Result<(), String> {
        info!("domain activator starts to create domain scheduler");
        match self.launcher.start().await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(error = %e, "failed to create domain scheduler");
                Err(e)
            }
        }
    }

    pub async fn stop_domain(&self) -> Result<(), String> {
        self.launcher.stop().await
    }
}
