// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local scheduler membership.
//!
//! Caches registered locals, pushes topology-view updates to them, and
//! forwards evictions. Registration and deregistration surface as
//! [`LocalEvent`]s for the global scheduler actor.

use crate::clients::{ClientError, LocalClient};
use fm_core::ErrCode;
use fm_wire::{EvictAgentRequest, RegisterAck, RemoveBundleRequest, ScheduleTopology};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

/// Membership changes observed by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalEvent {
    Registered { name: String, address: String },
    /// A local deregistered on its own.
    Unregistered { name: String, ip: String },
}

enum Msg {
    Register { name: String, address: String },
    Unregister { name: String, ip: String },
    Registered { address: String, ack: RegisterAck },
    PushTopology { addresses: Vec<String>, topology: ScheduleTopology },
    GetAddress { name: String, reply: oneshot::Sender<Option<String>> },
    Forget { name: String },
}

/// Handle to the local manager actor.
#[derive(Clone)]
pub struct LocalMgrHandle {
    tx: mpsc::Sender<Msg>,
    client: Arc<dyn LocalClient>,
}

impl LocalMgrHandle {
    pub async fn register(&self, name: impl Into<String>, address: impl Into<String>) {
        let _ = self
            .tx
            .send(Msg::Register { name: name.into(), address: address.into() })
            .await;
    }

    pub async fn unregister(&self, name: impl Into<String>, ip: impl Into<String>) {
        let _ = self.tx.send(Msg::Unregister { name: name.into(), ip: ip.into() }).await;
    }

    pub async fn registered(&self, address: impl Into<String>, ack: RegisterAck) {
        let _ = self.tx.send(Msg::Registered { address: address.into(), ack }).await;
    }

    /// Push a topology view to every affected local.
    pub async fn push_topology(&self, addresses: Vec<String>, topology: ScheduleTopology) {
        let _ = self.tx.send(Msg::PushTopology { addresses, topology }).await;
    }

    /// Look up the cached address of a registered local.
    pub async fn address_of(&self, name: &str) -> Option<String> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(Msg::GetAddress { name: name.to_string(), reply }).await.ok()?;
        rx.await.ok().flatten()
    }

    /// Drop a local from the cache (after abnormal removal).
    pub async fn forget(&self, name: impl Into<String>) {
        let _ = self.tx.send(Msg::Forget { name: name.into() }).await;
    }

    /// Thin forwarder: evict an agent on a specific local.
    pub async fn evict_agent_on_local(
        &self,
        address: &str,
        req: EvictAgentRequest,
    ) -> Result<ErrCode, ClientError> {
        self.client.evict_agent(address, req).await
    }

    /// Thin forwarder: remove bundle reservations on a specific local.
    pub async fn remove_bundle_on_local(
        &self,
        address: &str,
        req: RemoveBundleRequest,
    ) -> Result<ErrCode, ClientError> {
        self.client.remove_bundle(address, req).await.map(|r| r.code)
    }
}

/// The local manager actor.
pub struct LocalMgrActor {
    rx: mpsc::Receiver<Msg>,
    client: Arc<dyn LocalClient>,
    events: mpsc::UnboundedSender<LocalEvent>,
    locals: HashMap<String, String>,
}

impl LocalMgrActor {
    pub fn spawn(
        client: Arc<dyn LocalClient>,
    ) -> (LocalMgrHandle, mpsc::UnboundedReceiver<LocalEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let actor = Self { rx, client: client.clone(), events: event_tx, locals: HashMap::new() };
        tokio::spawn(actor.run());
        (LocalMgrHandle { tx, client }, event_rx)
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.handle(msg).await;
        }
    }

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Register { name, address } => {
                info!(name, address, "local scheduler registered");
                self.locals.insert(name.clone(), address.clone());
                let _ = self.events.send(LocalEvent::Registered { name, address });
            }
            Msg::Unregister { name, ip } => {
                info!(name, "local scheduler unregistered");
                self.locals.remove(&name);
                let _ = self.events.send(LocalEvent::Unregistered { name, ip });
            }
            Msg::Registered { address, ack } => {
                if let Err(e) = self.client.registered(&address, ack).await {
                    warn!(address, error = %e, "failed to deliver registration ack");
                }
            }
            Msg::PushTopology { addresses, topology } => {
                for address in addresses {
                    if let Err(e) = self.client.update_topology(&address, topology.clone()).await {
                        warn!(address, error = %e, "failed to push topology view");
                    }
                }
            }
            Msg::GetAddress { name, reply } => {
                let _ = reply.send(self.locals.get(&name).cloned());
            }
            Msg::Forget { name } => {
                self.locals.remove(&name);
            }
        }
    }
}

#[cfg(test)]
#[path = "local_mgr_tests.rs"]
mod tests;
