// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Domain scheduler membership and the root-domain heartbeat link.
//!
//! One actor owns the registry of domain schedulers and a single heartbeat
//! link, always pointed at the current root. Registration and heartbeat
//! outcomes surface as [`DomainEvent`]s drained by the global scheduler
//! actor. Downstream RPC forwarding needs no actor state and goes straight
//! through the shared client.

use crate::clients::{ClientError, DomainClient};
use fm_wire::{
    GroupScheduleRequest, GroupScheduleResponse, QueryAgentInfoRequest, QueryAgentInfoResponse,
    QueryInstancesInfoRequest, QueryInstancesInfoResponse, QueryResourcesInfoRequest,
    QueryResourcesInfoResponse, RegisterAck, ScheduleRequest, ScheduleResponse,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Membership changes and failures observed by the manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    /// A domain scheduler registered (or re-registered).
    Registered { name: String, address: String },
    /// The heartbeat link to the root domain died.
    HeartbeatLost { name: String },
    /// A domain reported one of its locals gone.
    LocalLost { name: String, ip: String },
    /// Worker health notification to propagate as a taint.
    WorkerStatus { ip: String, key: String, healthy: bool },
}

enum Msg {
    Register { name: String, address: String },
    Registered { address: String, ack: RegisterAck },
    Connect { name: String, address: String, reply: oneshot::Sender<()> },
    Disconnect,
    HeartbeatMissed { name: String, address: String },
    LocalLost { name: String, ip: String },
    WorkerStatus { ip: String, key: String, healthy: bool },
}

/// Handle to the domain manager actor. RPC forwarding helpers live here
/// because they only need the shared client.
#[derive(Clone)]
pub struct DomainMgrHandle {
    tx: mpsc::Sender<Msg>,
    client: Arc<dyn DomainClient>,
    retry_cycle: Duration,
}

impl DomainMgrHandle {
    /// A domain scheduler announced itself.
    pub async fn register(&self, name: impl Into<String>, address: impl Into<String>) {
        let _ = self
            .tx
            .send(Msg::Register { name: name.into(), address: address.into() })
            .await;
    }

    /// Deliver a registration acknowledgment to a domain.
    pub async fn registered(&self, address: impl Into<String>, ack: RegisterAck) {
        let _ = self.tx.send(Msg::Registered { address: address.into(), ack }).await;
    }

    /// Point the heartbeat link at a (new) root domain.
    pub async fn connect(&self, name: impl Into<String>, address: impl Into<String>) {
        let (reply, done) = oneshot::channel();
        let _ = self
            .tx
            .send(Msg::Connect { name: name.into(), address: address.into(), reply })
            .await;
        let _ = done.await;
    }

    /// Drop the heartbeat link.
    pub async fn disconnect(&self) {
        let _ = self.tx.send(Msg::Disconnect).await;
    }

    /// A domain told us one of its locals is gone.
    pub async fn notify_local_lost(&self, name: impl Into<String>, ip: impl Into<String>) {
        let _ = self.tx.send(Msg::LocalLost { name: name.into(), ip: ip.into() }).await;
    }

    /// Worker health changed under some domain.
    pub async fn notify_worker_status(
        &self,
        ip: impl Into<String>,
        key: impl Into<String>,
        healthy: bool,
    ) {
        let _ = self
            .tx
            .send(Msg::WorkerStatus { ip: ip.into(), key: key.into(), healthy })
            .await;
    }

    /// Forward a schedule request downward, retrying transient transport
    /// failures once per retry cycle.
    pub async fn schedule(
        &self,
        name: &str,
        address: &str,
        req: ScheduleRequest,
    ) -> Result<ScheduleResponse, ClientError> {
        let mut attempts = 0u32;
        loop {
            match self.client.schedule(address, req.clone()).await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempts < SCHEDULE_FORWARD_ATTEMPTS => {
                    attempts += 1;
                    warn!(domain = name, error = %e, attempts, "schedule forward failed, retry");
                    tokio::time::sleep(self.retry_cycle).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn query_agent_info(
        &self,
        address: &str,
        req: QueryAgentInfoRequest,
    ) -> Result<QueryAgentInfoResponse, ClientError> {
        self.client.query_agent_info(address, req).await
    }

    pub async fn query_resources_info(
        &self,
        address: &str,
        req: QueryResourcesInfoRequest,
    ) -> Result<QueryResourcesInfoResponse, ClientError> {
        self.client.query_resources_info(address, req).await
    }

    pub async fn get_scheduling_queue(
        &self,
        address: &str,
        req: QueryInstancesInfoRequest,
    ) -> Result<QueryInstancesInfoResponse, ClientError> {
        self.client.get_scheduling_queue(address, req).await
    }

    pub async fn group_schedule(
        &self,
        address: &str,
        req: GroupScheduleRequest,
    ) -> Result<GroupScheduleResponse, ClientError> {
        self.client.group_schedule(address, req).await
    }
}

struct HeartbeatLink {
    name: String,
    cancel: CancellationToken,
}

/// The domain manager actor.
pub struct DomainMgrActor {
    rx: mpsc::Receiver<Msg>,
    self_tx: mpsc::Sender<Msg>,
    client: Arc<dyn DomainClient>,
    events: mpsc::UnboundedSender<DomainEvent>,
    domains: HashMap<String, String>,
    link: Option<HeartbeatLink>,
    heartbeat_interval: Duration,
    max_heartbeat_miss: u32,
}

impl DomainMgrActor {
    /// Spawn the actor. Events land on the returned receiver.
    pub fn spawn(
        client: Arc<dyn DomainClient>,
        heartbeat_interval: Duration,
        max_heartbeat_miss: u32,
        retry_cycle: Duration,
    ) -> (DomainMgrHandle, mpsc::UnboundedReceiver<DomainEvent>) {
        let (tx, rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let actor = Self {
            rx,
            self_tx: tx.clone(),
            client: client.clone(),
            events: event_tx,
            domains: HashMap::new(),
            link: None,
            heartbeat_interval,
            max_heartbeat_miss,
        };
        tokio::spawn(actor.run());
        (DomainMgrHandle { tx, client, retry_cycle }, event_rx)
    }

    async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            self.handle(msg).await;
        }
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
        }
    }

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Register { name, address } => {
                info!(name, address, "domain scheduler registered");
                self.domains.insert(name.clone(), address.clone());
                let _ = self.events.send(DomainEvent::Registered { name, address });
            }
            Msg::Registered { address, ack } => {
                if let Err(e) = self.client.registered(&address, ack).await {
                    warn!(address, error = %e, "failed to deliver registration ack");
                }
            }
            Msg::Connect { name, address, reply } => {
                self.connect(name, address);
                let _ = reply.send(());
            }
            Msg::Disconnect => {
                if let Some(link) = self.link.take() {
                    info!(name = link.name, "disconnect heartbeat link");
                    link.cancel.cancel();
                }
            }
            Msg::HeartbeatMissed { name, address } => {
                // Stale reports from a link we already tore down are ignored.
                if self.link.as_ref().is_some_and(|l| l.name == name) {
                    warn!(name, address, "root domain heartbeat lost");
                    if let Some(link) = self.link.take() {
                        link.cancel.cancel();
                    }
                    let _ = self.events.send(DomainEvent::HeartbeatLost { name });
                }
            }
            Msg::LocalLost { name, ip } => {
                let _ = self.events.send(DomainEvent::LocalLost { name, ip });
            }
            Msg::WorkerStatus { ip, key, healthy } => {
                let _ = self.events.send(DomainEvent::WorkerStatus { ip, key, healthy });
            }
        }
    }

    fn connect(&mut self, name: String, address: String) {
        if let Some(previous) = self.link.take() {
            info!(name = previous.name, "replace heartbeat link");
            previous.cancel.cancel();
        }
        info!(name, address, "connect heartbeat to root domain");
        let cancel = CancellationToken::new();
        self.link = Some(HeartbeatLink { name: name.clone(), cancel: cancel.clone() });
        let client = self.client.clone();
        let self_tx = self.self_tx.clone();
        let interval = self.heartbeat_interval;
        let max_miss = self.max_heartbeat_miss;
        tokio::spawn(async move {
            let mut misses = 0u32;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                match client.heartbeat(&address).await {
                    Ok(()) => misses = 0,
                    Err(_) => {
                        // One immediate reconnect attempt before counting.
                        if client.heartbeat(&address).await.is_ok() {
                            misses = 0;
                            continue;
                        }
                        misses += 1;
                        if misses >= max_miss {
                            let _ = self_tx
                                .send(Msg::HeartbeatMissed {
                                    name: name.clone(),
                                    address: address.clone(),
                                })
                                .await;
                            return;
                        }
                    }
                }
            }
        });
    }
}

const SCHEDULE_FORWARD_ATTEMPTS: u32 = 3;

#[cfg(test)]
#[path = "domain_mgr_tests.rs"]
mod tests;
