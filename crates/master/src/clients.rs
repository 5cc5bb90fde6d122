// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client contracts toward downstream schedulers.
//!
//! The transport (socket dialing, framing, reconnect) is external; the
//! managers only need these call shapes. Tests plug in recording fakes.

use async_trait::async_trait;
use fm_wire::{
    EvictAgentRequest, GroupScheduleRequest, GroupScheduleResponse, QueryAgentInfoRequest,
    QueryAgentInfoResponse, QueryInstancesInfoRequest, QueryInstancesInfoResponse,
    QueryResourcesInfoRequest, QueryResourcesInfoResponse, RegisterAck, RemoveBundleRequest,
    RemoveBundleResponse, ScheduleRequest, ScheduleResponse, ScheduleTopology,
};
use thiserror::Error;

/// A downstream call failed at the transport level.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("peer {0} unreachable")]
    Unreachable(String),
    #[error("call to {0} timed out")]
    Timeout(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Calls into a domain scheduler process.
#[async_trait]
pub trait DomainClient: Send + Sync {
    /// One heartbeat round trip.
    async fn heartbeat(&self, address: &str) -> Result<(), ClientError>;

    /// Deliver a registration acknowledgment.
    async fn registered(&self, address: &str, ack: RegisterAck) -> Result<(), ClientError>;

    /// Push a fresh topology view.
    async fn update_topology(
        &self,
        address: &str,
        topology: ScheduleTopology,
    ) -> Result<(), ClientError>;

    async fn schedule(
        &self,
        address: &str,
        req: ScheduleRequest,
    ) -> Result<ScheduleResponse, ClientError>;

    async fn query_agent_info(
        &self,
        address: &str,
        req: QueryAgentInfoRequest,
    ) -> Result<QueryAgentInfoResponse, ClientError>;

    async fn query_resources_info(
        &self,
        address: &str,
        req: QueryResourcesInfoRequest,
    ) -> Result<QueryResourcesInfoResponse, ClientError>;

    async fn get_scheduling_queue(
        &self,
        address: &str,
        req: QueryInstancesInfoRequest,
    ) -> Result<QueryInstancesInfoResponse, ClientError>;

    /// Gang-schedule a resource group at the domain's group controller.
    async fn group_schedule(
        &self,
        address: &str,
        req: GroupScheduleRequest,
    ) -> Result<GroupScheduleResponse, ClientError>;
}

/// Calls into a local scheduler process.
#[async_trait]
pub trait LocalClient: Send + Sync {
    /// Deliver a registration acknowledgment.
    async fn registered(&self, address: &str, ack: RegisterAck) -> Result<(), ClientError>;

    /// Push a fresh topology view.
    async fn update_topology(
        &self,
        address: &str,
        topology: ScheduleTopology,
    ) -> Result<(), ClientError>;

    /// Forward an eviction to the local that owns the agent.
    async fn evict_agent(
        &self,
        address: &str,
        req: EvictAgentRequest,
    ) -> Result<fm_core::ErrCode, ClientError>;

    /// Release bundle reservations held by the local.
    async fn remove_bundle(
        &self,
        address: &str,
        req: RemoveBundleRequest,
    ) -> Result<RemoveBundleResponse, ClientError>;
}
