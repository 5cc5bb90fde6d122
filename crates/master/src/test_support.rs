// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording client fakes shared by the actor tests.

use crate::clients::{ClientError, DomainClient, LocalClient};
use async_trait::async_trait;
use fm_core::ErrCode;
use fm_wire::{
    EvictAgentRequest, GroupScheduleRequest, GroupScheduleResponse, QueryAgentInfoRequest,
    QueryAgentInfoResponse, QueryInstancesInfoRequest, QueryInstancesInfoResponse,
    QueryResourcesInfoRequest, QueryResourcesInfoResponse, RegisterAck, RemoveBundleRequest,
    RemoveBundleResponse, ScheduleRequest, ScheduleResponse, ScheduleTopology,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Calls a fake observed, for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    Heartbeat { address: String },
    Registered { address: String, ok: bool },
    UpdateTopology { address: String, leader: String, member_count: usize },
    Schedule { address: String, request_id: String },
    EvictAgent { address: String, agent_id: String },
    RemoveBundle { address: String, group: String },
    GroupSchedule { address: String, group: String },
}

#[derive(Default)]
pub struct FakeDomainClient {
    pub calls: Mutex<Vec<RecordedCall>>,
    pub heartbeat_fails: AtomicBool,
    pub heartbeat_count: AtomicU32,
    pub schedule_response: Mutex<Option<ScheduleResponse>>,
    pub agent_infos: Mutex<Vec<fm_wire::AgentInfo>>,
    /// bundle id -> node id used to answer gang schedules.
    pub gang_results: Mutex<BTreeMap<String, String>>,
    pub gang_fails: AtomicBool,
}

impl FakeDomainClient {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DomainClient for FakeDomainClient {
    async fn heartbeat(&self, address: &str) -> Result<(), ClientError> {
        self.heartbeat_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().push(RecordedCall::Heartbeat { address: address.to_string() });
        if self.heartbeat_fails.load(Ordering::SeqCst) {
            Err(ClientError::Unreachable(address.to_string()))
        } else {
            Ok(())
        }
    }

    async fn registered(&self, address: &str, ack: RegisterAck) -> Result<(), ClientError> {
        self.calls.lock().push(RecordedCall::Registered {
            address: address.to_string(),
            ok: ack.code.is_ok(),
        });
        Ok(())
    }

    async fn update_topology(
        &self,
        address: &str,
        topology: ScheduleTopology,
    ) -> Result<(), ClientError> {
        self.calls.lock().push(RecordedCall::UpdateTopology {
            address: address.to_string(),
            leader: topology.leader.name,
            member_count: topology.members.len(),
        });
        Ok(())
    }

    async fn schedule(
        &self,
        address: &str,
        req: ScheduleRequest,
    ) -> Result<ScheduleResponse, ClientError> {
        self.calls.lock().push(RecordedCall::Schedule {
            address: address.to_string(),
            request_id: req.request_id.clone(),
        });
        match self.schedule_response.lock().clone() {
            Some(resp) => Ok(resp),
            None => Ok(ScheduleResponse::new(&req, ErrCode::None, "")),
        }
    }

    async fn query_agent_info(
        &self,
        _address: &str,
        _req: QueryAgentInfoRequest,
    ) -> Result<QueryAgentInfoResponse, ClientError> {
        Ok(QueryAgentInfoResponse {
            code: ErrCode::None,
            agent_infos: self.agent_infos.lock().clone(),
        })
    }

    async fn query_resources_info(
        &self,
        _address: &str,
        _req: QueryResourcesInfoRequest,
    ) -> Result<QueryResourcesInfoResponse, ClientError> {
        Ok(QueryResourcesInfoResponse::default())
    }

    async fn get_scheduling_queue(
        &self,
        _address: &str,
        _req: QueryInstancesInfoRequest,
    ) -> Result<QueryInstancesInfoResponse, ClientError> {
        Ok(QueryInstancesInfoResponse::default())
    }

    async fn group_schedule(
        &self,
        address: &str,
        req: GroupScheduleRequest,
    ) -> Result<GroupScheduleResponse, ClientError> {
        self.calls.lock().push(RecordedCall::GroupSchedule {
            address: address.to_string(),
            group: req.group.name.clone(),
        });
        if self.gang_fails.load(Ordering::SeqCst) {
            return Ok(GroupScheduleResponse {
                request_id: req.request_id,
                code: ErrCode::ResourceNotEnough,
                message: "no capacity".to_string(),
                schedule_results: BTreeMap::new(),
            });
        }
        let mut results = self.gang_results.lock().clone();
        if results.is_empty() {
            // Place every bundle on a default node.
            for bundle in &req.group.bundles {
                results.insert(bundle.bundle_id.clone(), "local-default".to_string());
            }
        }
        Ok(GroupScheduleResponse {
            request_id: req.request_id,
            code: ErrCode::None,
            message: String::new(),
            schedule_results: results,
        })
    }
}

#[derive(Default)]
pub struct FakeLocalClient {
    pub calls: Mutex<Vec<RecordedCall>>,
    pub evict_code: Mutex<Option<ErrCode>>,
}

impl FakeLocalClient {
    pub fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl LocalClient for FakeLocalClient {
    async fn registered(&self, address: &str, ack: RegisterAck) -> Result<(), ClientError> {
        self.calls.lock().push(RecordedCall::Registered {
            address: address.to_string(),
            ok: ack.code.is_ok(),
        });
        Ok(())
    }

    async fn update_topology(
        &self,
        address: &str,
        topology: ScheduleTopology,
    ) -> Result<(), ClientError> {
        self.calls.lock().push(RecordedCall::UpdateTopology {
            address: address.to_string(),
            leader: topology.leader.name,
            member_count: topology.members.len(),
        });
        Ok(())
    }

    async fn evict_agent(
        &self,
        address: &str,
        req: EvictAgentRequest,
    ) -> Result<ErrCode, ClientError> {
        self.calls.lock().push(RecordedCall::EvictAgent {
            address: address.to_string(),
            agent_id: req.agent_id.clone(),
        });
        Ok(self.evict_code.lock().unwrap_or(ErrCode::None))
    }

    async fn remove_bundle(
        &self,
        address: &str,
        req: RemoveBundleRequest,
    ) -> Result<RemoveBundleResponse, ClientError> {
        self.calls.lock().push(RecordedCall::RemoveBundle {
            address: address.to_string(),
            group: req.group_name.clone(),
        });
        Ok(RemoveBundleResponse { code: ErrCode::None, message: String::new() })
    }
}
