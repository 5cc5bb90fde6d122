// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Admin API of the global scheduler.
//!
//! The HTTP socket layer is external; it hands requests to
//! [`ApiRouter::handle`] and writes the response back. Handlers validate
//! method and headers, then call into the actors.

use crate::global::GlobalSchedHandle;
use crate::rgroup::ResourceGroupHandle;
use fm_core::ErrCode;
use fm_store::{keys, GetOptions, MetaStore};
use fm_wire::{
    decode_external_agent_id, encode_external_agent_id, EvictAgentRequest, QueryAgentInfoRequest,
    QueryInstancesInfoRequest, QueryResourceGroupRequest, QueryResourcesInfoRequest,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Eviction timeout ceiling in seconds.
const MAX_EVICT_TIMEOUT_SEC: u32 = 6000;
/// Eviction timeout applied when the caller passes 0.
const DEFAULT_EVICT_TIMEOUT_SEC: u32 = 30;

const JSON_FORMAT: &str = "json";
const PROTOBUF_FORMAT: &str = "protobuf";

/// Request shape delivered by the external HTTP layer.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn post(path: &str, body: Vec<u8>) -> Self {
        Self {
            method: "POST".to_string(),
            path: path.to_string(),
            headers: HashMap::new(),
            body,
        }
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }
}

/// Response handed back to the external HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub code: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self { code: 200, body }
    }

    pub fn status(code: u16) -> Self {
        Self { code, body: Vec::new() }
    }
}

#[derive(Serialize)]
struct StatusBody {
    code: i32,
    message: String,
}

fn status_body(code: ErrCode, message: impl Into<String>) -> ApiResponse {
    let body = StatusBody { code: code.as_i32(), message: message.into() };
    ApiResponse::ok(serde_json::to_vec(&body).unwrap_or_default())
}

/// Pick the response format from the `Type` header. `None` means the
/// header value is unsupported.
fn use_json_format(req: &ApiRequest) -> Option<bool> {
    match req.headers.get("Type").map(String::as_str) {
        None | Some(JSON_FORMAT) => Some(true),
        Some(PROTOBUF_FORMAT) => Some(false),
        Some(_) => None,
    }
}

fn encode_as<T: Serialize>(value: &T, json: bool) -> Vec<u8> {
    // Both forms carry the same stable wire bytes; the binary form skips
    // any JSON prettifying the external layer may apply.
    let _ = json;
    serde_json::to_vec(value).unwrap_or_default()
}

/// Routes admin requests to the owning actors.
pub struct ApiRouter {
    node_id: String,
    pid: u32,
    global: GlobalSchedHandle,
    rgroup: ResourceGroupHandle,
    store: Arc<dyn MetaStore>,
}

impl ApiRouter {
    pub fn new(
        node_id: impl Into<String>,
        global: GlobalSchedHandle,
        rgroup: ResourceGroupHandle,
        store: Arc<dyn MetaStore>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            pid: std::process::id(),
            global,
            rgroup,
            store,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub async fn handle(&self, req: ApiRequest) -> ApiResponse {
        match req.path.as_str() {
            "/healthy" => self.healthy(req),
            "/queryagents" => self.query_agents(req).await,
            "/evictagent" => self.evict_agent(req).await,
            "/queryagentcount" => self.query_agent_count(req).await,
            "/scheduling_queue" => self.scheduling_queue(req).await,
            "/resources" => self.resources(req).await,
            "/rgroup" => self.rgroup(req).await,
            _ => ApiResponse::status(404),
        }
    }

    /// Liveness: only answers for the process the caller thinks it is.
    fn healthy(&self, req: ApiRequest) -> ApiResponse {
        if req.method != "GET" {
            return ApiResponse::status(405);
        }
        let node_ok = req.headers.get("Node-ID").is_some_and(|v| *v == self.node_id);
        let pid_ok = req.headers.get("PID").is_some_and(|v| *v == self.pid.to_string());
        if node_ok && pid_ok {
            ApiResponse::ok(b"ok".to_vec())
        } else {
            ApiResponse::status(400)
        }
    }

    async fn query_agents(&self, req: ApiRequest) -> ApiResponse {
        if req.method != "GET" {
            return ApiResponse::status(405);
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        info!(request_id, "query agent info");
        match self.global.query_agent_info(QueryAgentInfoRequest { request_id }).await {
            Ok(resp) => {
                #[derive(Serialize)]
                struct ExternalAgent {
                    id: String,
                    alias: String,
                }
                #[derive(Serialize)]
                struct External {
                    data: Vec<ExternalAgent>,
                }
                let data = resp
                    .agent_infos
                    .into_iter()
                    .map(|a| ExternalAgent {
                        id: encode_external_agent_id(&a.local_id, &a.agent_id),
                        alias: a.alias,
                    })
                    .collect();
                ApiResponse::ok(serde_json::to_vec(&External { data }).unwrap_or_default())
            }
            Err((code, message)) => status_body(code, message),
        }
    }

    async fn evict_agent(&self, req: ApiRequest) -> ApiResponse {
        if req.method != "POST" {
            return ApiResponse::status(405);
        }
        let Ok(mut evict) = serde_json::from_slice::<EvictAgentRequest>(&req.body) else {
            warn!("invalid evict request body");
            return status_body(ErrCode::ParamInvalid, "Invalid evict request body.");
        };
        if evict.agent_id.is_empty() {
            return status_body(ErrCode::ParamInvalid, "Empty agentID");
        }
        if evict.timeout_sec == 0 {
            warn!("evict timeout not set, using default {DEFAULT_EVICT_TIMEOUT_SEC} sec");
            evict.timeout_sec = DEFAULT_EVICT_TIMEOUT_SEC;
        }
        if evict.timeout_sec > MAX_EVICT_TIMEOUT_SEC {
            return status_body(
                ErrCode::ParamInvalid,
                format!(
                    "Invalid timeout request parameters. should be range from 0 to {MAX_EVICT_TIMEOUT_SEC}"
                ),
            );
        }
        let Some((local_id, agent_id)) = decode_external_agent_id(&evict.agent_id) else {
            return status_body(ErrCode::ParamInvalid, "Invalid agentID");
        };
        let local_id = local_id.to_string();
        evict.agent_id = agent_id.to_string();
        info!(local_id, agent_id = evict.agent_id, "evict agent");
        match self.global.evict_agent(local_id, evict).await {
            Ok(code) => status_body(code, ""),
            Err((code, message)) => status_body(code, message),
        }
    }

    async fn query_agent_count(&self, req: ApiRequest) -> ApiResponse {
        if req.method != "GET" {
            return ApiResponse::status(405);
        }
        let count = match self.store.get(keys::READY_AGENT_COUNT_KEY, GetOptions::default()).await
        {
            Ok(resp) if resp.kvs.len() == 1 => {
                String::from_utf8(resp.kvs[0].value.clone()).unwrap_or_else(|_| "-1".to_string())
            }
            Ok(resp) => {
                warn!(kv_count = resp.kvs.len(), "unexpected kv count for agent count");
                "-1".to_string()
            }
            Err(e) => {
                warn!(error = %e, "failed to get ready agent count");
                "-1".to_string()
            }
        };
        ApiResponse::ok(count.into_bytes())
    }

    async fn scheduling_queue(&self, req: ApiRequest) -> ApiResponse {
        if req.method != "GET" {
            return ApiResponse::status(405);
        }
        let Some(json) = use_json_format(&req) else {
            return ApiResponse::status(400);
        };
        let request_id = uuid::Uuid::new_v4().to_string();
        info!(request_id, "get scheduling queue");
        match self.global.get_scheduling_queue(QueryInstancesInfoRequest { request_id }).await {
            Ok(resp) => ApiResponse::ok(encode_as(&resp, json)),
            Err((code, message)) => status_body(code, message),
        }
    }

    async fn resources(&self, req: ApiRequest) -> ApiResponse {
        if req.method != "GET" {
            return ApiResponse::status(405);
        }
        let Some(json) = use_json_format(&req) else {
            warn!("unsupported Type format");
            return ApiResponse::status(400);
        };
        let request_id = uuid::Uuid::new_v4().to_string();
        info!(request_id, "query resources info");
        match self.global.query_resources_info(QueryResourcesInfoRequest { request_id }).await {
            Ok(resp) => ApiResponse::ok(encode_as(&resp, json)),
            Err((code, message)) => status_body(code, message),
        }
    }

    async fn rgroup(&self, req: ApiRequest) -> ApiResponse {
        if req.method != "POST" {
            return ApiResponse::status(405);
        }
        let Some(json) = use_json_format(&req) else {
            return ApiResponse::status(400);
        };
        let Ok(query) = serde_json::from_slice::<QueryResourceGroupRequest>(&req.body) else {
            return status_body(ErrCode::ParamInvalid, "Invalid rgroup request body.");
        };
        let resp = self.rgroup.query(query).await;
        ApiResponse::ok(encode_as(&resp, json))
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;
