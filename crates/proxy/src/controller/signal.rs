// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom-signal routing between locals.
//!
//! A non-shutdown signal aimed at a remote instance is forwarded to the
//! local that owns it, resolved through the route records. Replies arrive
//! on a separate message and are matched back by (instance id, signal);
//! unanswered forwards retry on the configured cycle.

use super::InstanceController;
use fm_core::{ErrCode, Signal};
use fm_store::{keys, GetOptions};
use fm_wire::{
    ForwardCustomSignalRequest, ForwardCustomSignalResponse, KillRequest, KillResponse, RouteInfo,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn correlation_key(instance_id: &str, signal: Signal) -> String {
    format!("{instance_id}:{}", signal.as_i32())
}

impl InstanceController {
    /// Resolve the address of the local that owns an instance, retrying
    /// the route lookup a bounded number of times.
    pub(crate) async fn resolve_owner(&self, instance_id: &str) -> Option<String> {
        for attempt in 0..self.config.max_get_local_aid_times {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            let fetched = self
                .store
                .get(&keys::route_key(instance_id), GetOptions::default())
                .await;
            let Ok(resp) = fetched else { continue };
            let Some(kv) = resp.kvs.first() else { continue };
            let Ok(route) = serde_json::from_slice::<RouteInfo>(&kv.value) else {
                warn!(instance_id, "unparsable route record");
                continue;
            };
            if let Some(address) = self.peers.resolve_local(&route.function_proxy_id).await {
                return Some(address);
            }
        }
        None
    }

    /// Forward a custom signal to the owning local and await the
    /// correlated reply, retrying per the kill-forward budget.
    pub(crate) async fn route_custom_signal(
        self: &Arc<Self>,
        src_instance_id: &str,
        req: KillRequest,
    ) -> KillResponse {
        let Some(address) = self.resolve_owner(&req.instance_id).await else {
            return KillResponse::new(&req.instance_id, ErrCode::InstanceNotFound, "no route to instance");
        };
        let key = correlation_key(&req.instance_id, req.signal);
        let forward = ForwardCustomSignalRequest {
            src_instance_id: src_instance_id.to_string(),
            kill: req.clone(),
        };
        for attempt in 0..self.config.max_forward_kill_retry_times {
            let pending = self.signal_sync.lock().register(key.clone());
            if let Err(e) = self.peers.forward_custom_signal(&address, forward.clone()).await {
                warn!(
                    instance_id = req.instance_id,
                    attempt, error = %e,
                    "custom signal forward failed"
                );
                self.signal_sync.lock().cancel(&key);
                tokio::time::sleep(Duration::from_millis(
                    self.config.max_forward_kill_retry_cycle_ms,
                ))
                .await;
                continue;
            }
            match pending.await {
                Ok(resp) => {
                    return KillResponse::new(&req.instance_id, resp.code, resp.message);
                }
                Err(_) => {
                    warn!(instance_id = req.instance_id, attempt, "custom signal reply timed out");
                }
            }
        }
        self.signal_sync.lock().prune();
        KillResponse::new(
            &req.instance_id,
            ErrCode::InnerCommunication,
            "custom signal forward exhausted retries",
        )
    }

    /// Transport entry: a peer forwarded a custom signal for an instance
    /// this local owns. Delivers it and returns the correlated reply.
    pub async fn handle_forward_custom_signal(
        self: &Arc<Self>,
        req: ForwardCustomSignalRequest,
    ) -> ForwardCustomSignalResponse {
        let instance_id = req.kill.instance_id.clone();
        let signal = req.kill.signal;
        info!(instance_id, signal = %signal, "handling forwarded custom signal");
        let resp = self.kill(&req.src_instance_id, req.kill).await;
        ForwardCustomSignalResponse {
            instance_id,
            signal,
            code: resp.code,
            message: resp.message,
        }
    }

    /// Transport entry: the reply to a custom signal this local forwarded.
    pub fn on_forward_signal_response(&self, resp: ForwardCustomSignalResponse) {
        let key = correlation_key(&resp.instance_id, resp.signal);
        if !self.signal_sync.lock().complete(&key, resp) {
            warn!(key, "late or unknown custom signal reply dropped");
        }
    }
}
