// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kill handling, the exit pipeline, and agent eviction.

use super::InstanceController;
use fm_core::{ErrCode, InstanceState, Signal};
use fm_wire::{EvictAgentRequest, KillRequest, KillResponse, ShutdownRequest};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Synthetic source id prefix for job-wide kills.
pub const KILL_JOB_PREFIX: &str = "job-killer-";

impl InstanceController {
    /// Entry point for every kill/signal request against this local.
    pub async fn kill(self: &Arc<Self>, src_instance_id: &str, req: KillRequest) -> KillResponse {
        match req.signal {
            Signal::ShutDownAll => self.kill_job(src_instance_id, &req).await,
            Signal::ShutDownGroup => self.kill_group(&req).await,
            Signal::ShutDown | Signal::ShutDownSync => self.kill_one(src_instance_id, req).await,
            // Everything else rides the custom-signal path: locally into
            // the runtime, remotely through the owning local.
            _ => {
                if let Some(info) = self.view.get(&req.instance_id) {
                    match self.runtime.signal(&info.runtime_address, req.clone()).await {
                        Ok(resp) => resp,
                        Err(e) => KillResponse::new(
                            &req.instance_id,
                            ErrCode::RequestBetweenRuntimeBus,
                            e.to_string(),
                        ),
                    }
                } else {
                    self.route_custom_signal(src_instance_id, req).await
                }
            }
        }
    }

    /// Job-wide shutdown: every tracked instance of the job exits.
    async fn kill_job(self: &Arc<Self>, src_instance_id: &str, req: &KillRequest) -> KillResponse {
        let job_id = match self.view.get(&req.instance_id) {
            Some(info) => info.job_id,
            None => match req.instance_id.strip_prefix(KILL_JOB_PREFIX) {
                Some(job) => job.to_string(),
                None => req.instance_id.clone(),
            },
        };
        if job_id.is_empty() {
            return KillResponse::new(&req.instance_id, ErrCode::ParamInvalid, "no job to kill");
        }
        info!(job_id, "job-wide shutdown");
        let targets: Vec<String> = self
            .view
            .instances()
            .into_iter()
            .filter(|i| i.job_id == job_id)
            .map(|i| i.instance_id)
            .collect();
        let mut code = ErrCode::None;
        for target in targets {
            let mut single = KillRequest::new(&target, Signal::ShutDownSync);
            single.grace_period_sec = req.grace_period_sec;
            let resp = self.kill_one(src_instance_id, single).await;
            if !resp.code.is_ok() && code.is_ok() {
                code = resp.code;
            }
        }
        KillResponse::new(&req.instance_id, code, "")
    }

    /// Shutdown of every instance sharing the target's resource group.
    async fn kill_group(self: &Arc<Self>, req: &KillRequest) -> KillResponse {
        let Some(info) = self.view.get(&req.instance_id) else {
            return KillResponse::new(&req.instance_id, ErrCode::InstanceNotFound, "unknown instance");
        };
        let group = info.schedule_option.resource_group.clone();
        let targets: Vec<String> = if group.is_empty() {
            vec![req.instance_id.clone()]
        } else {
            self.view
                .instances()
                .into_iter()
                .filter(|i| i.schedule_option.resource_group == group)
                .map(|i| i.instance_id)
                .collect()
        };
        let mut code = ErrCode::None;
        for target in targets {
            let mut single = KillRequest::new(&target, Signal::ShutDownSync);
            single.grace_period_sec = req.grace_period_sec;
            let resp = self.kill_one("", single).await;
            if !resp.code.is_ok() && code.is_ok() {
                code = resp.code;
            }
        }
        KillResponse::new(&req.instance_id, code, "")
    }

    /// Shutdown of one instance. `ShutDownSync` awaits exit completion;
    /// plain shutdown replies once the exit pipeline is launched.
    async fn kill_one(self: &Arc<Self>, src_instance_id: &str, req: KillRequest) -> KillResponse {
        let instance_id = req.instance_id.clone();
        if !self.view.contains(&instance_id) {
            return self.kill_remote_instance(src_instance_id, req).await;
        }
        let Some(state) = self.view.state(&instance_id) else {
            return KillResponse::new(&instance_id, ErrCode::InstanceNotFound, "unknown instance");
        };
        match state {
            InstanceState::Exited | InstanceState::Exiting => {
                return KillResponse::new(&instance_id, ErrCode::InstanceExited, "already exiting")
            }
            InstanceState::Evicted => {
                return KillResponse::new(&instance_id, ErrCode::InstanceEvicted, "already evicted")
            }
            InstanceState::ScheduleFailed => {
                // Failed schedules are garbage collected by this explicit kill.
                if let Some(info) = self.view.remove(&instance_id) {
                    let _ = self.view.delete_record(&info).await;
                }
                self.notified.lock().remove(&instance_id);
                return KillResponse::ok(&instance_id);
            }
            _ => {}
        }
        // Abort any in-flight pipeline before exiting.
        self.view.cancel(&instance_id);
        let grace = if req.grace_period_sec > 0 {
            req.grace_period_sec
        } else {
            self.view
                .get(&instance_id)
                .map(|i| i.schedule_option.graceful_shutdown_sec)
                .unwrap_or(0)
        };
        let signal = req.signal;
        let outcome = self
            .view
            .transition(&instance_id, InstanceState::Exiting, move |i| {
                i.status.exit_type = signal.to_string();
            })
            .await;
        if let Err(e) = outcome {
            return KillResponse::new(&instance_id, ErrCode::InnerSystemError, e.to_string());
        }
        if req.signal == Signal::ShutDownSync {
            self.exit_instance(&instance_id, grace).await;
            KillResponse::ok(&instance_id)
        } else {
            let this = self.clone();
            let id = instance_id.clone();
            tokio::spawn(async move {
                this.exit_instance(&id, grace).await;
            });
            KillResponse::ok(&instance_id)
        }
    }

    /// The exit pipeline: graceful shutdown, hard kill at the agent,
    /// resource view release, record deletion. Terminates in EXITED.
    pub(crate) async fn exit_instance(self: &Arc<Self>, instance_id: &str, grace_period_sec: u32) {
        self.stop_heartbeat(instance_id);
        let Some(info) = self.view.get(instance_id) else {
            return;
        };
        if info.is_driver() {
            // Driver shutdown waits for the stream to go first.
            self.runtime.close(instance_id).await;
        }
        if !info.runtime_address.is_empty() {
            let shutdown = ShutdownRequest {
                instance_id: instance_id.to_string(),
                grace_period_sec,
            };
            if let Err(e) = self.runtime.shutdown(&info.runtime_address, shutdown).await {
                warn!(instance_id, error = %e, "graceful shutdown failed, killing anyway");
            }
        }
        self.kill_runtime_of(&info).await;
        self.decision.release(instance_id);
        let outcome = self.view.transition(instance_id, InstanceState::Exited, |_| {}).await;
        if let Err(e) = outcome {
            warn!(instance_id, error = %e, "failed to persist exited state");
        }
        if let Some(info) = self.view.remove(instance_id) {
            if let Err(e) = self.view.delete_record(&info).await {
                warn!(instance_id, error = %e, "failed to delete exited record");
            }
            self.notify_creator(&info, ErrCode::InstanceExited, "instance exited").await;
        }
        // The notified marker goes with the record; a reused instance id
        // starts a fresh lifecycle with a fresh notification.
        self.notified.lock().remove(instance_id);
        info!(instance_id, "exit pipeline finished");
    }

    /// A shutdown aimed at an instance some other local owns.
    async fn kill_remote_instance(
        self: &Arc<Self>,
        _src_instance_id: &str,
        req: KillRequest,
    ) -> KillResponse {
        let Some(address) = self.resolve_owner(&req.instance_id).await else {
            return KillResponse::new(&req.instance_id, ErrCode::InstanceNotFound, "no route to instance");
        };
        match self.peers.kill_remote(&address, req.clone()).await {
            Ok(resp) => resp,
            Err(e) => KillResponse::new(&req.instance_id, ErrCode::InnerCommunication, e.to_string()),
        }
    }

    // ── Eviction ────────────────────────────────────────────────────────

    /// Drain one agent: every instance on it is gracefully shut down and
    /// marked evicted. Instances still creating are waited on first (they
    /// either reach RUNNING and get evicted, or die on their own).
    pub async fn evict_agent(self: &Arc<Self>, req: EvictAgentRequest) -> ErrCode {
        let targets: Vec<String> = self
            .view
            .instances()
            .into_iter()
            .filter(|i| i.function_agent_id == req.agent_id)
            .map(|i| i.instance_id)
            .collect();
        info!(agent_id = req.agent_id, count = targets.len(), "evicting agent");
        let mut result = ErrCode::None;
        for instance_id in targets {
            let code = self.evict_instance(&instance_id, req.timeout_sec).await;
            if !code.is_ok() && result.is_ok() {
                result = code;
            }
        }
        result
    }

    async fn evict_instance(self: &Arc<Self>, instance_id: &str, timeout_sec: u32) -> ErrCode {
        if self.view.state(instance_id) == Some(InstanceState::Creating) {
            // Wait for the pipeline to settle before evicting.
            let settled = self.view.subscribe(
                instance_id,
                HashSet::from([
                    InstanceState::Running,
                    InstanceState::Fatal,
                    InstanceState::Exited,
                    InstanceState::Evicted,
                ]),
            );
            if let Some(rx) = settled {
                let _ = tokio::time::timeout(Duration::from_secs(timeout_sec as u64), rx).await;
            }
        }
        match self.view.state(instance_id) {
            Some(InstanceState::Running) | Some(InstanceState::SubHealth) => {}
            Some(other) => {
                info!(instance_id, state = %other, "instance settled outside eviction scope");
                return ErrCode::None;
            }
            None => return ErrCode::None,
        }
        let outcome = self
            .view
            .transition(instance_id, InstanceState::Evicting, |i| {
                i.status.err_code = ErrCode::InstanceEvicted;
            })
            .await;
        if let Err(e) = outcome {
            warn!(instance_id, error = %e, "evicting transition failed");
            return ErrCode::InnerSystemError;
        }
        self.stop_heartbeat(instance_id);
        let Some(info) = self.view.get(instance_id) else {
            return ErrCode::None;
        };
        if !info.runtime_address.is_empty() {
            let shutdown = ShutdownRequest {
                instance_id: instance_id.to_string(),
                grace_period_sec: info.schedule_option.graceful_shutdown_sec,
            };
            let _ = self.runtime.shutdown(&info.runtime_address, shutdown).await;
        }
        self.kill_runtime_of(&info).await;
        self.decision.release(instance_id);
        let outcome = self.view.transition(instance_id, InstanceState::Evicted, |_| {}).await;
        if let Err(e) = outcome {
            warn!(instance_id, error = %e, "evicted transition failed");
        }
        if let Some(info) = self.view.remove(instance_id) {
            let _ = self.view.delete_record(&info).await;
            self.notify_creator(&info, ErrCode::InstanceEvicted, "instance evicted").await;
        }
        self.notified.lock().remove(instance_id);
        ErrCode::None
    }
}
