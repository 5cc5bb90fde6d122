// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance creation: deploy, readiness, init call, creator notification.

use super::InstanceController;
use crate::machine::SaveOutcome;
use fm_core::{ErrCode, InstanceState};
use fm_wire::{
    CallResult, DeployInstanceRequest, ForwardCallResultRequest, FunctionMeta, InitCallRequest,
    KillRuntimeRequest, ReadinessRequest, ScheduleRequest, ScheduleResponse,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Init-call timeout applied when the caller didn't set one.
const DEFAULT_INIT_CALL_TIMEOUT_MS: u64 = 30_000;

/// How one creation attempt ended.
pub(crate) enum CreateOutcome {
    /// Terminal for this schedule call (success or unrecoverable failure).
    Done(ScheduleResponse),
    /// The instance sits in FAILED with recovery allowed; the dispatch
    /// loop consumes one reschedule and tries again.
    Recover,
}

impl InstanceController {
    /// Stages 8..11 for an instance already in CREATING with a chosen agent.
    pub(crate) async fn create_instance(
        self: &Arc<Self>,
        req: &ScheduleRequest,
        meta: &FunctionMeta,
    ) -> CreateOutcome {
        let instance_id = req.instance.instance_id.clone();
        let cancel = self.view.cancel_token(&instance_id);

        // Stage 8 + 9: deploy to the agent, then prove the runtime ready.
        // A readiness failure kills the runtime and redeploys, sharing the
        // redeploy budget.
        let mut runtime_id = String::new();
        let mut runtime_address = String::new();
        let mut deployed = false;
        for attempt in 0..=self.config.max_redeploy_times {
            if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return CreateOutcome::Done(self.canceled(req).await);
            }
            let Some(current) = self.view.get(&instance_id) else {
                return CreateOutcome::Done(Self::respond(
                    req,
                    ErrCode::InstanceNotFound,
                    "instance left the control view",
                ));
            };
            if attempt > 0 {
                // Monopoly placements must not reuse a half-claimed agent.
                if current.schedule_option.policy == "monopoly" {
                    let _ = self
                        .agent
                        .kill_runtime(
                            &current.function_agent_id,
                            KillRuntimeRequest {
                                instance_id: instance_id.clone(),
                                runtime_id: runtime_id.clone(),
                                recovering: true,
                            },
                        )
                        .await;
                }
                tokio::time::sleep(jittered(self.config.reconnect_interval_ms)).await;
            }
            let deploy = DeployInstanceRequest {
                instance: current.clone(),
                meta: meta.clone(),
                credentials: String::new(),
            };
            match self.agent.deploy(&current.function_agent_id, deploy).await {
                Ok(resp) if resp.code.is_ok() => {
                    runtime_id = resp.runtime_id;
                    runtime_address = resp.runtime_address;
                    if self.check_readiness(&instance_id, &runtime_id, &runtime_address).await {
                        deployed = true;
                        break;
                    }
                    // Readiness failed: kill and let the loop redeploy.
                    let _ = self
                        .agent
                        .kill_runtime(
                            &current.function_agent_id,
                            KillRuntimeRequest {
                                instance_id: instance_id.clone(),
                                runtime_id: runtime_id.clone(),
                                recovering: true,
                            },
                        )
                        .await;
                }
                Ok(resp) => {
                    warn!(instance_id, attempt, code = %resp.code, "deploy refused by agent");
                }
                Err(e) => {
                    warn!(instance_id, attempt, error = %e, "deploy transport failed");
                }
            }
        }
        if !deployed {
            return self.create_failed(req, ErrCode::InnerCommunication, "deploy failed").await;
        }

        // Stage 10: checkpoint (best effort), then the init call raced
        // against the cancel signal.
        let checkpointed = self.runtime.checkpoint(&runtime_address, &instance_id).await.is_ok();
        let requested = req.instance.schedule_option.timeout_ms;
        let timeout_ms = if requested == 0 {
            DEFAULT_INIT_CALL_TIMEOUT_MS
        } else {
            requested.min(crate::config::MAX_INIT_CALL_TIMEOUT_MS)
        };
        let init = InitCallRequest {
            instance_id: instance_id.clone(),
            request_id: req.request_id.clone(),
            args: Vec::new(),
            timeout_ms,
        };
        let init_result = {
            let call = self.runtime.init_call(&runtime_address, init);
            let timed = tokio::time::timeout(Duration::from_millis(timeout_ms), call);
            match cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => {
                        return CreateOutcome::Done(self.canceled(req).await);
                    }
                    result = timed => result,
                },
                None => timed.await,
            }
        };
        let call_result = match init_result {
            Ok(Ok(result)) if result.code.is_ok() => result,
            Ok(Ok(result)) => {
                warn!(instance_id, code = %result.code, "init call reported failure");
                return self.create_failed(req, result.code, &result.message).await;
            }
            Ok(Err(e)) => {
                warn!(instance_id, error = %e, "init call transport failed");
                return self.create_failed(req, ErrCode::RequestBetweenRuntimeBus, &e.to_string()).await;
            }
            Err(_) => {
                warn!(instance_id, timeout_ms, "init call timed out");
                return self.create_failed(req, ErrCode::UserFunctionException, "init call timed out").await;
            }
        };

        // CREATING -> RUNNING with the runtime coordinates.
        let rt_id = runtime_id.clone();
        let rt_addr = runtime_address.clone();
        let outcome = self
            .view
            .transition(&instance_id, InstanceState::Running, move |i| {
                i.runtime_id = rt_id;
                i.runtime_address = rt_addr;
                if checkpointed {
                    i.create_options.insert("isCheckpointed".to_string(), "true".to_string());
                }
            })
            .await;
        match outcome {
            Ok(SaveOutcome::Applied) | Ok(SaveOutcome::AlreadyApplied) => {}
            Ok(SaveOutcome::Relinquished { new_owner }) => {
                self.view.remove(&instance_id);
                let mut resp = Self::respond(req, ErrCode::None, "scheduled elsewhere");
                resp.scheduled_on = new_owner;
                return CreateOutcome::Done(resp);
            }
            Ok(SaveOutcome::RolledBack { store_state }) => {
                return CreateOutcome::Done(Self::respond(
                    req,
                    ErrCode::EtcdOperationError,
                    format!("store diverged to {store_state}"),
                ));
            }
            Err(e) => {
                return CreateOutcome::Done(Self::respond(req, ErrCode::EtcdOperationError, e.to_string()));
            }
        }
        if let Some(info) = self.view.get(&instance_id) {
            if let Err(e) = self.view.persist_route(&info).await {
                warn!(instance_id, error = %e, "failed to publish route record");
            }
        }
        info!(instance_id, runtime_id, "instance is running");
        self.start_heartbeat(&instance_id);

        // Stage 11: forward the create result to whoever asked for it.
        self.forward_call_result(&req.instance, call_result).await;
        let mut resp = ScheduleResponse::ok(req, self.config.node_id.clone());
        resp.message = "created".to_string();
        CreateOutcome::Done(resp)
    }

    async fn check_readiness(
        self: &Arc<Self>,
        instance_id: &str,
        runtime_id: &str,
        runtime_address: &str,
    ) -> bool {
        for attempt in 0..=self.config.max_reconnect_times {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.reconnect_interval_ms)).await;
            }
            if self.runtime.connect(runtime_address).await.is_err() {
                warn!(instance_id, attempt, "runtime control stream connect failed");
                continue;
            }
            let probe = ReadinessRequest {
                instance_id: instance_id.to_string(),
                runtime_id: runtime_id.to_string(),
            };
            match self.runtime.readiness(runtime_address, probe).await {
                Ok(resp) if resp.code.is_ok() => return true,
                Ok(resp) => {
                    warn!(instance_id, attempt, code = %resp.code, "readiness check refused")
                }
                Err(e) => warn!(instance_id, attempt, error = %e, "readiness check failed"),
            }
        }
        false
    }

    /// Creation failed. Recovery-enabled instances park in FAILED for the
    /// dispatch loop; the rest go FATAL here.
    pub(crate) async fn create_failed(
        self: &Arc<Self>,
        req: &ScheduleRequest,
        code: ErrCode,
        message: &str,
    ) -> CreateOutcome {
        let instance_id = req.instance.instance_id.clone();
        let recoverable = self.view.get(&instance_id).is_some_and(|i| i.recoverable());
        if recoverable {
            let fail_code = code;
            let fail_message = message.to_string();
            let outcome = self
                .view
                .transition(&instance_id, InstanceState::Failed, move |i| {
                    i.status.err_code = fail_code;
                    i.status.message = fail_message;
                })
                .await;
            match outcome {
                Ok(SaveOutcome::Applied) | Ok(SaveOutcome::AlreadyApplied) => CreateOutcome::Recover,
                _ => CreateOutcome::Done(Self::respond(req, code, message)),
            }
        } else {
            self.make_fatal(&instance_id, code, message).await;
            self.notify_creator(&req.instance, code, message).await;
            CreateOutcome::Done(Self::respond(req, code, message))
        }
    }

    async fn canceled(self: &Arc<Self>, req: &ScheduleRequest) -> ScheduleResponse {
        info!(
            instance_id = req.instance.instance_id,
            "create pipeline canceled by a kill"
        );
        Self::respond(req, ErrCode::ScheduleCanceled, "schedule canceled")
    }

    // ── Creator notification ────────────────────────────────────────────

    /// Notify the creating instance with an error outcome. Wrapper around
    /// [`Self::forward_call_result`] for failure paths.
    pub(crate) async fn notify_creator(
        self: &Arc<Self>,
        instance: &fm_core::InstanceInfo,
        code: ErrCode,
        message: &str,
    ) {
        let result = CallResult {
            instance_id: instance.instance_id.clone(),
            request_id: instance.request_id.clone(),
            code,
            message: message.to_string(),
            exit_code: 0,
        };
        self.forward_call_result(instance, result).await;
    }

    /// Deliver a call result to the creator, exactly once per lifecycle.
    /// A local creator gets it directly; a remote one through its local.
    pub(crate) async fn forward_call_result(
        self: &Arc<Self>,
        instance: &fm_core::InstanceInfo,
        result: CallResult,
    ) {
        if instance.parent_id.is_empty() {
            return;
        }
        if !self.notified.lock().insert(instance.instance_id.clone()) {
            info!(
                instance_id = instance.instance_id,
                code = %result.code,
                "creator already notified, dropping call result"
            );
            return;
        }
        if self.view.contains(&instance.parent_id) {
            if let Err(e) = self.creator_sink.deliver(&instance.parent_id, result).await {
                warn!(parent = instance.parent_id, error = %e, "local call result delivery failed");
            }
            return;
        }
        let Some(owner) = self.resolve_owner(&instance.parent_id).await else {
            warn!(parent = instance.parent_id, "no route to creator for call result");
            return;
        };
        let forward = ForwardCallResultRequest {
            dst_instance_id: instance.parent_id.clone(),
            result,
        };
        if let Err(e) = self.peers.forward_call_result(&owner, forward).await {
            warn!(parent = instance.parent_id, error = %e, "call result forward failed");
        }
    }

    /// Kill the runtime for an instance that will never run again.
    pub(crate) async fn kill_runtime_of(&self, info: &fm_core::InstanceInfo) {
        if info.function_agent_id.is_empty() {
            return;
        }
        let req = KillRuntimeRequest {
            instance_id: info.instance_id.clone(),
            runtime_id: info.runtime_id.clone(),
            recovering: false,
        };
        if let Err(e) = self.agent.kill_runtime(&info.function_agent_id, req).await {
            warn!(instance_id = info.instance_id, error = %e, "kill runtime failed");
        }
    }

    /// Fatal policy: transition, kill the runtime, drop the resource view
    /// entry, and delete the record after a grace window.
    pub(crate) async fn make_fatal(self: &Arc<Self>, instance_id: &str, code: ErrCode, message: &str) {
        let fail_code = code;
        let fail_message = message.to_string();
        let outcome = self
            .view
            .transition(instance_id, InstanceState::Fatal, move |i| {
                i.status.err_code = fail_code;
                i.status.message = fail_message;
                i.status.exit_type = "fatal".to_string();
            })
            .await;
        if let Err(e) = outcome {
            warn!(instance_id, error = %e, "failed to persist fatal state");
        }
        self.stop_heartbeat(instance_id);
        if let Some(info) = self.view.get(instance_id) {
            self.kill_runtime_of(&info).await;
            self.decision.release(instance_id);
            let this = self.clone();
            let grace = Duration::from_secs(FATAL_RECORD_GRACE_SEC);
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                if let Some(info) = this.view.remove(&info.instance_id) {
                    let _ = this.view.delete_record(&info).await;
                }
                this.notified.lock().remove(&info.instance_id);
            });
        }
    }
}

/// Delay before a fatal record is garbage collected.
const FATAL_RECORD_GRACE_SEC: u64 = 5;

fn jittered(base_ms: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 2 + 1);
    Duration::from_millis(base_ms + jitter)
}
