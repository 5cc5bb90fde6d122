// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime health: heartbeat loops, sub-health flips, loss recovery.

use super::InstanceController;
use crate::machine::SaveOutcome;
use fm_core::{ErrCode, InstanceState, Signal};
use fm_wire::{HeartbeatRequest, KillRequest, ScheduleRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

impl InstanceController {
    /// Start (or restart) the heartbeat loop for a running instance.
    /// Cancel-then-reschedule keeps exactly one timer per instance.
    pub(crate) fn start_heartbeat(self: &Arc<Self>, instance_id: &str) {
        let token = CancellationToken::new();
        if let Some(previous) = self
            .heartbeats
            .lock()
            .insert(instance_id.to_string(), token.clone())
        {
            previous.cancel();
        }
        let this = self.clone();
        let instance_id = instance_id.to_string();
        let interval = Duration::from_millis(this.config.heartbeat_interval_ms);
        tokio::spawn(async move {
            let mut misses = 0u32;
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(interval) => {}
                }
                let Some(info) = this.view.get(&instance_id) else {
                    return;
                };
                if !matches!(info.state(), InstanceState::Running | InstanceState::SubHealth) {
                    return;
                }
                let probe = HeartbeatRequest {
                    instance_id: instance_id.clone(),
                    runtime_id: info.runtime_id.clone(),
                };
                // Timeout widens with each consecutive miss.
                let budget = Duration::from_millis(
                    this.config.runtime_heartbeat_timeout_ms * (misses as u64 + 1),
                );
                let beat = tokio::time::timeout(
                    budget,
                    this.runtime.heartbeat(&info.runtime_address, probe),
                )
                .await;
                match beat {
                    Ok(Ok(resp)) if resp.code.is_ok() => {
                        misses = 0;
                        this.apply_health_code(&instance_id, resp.health_code).await;
                    }
                    _ => {
                        misses += 1;
                        warn!(instance_id, misses, "runtime heartbeat missed");
                        if misses >= this.config.max_heartbeat_timeout_times {
                            this.heartbeats.lock().remove(&instance_id);
                            this.on_heartbeat_lost(&instance_id).await;
                            return;
                        }
                    }
                }
            }
        });
    }

    pub(crate) fn stop_heartbeat(&self, instance_id: &str) {
        if let Some(token) = self.heartbeats.lock().remove(instance_id) {
            token.cancel();
        }
    }

    /// Health-check code changes map RUNNING <-> SUB_HEALTH.
    async fn apply_health_code(self: &Arc<Self>, instance_id: &str, health_code: i32) {
        let Some(state) = self.view.state(instance_id) else {
            return;
        };
        let target = match (state, health_code) {
            (InstanceState::Running, code) if code != 0 => InstanceState::SubHealth,
            (InstanceState::SubHealth, 0) => InstanceState::Running,
            _ => return,
        };
        info!(instance_id, health_code, new_state = %target, "instance health changed");
        let code = if target == InstanceState::SubHealth {
            ErrCode::InstanceSubHealth
        } else {
            ErrCode::None
        };
        let result = self
            .view
            .transition(instance_id, target, move |i| {
                i.status.err_code = code;
            })
            .await;
        if let Err(e) = result {
            warn!(instance_id, error = %e, "health transition failed");
        }
    }

    /// Heartbeat exhausted its miss budget.
    pub(crate) async fn on_heartbeat_lost(self: &Arc<Self>, instance_id: &str) {
        let Some(info) = self.view.get(instance_id) else {
            return;
        };
        warn!(instance_id, runtime_id = info.runtime_id, "runtime heartbeat lost");
        self.runtime.close(instance_id).await;

        // A lost driver tears its whole job down.
        if info.is_driver() {
            info!(instance_id, job_id = info.job_id, "driver lost, shutting the job down");
            let kill = KillRequest::new(instance_id, Signal::ShutDownAll);
            let _ = self.kill(&info.parent_id, kill).await;
            return;
        }

        let exited = self
            .agent
            .query_exit_info(&info.function_agent_id, instance_id)
            .await;
        let runtime_gone = match exited {
            Ok(exit) => exit.runtime_gone,
            Err(e) => {
                warn!(instance_id, error = %e, "agent exit query failed, assuming runtime gone");
                true
            }
        };
        if runtime_gone && info.recoverable() {
            self.reschedule(instance_id).await;
        } else {
            self.make_fatal(instance_id, ErrCode::UserFunctionException, "runtime heartbeat lost")
                .await;
        }
    }

    /// Recover a failed instance: RUNNING/SUB_HEALTH -> FAILED ->
    /// SCHEDULING -> the dispatch loop. At most one reschedule runs per
    /// instance at a time.
    pub(crate) async fn reschedule(self: &Arc<Self>, instance_id: &str) {
        if !self.reschedules.lock().insert(instance_id.to_string()) {
            info!(instance_id, "reschedule already in flight");
            return;
        }
        let result = self.do_reschedule(instance_id).await;
        self.reschedules.lock().remove(instance_id);
        if let Err(e) = result {
            warn!(instance_id, error = e, "reschedule failed");
        }
    }

    async fn do_reschedule(self: &Arc<Self>, instance_id: &str) -> Result<(), String> {
        let failed = self
            .view
            .transition(instance_id, InstanceState::Failed, |i| {
                i.status.err_code = ErrCode::UserFunctionException;
                i.status.message = "runtime lost".to_string();
            })
            .await;
        match failed {
            Ok(SaveOutcome::Applied) | Ok(SaveOutcome::AlreadyApplied) => {}
            Ok(other) => return Err(format!("instance moved during failure: {other:?}")),
            Err(e) => return Err(e.to_string()),
        }
        if !self.consume_reschedule_budget(instance_id).await? {
            return Ok(()); // went fatal
        }
        let Some(info) = self.view.get(instance_id) else {
            return Err("instance left the control view".to_string());
        };
        let meta = self
            .fetch_meta(&info.function)
            .await?
            .ok_or_else(|| "function meta disappeared".to_string())?;
        let mut req = ScheduleRequest::new(info);
        req.rescheduled = true;
        let resp = self.dispatch_schedule(&mut req, &meta).await;
        info!(instance_id, code = %resp.code, "reschedule finished");
        Ok(())
    }
}
