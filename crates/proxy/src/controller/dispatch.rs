// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule decision and the forward-up path.

use super::InstanceController;
use crate::decision::DecisionOutcome;
use crate::machine::SaveOutcome;
use fm_core::{ErrCode, InstanceState};
use fm_wire::{FunctionMeta, ScheduleRequest, ScheduleResponse};
use std::sync::Arc;
use tracing::{info, warn};

impl InstanceController {
    /// Stages 7..11: place the instance locally or forward it up the tree,
    /// then create it. A recoverable creation failure loops back here
    /// (FAILED -> SCHEDULING, one reschedule consumed) until the budget
    /// runs dry. Entered by fresh requests and by reschedules.
    pub(crate) async fn dispatch_schedule(
        self: &Arc<Self>,
        req: &mut ScheduleRequest,
        meta: &FunctionMeta,
    ) -> ScheduleResponse {
        let instance_id = req.instance.instance_id.clone();
        loop {
            let Some(current) = self.view.get(&instance_id) else {
                return Self::respond(req, ErrCode::InstanceNotFound, "instance left the control view");
            };
            match self.decision.decide(&current) {
                DecisionOutcome::Success { agent_id, device_options } => {
                    info!(instance_id, agent_id, "schedule decision placed the instance");
                    let chosen_agent = agent_id.clone();
                    let outcome = self
                        .view
                        .transition(&instance_id, InstanceState::Creating, move |i| {
                            i.function_agent_id = chosen_agent;
                            for (k, v) in device_options {
                                i.create_options.insert(k, v);
                            }
                        })
                        .await;
                    match outcome {
                        Ok(SaveOutcome::Applied) | Ok(SaveOutcome::AlreadyApplied) => {}
                        Ok(SaveOutcome::Relinquished { new_owner }) => {
                            self.view.remove(&instance_id);
                            let mut resp = Self::respond(req, ErrCode::None, "scheduled elsewhere");
                            resp.scheduled_on = new_owner;
                            return resp;
                        }
                        Ok(SaveOutcome::RolledBack { store_state }) => {
                            return Self::respond(
                                req,
                                ErrCode::EtcdOperationError,
                                format!("store diverged to {store_state}"),
                            )
                        }
                        Err(e) => {
                            return Self::respond(req, ErrCode::EtcdOperationError, e.to_string())
                        }
                    }
                    match self.create_instance(req, meta).await {
                        super::deploy::CreateOutcome::Done(resp) => return resp,
                        super::deploy::CreateOutcome::Recover => {
                            match self.consume_reschedule_budget(&instance_id).await {
                                Ok(true) => continue,
                                Ok(false) => {
                                    self.notify_creator(
                                        &req.instance,
                                        ErrCode::UserFunctionException,
                                        "reschedule budget exhausted",
                                    )
                                    .await;
                                    return Self::respond(
                                        req,
                                        ErrCode::UserFunctionException,
                                        "reschedule budget exhausted",
                                    );
                                }
                                Err(e) => {
                                    return Self::respond(req, ErrCode::EtcdOperationError, e)
                                }
                            }
                        }
                    }
                }
                DecisionOutcome::ResourceNotEnough | DecisionOutcome::AffinityFail
                    if req.is_first_hop() =>
                {
                    return self.forward_up(req).await;
                }
                DecisionOutcome::ResourceNotEnough => {
                    return Self::respond(req, ErrCode::ResourceNotEnough, "no agent has room");
                }
                DecisionOutcome::AffinityFail => {
                    return Self::respond(req, ErrCode::AffinityFail, "affinity excluded every agent");
                }
                DecisionOutcome::Error(e) => {
                    // Unexpected engine failure: stop claiming the instance.
                    warn!(instance_id, error = e, "schedule decision failed");
                    self.view.remove(&instance_id);
                    return Self::respond(req, ErrCode::InnerSystemError, e);
                }
            }
        }
    }

    /// FAILED -> SCHEDULING, consuming one reschedule. `Ok(false)` means
    /// the budget ran dry and the instance went FATAL.
    pub(crate) async fn consume_reschedule_budget(
        self: &Arc<Self>,
        instance_id: &str,
    ) -> Result<bool, String> {
        let Some(info) = self.view.get(instance_id) else {
            return Err("instance left the control view".to_string());
        };
        if !info.recoverable() {
            self.make_fatal(instance_id, info.status.err_code, "reschedule budget exhausted")
                .await;
            return Ok(false);
        }
        match self
            .view
            .transition(instance_id, InstanceState::Scheduling, |i| {
                i.schedule_times = i.schedule_times.saturating_sub(1);
                i.function_agent_id.clear();
            })
            .await
        {
            Ok(SaveOutcome::Applied) | Ok(SaveOutcome::AlreadyApplied) => Ok(true),
            Ok(other) => Err(format!("reschedule lost the record: {other:?}")),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Forward the request toward the root domain. Each retry bumps the
    /// record version (SCHEDULING -> SCHEDULING); exhaustion lands in
    /// SCHEDULE_FAILED and notifies the creator.
    async fn forward_up(self: &Arc<Self>, req: &mut ScheduleRequest) -> ScheduleResponse {
        let instance_id = req.instance.instance_id.clone();
        let cancel = self.view.cancel_token(&instance_id);
        req.scheduler_chain.push(self.config.node_id.clone());
        let mut forwarded = req.clone();
        forwarded.instance = match self.view.get(&instance_id) {
            Some(info) => info,
            None => {
                return Self::respond(req, ErrCode::InstanceNotFound, "instance left the control view")
            }
        };

        for attempt in 0..self.config.max_forward_schedule_retry_times {
            if cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Self::respond(req, ErrCode::ScheduleCanceled, "schedule canceled");
            }
            // Version bump marks another forward attempt in the store.
            match self
                .view
                .transition(&instance_id, InstanceState::Scheduling, |_| {})
                .await
            {
                Ok(SaveOutcome::Applied) | Ok(SaveOutcome::AlreadyApplied) => {}
                Ok(SaveOutcome::Relinquished { new_owner }) => {
                    self.view.remove(&instance_id);
                    let mut resp = Self::respond(req, ErrCode::None, "scheduled elsewhere");
                    resp.scheduled_on = new_owner;
                    return resp;
                }
                Ok(SaveOutcome::RolledBack { .. }) | Err(_) => {
                    return Self::respond(req, ErrCode::EtcdOperationError, "forward bump failed")
                }
            }
            forwarded.instance = match self.view.get(&instance_id) {
                Some(info) => info,
                None => {
                    return Self::respond(req, ErrCode::InstanceNotFound, "instance left the control view")
                }
            };
            info!(instance_id, attempt, "forwarding schedule request up the tree");
            match self.upstream.forward_schedule(forwarded.clone()).await {
                Ok(resp) if resp.code.is_ok() => {
                    // Another local took over; drop our cached machine.
                    self.view.remove(&instance_id);
                    let mut ours = resp;
                    if ours.message.is_empty() {
                        ours.message = "scheduled elsewhere".to_string();
                    }
                    return ours;
                }
                Ok(resp)
                    if matches!(
                        resp.code,
                        ErrCode::ResourceNotEnough | ErrCode::AffinityFail
                    ) =>
                {
                    warn!(instance_id, attempt, code = %resp.code, "forward attempt rejected");
                }
                Ok(resp) => {
                    warn!(instance_id, code = %resp.code, "forward failed terminally");
                    return self.fail_schedule(req, resp.code, &resp.message).await;
                }
                Err(e) => {
                    warn!(instance_id, attempt, error = %e, "forward transport failed");
                }
            }
        }
        self.fail_schedule(req, ErrCode::ResourceNotEnough, "forward retries exhausted").await
    }

    /// Forward exhaustion: SCHEDULING -> SCHEDULE_FAILED, creator notified
    /// with the failure code. The record stays until an explicit kill.
    pub(crate) async fn fail_schedule(
        self: &Arc<Self>,
        req: &ScheduleRequest,
        code: ErrCode,
        message: &str,
    ) -> ScheduleResponse {
        let instance_id = req.instance.instance_id.clone();
        let fail_code = code;
        let fail_message = message.to_string();
        let outcome = self
            .view
            .transition(&instance_id, InstanceState::ScheduleFailed, move |i| {
                i.status.err_code = fail_code;
                i.status.message = fail_message;
                // Schedule failed records no longer belong to anyone.
                i.function_proxy_id.clear();
            })
            .await;
        if let Err(e) = outcome {
            warn!(instance_id, error = %e, "failed to persist schedule failure");
        }
        self.notify_creator(&req.instance, code, message).await;
        Self::respond(req, code, message)
    }
}
