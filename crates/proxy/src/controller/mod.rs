// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The instance controller: dispatch pipeline, runtime health, and exits.
//!
//! One controller runs per local scheduler. Callers invoke its async
//! methods concurrently; shared maps sit behind short-lived locks that are
//! never held across awaits. The per-instance state machines serialize
//! their own saves.

mod deploy;
mod dispatch;
mod exit;
mod health;
mod signal;

#[cfg(test)]
#[path = "controller_tests.rs"]
mod tests;

use crate::clients::{
    CreatorSink, FunctionAgentClient, PeerProxy, RuntimeClient, UpstreamScheduler,
};
use crate::config::InstanceCtrlConfig;
use crate::decision::ScheduleDecision;
use crate::machine::{InstanceControlView, SaveOutcome};
use crate::meta::FunctionMetaStore;
use crate::rate_limit::TenantRateLimiter;
use crate::validate::check_schedule_request;
use fm_core::{ErrCode, InstanceState, SystemClock, RESERVED_TENANT_LABEL};
use fm_store::MetaStore;
use fm_wire::{
    ForwardCustomSignalResponse, FunctionMeta, RequestSync, ScheduleRequest, ScheduleResponse,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Interval of the idle-limiter sweep.
const RATE_LIMITER_SWEEP_INTERVAL_MS: u64 = 60 * 60 * 1000;

/// External collaborators the controller talks to.
pub struct ControllerDeps {
    pub store: Arc<dyn MetaStore>,
    pub meta: Arc<dyn FunctionMetaStore>,
    pub agent: Arc<dyn FunctionAgentClient>,
    pub runtime: Arc<dyn RuntimeClient>,
    pub decision: Arc<dyn ScheduleDecision>,
    pub upstream: Arc<dyn UpstreamScheduler>,
    pub peers: Arc<dyn PeerProxy>,
    pub creator_sink: Arc<dyn CreatorSink>,
}

/// Instance controller of one local scheduler.
pub struct InstanceController {
    pub(crate) config: InstanceCtrlConfig,
    pub(crate) clock: SystemClock,
    pub(crate) view: InstanceControlView,
    pub(crate) meta: Arc<dyn FunctionMetaStore>,
    pub(crate) agent: Arc<dyn FunctionAgentClient>,
    pub(crate) runtime: Arc<dyn RuntimeClient>,
    pub(crate) decision: Arc<dyn ScheduleDecision>,
    pub(crate) upstream: Arc<dyn UpstreamScheduler>,
    pub(crate) peers: Arc<dyn PeerProxy>,
    pub(crate) creator_sink: Arc<dyn CreatorSink>,
    pub(crate) store: Arc<dyn MetaStore>,
    pub(crate) meta_cache: Mutex<HashMap<String, FunctionMeta>>,
    pub(crate) limiter: Mutex<TenantRateLimiter>,
    /// request id -> waiters subscribed to the first caller's outcome.
    pub(crate) inflight: Mutex<HashMap<String, Vec<oneshot::Sender<ScheduleResponse>>>>,
    /// instance id -> heartbeat loop cancel (cancel-then-reschedule).
    pub(crate) heartbeats: Mutex<HashMap<String, CancellationToken>>,
    /// instances with a reschedule in flight (at most one each).
    pub(crate) reschedules: Mutex<HashSet<String>>,
    /// creators already notified; later results are logged only.
    pub(crate) notified: Mutex<HashSet<String>>,
    /// correlation map for forwarded custom signals.
    pub(crate) signal_sync: Mutex<RequestSync<ForwardCustomSignalResponse>>,
    pub(crate) abnormal: AtomicBool,
}

impl InstanceController {
    pub fn new(config: InstanceCtrlConfig, deps: ControllerDeps) -> Arc<Self> {
        let view = InstanceControlView::new(config.node_id.clone(), deps.store.clone());
        let limiter = TenantRateLimiter::new(config.rate_limit_capacity);
        let signal_sync =
            RequestSync::new(Duration::from_millis(config.max_forward_kill_retry_cycle_ms));
        let controller = Arc::new(Self {
            config,
            clock: SystemClock,
            view,
            meta: deps.meta,
            agent: deps.agent,
            runtime: deps.runtime,
            decision: deps.decision,
            upstream: deps.upstream,
            peers: deps.peers,
            creator_sink: deps.creator_sink,
            store: deps.store,
            meta_cache: Mutex::new(HashMap::new()),
            limiter: Mutex::new(limiter),
            inflight: Mutex::new(HashMap::new()),
            heartbeats: Mutex::new(HashMap::new()),
            reschedules: Mutex::new(HashSet::new()),
            notified: Mutex::new(HashSet::new()),
            signal_sync: Mutex::new(signal_sync),
            abnormal: AtomicBool::new(false),
        });
        // Periodic limiter sweep; stops when the controller is dropped.
        let weak = Arc::downgrade(&controller);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(RATE_LIMITER_SWEEP_INTERVAL_MS)).await;
                let Some(controller) = weak.upgrade() else { return };
                controller.sweep_rate_limiters();
            }
        });
        controller
    }

    pub fn view(&self) -> &InstanceControlView {
        &self.view
    }

    /// Mark this local abnormal; every new schedule request is refused.
    pub fn set_abnormal(&self, abnormal: bool) {
        self.abnormal.store(abnormal, Ordering::SeqCst);
    }

    fn respond(req: &ScheduleRequest, code: ErrCode, message: impl Into<String>) -> ScheduleResponse {
        ScheduleResponse::new(req, code, message)
    }

    /// Drop per-tenant limiters idle beyond the configured window.
    pub fn sweep_rate_limiters(&self) {
        self.limiter.lock().sweep(&self.clock);
    }

    // ── Pipeline stages 1..6 ────────────────────────────────────────────

    /// Handle one schedule request end to end. Resolves when the instance
    /// is running (or failed terminally, was scheduled elsewhere, etc.).
    pub async fn schedule(self: &Arc<Self>, mut req: ScheduleRequest) -> ScheduleResponse {
        // Stage 1: admission.
        if self.abnormal.load(Ordering::SeqCst) {
            return Self::respond(&req, ErrCode::LocalSchedulerAbnormal, "local is already abnormal");
        }
        let incoming_state = req.instance.state();
        if incoming_state == InstanceState::New && !req.instance.parent_id.is_empty() {
            if let Some(InstanceState::Exiting) = self.view.state(&req.instance.parent_id) {
                warn!(
                    request_id = req.request_id,
                    parent = req.instance.parent_id,
                    "schedule request from an exiting instance"
                );
                return Self::respond(
                    &req,
                    ErrCode::InstanceExited,
                    "creation refused: the creating instance is exiting",
                );
            }
        }
        if incoming_state == InstanceState::New {
            if let Some(state) = self.view.state(&req.instance.instance_id) {
                let (code, message) = match state {
                    InstanceState::Exiting | InstanceState::Exited => {
                        (ErrCode::InstanceExited, "instance already exited")
                    }
                    InstanceState::Evicting | InstanceState::Evicted => {
                        (ErrCode::InstanceEvicted, "instance was evicted")
                    }
                    _ => (ErrCode::InstanceDuplicated, "instance already exists"),
                };
                return Self::respond(&req, code, message);
            }
        }
        // Deduplicate by request id: later callers wait on the first.
        let waiter = {
            let mut inflight = self.inflight.lock();
            match inflight.get_mut(&req.request_id) {
                Some(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                None => {
                    inflight.insert(req.request_id.clone(), Vec::new());
                    None
                }
            }
        };
        if let Some(rx) = waiter {
            info!(request_id = req.request_id, "schedule request already in flight, subscribing");
            return match rx.await {
                Ok(resp) => resp,
                Err(_) => Self::respond(&req, ErrCode::InnerSystemError, "in-flight request dropped"),
            };
        }

        let response = self.do_schedule(&mut req).await;

        // Resolve everyone who piled onto this request id.
        let waiters = self.inflight.lock().remove(&req.request_id).unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(response.clone());
        }
        response
    }

    async fn do_schedule(self: &Arc<Self>, req: &mut ScheduleRequest) -> ScheduleResponse {
        info!(
            request_id = req.request_id,
            instance_id = req.instance.instance_id,
            version = req.instance.version,
            "received a schedule request"
        );
        // Stage 2: meta fetch (cache on success).
        let meta = match self.fetch_meta(&req.instance.function).await {
            Ok(Some(meta)) => meta,
            Ok(None) => {
                warn!(function = req.instance.function, "function meta not found");
                return Self::respond(req, ErrCode::FunctionMetaNotFound, "failed to find function meta");
            }
            Err(e) => return Self::respond(req, ErrCode::InnerCommunication, e),
        };
        req.instance.is_system_func = meta.is_system_func;

        // Stage 3: validation.
        if let Err(e) = check_schedule_request(&req.instance, &self.config) {
            warn!(request_id = req.request_id, error = %e.message, "schedule request is invalid");
            return Self::respond(req, e.code, e.message);
        }

        // Stage 4: rate limit.
        let admitted = self.limiter.lock().admit(
            &req.instance.tenant_id,
            req.rescheduled,
            &self.clock,
        );
        if !admitted {
            warn!(request_id = req.request_id, tenant = req.instance.tenant_id, "create rate limited");
            return Self::respond(req, ErrCode::CreateRateLimited, "create rate limited on local");
        }

        if req.instance.job_id.is_empty() {
            req.instance.job_id = job_id_from_trace(&req.instance.trace_id);
        }

        // Stage 5: affinity augmentation.
        if self.config.enable_tenant_affinity
            && !req.instance.is_system_func
            && req.instance.schedule_option.policy != "monopoly"
        {
            apply_tenant_affinity(&mut req.instance);
        }

        // Stage 6: NEW -> SCHEDULING under this local's ownership. A
        // machine that already exists (domain re-dispatch back to us)
        // keeps its callbacks and cancel state.
        if !self.view.contains(&req.instance.instance_id) {
            let mut tracked = req.instance.clone();
            tracked.function_proxy_id = self.config.node_id.clone();
            if tracked.schedule_times == 0 {
                tracked.schedule_times = self.config.recover_retry_times;
            }
            self.view.insert(tracked);
        }
        let node_id = self.config.node_id.clone();
        match self
            .view
            .transition(&req.instance.instance_id, InstanceState::Scheduling, move |i| {
                i.function_proxy_id = node_id;
            })
            .await
        {
            Ok(SaveOutcome::Applied) | Ok(SaveOutcome::AlreadyApplied) => {}
            Ok(SaveOutcome::Relinquished { new_owner }) => {
                self.view.remove(&req.instance.instance_id);
                let mut resp = Self::respond(req, ErrCode::None, "scheduled elsewhere");
                resp.scheduled_on = new_owner;
                return resp;
            }
            Ok(SaveOutcome::RolledBack { store_state }) => {
                let advanced = matches!(
                    store_state,
                    InstanceState::Scheduling
                        | InstanceState::Creating
                        | InstanceState::Running
                        | InstanceState::SubHealth
                );
                return if advanced {
                    let mut resp = Self::respond(req, ErrCode::None, "already scheduled");
                    resp.scheduled_on = self.config.node_id.clone();
                    resp
                } else {
                    Self::respond(req, ErrCode::EtcdOperationError, "conflicting record in store")
                };
            }
            Err(e) => {
                self.view.remove(&req.instance.instance_id);
                return Self::respond(req, ErrCode::EtcdOperationError, e.to_string());
            }
        }

        // Stages 7..11 share the dispatch path with reschedules.
        self.dispatch_schedule(req, &meta).await
    }

    pub(crate) async fn fetch_meta(&self, function: &str) -> Result<Option<FunctionMeta>, String> {
        if let Some(meta) = self.meta_cache.lock().get(function) {
            return Ok(Some(meta.clone()));
        }
        match self.meta.fetch(function).await {
            Ok(Some(meta)) => {
                self.meta_cache.lock().insert(function.to_string(), meta.clone());
                Ok(Some(meta))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Job ids fall out of the trace id (`{job}-trace-{n}`) when the caller
/// didn't set one.
fn job_id_from_trace(trace_id: &str) -> String {
    match trace_id.split_once("-trace-") {
        Some((job, _)) if !job.is_empty() => job.to_string(),
        _ => String::new(),
    }
}

/// Stage 5 helper: tenant label plus prefer-same / require-not-other
/// tenant placement rules. Any caller-supplied tenant label is dropped
/// first so the control plane's is the only one.
fn apply_tenant_affinity(instance: &mut fm_core::InstanceInfo) {
    use fm_core::{LabelExpression, Selector};

    let tenant = instance.tenant_id.clone();
    instance
        .labels
        .retain(|l| l != RESERVED_TENANT_LABEL && !l.starts_with(&format!("{RESERVED_TENANT_LABEL}:")));
    instance.labels.push(format!("{RESERVED_TENANT_LABEL}:{tenant}"));

    let affinity = &mut instance.schedule_option.affinity;
    affinity.erase_key(RESERVED_TENANT_LABEL);

    let prefer_same = vec![LabelExpression::label_in(RESERVED_TENANT_LABEL, vec![tenant.clone()])];
    match &mut affinity.preferred {
        Some(selector) => selector.sub_conditions.push(fm_core::Condition {
            expressions: prefer_same,
            weight: fm_core::affinity::MAX_PRIORITY_SCORE,
        }),
        None => affinity.preferred = Some(Selector::new(true, vec![prefer_same])),
    }

    let not_other = vec![
        LabelExpression::label_not_in(RESERVED_TENANT_LABEL, vec![tenant]),
        LabelExpression::exists(RESERVED_TENANT_LABEL),
    ];
    match &mut affinity.required_anti {
        Some(selector) => selector.sub_conditions.push(fm_core::Condition {
            expressions: not_other,
            weight: fm_core::affinity::MAX_PRIORITY_SCORE,
        }),
        None => affinity.required_anti = Some(Selector::new(false, vec![not_other])),
    }
}
