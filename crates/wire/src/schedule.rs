// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Instance schedule request/response messages.

use fm_core::{ErrCode, InstanceInfo};
use serde::{Deserialize, Serialize};

/// Request to create (schedule) one instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub request_id: String,
    #[serde(default)]
    pub trace_id: String,
    pub instance: InstanceInfo,
    /// Schedulers that have handled this request, first hop first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scheduler_chain: Vec<String>,
    /// Set when a failure-recovery reschedule re-enters the pipeline;
    /// bypasses rate limiting.
    #[serde(default)]
    pub rescheduled: bool,
}

impl ScheduleRequest {
    pub fn new(instance: InstanceInfo) -> Self {
        Self {
            request_id: instance.request_id.clone(),
            trace_id: instance.trace_id.clone(),
            instance,
            scheduler_chain: Vec::new(),
            rescheduled: false,
        }
    }

    /// True until any scheduler has claimed the request.
    pub fn is_first_hop(&self) -> bool {
        self.scheduler_chain.is_empty()
    }
}

/// Reply to a schedule request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleResponse {
    pub request_id: String,
    pub instance_id: String,
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
    /// Local scheduler the instance landed on, when known.
    #[serde(default)]
    pub scheduled_on: String,
}

impl ScheduleResponse {
    pub fn new(req: &ScheduleRequest, code: ErrCode, message: impl Into<String>) -> Self {
        Self {
            request_id: req.request_id.clone(),
            instance_id: req.instance.instance_id.clone(),
            code,
            message: message.into(),
            scheduled_on: String::new(),
        }
    }

    pub fn ok(req: &ScheduleRequest, scheduled_on: impl Into<String>) -> Self {
        Self {
            request_id: req.request_id.clone(),
            instance_id: req.instance.instance_id.clone(),
            code: ErrCode::None,
            message: String::new(),
            scheduled_on: scheduled_on.into(),
        }
    }
}
