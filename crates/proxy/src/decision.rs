// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The local scheduler-decision engine contract.
//!
//! Placement over the agents this local knows about. The full engine (score
//! plugins, preemption, heterogeneous devices) lives outside; the
//! controller only consumes its verdicts and keeps its resource view in
//! step with instance lifecycles.

use fm_core::InstanceInfo;

/// Verdict of one placement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionOutcome {
    /// Placed on a locally known agent.
    Success {
        agent_id: String,
        /// Heterogeneous device ids/addresses chosen for the instance,
        /// copied into its create options.
        device_options: Vec<(String, String)>,
    },
    /// No agent has room for the request.
    ResourceNotEnough,
    /// Agents have room but affinity rules exclude them all.
    AffinityFail,
    /// The engine itself failed.
    Error(String),
}

/// The decision engine plus its resource view.
pub trait ScheduleDecision: Send + Sync {
    fn decide(&self, instance: &InstanceInfo) -> DecisionOutcome;

    /// Release everything the view holds for an instance (exit/fatal).
    fn release(&self, instance_id: &str);
}
