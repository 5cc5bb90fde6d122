// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Master configuration.

/// Smallest sensible per-domain fan-out.
pub const MIN_SCHED_PER_DOMAIN: usize = 2;
/// Default leaf capacity of one domain.
pub const DEFAULT_LOCAL_PER_DOMAIN: usize = 4005;
/// Default sub-domain capacity of one domain.
pub const DEFAULT_DOMAIN_PER_DOMAIN: usize = 1000;

/// Tunables of the global scheduler. Flag parsing lives outside; whatever
/// front end exists builds one of these.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    /// Identity of this global scheduler process.
    pub node_id: String,
    pub max_local_per_domain: usize,
    pub max_domain_per_domain: usize,
    /// Interval of the heartbeat to the root domain.
    pub heartbeat_interval_ms: u64,
    /// Consecutive heartbeat misses before the root domain is broken.
    pub max_heartbeat_miss: u32,
    /// Retry cycle for schedule RPCs forwarded to a domain.
    pub schedule_retry_cycle_ms: u64,
    /// Timeout of one gang-schedule round trip.
    pub group_timeout_ms: u64,
    /// Interval between bundle re-schedule attempts.
    pub reschedule_interval_ms: u64,
    /// Bounded wait for the topology snapshot during recovery.
    pub recover_timeout_ms: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            node_id: "global-scheduler".to_string(),
            max_local_per_domain: DEFAULT_LOCAL_PER_DOMAIN,
            max_domain_per_domain: DEFAULT_DOMAIN_PER_DOMAIN,
            heartbeat_interval_ms: 3000,
            max_heartbeat_miss: 3,
            schedule_retry_cycle_ms: 10_000,
            group_timeout_ms: 10_000,
            reschedule_interval_ms: 3000,
            recover_timeout_ms: 5000,
        }
    }
}

impl MasterConfig {
    fm_core::setters! {
        into {
            node_id: String,
        }
        set {
            max_local_per_domain: usize,
            max_domain_per_domain: usize,
            heartbeat_interval_ms: u64,
            max_heartbeat_miss: u32,
            schedule_retry_cycle_ms: u64,
            group_timeout_ms: u64,
            reschedule_interval_ms: u64,
            recover_timeout_ms: u64,
        }
    }

    /// Fan-out limits below [`MIN_SCHED_PER_DOMAIN`] can't form a tree.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_local_per_domain < MIN_SCHED_PER_DOMAIN
            || self.max_domain_per_domain < MIN_SCHED_PER_DOMAIN
        {
            return Err(format!(
                "per-domain fan-out can't be less than {MIN_SCHED_PER_DOMAIN}"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(MasterConfig::default().validate().is_ok());
    }

    #[test]
    fn tiny_fanout_is_rejected() {
        let config = MasterConfig::default().max_local_per_domain(1);
        assert!(config.validate().is_err());
    }
}
