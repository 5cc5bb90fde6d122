// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Schedule request validation.
//!
//! A pipeline of small checks, each returning early with the wire error
//! code the caller sees. No state is touched here.

use crate::config::InstanceCtrlConfig;
use fm_core::{
    validate_instance_id, ErrCode, HeteroResource, InstanceInfo, RESERVED_TENANT_LABEL,
};

/// Longest accepted tenant id.
const TENANT_ID_MAX_LENGTH: usize = 128;

/// A validation failure, carrying the wire code and a caller-facing reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub code: ErrCode,
    pub message: String,
}

impl ValidationError {
    fn new(code: ErrCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

/// Validate an incoming schedule request's instance record.
pub fn check_schedule_request(
    instance: &InstanceInfo,
    config: &InstanceCtrlConfig,
) -> Result<(), ValidationError> {
    check_instance_id(instance)?;
    check_resources(instance, config)?;
    check_hetero(&instance.resources.hetero)?;
    if !instance.is_system_func {
        check_tenant(instance)?;
    }
    Ok(())
}

fn check_instance_id(instance: &InstanceInfo) -> Result<(), ValidationError> {
    validate_instance_id(&instance.instance_id)
        .map_err(|e| ValidationError::new(ErrCode::ParamInvalid, e.to_string()))
}

fn check_resources(
    instance: &InstanceInfo,
    config: &InstanceCtrlConfig,
) -> Result<(), ValidationError> {
    let r = &instance.resources;
    if r.cpu_milli < config.min_cpu_milli || r.cpu_milli > config.max_cpu_milli {
        return Err(ValidationError::new(
            ErrCode::ResourceConfigError,
            format!(
                "cpu {} out of range [{}, {}]",
                r.cpu_milli, config.min_cpu_milli, config.max_cpu_milli
            ),
        ));
    }
    if r.memory_mb < config.min_memory_mb || r.memory_mb > config.max_memory_mb {
        return Err(ValidationError::new(
            ErrCode::ResourceConfigError,
            format!(
                "memory {} out of range [{}, {}]",
                r.memory_mb, config.min_memory_mb, config.max_memory_mb
            ),
        ));
    }
    Ok(())
}

/// A heterogeneous request names either a plain `count`, or exactly the
/// (memory, latency, stream) triple. Vendor/product patterns must be
/// valid regexes since agents match device inventories against them.
fn check_hetero(hetero: &[HeteroResource]) -> Result<(), ValidationError> {
    for h in hetero {
        let has_count = h.count.is_some();
        let triple = [h.memory_mb.is_some(), h.latency_us.is_some(), h.stream.is_some()];
        let full_triple = triple.iter().all(|p| *p);
        let any_triple = triple.iter().any(|p| *p);
        if has_count && any_triple {
            return Err(ValidationError::new(
                ErrCode::ResourceConfigError,
                "hetero resource takes count or (memory, latency, stream), not both",
            ));
        }
        if !has_count && !full_triple {
            return Err(ValidationError::new(
                ErrCode::ResourceConfigError,
                "hetero resource needs count or the full (memory, latency, stream) triple",
            ));
        }
        for pattern in [&h.vendor, &h.product] {
            if !pattern.is_empty() && regex::Regex::new(pattern).is_err() {
                return Err(ValidationError::new(
                    ErrCode::ResourceConfigError,
                    format!("invalid device pattern {pattern:?}"),
                ));
            }
        }
    }
    Ok(())
}

fn check_tenant(instance: &InstanceInfo) -> Result<(), ValidationError> {
    if instance.tenant_id.len() > TENANT_ID_MAX_LENGTH {
        return Err(ValidationError::new(ErrCode::ParamInvalid, "invalid tenant id length"));
    }
    if instance
        .labels
        .iter()
        .any(|l| l == RESERVED_TENANT_LABEL || l.starts_with(&format!("{RESERVED_TENANT_LABEL}:")))
    {
        return Err(ValidationError::new(
            ErrCode::ParamInvalid,
            format!("labels contain reserved key {RESERVED_TENANT_LABEL}"),
        ));
    }
    if instance.schedule_option.affinity.contains_key(RESERVED_TENANT_LABEL) {
        return Err(ValidationError::new(
            ErrCode::ParamInvalid,
            format!("affinity contains reserved key {RESERVED_TENANT_LABEL}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
