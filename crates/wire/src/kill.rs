// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kill, custom-signal, and call-result messages.

use fm_core::{ErrCode, Signal};
use serde::{Deserialize, Serialize};

/// Kill or signal one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillRequest {
    pub instance_id: String,
    pub signal: Signal,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payload: Vec<u8>,
    #[serde(default)]
    pub grace_period_sec: u32,
}

impl KillRequest {
    pub fn new(instance_id: impl Into<String>, signal: Signal) -> Self {
        Self {
            instance_id: instance_id.into(),
            signal,
            payload: Vec::new(),
            grace_period_sec: 0,
        }
    }
}

/// Reply to a kill/signal request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillResponse {
    pub instance_id: String,
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
}

impl KillResponse {
    pub fn new(instance_id: impl Into<String>, code: ErrCode, message: impl Into<String>) -> Self {
        Self { instance_id: instance_id.into(), code, message: message.into() }
    }

    pub fn ok(instance_id: impl Into<String>) -> Self {
        Self::new(instance_id, ErrCode::None, "")
    }
}

/// Result of an instance creation, delivered to the creator exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub instance_id: String,
    pub request_id: String,
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub exit_code: i32,
}

/// Acknowledgment of a delivered [`CallResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResultAck {
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
}

/// Custom (non-shutdown) signal forwarded to the local that owns the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardCustomSignalRequest {
    /// Instance that raised the signal.
    pub src_instance_id: String,
    pub kill: KillRequest,
}

/// Reply to a forwarded custom signal, correlated by (instance, signal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardCustomSignalResponse {
    pub instance_id: String,
    pub signal: Signal,
    pub code: ErrCode,
    #[serde(default)]
    pub message: String,
}

/// Call result forwarded to the creator's local scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardCallResultRequest {
    /// Instance that should receive the result.
    pub dst_instance_id: String,
    pub result: CallResult,
}

/// Reply to a forwarded call result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardCallResultResponse {
    pub request_id: String,
    pub ack: CallResultAck,
}
