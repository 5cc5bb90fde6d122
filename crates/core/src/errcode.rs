// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level error codes.
//!
//! A closed enum reused across every RPC surface. The numeric values are
//! part of the wire contract and must stay stable across releases.

use serde::{Deserialize, Serialize};

/// Error code carried in every response and `CallResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "i32", into = "i32")]
pub enum ErrCode {
    #[default]
    None = 0,
    ParamInvalid = 1,
    InstanceNotFound = 2,
    InstanceExited = 3,
    InstanceDuplicated = 4,
    InstanceEvicted = 5,
    UserFunctionException = 6,
    RequestBetweenRuntimeBus = 7,
    InnerCommunication = 8,
    InnerSystemError = 9,
    EtcdOperationError = 10,
    ScheduleCanceled = 11,
    LocalSchedulerAbnormal = 12,
    FunctionMetaNotFound = 13,
    ResourceConfigError = 14,
    AuthorizeFailed = 15,
    CreateRateLimited = 16,
    InstanceSubHealth = 17,
    ResourceNotEnough = 18,
    AffinityFail = 19,
}

impl ErrCode {
    pub fn is_ok(self) -> bool {
        self == ErrCode::None
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl From<ErrCode> for i32 {
    fn from(code: ErrCode) -> i32 {
        code as i32
    }
}

impl TryFrom<i32> for ErrCode {
    type Error = String;

    fn try_from(v: i32) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => ErrCode::None,
            1 => ErrCode::ParamInvalid,
            2 => ErrCode::InstanceNotFound,
            3 => ErrCode::InstanceExited,
            4 => ErrCode::InstanceDuplicated,
            5 => ErrCode::InstanceEvicted,
            6 => ErrCode::UserFunctionException,
            7 => ErrCode::RequestBetweenRuntimeBus,
            8 => ErrCode::InnerCommunication,
            9 => ErrCode::InnerSystemError,
            10 => ErrCode::EtcdOperationError,
            11 => ErrCode::ScheduleCanceled,
            12 => ErrCode::LocalSchedulerAbnormal,
            13 => ErrCode::FunctionMetaNotFound,
            14 => ErrCode::ResourceConfigError,
            15 => ErrCode::AuthorizeFailed,
            16 => ErrCode::CreateRateLimited,
            17 => ErrCode::InstanceSubHealth,
            18 => ErrCode::ResourceNotEnough,
            19 => ErrCode::AffinityFail,
            other => return Err(format!("unknown error code {other}")),
        })
    }
}

crate::simple_display! {
    ErrCode {
        None => "ok",
        ParamInvalid => "parameter invalid",
        InstanceNotFound => "instance not found",
        InstanceExited => "instance exited",
        InstanceDuplicated => "instance duplicated",
        InstanceEvicted => "instance evicted",
        UserFunctionException => "user function exception",
        RequestBetweenRuntimeBus => "request between runtime and bus failed",
        InnerCommunication => "inner communication failed",
        InnerSystemError => "inner system error",
        EtcdOperationError => "meta store operation failed",
        ScheduleCanceled => "schedule canceled",
        LocalSchedulerAbnormal => "local scheduler abnormal",
        FunctionMetaNotFound => "function meta not found",
        ResourceConfigError => "resource config error",
        AuthorizeFailed => "authorize failed",
        CreateRateLimited => "create rate limited",
        InstanceSubHealth => "instance sub-health",
        ResourceNotEnough => "resource not enough",
        AffinityFail => "affinity not satisfied",
    }
}

#[cfg(test)]
#[path = "errcode_tests.rs"]
mod tests;
