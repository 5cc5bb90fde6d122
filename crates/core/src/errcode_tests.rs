// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn wire_values_are_stable() {
    assert_eq!(ErrCode::None.as_i32(), 0);
    assert_eq!(ErrCode::ParamInvalid.as_i32(), 1);
    assert_eq!(ErrCode::EtcdOperationError.as_i32(), 10);
    assert_eq!(ErrCode::ScheduleCanceled.as_i32(), 11);
    assert_eq!(ErrCode::InstanceSubHealth.as_i32(), 17);
}

#[test]
fn round_trip_through_i32() {
    for v in 0..=19 {
        let code = ErrCode::try_from(v).unwrap();
        assert_eq!(code.as_i32(), v);
    }
    assert!(ErrCode::try_from(99).is_err());
}

#[test]
fn serde_uses_wire_integers() {
    let json = serde_json::to_string(&ErrCode::InstanceExited).unwrap();
    assert_eq!(json, "3");
    let back: ErrCode = serde_json::from_str("3").unwrap();
    assert_eq!(back, ErrCode::InstanceExited);
}

#[test]
fn only_none_is_ok() {
    assert!(ErrCode::None.is_ok());
    assert!(!ErrCode::InnerSystemError.is_ok());
}
