// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Kill/notification signal vocabulary.
//!
//! Wire values are fixed integers. Values in `[USER_SIGNAL_MIN, USER_SIGNAL_MAX)`
//! are passed through to user code untouched; everything else out of range is a
//! parameter error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First wire value of the user-signal range.
pub const USER_SIGNAL_MIN: i32 = 64;
/// One past the last wire value of the user-signal range.
pub const USER_SIGNAL_MAX: i32 = 128;

/// A control-plane signal delivered through the kill path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Signal {
    /// Graceful shutdown of one instance.
    ShutDown,
    /// Shutdown that awaits exit completion before replying.
    ShutDownSync,
    /// Job-wide shutdown of every instance sharing the target's job id.
    ShutDownAll,
    /// Shutdown of every instance in the target's group.
    ShutDownGroup,
    /// Terminal-state propagation to peers in the same group.
    GroupExit,
    /// Terminal-state propagation to peers in the same family.
    FamilyExit,
    /// Stop an application driver.
    AppStop,
    /// Tear down a resource group.
    RemoveResourceGroup,
    Subscribe,
    Notify,
    Unsubscribe,
    /// User-defined signal in `[64, 128)`.
    User(i32),
}

/// Signal wire value was outside every known range.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("signal value {0} out of range")]
pub struct SignalError(pub i32);

impl Signal {
    pub fn as_i32(self) -> i32 {
        match self {
            Signal::ShutDown => 0,
            Signal::ShutDownSync => 1,
            Signal::ShutDownAll => 2,
            Signal::ShutDownGroup => 3,
            Signal::GroupExit => 4,
            Signal::FamilyExit => 5,
            Signal::AppStop => 6,
            Signal::RemoveResourceGroup => 7,
            Signal::Subscribe => 8,
            Signal::Notify => 9,
            Signal::Unsubscribe => 10,
            Signal::User(v) => v,
        }
    }

    /// True for the signals that terminate an instance.
    pub fn is_shutdown(self) -> bool {
        matches!(
            self,
            Signal::ShutDown | Signal::ShutDownSync | Signal::ShutDownAll | Signal::ShutDownGroup
        )
    }
}

impl From<Signal> for i32 {
    fn from(s: Signal) -> i32 {
        s.as_i32()
    }
}

impl TryFrom<i32> for Signal {
    type Error = SignalError;

    fn try_from(v: i32) -> Result<Self, SignalError> {
        Ok(match v {
            0 => Signal::ShutDown,
            1 => Signal::ShutDownSync,
            2 => Signal::ShutDownAll,
            3 => Signal::ShutDownGroup,
            4 => Signal::GroupExit,
            5 => Signal::FamilyExit,
            6 => Signal::AppStop,
            7 => Signal::RemoveResourceGroup,
            8 => Signal::Subscribe,
            9 => Signal::Notify,
            10 => Signal::Unsubscribe,
            v if (USER_SIGNAL_MIN..USER_SIGNAL_MAX).contains(&v) => Signal::User(v),
            other => return Err(SignalError(other)),
        })
    }
}

crate::simple_display! {
    Signal {
        ShutDown => "shutdown",
        ShutDownSync => "shutdown-sync",
        ShutDownAll => "shutdown-all",
        ShutDownGroup => "shutdown-group",
        GroupExit => "group-exit",
        FamilyExit => "family-exit",
        AppStop => "app-stop",
        RemoveResourceGroup => "remove-resource-group",
        Subscribe => "subscribe",
        Notify => "notify",
        Unsubscribe => "unsubscribe",
        User(..) => "user",
    }
}

#[cfg(test)]
#[path = "signal_tests.rs"]
mod tests;
