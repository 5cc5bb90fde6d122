// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Id generation and instance-id validation.
//!
//! Instance ids are opaque caller-supplied strings; the control plane only
//! rejects characters that could escape into shell or query contexts on the
//! worker side. Request and runtime ids are generated locally.

use thiserror::Error;

/// Characters an instance id must never contain.
const FORBIDDEN_ID_CHARS: &[char] = &['"', '\'', ';', '\\', '|', '&', '$', '>', '<', '`'];

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    if s.len() <= n {
        s
    } else {
        &s[..n]
    }
}

/// Instance id failed validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidInstanceId {
    #[error("instance id is empty")]
    Empty,
    #[error("instance id contains forbidden character {0:?}")]
    ForbiddenChar(char),
}

/// Validate a caller-supplied instance id.
pub fn validate_instance_id(id: &str) -> Result<(), InvalidInstanceId> {
    if id.is_empty() {
        return Err(InvalidInstanceId::Empty);
    }
    if let Some(c) = id.chars().find(|c| FORBIDDEN_ID_CHARS.contains(c)) {
        return Err(InvalidInstanceId::ForbiddenChar(c));
    }
    Ok(())
}

/// Generate a request id (`req-` + 19 random characters).
pub fn gen_request_id() -> String {
    format!("req-{}", nanoid::nanoid!(19))
}

/// Generate a runtime id (`rt-` + 19 random characters).
pub fn gen_runtime_id() -> String {
    format!("rt-{}", nanoid::nanoid!(19))
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
