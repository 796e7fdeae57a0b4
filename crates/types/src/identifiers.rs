// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Identifiers used across the controller.

use std::fmt;
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use uuid::Uuid;

/// Identifies a single invocation attempt of an action.
///
/// The id is the join key between the completion feed, the activation store and the
/// response header. Its string form is the 32 characters lowercase hex encoding of a
/// random uuid, e.g. `9e1c0a7b3f0e4d6a8c5b2d1e0f9a8b7c`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, SerializeDisplay, DeserializeFromStr,
)]
pub struct ActivationId(Uuid);

impl ActivationId {
    pub fn generate() -> Self {
        ActivationId(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        ActivationId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for ActivationId {
    fn from(value: Uuid) -> Self {
        ActivationId(value)
    }
}

impl fmt::Display for ActivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.simple(), f)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ActivationIdParseError {
    #[error("bad activation id length, expected 32 hex characters but got {0}")]
    Length(usize),
    #[error("bad activation id: {0}")]
    Uuid(#[from] uuid::Error),
}

impl FromStr for ActivationId {
    type Err = ActivationIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Only the simple (dash-less) form is accepted, so ids stay canonical.
        if s.len() != 32 {
            return Err(ActivationIdParseError::Length(s.len()));
        }
        Ok(ActivationId(Uuid::try_parse(s)?))
    }
}
