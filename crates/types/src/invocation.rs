// Copyright (c) 2023 - 2025 Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Types describing an invocation request on its way to the execution path.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::ActivationId;

/// The action to invoke. By the time it reaches the controller core the action has
/// already been resolved and its parameters validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub namespace: String,
    pub name: String,
    /// Parameters passed to the action, a JSON object.
    #[serde(default = "empty_parameters")]
    pub parameters: Value,
}

fn empty_parameters() -> Value {
    Value::Object(Default::default())
}

impl ActionDescriptor {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            parameters: empty_parameters(),
        }
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Fully qualified name, `namespace/name`.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Invoking identity, as established by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: String,
    pub namespace: String,
}

impl Identity {
    pub fn new(subject: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            namespace: namespace.into(),
        }
    }
}

/// Request handed to the execution dispatcher.
///
/// The activation id is generated by the controller before dispatching, so that a
/// waiter can subscribe to the completion of the activation before the execution
/// path had any chance to complete it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivationRequest {
    pub activation_id: ActivationId,
    pub action: ActionDescriptor,
    pub identity: Identity,
    pub blocking: bool,
}

impl ActivationRequest {
    pub fn new(action: ActionDescriptor, identity: Identity, blocking: bool) -> Self {
        Self {
            activation_id: ActivationId::generate(),
            action,
            identity,
            blocking,
        }
    }
}
