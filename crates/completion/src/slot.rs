// Copyright (c) 2024 -  Nimbus developers.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use parking_lot::Mutex;

#[derive(Debug)]
enum SlotState<T> {
    Waiting,
    Resolved(T),
    Cancelled,
}

/// Single assignment cell shared by the completion sources of one wait.
///
/// Moves from waiting to either resolved or cancelled exactly once. The first
/// source calling [`ResolveSlot::try_resolve`] wins, any later value is handed
/// back to its caller.
#[derive(Debug)]
pub struct ResolveSlot<T> {
    state: Mutex<SlotState<T>>,
}

impl<T> Default for ResolveSlot<T> {
    fn default() -> Self {
        Self {
            state: Mutex::new(SlotState::Waiting),
        }
    }
}

impl<T> ResolveSlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_resolve(&self, value: T) -> Result<(), T> {
        let mut state = self.state.lock();
        match *state {
            SlotState::Waiting => {
                *state = SlotState::Resolved(value);
                Ok(())
            }
            SlotState::Resolved(_) | SlotState::Cancelled => Err(value),
        }
    }

    /// Returns true if this call moved the slot out of waiting.
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Waiting) {
            *state = SlotState::Cancelled;
            true
        } else {
            false
        }
    }

    pub fn is_waiting(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Waiting)
    }

    /// Takes the resolved value, leaving the slot cancelled.
    pub fn take(&self) -> Option<T> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Cancelled) {
            SlotState::Resolved(value) => Some(value),
            SlotState::Waiting | SlotState::Cancelled => None,
        }
    }
}
