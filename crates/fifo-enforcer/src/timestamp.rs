// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;

/// A position in the sequence of writes: the number of writes that passed
/// the checkpoint so far.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct StateTimestamp(u64);

impl StateTimestamp {
    pub const ZERO: StateTimestamp = StateTimestamp(0);

    #[inline]
    pub const fn zero() -> Self {
        Self::ZERO
    }

    /// The state reached after one more write.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Identifies the write that moves the sequence from [`before`](Self::before)
/// to [`after`](Self::after).
///
/// Transitions order by the state they originate from.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Hash,
    Ord,
    PartialOrd,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct TransitionTimestamp {
    before: StateTimestamp,
}

impl TransitionTimestamp {
    #[inline]
    pub const fn starting_from(before: StateTimestamp) -> Self {
        Self { before }
    }

    #[inline]
    pub const fn before(&self) -> StateTimestamp {
        self.before
    }

    #[inline]
    pub const fn after(&self) -> StateTimestamp {
        self.before.next()
    }
}

impl fmt::Display for TransitionTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.before, self.after())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_timestamps_advance_by_one() {
        let t0 = StateTimestamp::zero();
        assert_eq!(t0, StateTimestamp::from(0));
        assert_eq!(t0.next().as_u64(), 1);
        assert!(t0 < t0.next());
    }

    #[test]
    fn transitions_order_by_origin() {
        let t1 = TransitionTimestamp::starting_from(StateTimestamp::from(1));
        let t2 = TransitionTimestamp::starting_from(StateTimestamp::from(2));
        assert!(t1 < t2);
        assert_eq!(t1.after(), t2.before());
        assert_eq!(t1.to_string(), "1->2");
    }
}
