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

use crate::timestamp::{StateTimestamp, TransitionTimestamp};

/// Issued by [`FifoSource::enter_read`](crate::FifoSource::enter_read).
///
/// Reads carrying the same timestamp may pass the sink in any order relative
/// to each other, but never overtake (or get overtaken by) a write.
#[derive(Clone, Copy, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ReadToken {
    pub(crate) timestamp: StateTimestamp,
}

impl ReadToken {
    pub(crate) const fn new(timestamp: StateTimestamp) -> Self {
        Self { timestamp }
    }

    pub fn timestamp(&self) -> StateTimestamp {
        self.timestamp
    }
}

impl fmt::Debug for ReadToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadToken").field(&self.timestamp.as_u64()).finish()
    }
}

/// Issued by [`FifoSource::enter_write`](crate::FifoSource::enter_write).
///
/// A write passes the sink only after every write with a smaller origin, and
/// after exactly `num_preceding_reads` reads issued at its origin.
#[derive(Clone, Copy, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
pub struct WriteToken {
    pub(crate) timestamp: TransitionTimestamp,
    pub(crate) num_preceding_reads: u64,
}

impl WriteToken {
    pub(crate) const fn new(timestamp: TransitionTimestamp, num_preceding_reads: u64) -> Self {
        Self {
            timestamp,
            num_preceding_reads,
        }
    }

    pub fn timestamp(&self) -> TransitionTimestamp {
        self.timestamp
    }

    pub fn num_preceding_reads(&self) -> u64 {
        self.num_preceding_reads
    }
}

impl fmt::Debug for WriteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteToken")
            .field("transition", &format_args!("{}", self.timestamp))
            .field("num_preceding_reads", &self.num_preceding_reads)
            .finish()
    }
}
