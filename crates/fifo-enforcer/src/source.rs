// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use parking_lot::Mutex;

use crate::timestamp::{StateTimestamp, TransitionTimestamp};
use crate::token::{ReadToken, WriteToken};

/// Snapshot of a [`FifoSource`].
///
/// Pass it to [`FifoSink::from_source_state`](crate::FifoSink::from_source_state)
/// to create a sink that skips every token the source has issued so far.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SourceState {
    pub(crate) timestamp: StateTimestamp,
    pub(crate) num_reads: u64,
}

impl SourceState {
    pub fn timestamp(&self) -> StateTimestamp {
        self.timestamp
    }

    /// Reads issued since the last write.
    pub fn num_reads(&self) -> u64 {
        self.num_reads
    }
}

/// The issuing checkpoint. Hands out tokens in the order callers pass
/// through it. None of its operations block.
#[derive(Debug, Default)]
pub struct FifoSource {
    state: Mutex<SourceState>,
}

impl FifoSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enters the FIFO for read.
    pub fn enter_read(&self) -> ReadToken {
        let mut state = self.state.lock();
        state.num_reads += 1;
        ReadToken::new(state.timestamp)
    }

    /// Enters the FIFO for write.
    pub fn enter_write(&self) -> WriteToken {
        let mut state = self.state.lock();
        let token = WriteToken::new(
            TransitionTimestamp::starting_from(state.timestamp),
            state.num_reads,
        );
        state.timestamp = state.timestamp.next();
        state.num_reads = 0;
        token
    }

    pub fn state(&self) -> SourceState {
        *self.state.lock()
    }
}
