// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Enforces that operations pass a checkpoint in the same order in which they
//! passed a previous one.
//!
//! Operations travelling between the two checkpoints are identified by
//! tokens. A [`FifoSource`] hands them out at the first checkpoint and a
//! [`FifoSink`] admits them at the second, regardless of the path, task or
//! connection each token took to get there.
//!
//! # Roles
//!
//! | Type | Role |
//! |------|------|
//! | [`FifoSource`] | Issues [`ReadToken`]s and [`WriteToken`]s. Never blocks. |
//! | [`FifoSink`] | Admits tokens in issue order. Waits until a token is next. |
//! | [`ReadPermit`] / [`WritePermit`] | Held while the admitted operation runs. Dropping it lets later tokens through. |
//!
//! # Semantics
//!
//! Writes pass the sink in exactly the order they were issued. Reads may be
//! reordered relative to each other, but never relative to writes: a read
//! issued between two writes passes after the first write's permit is
//! dropped, and before the second write is admitted.
//!
//! The source stamps every read with the number of writes issued before it,
//! and every write with the number of reads issued since the previous write.
//! That is all the sink needs to reconstruct the order without talking to
//! the source.
//!
//! If a sink is created after the source has already issued tokens, take a
//! snapshot with [`FifoSource::state`] and pass it to
//! [`FifoSink::from_source_state`]; the sink then expects the first token
//! issued after the snapshot.
//!
//! # Cancellation
//!
//! Every acquisition takes a [`CancellationToken`](tokio_util::sync::CancellationToken).
//! If it fires before the token is admitted, acquisition fails with
//! [`Interrupted`] and the sink is left as if the token never arrived, so the
//! same token can be presented again. Dropping the acquisition future is
//! equivalent.
//!
//! # Invariant violations
//!
//! Presenting a token whose place in the order has already passed, or
//! dropping a sink while tokens are still waiting, means the surrounding
//! system lost track of its operations. The sink panics instead of guessing.
//!
//! # Example
//!
//! ```
//! # async fn example() {
//! use restate_fifo_enforcer::{FifoSink, FifoSource};
//! use tokio_util::sync::CancellationToken;
//!
//! let source = FifoSource::new();
//! let sink = FifoSink::new();
//! let cancel = CancellationToken::new();
//!
//! let read = source.enter_read();
//! let write = source.enter_write();
//!
//! // The read is admitted first. The write waits until its permit is dropped.
//! let permit = sink.acquire_read(read, &cancel).await.unwrap();
//! drop(permit);
//!
//! let permit = sink.acquire_write(write, &cancel).await.unwrap();
//! drop(permit);
//! # }
//! ```

mod error;
mod options;
mod sink;
mod source;
mod timestamp;
mod token;

pub use error::Interrupted;
pub use options::{FifoSinkOptions, FifoSinkOptionsBuilder, FifoSinkOptionsBuilderError};
pub use sink::{FifoSink, ReadPermit, WritePermit};
pub use source::{FifoSource, SourceState};
pub use timestamp::{StateTimestamp, TransitionTimestamp};
pub use token::{ReadToken, WriteToken};
