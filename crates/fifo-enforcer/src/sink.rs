// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::error::Interrupted;
use crate::options::FifoSinkOptions;
use crate::source::SourceState;
use crate::timestamp::{StateTimestamp, TransitionTimestamp};
use crate::token::{ReadToken, WriteToken};

const MAX_REPEAT_DURATION: Duration = const { Duration::from_secs(30) };

type WaiterId = u64;

#[derive(Debug, Clone, Copy)]
enum WaitKey {
    Read {
        timestamp: StateTimestamp,
        id: WaiterId,
    },
    Write {
        transition: TransitionTimestamp,
        id: WaiterId,
    },
}

impl fmt::Display for WaitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitKey::Read { timestamp, .. } => write!(f, "read@{timestamp}"),
            WaitKey::Write { transition, .. } => write!(f, "write@{transition}"),
        }
    }
}

#[derive(Debug)]
struct WaitingWriter {
    id: WaiterId,
    num_preceding_reads: u64,
    tx: oneshot::Sender<()>,
}

#[derive(Debug)]
struct SinkState {
    timestamp: StateTimestamp,
    /// Reads admitted at `timestamp`, released or not.
    num_reads: u64,
    reads_in_flight: u64,
    write_in_flight: bool,
    next_waiter_id: WaiterId,
    waiting_readers: BTreeMap<StateTimestamp, HashMap<WaiterId, oneshot::Sender<()>>>,
    waiting_writers: BTreeMap<TransitionTimestamp, WaitingWriter>,
}

impl SinkState {
    fn new(init: SourceState) -> Self {
        Self {
            timestamp: init.timestamp,
            num_reads: init.num_reads,
            reads_in_flight: 0,
            write_in_flight: false,
            next_waiter_id: 0,
            waiting_readers: BTreeMap::new(),
            waiting_writers: BTreeMap::new(),
        }
    }

    fn can_admit_read(&self, token: &ReadToken) -> bool {
        assert!(
            token.timestamp >= self.timestamp,
            "{token:?} arrived after its window closed, sink is at {}",
            self.timestamp
        );
        if token.timestamp > self.timestamp {
            return false;
        }
        assert!(
            !self.write_in_flight,
            "{token:?} arrived while the write closing its window is admitted"
        );
        true
    }

    fn can_admit_write(&self, token: &WriteToken) -> bool {
        let origin = token.timestamp.before();
        assert!(
            origin >= self.timestamp,
            "{token:?} arrived after its window closed, sink is at {}",
            self.timestamp
        );
        if origin > self.timestamp {
            return false;
        }
        assert!(
            !self.write_in_flight,
            "{token:?} arrived while a write for the same transition is admitted"
        );
        assert!(
            token.num_preceding_reads >= self.num_reads,
            "{token:?} expects fewer reads than the {} already admitted at {}",
            self.num_reads,
            self.timestamp
        );
        token.num_preceding_reads == self.num_reads && self.reads_in_flight == 0
    }

    fn admit_read(&mut self) {
        self.num_reads += 1;
        self.reads_in_flight += 1;
    }

    fn admit_write(&mut self) {
        self.write_in_flight = true;
    }

    fn next_waiter_id(&mut self) -> WaiterId {
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        id
    }

    fn register_read(&mut self, token: &ReadToken) -> (WaitKey, oneshot::Receiver<()>) {
        let id = self.next_waiter_id();
        let (tx, rx) = oneshot::channel();
        self.waiting_readers
            .entry(token.timestamp)
            .or_default()
            .insert(id, tx);
        (
            WaitKey::Read {
                timestamp: token.timestamp,
                id,
            },
            rx,
        )
    }

    fn register_write(&mut self, token: &WriteToken) -> (WaitKey, oneshot::Receiver<()>) {
        let id = self.next_waiter_id();
        let (tx, rx) = oneshot::channel();
        match self.waiting_writers.entry(token.timestamp) {
            Entry::Vacant(entry) => {
                entry.insert(WaitingWriter {
                    id,
                    num_preceding_reads: token.num_preceding_reads,
                    tx,
                });
            }
            Entry::Occupied(_) => {
                panic!("{token:?} is already waiting for admission");
            }
        }
        (
            WaitKey::Write {
                transition: token.timestamp,
                id,
            },
            rx,
        )
    }

    /// Removes a wait entry. Returns false if the entry is gone, meaning that a
    /// pump has admitted the waiter already.
    fn remove_waiter(&mut self, key: WaitKey) -> bool {
        match key {
            WaitKey::Read { timestamp, id } => {
                let Some(bucket) = self.waiting_readers.get_mut(&timestamp) else {
                    return false;
                };
                let removed = bucket.remove(&id).is_some();
                if bucket.is_empty() {
                    self.waiting_readers.remove(&timestamp);
                }
                removed
            }
            WaitKey::Write { transition, id } => match self.waiting_writers.entry(transition) {
                Entry::Occupied(entry) if entry.get().id == id => {
                    entry.remove();
                    true
                }
                _ => false,
            },
        }
    }

    fn release(&mut self, key: WaitKey) {
        match key {
            WaitKey::Read { .. } => self.release_read(),
            WaitKey::Write { .. } => self.release_write(),
        }
    }

    fn release_read(&mut self) {
        debug_assert!(self.reads_in_flight > 0);
        self.reads_in_flight -= 1;
        self.pump_writers();
    }

    fn release_write(&mut self) {
        debug_assert!(self.write_in_flight);
        self.write_in_flight = false;
        self.timestamp = self.timestamp.next();
        self.num_reads = 0;
        self.pump_writers();
        self.pump_readers();
    }

    fn pump_writers(&mut self) {
        if self.write_in_flight || self.reads_in_flight > 0 {
            return;
        }
        let Entry::Occupied(entry) = self
            .waiting_writers
            .entry(TransitionTimestamp::starting_from(self.timestamp))
        else {
            return;
        };
        let num_preceding_reads = entry.get().num_preceding_reads;
        // a second panic while a permit is dropped during unwinding would abort
        assert!(
            num_preceding_reads >= self.num_reads || std::thread::panicking(),
            "write@{} expects {num_preceding_reads} preceding reads but {} were admitted",
            entry.key(),
            self.num_reads
        );
        if num_preceding_reads == self.num_reads {
            let (transition, writer) = entry.remove_entry();
            self.admit_write();
            trace!(%transition, "Waking write");
            // a dropped receiver is handled by its waiter, which finds the entry gone
            let _ = writer.tx.send(());
        }
    }

    fn pump_readers(&mut self) {
        if self.write_in_flight {
            // only a replayed token stream gets here; leave the reads to their waiters
            let num_waiting = self.waiting_readers.get(&self.timestamp).map_or(0, HashMap::len);
            assert!(
                num_waiting == 0 || std::thread::panicking(),
                "{num_waiting} reads waiting at {} although the write leaving it is admitted",
                self.timestamp
            );
            return;
        }
        let Some(waiters) = self.waiting_readers.remove(&self.timestamp) else {
            return;
        };
        trace!(timestamp = %self.timestamp, count = waiters.len(), "Waking reads");
        for (_, tx) in waiters {
            self.admit_read();
            let _ = tx.send(());
        }
    }

    fn num_waiting_readers(&self) -> usize {
        self.waiting_readers.values().map(HashMap::len).sum()
    }
}

/// The admitting checkpoint.
///
/// Tokens presented to the sink are let through in the order their
/// [`FifoSource`](crate::FifoSource) issued them. Admission is represented by
/// a permit; later tokens are held back until the permit is dropped, so the
/// work done while holding it is part of the order.
///
/// If the cancellation token passed to [`acquire_read`](Self::acquire_read) or
/// [`acquire_write`](Self::acquire_write) fires before the token is admitted,
/// [`Interrupted`] is returned and the sink is left as if the token never
/// arrived. Dropping the acquisition future has the same effect.
///
/// Dropping a sink while tokens are waiting for admission panics.
#[derive(Debug)]
pub struct FifoSink {
    state: Mutex<SinkState>,
    options: FifoSinkOptions,
}

impl Default for FifoSink {
    fn default() -> Self {
        Self::new()
    }
}

impl FifoSink {
    pub fn new() -> Self {
        Self::with_options(FifoSinkOptions::default())
    }

    pub fn with_options(options: FifoSinkOptions) -> Self {
        Self::from_source_state_with_options(SourceState::default(), options)
    }

    /// Creates a sink that skips every token issued before `init` was taken.
    pub fn from_source_state(init: SourceState) -> Self {
        Self::from_source_state_with_options(init, FifoSinkOptions::default())
    }

    pub fn from_source_state_with_options(init: SourceState, options: FifoSinkOptions) -> Self {
        if init != SourceState::default() {
            info!(
                timestamp = %init.timestamp,
                num_reads = init.num_reads,
                "Creating fifo sink from source state"
            );
        }
        Self {
            state: Mutex::new(SinkState::new(init)),
            options,
        }
    }

    pub fn current_timestamp(&self) -> StateTimestamp {
        self.state.lock().timestamp
    }

    pub fn num_waiting_readers(&self) -> usize {
        self.state.lock().num_waiting_readers()
    }

    pub fn num_waiting_writers(&self) -> usize {
        self.state.lock().waiting_writers.len()
    }

    /// Waits until `token` may pass.
    ///
    /// A token that is admissible right away is admitted even if `cancel` has
    /// already fired.
    ///
    /// # Panics
    ///
    /// If the token's window has closed already, i.e. the write following it
    /// has been admitted.
    pub async fn acquire_read(
        &self,
        token: ReadToken,
        cancel: &CancellationToken,
    ) -> Result<ReadPermit<'_>, Interrupted> {
        let (key, rx) = {
            let mut state = self.state.lock();
            if state.can_admit_read(&token) {
                state.admit_read();
                trace!(timestamp = %token.timestamp, "Read admitted");
                return Ok(ReadPermit { sink: self, token });
            }
            state.register_read(&token)
        };
        trace!(timestamp = %token.timestamp, "Read waiting for admission");

        Waiter::new(self, key).wait(rx, cancel).await?;
        trace!(timestamp = %token.timestamp, "Read admitted");
        Ok(ReadPermit { sink: self, token })
    }

    /// Waits until `token` may pass.
    ///
    /// A token that is admissible right away is admitted even if `cancel` has
    /// already fired.
    ///
    /// # Panics
    ///
    /// If a write for the same or a later transition has been admitted
    /// already, or if more reads than `token` expects were admitted at its
    /// origin.
    pub async fn acquire_write(
        &self,
        token: WriteToken,
        cancel: &CancellationToken,
    ) -> Result<WritePermit<'_>, Interrupted> {
        let (key, rx) = {
            let mut state = self.state.lock();
            if state.can_admit_write(&token) {
                state.admit_write();
                trace!(transition = %token.timestamp, "Write admitted");
                return Ok(WritePermit { sink: self, token });
            }
            state.register_write(&token)
        };
        trace!(
            transition = %token.timestamp,
            num_preceding_reads = token.num_preceding_reads,
            "Write waiting for admission"
        );

        Waiter::new(self, key).wait(rx, cancel).await?;
        trace!(transition = %token.timestamp, "Write admitted");
        Ok(WritePermit { sink: self, token })
    }
}

impl Drop for FifoSink {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let state = self.state.get_mut();
        assert!(
            state.waiting_readers.is_empty() && state.waiting_writers.is_empty(),
            "fifo sink dropped with {} reads and {} writes waiting for admission",
            state.num_waiting_readers(),
            state.waiting_writers.len()
        );
    }
}

/// A registered wait entry. Dropping it before the wait completes removes the
/// entry, or releases the admission if a pump got to it first.
struct Waiter<'a> {
    sink: &'a FifoSink,
    key: WaitKey,
    done: bool,
}

impl<'a> Waiter<'a> {
    fn new(sink: &'a FifoSink, key: WaitKey) -> Self {
        Self {
            sink,
            key,
            done: false,
        }
    }

    async fn wait(
        mut self,
        mut rx: oneshot::Receiver<()>,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        let started_at = Instant::now();
        let mut report_after = self.sink.options.slow_admission_threshold();

        loop {
            tokio::select! {
                biased;
                result = &mut rx => {
                    // senders are only dropped after being used to admit us
                    debug_assert!(result.is_ok());
                    self.done = true;
                    return Ok(());
                }
                _ = cancel.cancelled() => {
                    let mut state = self.sink.state.lock();
                    self.done = true;
                    if state.remove_waiter(self.key) {
                        debug!(key = %self.key, "Waiting for fifo admission was interrupted");
                        return Err(Interrupted);
                    }
                    debug!(key = %self.key, "Interrupted after fifo admission, ignoring");
                    return Ok(());
                }
                _ = sleep_for(report_after) => {
                    let timestamp = self.sink.current_timestamp();
                    warn!(
                        key = %self.key,
                        sink_timestamp = %timestamp,
                        "Still waiting for fifo admission after {:?}",
                        started_at.elapsed()
                    );
                    report_after = report_after.map(next_report_delay);
                }
            }
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let mut state = self.sink.state.lock();
        if !state.remove_waiter(self.key) {
            trace!(key = %self.key, "Releasing admission of dropped waiter");
            state.release(self.key);
        }
    }
}

/// Doubles the delay until the next slow admission report, clamped at 30 seconds.
fn next_report_delay(current: Duration) -> Duration {
    current
        .saturating_mul(2)
        .clamp(current, MAX_REPEAT_DURATION.max(current))
}

async fn sleep_for(duration: Option<Duration>) {
    match duration {
        Some(duration) => tokio::time::sleep(duration).await,
        None => std::future::pending().await,
    }
}

/// Admission of a [`ReadToken`]. Dropping it lets subsequent tokens proceed.
#[must_use = "dropping the permit releases the admission immediately"]
pub struct ReadPermit<'a> {
    sink: &'a FifoSink,
    token: ReadToken,
}

impl ReadPermit<'_> {
    pub fn token(&self) -> ReadToken {
        self.token
    }

    pub fn release(self) {}
}

impl fmt::Debug for ReadPermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadPermit").field(&self.token).finish()
    }
}

impl Drop for ReadPermit<'_> {
    fn drop(&mut self) {
        trace!(timestamp = %self.token.timestamp, "Read released");
        self.sink.state.lock().release_read();
    }
}

/// Admission of a [`WriteToken`]. Dropping it advances the sink past the
/// write's transition.
#[must_use = "dropping the permit releases the admission immediately"]
pub struct WritePermit<'a> {
    sink: &'a FifoSink,
    token: WriteToken,
}

impl WritePermit<'_> {
    pub fn token(&self) -> WriteToken {
        self.token
    }

    pub fn release(self) {}
}

impl fmt::Debug for WritePermit<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("WritePermit").field(&self.token).finish()
    }
}

impl Drop for WritePermit<'_> {
    fn drop(&mut self) {
        trace!(transition = %self.token.timestamp, "Write released");
        self.sink.state.lock().release_write();
    }
}
