// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fence ordering diagnostics for a shared resource.
//!
//! A [`DependencyMonitor`] follows one resource through repeated usage
//! cycles. Each cycle is a *dependency block*:
//!
//! 1. a single ingress fence, fired when the resource becomes safe to use;
//! 2. any number of access-completion fences, fired as each use finishes;
//! 3. a single egress fence, fired when the resource is released to another
//!    system.
//!
//! Blocks are validated lazily. Each [`add_ingress`](DependencyMonitor::add_ingress)
//! first resolves earlier blocks whose fences have all signalled, then checks
//! the resolved blocks for accesses that completed before ingress or after
//! egress. Anomalies are reported to the monitor's [`TraceSink`]; nothing is
//! ever rejected or retried.
//!
//! The monitor only sees one side of the exchange. If the other system
//! ignores the egress fence and is slow to produce the next ingress, nothing
//! is reported; that system needs a monitor of its own. Conversely, unless the
//! fences fed in are themselves wrong, a report is never a false positive.
//!
//! At most [`DEPENDENCY_HISTORY`] blocks are retained. Starting a cycle while
//! the ring is full overwrites the oldest block, reporting a
//! [`ClobberEvent`] if that block had not resolved.

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::fence::{FenceTimePtr, SignalTime};
use crate::ring::RingBuffer;
use crate::trace::{
    BlockResolvedEvent, ClobberEvent, FenceAddedEvent, FenceStage, LogSink, TraceSink,
    ViolationEvent, ViolationKind,
};

/// Number of dependency blocks retained per monitor.
pub const DEPENDENCY_HISTORY: usize = 10;

/// Block ids are unique across every monitor in the process.
static NEXT_BLOCK_ID: AtomicI64 = AtomicI64::new(0);

#[derive(Debug, Default)]
struct AnnotatedFence {
    fence: FenceTimePtr,
    annotation: String,
}

#[derive(Debug)]
struct DependencyBlock {
    id: i64,
    ingress: AnnotatedFence,
    access_completions: Vec<AnnotatedFence>,
    egress: AnnotatedFence,
    validated: bool,
}

impl Default for DependencyBlock {
    fn default() -> Self {
        Self {
            id: -1,
            ingress: AnnotatedFence::default(),
            access_completions: Vec::new(),
            egress: AnnotatedFence::default(),
            validated: false,
        }
    }
}

impl DependencyBlock {
    fn reset(&mut self) {
        self.id = NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed);
        self.ingress = AnnotatedFence::default();
        self.access_completions.clear();
        self.egress = AnnotatedFence::default();
        self.validated = false;
    }

    /// Polls every fence in the block. Returns `true` once none is pending.
    fn update_signal_times(&self, exclude_ingress: bool) -> bool {
        if self.egress.fence.signal_time().is_pending() {
            return false;
        }
        if !exclude_ingress && self.ingress.fence.signal_time().is_pending() {
            return false;
        }
        self.access_completions
            .iter()
            .all(|access| !access.fence.signal_time().is_pending())
    }

    fn check_unsafe_access(&self, token: &str, sink: &mut dyn TraceSink) {
        let egress = self.egress.fence.cached_signal_time();
        let ingress = self.ingress.fence.cached_signal_time();

        sink.on_block_resolved(&BlockResolvedEvent {
            token,
            block_id: self.id,
            ingress,
            egress,
            access_count: self.access_completions.len(),
        });

        let violation = |kind, annotation, observed, reference| ViolationEvent {
            token,
            block_id: self.id,
            kind,
            annotation,
            observed,
            reference,
        };

        if let (Some(egress_time), Some(ingress_time)) = (egress.timestamp(), ingress.timestamp())
            && egress_time < ingress_time
        {
            sink.on_violation(&violation(
                ViolationKind::EgressBeforeIngress,
                self.egress.annotation.as_str(),
                egress,
                ingress,
            ));
        }

        for access in &self.access_completions {
            let completed = access.fence.cached_signal_time();
            let Some(completed_time) = completed.timestamp() else {
                sink.on_violation(&violation(
                    ViolationKind::InvalidAccess,
                    access.annotation.as_str(),
                    completed,
                    SignalTime::Invalid,
                ));
                continue;
            };

            if egress.timestamp().is_some_and(|t| completed_time > t) {
                sink.on_violation(&violation(
                    ViolationKind::AccessAfterEgress,
                    access.annotation.as_str(),
                    completed,
                    egress,
                ));
            }
            if ingress.timestamp().is_some_and(|t| completed_time < t) {
                sink.on_violation(&violation(
                    ViolationKind::AccessBeforeIngress,
                    access.annotation.as_str(),
                    completed,
                    ingress,
                ));
            }
        }
    }
}

struct State {
    token: String,
    blocks: RingBuffer<DependencyBlock, DEPENDENCY_HISTORY>,
    sink: Box<dyn TraceSink + Send>,
}

impl State {
    /// Validates blocks newest to oldest, stopping at the first one that
    /// still has a pending fence.
    fn resolve(&mut self) {
        for pos in (0..self.blocks.len()).rev() {
            let block = self.blocks.get(pos);
            if block.validated {
                continue;
            }
            if !block.update_signal_times(false) {
                break;
            }
            let block = self.blocks.get_mut(pos);
            block.validated = true;
            block.check_unsafe_access(&self.token, &mut *self.sink);
        }
    }

    fn fence_added(&mut self, block_id: i64, stage: FenceStage, annotation: &str) {
        self.sink.on_fence_added(&FenceAddedEvent {
            token: &self.token,
            block_id,
            stage,
            annotation,
        });
    }
}

/// Tracks the fences of one shared resource and reports ordering anomalies.
///
/// Every method takes an internal lock, so a monitor may be shared between
/// producer and consumer threads. No method blocks on a fence.
pub struct DependencyMonitor {
    state: Mutex<State>,
}

impl fmt::Debug for DependencyMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("DependencyMonitor")
            .field("token", &state.token)
            .field("blocks", &state.blocks.len())
            .finish_non_exhaustive()
    }
}

impl Default for DependencyMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyMonitor {
    /// Creates a monitor that reports through [`LogSink`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_sink(LogSink)
    }

    /// Creates a monitor that reports to `sink`.
    #[must_use]
    pub fn with_sink(sink: impl TraceSink + Send + 'static) -> Self {
        Self {
            state: Mutex::new(State {
                token: String::new(),
                blocks: RingBuffer::new(),
                sink: Box::new(sink),
            }),
        }
    }

    /// Names the tracked resource in reports.
    pub fn set_token(&self, token: impl Into<String>) {
        self.lock().token = token.into();
    }

    /// The tracked resource's name.
    #[must_use]
    pub fn token(&self) -> String {
        self.lock().token.clone()
    }

    /// Starts a new usage cycle gated on `fence`.
    ///
    /// Resolves completed cycles first. If the ring is full, the oldest cycle
    /// is overwritten.
    pub fn add_ingress(&self, fence: FenceTimePtr, annotation: impl Into<String>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        state.resolve();

        if state.blocks.is_full() {
            let oldest = state.blocks.front();
            if !oldest.update_signal_times(true) {
                state.sink.on_clobber(&ClobberEvent {
                    token: &state.token,
                    block_id: oldest.id,
                });
            }
        }

        let block = state.blocks.next();
        block.reset();
        block.ingress = AnnotatedFence {
            fence,
            annotation: annotation.into(),
        };
        let id = block.id;
        let annotation = block.ingress.annotation.clone();
        state.fence_added(id, FenceStage::Ingress, &annotation);
    }

    /// Records that one access of the resource completes with `fence`.
    ///
    /// Ignored before the first ingress.
    pub fn add_access_completion(&self, fence: FenceTimePtr, annotation: impl Into<String>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.blocks.is_empty() {
            return;
        }
        let annotation = annotation.into();
        let block = state.blocks.back_mut();
        let id = block.id;
        block.access_completions.push(AnnotatedFence {
            fence,
            annotation: annotation.clone(),
        });
        state.fence_added(id, FenceStage::Access, &annotation);
    }

    /// Records that the resource is released with `fence`, replacing any
    /// egress already set for the current cycle.
    ///
    /// Ignored before the first ingress.
    pub fn add_egress(&self, fence: FenceTimePtr, annotation: impl Into<String>) {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.blocks.is_empty() {
            return;
        }
        let annotation = annotation.into();
        let block = state.blocks.back_mut();
        let id = block.id;
        block.egress = AnnotatedFence {
            fence,
            annotation: annotation.clone(),
        };
        state.fence_added(id, FenceStage::Egress, &annotation);
    }

    /// Number of retained blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().blocks.len()
    }

    /// Returns `true` before the first ingress.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().blocks.is_empty()
    }

    /// Number of retained blocks that have been validated.
    #[must_use]
    pub fn validated_count(&self) -> usize {
        self.lock()
            .blocks
            .iter()
            .filter(|block| block.validated)
            .count()
    }

    /// Writes every retained block, oldest first, using cached signal times.
    pub fn dump(&self, out: &mut impl fmt::Write) -> fmt::Result {
        let state = self.lock();
        writeln!(
            out,
            "{}: {} of {} blocks",
            state.token,
            state.blocks.len(),
            DEPENDENCY_HISTORY
        )?;
        for block in state.blocks.iter() {
            writeln!(
                out,
                "  block {}{}",
                block.id,
                if block.validated { " (validated)" } else { "" }
            )?;
            writeln!(
                out,
                "    ingress {:?} <{}>",
                block.ingress.fence.cached_signal_time(),
                block.ingress.annotation
            )?;
            for access in &block.access_completions {
                writeln!(
                    out,
                    "    access {:?} <{}>",
                    access.fence.cached_signal_time(),
                    access.annotation
                )?;
            }
            writeln!(
                out,
                "    egress {:?} <{}>",
                block.egress.fence.cached_signal_time(),
                block.egress.annotation
            )?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Reports are diagnostic only; a panic elsewhere leaves them usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
