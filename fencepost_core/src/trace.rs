// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostics for frame targeting and fence dependency tracking.
//!
//! This module provides a [`TraceSink`] trait with one method per event. All
//! method bodies default to no-ops, so implementing only the events you care
//! about is fine.
//!
//! Two producers feed sinks:
//!
//! - The frame loop, which snapshots each
//!   [`FrameTarget`](crate::targeter::FrameTarget) into a [`FrameTargetEvent`]
//!   and reports present fences and frame ends. The targeter itself does no
//!   I/O; callers forward events through a [`Tracer`].
//! - [`DependencyMonitor`](crate::dependency::DependencyMonitor), which owns a
//!   sink and reports fence registrations, clobbered blocks, resolutions, and
//!   ordering violations.
//!
//! [`LogSink`] forwards every event to the `log` facade and is the monitor's
//! default. [`NoopSink`] discards everything.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.

use crate::display::DisplayId;
use crate::fence::SignalTime;
use crate::targeter::FrameTarget;
use crate::time::TimePoint;
use crate::timing::{CompositionCoverageFlags, VsyncId};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which stage of a resource's usage cycle a fence belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FenceStage {
    /// The resource becomes usable.
    Ingress,
    /// One access of the resource completed.
    Access,
    /// The resource is released.
    Egress,
}

/// An ordering anomaly found when a dependency block resolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// An access completed after the resource was released.
    AccessAfterEgress,
    /// An access completed before the resource became usable.
    AccessBeforeIngress,
    /// An access fence resolved without a usable timestamp.
    InvalidAccess,
    /// The resource was released before it became usable.
    EgressBeforeIngress,
}

impl ViolationKind {
    /// Short human-readable description.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::AccessAfterEgress => "access completion after egress",
            Self::AccessBeforeIngress => "access completion prior to ingress",
            Self::InvalidAccess => "access completion with invalid signal time",
            Self::EgressBeforeIngress => "egress prior to ingress",
        }
    }

    /// Whether the anomaly means the resource was used unsafely.
    #[must_use]
    pub const fn is_unsafe_access(self) -> bool {
        matches!(self, Self::AccessAfterEgress | Self::AccessBeforeIngress)
    }
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Snapshot of a display's frame target, taken after `begin_frame`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTargetEvent {
    /// Which display.
    pub display: DisplayId,
    /// Targeted vsync.
    pub vsync_id: VsyncId,
    /// When the frame began.
    pub frame_begin_time: TimePoint,
    /// When the frame is expected to present.
    pub expected_present_time: TimePoint,
    /// Earliest safe present time, if one was computed.
    pub earliest_present_time: Option<TimePoint>,
    /// The inspected previous present fence was still pending.
    pub frame_pending: bool,
    /// The previous frame missed.
    pub frame_missed: bool,
    /// The previous frame missed while composed by the hardware composer.
    pub hwc_frame_missed: bool,
    /// The previous frame missed while composed on the GPU.
    pub gpu_frame_missed: bool,
    /// Composition should back off this vsync.
    pub would_backpressure_hwc: bool,
}

impl From<&FrameTarget> for FrameTargetEvent {
    fn from(target: &FrameTarget) -> Self {
        Self {
            display: target.display(),
            vsync_id: target.vsync_id(),
            frame_begin_time: target.frame_begin_time(),
            expected_present_time: target.expected_present_time(),
            earliest_present_time: target.earliest_present_time(),
            frame_pending: target.is_frame_pending(),
            frame_missed: target.did_miss_frame(),
            hwc_frame_missed: target.did_miss_hwc_frame(),
            gpu_frame_missed: target.did_miss_gpu_frame(),
            would_backpressure_hwc: target.would_backpressure_hwc(),
        }
    }
}

/// Emitted when a frame's present fence is registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentFenceEvent {
    /// Which display.
    pub display: DisplayId,
    /// Vsync the presented frame targeted.
    pub vsync_id: VsyncId,
    /// When the frame is expected to present.
    pub expected_present_time: TimePoint,
}

/// Emitted when a frame is closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameEndEvent {
    /// Which display.
    pub display: DisplayId,
    /// Vsync the frame targeted.
    pub vsync_id: VsyncId,
    /// How the frame was composed.
    pub coverage: CompositionCoverageFlags,
}

/// Emitted when a fence is attached to a dependency block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FenceAddedEvent<'a> {
    /// Label of the tracked resource.
    pub token: &'a str,
    /// Block the fence was attached to.
    pub block_id: i64,
    /// Which stage the fence marks.
    pub stage: FenceStage,
    /// Caller-supplied description.
    pub annotation: &'a str,
}

/// Emitted when a new cycle overwrites a block that had not resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClobberEvent<'a> {
    /// Label of the tracked resource.
    pub token: &'a str,
    /// The block being overwritten.
    pub block_id: i64,
}

/// Emitted when every fence of a block has resolved and it is validated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockResolvedEvent<'a> {
    /// Label of the tracked resource.
    pub token: &'a str,
    /// The validated block.
    pub block_id: i64,
    /// Ingress signal time.
    pub ingress: SignalTime,
    /// Egress signal time.
    pub egress: SignalTime,
    /// Number of access completions checked.
    pub access_count: usize,
}

/// Emitted for each ordering anomaly found in a resolved block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ViolationEvent<'a> {
    /// Label of the tracked resource.
    pub token: &'a str,
    /// The block the anomaly was found in.
    pub block_id: i64,
    /// What was found.
    pub kind: ViolationKind,
    /// Annotation of the offending fence.
    pub annotation: &'a str,
    /// Signal time of the offending fence.
    pub observed: SignalTime,
    /// Signal time it was compared against. [`SignalTime::Invalid`] for
    /// [`ViolationKind::InvalidAccess`].
    pub reference: SignalTime,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives diagnostic events.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called with a frame target snapshot after `begin_frame`.
    fn on_frame_target(&mut self, e: &FrameTargetEvent) {
        _ = e;
    }

    /// Called when a present fence is registered.
    fn on_present_fence(&mut self, e: &PresentFenceEvent) {
        _ = e;
    }

    /// Called when a frame ends.
    fn on_frame_end(&mut self, e: &FrameEndEvent) {
        _ = e;
    }

    /// Called when a fence is attached to a dependency block.
    fn on_fence_added(&mut self, e: &FenceAddedEvent<'_>) {
        _ = e;
    }

    /// Called when an unresolved dependency block is overwritten.
    fn on_clobber(&mut self, e: &ClobberEvent<'_>) {
        _ = e;
    }

    /// Called when a dependency block is validated.
    fn on_block_resolved(&mut self, e: &BlockResolvedEvent<'_>) {
        _ = e;
    }

    /// Called for each ordering anomaly.
    fn on_violation(&mut self, e: &ViolationEvent<'_>) {
        _ = e;
    }
}

impl<S: TraceSink + ?Sized> TraceSink for &mut S {
    fn on_frame_target(&mut self, e: &FrameTargetEvent) {
        (**self).on_frame_target(e);
    }

    fn on_present_fence(&mut self, e: &PresentFenceEvent) {
        (**self).on_present_fence(e);
    }

    fn on_frame_end(&mut self, e: &FrameEndEvent) {
        (**self).on_frame_end(e);
    }

    fn on_fence_added(&mut self, e: &FenceAddedEvent<'_>) {
        (**self).on_fence_added(e);
    }

    fn on_clobber(&mut self, e: &ClobberEvent<'_>) {
        (**self).on_clobber(e);
    }

    fn on_block_resolved(&mut self, e: &BlockResolvedEvent<'_>) {
        (**self).on_block_resolved(e);
    }

    fn on_violation(&mut self, e: &ViolationEvent<'_>) {
        (**self).on_violation(e);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that forwards events to the `log` facade.
///
/// Severity follows how actionable the event is: unsafe or invalid accesses
/// log at `info`, clobbered blocks and missed frames at `debug`, and routine
/// bookkeeping at `trace`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn on_frame_target(&mut self, e: &FrameTargetEvent) {
        if e.frame_missed {
            log::debug!(
                "display {}: frame before vsync {} missed (hwc: {}, gpu: {})",
                e.display,
                e.vsync_id.0,
                e.hwc_frame_missed,
                e.gpu_frame_missed,
            );
        }
        if e.would_backpressure_hwc {
            log::trace!(
                "display {}: backpressure for vsync {}",
                e.display,
                e.vsync_id.0
            );
        }
    }

    fn on_present_fence(&mut self, e: &PresentFenceEvent) {
        log::trace!(
            "display {}: present fence for vsync {} expected at {:?}",
            e.display,
            e.vsync_id.0,
            e.expected_present_time,
        );
    }

    fn on_frame_end(&mut self, e: &FrameEndEvent) {
        log::trace!(
            "display {}: frame for vsync {} ended with {:?}",
            e.display,
            e.vsync_id.0,
            e.coverage,
        );
    }

    fn on_fence_added(&mut self, e: &FenceAddedEvent<'_>) {
        log::trace!(
            "{}: block {} {:?} fence ({})",
            e.token,
            e.block_id,
            e.stage,
            e.annotation,
        );
    }

    fn on_clobber(&mut self, e: &ClobberEvent<'_>) {
        log::debug!(
            "{}: clobbering unresolved dependencies of block {}",
            e.token,
            e.block_id,
        );
    }

    fn on_block_resolved(&mut self, e: &BlockResolvedEvent<'_>) {
        log::trace!(
            "{}: block {} resolved ({} accesses)",
            e.token,
            e.block_id,
            e.access_count,
        );
    }

    fn on_violation(&mut self, e: &ViolationEvent<'_>) {
        match e.kind {
            ViolationKind::EgressBeforeIngress => log::trace!(
                "{}: block {}: {} ({:?} < {:?})",
                e.token,
                e.block_id,
                e.kind.describe(),
                e.observed,
                e.reference,
            ),
            ViolationKind::InvalidAccess => log::info!(
                "{}: block {}: {} ({})",
                e.token,
                e.block_id,
                e.kind.describe(),
                e.annotation,
            ),
            ViolationKind::AccessAfterEgress | ViolationKind::AccessBeforeIngress => log::info!(
                "{}: block {}: unsafe {} ({}: {:?} vs {:?})",
                e.token,
                e.block_id,
                e.kind.describe(),
                e.annotation,
                e.observed,
                e.reference,
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a snapshot of `target`.
    #[inline]
    pub fn frame_target(&mut self, target: &FrameTarget) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_target(&FrameTargetEvent::from(target));
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = target;
        }
    }

    /// Emits a [`PresentFenceEvent`].
    #[inline]
    pub fn present_fence(&mut self, e: &PresentFenceEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_present_fence(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FrameEndEvent`].
    #[inline]
    pub fn frame_end(&mut self, e: &FrameEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_frame_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
