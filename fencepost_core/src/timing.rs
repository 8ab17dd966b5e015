// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-frame scheduling inputs and outcomes.
//!
//! This module defines the values that flow between the compositor and the
//! [`FrameTargeter`](crate::targeter::FrameTargeter):
//!
//! - [`BeginFrameArgs`]: what the scheduler knows when a frame starts
//! - [`CompositeResult`]: how the frame that just ended was composed
//! - [`FrameTime`]: when a past frame was expected versus when it landed
//! - [`FeatureFlags`]: per-display capabilities fixed at setup
//!
//! # Data flow
//!
//! 1. The scheduler wakes for a vsync and calls
//!    [`FrameTargeter::begin_frame`](crate::targeter::FrameTargeter::begin_frame)
//!    with [`BeginFrameArgs`] and the display's
//!    [`VsyncSource`](crate::backend::VsyncSource).
//! 2. The compositor reads the resulting
//!    [`FrameTarget`](crate::targeter::FrameTarget) to decide whether to
//!    compose now, back off, or hold the present until the earliest safe time.
//! 3. After handing the frame to the display it registers the present fence
//!    and closes the frame with a [`CompositeResult`].

use bitflags::bitflags;

use crate::time::{Duration, TimePoint};

/// Identifier of the vsync a frame targets. Increases monotonically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct VsyncId(pub i64);

impl VsyncId {
    /// Returns the id of the following vsync.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Inputs to [`FrameTargeter::begin_frame`](crate::targeter::FrameTargeter::begin_frame).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeginFrameArgs {
    /// When the frame actually began.
    pub frame_begin_time: TimePoint,
    /// The vsync this frame targets.
    pub vsync_id: VsyncId,
    /// The vsync time predicted when the frame was scheduled.
    pub expected_vsync_time: TimePoint,
    /// Budget for software composition.
    pub sf_work_duration: Duration,
    /// Minimum lead time the hardware composer needs before a present.
    pub hwc_min_work_duration: Duration,
    /// Artificial present delay, used to inject jank in tests.
    pub debug_present_time_delay: Option<TimePoint>,
}

bitflags! {
    /// Composition strategies used for a frame.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct CompositionCoverageFlags: u8 {
        /// Layers composed by the hardware composer.
        const HWC = 1 << 0;
        /// Layers composed on the GPU for display.
        const GPU = 1 << 1;
        /// Layers composed on the GPU into an overlay buffer.
        const GPU_OVERLAY = 1 << 2;
    }
}

/// Outcome of composing a frame, passed to
/// [`FrameTargeter::end_frame`](crate::targeter::FrameTargeter::end_frame).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct CompositeResult {
    /// Which strategies the frame used.
    pub composition_coverage: CompositionCoverageFlags,
}

bitflags! {
    /// Per-display capabilities, fixed when the targeter is created.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FeatureFlags: u8 {
        /// Apply present-fence backpressure even after GPU composition.
        const BACKPRESSURE_GPU_COMPOSITION = 1 << 0;
        /// The display accepts an expected present time, so no earliest
        /// present time needs to be computed.
        const EXPECTED_PRESENT_TIME = 1 << 1;
    }
}

/// When a past frame was expected to present and when its fence signalled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct FrameTime {
    /// Present fence signal time.
    pub signal_time: TimePoint,
    /// The present time that frame targeted.
    pub expected_present_time: TimePoint,
}

impl FrameTime {
    /// How late the frame landed. Negative if it was early.
    #[inline]
    #[must_use]
    pub fn lateness(&self) -> Duration {
        self.signal_time - self.expected_present_time
    }
}
