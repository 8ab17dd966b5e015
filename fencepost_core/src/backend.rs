// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contract with the surrounding compositor.
//!
//! The core owns no clocks, threads, or platform handles. A compositor
//! integrating it provides the following pieces:
//!
//! - **Vsync source**: Implements [`VsyncSource`] to report the current
//!   vsync period, the minimum frame period across the refresh rates the
//!   display may switch between, and the next vsync deadline.
//!
//! - **Fences**: Implements [`Fence`](crate::fence::Fence) over its native
//!   sync primitive. Polling must never block.
//!
//! - **Composition result**: Reports which strategies composed each frame
//!   via [`CompositeResult`](crate::timing::CompositeResult).
//!
//! - **Diagnostics**: Optionally supplies a
//!   [`TraceSink`](crate::trace::TraceSink). Without one, dependency
//!   monitors log through the `log` facade.
//!
//! # Frame loop pseudocode
//!
//! ```rust,ignore
//! fn on_vsync(args: BeginFrameArgs) {
//!     targeter.begin_frame(&args, &vsync_source);
//!     let target = targeter.target();
//!
//!     if target.would_backpressure_hwc() {
//!         return; // try again next vsync
//!     }
//!
//!     let result = compose(target.expected_present_time(), target.earliest_present_time());
//!     let present_fence = display.present();
//!     targeter.set_present_fence(present_fence);
//!     targeter.end_frame(&result);
//! }
//! ```

use crate::time::{Period, TimePoint};

/// Supplies vsync timing for one display.
pub trait VsyncSource {
    /// The current vsync period.
    fn period(&self) -> Period;

    /// The shortest frame period the display may run at. Equal to
    /// [`period`](Self::period) unless the refresh rate varies.
    fn min_frame_period(&self) -> Period;

    /// The first vsync deadline after `time`.
    fn vsync_deadline_after(&self, time: TimePoint) -> TimePoint;
}

/// A [`VsyncSource`] with a fixed period, anchored at a known vsync.
///
/// Deadlines fall on `anchor + k * period` for integer `k`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedVsyncSource {
    /// The vsync period.
    pub period: Period,
    /// The minimum frame period.
    pub min_frame_period: Period,
    /// Any past or future vsync time.
    pub anchor: TimePoint,
}

impl FixedVsyncSource {
    /// Creates a source whose minimum frame period equals its period.
    #[must_use]
    pub const fn new(period: Period, anchor: TimePoint) -> Self {
        Self {
            period,
            min_frame_period: period,
            anchor,
        }
    }
}

impl VsyncSource for FixedVsyncSource {
    fn period(&self) -> Period {
        self.period
    }

    fn min_frame_period(&self) -> Period {
        self.min_frame_period
    }

    fn vsync_deadline_after(&self, time: TimePoint) -> TimePoint {
        let period = self.period.nanos();
        if period <= 0 {
            return time;
        }
        let since_anchor = (time - self.anchor).nanos();
        let elapsed = since_anchor.div_euclid(period) + 1;
        TimePoint(self.anchor.nanos() + elapsed * period)
    }
}
