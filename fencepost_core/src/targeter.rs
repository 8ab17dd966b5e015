// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-display present-time targeting.
//!
//! A [`FrameTargeter`] is driven once per vsync by the compositor:
//!
//! ```text
//! Idle ──begin_frame──► Begun ──set_present_fence / end_frame──► Ended ──begin_frame──► …
//! ```
//!
//! [`begin_frame`](FrameTargeter::begin_frame) computes when the frame is
//! expected to present, then looks back through the history of present fences
//! to decide whether the previous frame is still pending, whether it missed,
//! and whether composition should back off. The results are exposed through
//! the read-only [`FrameTarget`].
//!
//! # Running ahead
//!
//! When the expected frame duration exceeds one minimum frame period, the
//! pipeline is running more than one vsync ahead of the display: the fence of
//! the immediately preceding frame is not expected to have signalled yet. The
//! fence inspected is instead the newest one whose expected present time is
//! not after the current frame's begin time, found by walking the history
//! newest to oldest. Five present fences are retained.
//!
//! # Misses
//!
//! A frame is classified when the *next* frame begins, since only then is its
//! present fence inspected. The previous frame missed if that fence is still
//! pending, or if it signalled more than half a vsync period after the time
//! the frame was scheduled to present.
//!
//! The half-vsync slop makes this looser than a strict comparison against the
//! expected present time: a fence that lands after its target but within the
//! slop, even by a single nanosecond, is not counted as a miss.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::backend::VsyncSource;
use crate::display::DisplayId;
use crate::fence::{Fence, FenceTimePtr, SignalTime};
use crate::ring::RingBuffer;
use crate::time::{Duration, Period, TimePoint};
use crate::timing::{
    BeginFrameArgs, CompositeResult, CompositionCoverageFlags, FeatureFlags, FrameTime, VsyncId,
};

/// Number of present fences retained per display.
pub const PRESENT_FENCE_HISTORY: usize = 5;

/// Grace given to a present fence that is about to fire.
const PRESENT_FENCE_GRACE: Duration = Duration::from_millis(1);

static NO_PRESENT_FENCE: FenceTimePtr = FenceTimePtr::NO_FENCE;

/// Decides whether a present fence is still pending, waiting up to the given
/// grace period.
pub type IsFencePending = fn(&FenceTimePtr, Duration) -> bool;

/// A present fence together with the present time its frame targeted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PresentFence {
    /// The fence. [`FenceTimePtr::NO_FENCE`] for an empty entry.
    pub fence_time: FenceTimePtr,
    /// The expected present time of the frame that produced the fence.
    pub expected_present_time: TimePoint,
}

/// Where a [`FrameTargeter`] is in its per-frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FramePhase {
    /// No frame has begun yet.
    #[default]
    Idle,
    /// `begin_frame` ran; the frame has not ended.
    Begun,
    /// `end_frame` ran; waiting for the next vsync.
    Ended,
}

/// Read-only view of the metrics computed for the latest frame.
#[derive(Debug)]
pub struct FrameTarget {
    display: DisplayId,
    vsync_id: VsyncId,
    frame_begin_time: TimePoint,
    expected_present_time: TimePoint,
    earliest_present_time: Option<TimePoint>,
    debug_present_time_delay: Option<TimePoint>,

    frame_pending: bool,
    frame_missed: bool,
    hwc_frame_missed: bool,
    gpu_frame_missed: bool,
    would_backpressure_hwc: bool,

    present_fences: RingBuffer<PresentFence, PRESENT_FENCE_HISTORY>,
    last_signaled_frame_time: FrameTime,
}

impl FrameTarget {
    fn new(display: DisplayId) -> Self {
        Self {
            display,
            vsync_id: VsyncId::default(),
            frame_begin_time: TimePoint::default(),
            expected_present_time: TimePoint::default(),
            earliest_present_time: None,
            debug_present_time_delay: None,
            frame_pending: false,
            frame_missed: false,
            hwc_frame_missed: false,
            gpu_frame_missed: false,
            would_backpressure_hwc: false,
            present_fences: RingBuffer::new(),
            last_signaled_frame_time: FrameTime::default(),
        }
    }

    /// The display this target belongs to.
    #[must_use]
    pub fn display(&self) -> DisplayId {
        self.display
    }

    /// The vsync the current frame targets.
    #[must_use]
    pub fn vsync_id(&self) -> VsyncId {
        self.vsync_id
    }

    /// When the frame actually began, as opposed to when it was scheduled to
    /// begin.
    #[must_use]
    pub fn frame_begin_time(&self) -> TimePoint {
        self.frame_begin_time
    }

    /// Expected present time relative to when the frame actually began.
    #[must_use]
    pub fn expected_frame_duration(&self) -> Duration {
        self.expected_present_time - self.frame_begin_time
    }

    /// When the frame is expected to present.
    #[must_use]
    pub fn expected_present_time(&self) -> TimePoint {
        self.expected_present_time
    }

    /// Injected present delay, if any.
    #[must_use]
    pub fn debug_present_delay(&self) -> Option<TimePoint> {
        self.debug_present_time_delay
    }

    /// The earliest time the frame may be presented without landing a vsync
    /// early. `None` unless the frame would present early and the display
    /// cannot take an expected present time.
    #[must_use]
    pub fn earliest_present_time(&self) -> Option<TimePoint> {
        self.earliest_present_time
    }

    /// The newest present fence, or [`FenceTimePtr::NO_FENCE`].
    ///
    /// This is the fence of the frame that ended last, which is not the fence
    /// inspected for backpressure when running more than one vsync ahead.
    #[must_use]
    pub fn present_fence_for_previous_frame(&self) -> &FenceTimePtr {
        if self.present_fences.is_empty() {
            &NO_PRESENT_FENCE
        } else {
            &self.present_fences.back().fence_time
        }
    }

    /// Retained present fences, oldest first.
    pub fn present_fences(&self) -> impl DoubleEndedIterator<Item = &PresentFence> + '_ {
        self.present_fences.iter()
    }

    /// The inspected present fence had not signalled when the frame began.
    #[must_use]
    pub fn is_frame_pending(&self) -> bool {
        self.frame_pending
    }

    /// Composition should skip this vsync to let the display catch up.
    #[must_use]
    pub fn would_backpressure_hwc(&self) -> bool {
        self.would_backpressure_hwc
    }

    /// The previous frame missed its present time.
    #[must_use]
    pub fn did_miss_frame(&self) -> bool {
        self.frame_missed
    }

    /// The previous frame missed and was composed by the hardware composer
    /// alone.
    #[must_use]
    pub fn did_miss_hwc_frame(&self) -> bool {
        self.hwc_frame_missed && !self.gpu_frame_missed
    }

    /// The previous frame missed and used GPU composition.
    #[must_use]
    pub fn did_miss_gpu_frame(&self) -> bool {
        self.gpu_frame_missed
    }

    /// Timing of the most recent present fence observed to have signalled.
    #[must_use]
    pub fn last_signaled_frame_time(&self) -> FrameTime {
        self.last_signaled_frame_time
    }

    /// Whether the expected frame duration spans more than `N - 1` minimum
    /// frame periods. Exactly `N - 1` periods is not ahead.
    #[must_use]
    pub fn targets_vsyncs_ahead<const N: i64>(&self, min_frame_period: Period) -> bool {
        const { assert!(N > 1, "a frame always targets at least one vsync ahead") };
        self.expected_frame_duration() > min_frame_period * (N - 1)
    }

    /// The present fence that should have signalled by the time this frame
    /// began, and whether the pipeline is close enough behind it to apply
    /// backpressure.
    ///
    /// Returns an empty [`PresentFence`] if no retained fence targeted a
    /// present time at or before the frame's begin time.
    #[must_use]
    pub fn expected_signaled_present_fence(
        &self,
        vsync_period: Period,
        min_frame_period: Period,
    ) -> (bool, PresentFence) {
        let mut would_backpressure = true;
        let mut expected_present_time = self.expected_present_time;
        for fence in self.present_fences.iter().rev() {
            // A gap of more than a frame between consecutive targets means the
            // display had time to drain.
            if fence.expected_present_time + min_frame_period
                < expected_present_time - vsync_period / 2
            {
                would_backpressure = false;
            }

            if fence.expected_present_time <= self.frame_begin_time {
                return (would_backpressure, fence.clone());
            }

            expected_present_time = fence.expected_present_time;
        }
        (would_backpressure, PresentFence::default())
    }

    /// Whether the frame will be ready before its target vsync, so that it
    /// must be held back to avoid presenting a vsync early.
    #[must_use]
    pub fn would_present_early(&self, vsync_period: Period, min_frame_period: Period) -> bool {
        if self.targets_vsyncs_ahead::<3>(min_frame_period) {
            return true;
        }

        let (would_backpressure, fence) =
            self.expected_signaled_present_fence(vsync_period, min_frame_period);

        !would_backpressure
            || (fence.fence_time.is_valid() && !fence.fence_time.signal_time().is_pending())
    }

    /// The vsync before the targeted one. Equal to the previous frame's vsync
    /// unless running more than one vsync ahead.
    fn previous_frame_vsync_time(&self, min_frame_period: Period) -> TimePoint {
        self.expected_present_time - min_frame_period
    }

    fn add_fence(&mut self, fence_time: FenceTimePtr, expected_present_time: TimePoint) {
        *self.present_fences.next() = PresentFence {
            fence_time,
            expected_present_time,
        };
    }
}

/// Computes a display's per-frame present targets and tracks misses.
#[derive(Debug)]
pub struct FrameTargeter {
    target: FrameTarget,

    backpressure_gpu_composition: bool,
    supports_expected_present_time: bool,

    phase: FramePhase,
    scheduled_present_time: TimePoint,
    composition_coverage: CompositionCoverageFlags,

    frame_missed_count: AtomicU32,
    hwc_frame_missed_count: AtomicU32,
    gpu_frame_missed_count: AtomicU32,
}

impl FrameTargeter {
    /// Creates a targeter for `display` with the given capabilities.
    #[must_use]
    pub fn new(display: DisplayId, flags: FeatureFlags) -> Self {
        Self {
            target: FrameTarget::new(display),
            backpressure_gpu_composition: flags
                .contains(FeatureFlags::BACKPRESSURE_GPU_COMPOSITION),
            supports_expected_present_time: flags.contains(FeatureFlags::EXPECTED_PRESENT_TIME),
            phase: FramePhase::Idle,
            scheduled_present_time: TimePoint::default(),
            composition_coverage: CompositionCoverageFlags::empty(),
            frame_missed_count: AtomicU32::new(0),
            hwc_frame_missed_count: AtomicU32::new(0),
            gpu_frame_missed_count: AtomicU32::new(0),
        }
    }

    /// The metrics computed for the latest frame.
    #[must_use]
    pub fn target(&self) -> &FrameTarget {
        &self.target
    }

    /// Where the targeter is in its per-frame cycle.
    #[must_use]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Starts a frame, polling the relevant present fence without blocking
    /// beyond a short grace period.
    pub fn begin_frame(&mut self, args: &BeginFrameArgs, source: &dyn VsyncSource) {
        self.begin_frame_with(args, source, is_fence_pending);
    }

    /// Like [`begin_frame`](Self::begin_frame), with the pending-fence
    /// decision supplied by the caller.
    pub fn begin_frame_with(
        &mut self,
        args: &BeginFrameArgs,
        source: &dyn VsyncSource,
        is_fence_pending: IsFencePending,
    ) {
        self.phase = FramePhase::Begun;
        self.target.vsync_id = args.vsync_id;
        self.target.frame_begin_time = args.frame_begin_time;
        self.target.debug_present_time_delay = args.debug_present_time_delay;

        // Delayed frames may begin after the vsync they were scheduled for.
        // That moves the expected present time, but not the scheduled one.
        let last_scheduled_present_time =
            core::mem::replace(&mut self.scheduled_present_time, args.expected_vsync_time);

        let vsync_period = source.period();
        let min_frame_period = source.min_frame_period();

        self.target.expected_present_time = if args.expected_vsync_time >= args.frame_begin_time {
            args.expected_vsync_time
        } else {
            let deadline = source.vsync_deadline_after(args.frame_begin_time);
            if args.sf_work_duration > vsync_period {
                deadline + vsync_period
            } else {
                deadline
            }
        };

        if !self.supports_expected_present_time {
            self.target.earliest_present_time = self.compute_earliest_present_time(
                vsync_period,
                min_frame_period,
                args.hwc_min_work_duration,
            );
        }

        let (would_backpressure, fence) = self
            .target
            .expected_signaled_present_fence(vsync_period, min_frame_period);

        let consider_backpressure = self.backpressure_gpu_composition
            || !self
                .composition_coverage
                .contains(CompositionCoverageFlags::GPU);
        let grace = if would_backpressure
            && consider_backpressure
            && (fence.expected_present_time - args.frame_begin_time).abs() <= PRESENT_FENCE_GRACE
        {
            PRESENT_FENCE_GRACE
        } else {
            Duration::ZERO
        };

        let frame_pending =
            fence.fence_time.is_valid() && is_fence_pending(&fence.fence_time, grace);

        let frame_missed = frame_pending
            || match fence.fence_time.signal_time() {
                SignalTime::Invalid => false,
                // Judged signalled above but still pending: it cannot have
                // landed on time.
                SignalTime::Pending => true,
                SignalTime::Signaled(signal_time) => {
                    self.target.last_signaled_frame_time = FrameTime {
                        signal_time,
                        expected_present_time: fence.expected_present_time,
                    };
                    last_scheduled_present_time < signal_time - vsync_period / 2
                }
            };

        let coverage = self.composition_coverage;
        self.target.frame_pending = frame_pending;
        self.target.frame_missed = frame_missed;
        self.target.hwc_frame_missed =
            frame_missed && coverage.contains(CompositionCoverageFlags::HWC);
        self.target.gpu_frame_missed =
            frame_missed && coverage.contains(CompositionCoverageFlags::GPU);

        if self.target.frame_missed {
            self.frame_missed_count.fetch_add(1, Ordering::Relaxed);
        }
        if self.target.hwc_frame_missed {
            self.hwc_frame_missed_count.fetch_add(1, Ordering::Relaxed);
        }
        if self.target.gpu_frame_missed {
            self.gpu_frame_missed_count.fetch_add(1, Ordering::Relaxed);
        }

        self.target.would_backpressure_hwc = frame_pending && would_backpressure;
    }

    /// The earliest time the hardware composer may start on the current
    /// frame, or `None` if the frame would not present early.
    #[must_use]
    pub fn compute_earliest_present_time(
        &self,
        vsync_period: Period,
        min_frame_period: Period,
        hwc_min_work_duration: Duration,
    ) -> Option<TimePoint> {
        self.target
            .would_present_early(vsync_period, min_frame_period)
            .then(|| self.target.previous_frame_vsync_time(min_frame_period) - hwc_min_work_duration)
    }

    /// Records the present fence of the current frame and returns its shared
    /// handle.
    pub fn set_present_fence(&mut self, fence: Arc<dyn Fence>) -> FenceTimePtr {
        self.set_present_fence_time(FenceTimePtr::new(fence))
    }

    /// Records an already wrapped present fence, e.g. one shared with other
    /// consumers.
    pub fn set_present_fence_time(&mut self, fence_time: FenceTimePtr) -> FenceTimePtr {
        let expected_present_time = self.target.expected_present_time;
        self.target.add_fence(fence_time.clone(), expected_present_time);
        fence_time
    }

    /// Closes the current frame. Its coverage decides how a miss detected at
    /// the next `begin_frame` is attributed.
    pub fn end_frame(&mut self, result: &CompositeResult) {
        self.composition_coverage = result.composition_coverage;
        self.phase = FramePhase::Ended;
    }

    /// Frames observed to have missed, over the targeter's lifetime.
    #[must_use]
    pub fn frame_missed_count(&self) -> u32 {
        self.frame_missed_count.load(Ordering::Relaxed)
    }

    /// Missed frames that had hardware composition.
    #[must_use]
    pub fn hwc_frame_missed_count(&self) -> u32 {
        self.hwc_frame_missed_count.load(Ordering::Relaxed)
    }

    /// Missed frames that had GPU composition.
    #[must_use]
    pub fn gpu_frame_missed_count(&self) -> u32 {
        self.gpu_frame_missed_count.load(Ordering::Relaxed)
    }

    /// Writes the miss counters and a snapshot of the current target.
    pub fn dump(&self, out: &mut impl fmt::Write) -> fmt::Result {
        // The first three lines are parsed by tooling; keep their format.
        writeln!(out, "Total missed frame count: {}", self.frame_missed_count())?;
        writeln!(out, "HWC missed frame count: {}", self.hwc_frame_missed_count())?;
        writeln!(out, "GPU missed frame count: {}", self.gpu_frame_missed_count())?;

        let target = &self.target;
        writeln!(
            out,
            "display {} vsync {} ({:?}): begin {:?} expected present {:?} earliest {:?}",
            target.display,
            target.vsync_id.0,
            self.phase,
            target.frame_begin_time,
            target.expected_present_time,
            target.earliest_present_time,
        )?;
        writeln!(
            out,
            "  pending={} missed={} hwc_missed={} gpu_missed={} backpressure={}",
            target.frame_pending,
            target.frame_missed,
            target.did_miss_hwc_frame(),
            target.gpu_frame_missed,
            target.would_backpressure_hwc,
        )?;
        for fence in target.present_fences() {
            writeln!(
                out,
                "  present fence {:?} expected {:?}",
                fence.fence_time, fence.expected_present_time
            )?;
        }
        Ok(())
    }
}

/// Default pending-fence decision: polls with the grace period.
fn is_fence_pending(fence: &FenceTimePtr, grace: Duration) -> bool {
    fence.wait(grace).is_pending()
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloc::string::String;

    use crate::fence::ManualFence;

    const HWC_MIN_WORK_DURATION: Duration = Duration::from_nanos(5);

    /// Vsync source reporting a fixed deadline.
    #[derive(Clone, Copy)]
    struct VsyncDouble {
        period: Period,
        min_frame_period: Period,
        deadline: TimePoint,
    }

    impl VsyncSource for VsyncDouble {
        fn period(&self) -> Period {
            self.period
        }

        fn min_frame_period(&self) -> Period {
            self.min_frame_period
        }

        fn vsync_deadline_after(&self, _time: TimePoint) -> TimePoint {
            self.deadline
        }
    }

    fn fence_pending(_: &FenceTimePtr, _: Duration) -> bool {
        true
    }

    fn fence_signaled(_: &FenceTimePtr, _: Duration) -> bool {
        false
    }

    struct Harness {
        targeter: FrameTargeter,
        frame_begin_time: TimePoint,
        vsync_id: VsyncId,
    }

    impl Harness {
        fn new(flags: FeatureFlags) -> Self {
            Self {
                targeter: FrameTargeter::new(DisplayId::from_port(13), flags),
                frame_begin_time: TimePoint::default(),
                vsync_id: VsyncId::default(),
            }
        }

        fn backpressure_gpu() -> Self {
            Self::new(FeatureFlags::BACKPRESSURE_GPU_COMPOSITION)
        }

        fn starting_at(mut self, vsync_id: i64, begin: TimePoint) -> Self {
            self.vsync_id = VsyncId(vsync_id);
            self.frame_begin_time = begin;
            self
        }

        fn target(&self) -> &FrameTarget {
            self.targeter.target()
        }

        fn frame(&mut self, frame_duration: Duration, refresh_hz: u32) -> Frame<'_> {
            self.frame_with(frame_duration, refresh_hz, fence_signaled, None)
        }

        fn frame_with(
            &mut self,
            frame_duration: Duration,
            refresh_hz: u32,
            pending: IsFencePending,
            source: Option<VsyncDouble>,
        ) -> Frame<'_> {
            let period = Duration::from_hz(refresh_hz);
            let begin_time = self.frame_begin_time;
            let args = BeginFrameArgs {
                frame_begin_time: begin_time,
                vsync_id: self.vsync_id,
                expected_vsync_time: begin_time + frame_duration,
                sf_work_duration: Duration::from_millis(10),
                hwc_min_work_duration: HWC_MIN_WORK_DURATION,
                debug_present_time_delay: None,
            };
            let source = source.unwrap_or(VsyncDouble {
                period,
                min_frame_period: period,
                deadline: args.expected_vsync_time,
            });
            self.targeter.begin_frame_with(&args, &source, pending);
            self.vsync_id = self.vsync_id.next();
            Frame {
                harness: self,
                begin_time,
                period,
                ended: false,
            }
        }
    }

    struct Presented {
        time: FenceTimePtr,
        raw: Arc<ManualFence>,
    }

    /// An in-flight frame. Ends with hardware composition on drop if not
    /// ended explicitly, then advances the begin time by one period.
    struct Frame<'a> {
        harness: &'a mut Harness,
        begin_time: TimePoint,
        period: Period,
        ended: bool,
    }

    impl Frame<'_> {
        fn target(&self) -> &FrameTarget {
            self.harness.target()
        }

        fn end(&mut self) -> Presented {
            self.end_with(CompositionCoverageFlags::HWC)
        }

        fn end_with(&mut self, coverage: CompositionCoverageFlags) -> Presented {
            assert!(!self.ended, "frame ended twice");
            self.ended = true;
            let raw = Arc::new(ManualFence::new());
            let time = self.harness.targeter.set_present_fence(raw.clone());
            self.harness.targeter.end_frame(&CompositeResult {
                composition_coverage: coverage,
            });
            Presented { time, raw }
        }
    }

    impl Drop for Frame<'_> {
        fn drop(&mut self) {
            if !self.ended {
                self.end();
            }
            self.harness.frame_begin_time += self.period;
        }
    }

    #[test]
    fn targets_frames() {
        let mut h = Harness::backpressure_gpu().starting_at(42, TimePoint::from_millis(989));
        {
            let frame = h.frame(Duration::from_millis(10), 60);
            assert_eq!(frame.target().vsync_id(), VsyncId(42));
            assert_eq!(frame.target().frame_begin_time(), TimePoint::from_millis(989));
            assert_eq!(
                frame.target().expected_present_time(),
                TimePoint::from_millis(999)
            );
            assert_eq!(
                frame.target().expected_frame_duration(),
                Duration::from_millis(10)
            );
        }
        h.frame_begin_time = TimePoint::from_millis(1100);
        {
            let frame = h.frame(Duration::from_millis(11), 60);
            assert_eq!(frame.target().vsync_id(), VsyncId(43));
            assert_eq!(
                frame.target().frame_begin_time(),
                TimePoint::from_millis(1100)
            );
            assert_eq!(
                frame.target().expected_present_time(),
                TimePoint::from_millis(1111)
            );
            assert_eq!(
                frame.target().expected_frame_duration(),
                Duration::from_millis(11)
            );
        }
    }

    #[test]
    fn inflates_expected_present_time() {
        let begin = TimePoint::from_millis(777);
        let mut h = Harness::backpressure_gpu().starting_at(123, begin);
        let period = Duration::from_hz(120);
        let source = VsyncDouble {
            period,
            min_frame_period: period,
            deadline: begin + Duration::from_millis(5),
        };

        // Negative, so the expected vsync is already in the past.
        let frame = h.frame_with(Duration::from_millis(-3), 120, fence_signaled, Some(source));
        assert_eq!(
            frame.target().expected_present_time(),
            source.deadline + source.period,
            "work longer than a period targets the vsync after the deadline"
        );
    }

    #[test]
    fn late_frame_without_long_work_targets_the_next_deadline() {
        let begin = TimePoint::from_millis(777);
        let mut h = Harness::backpressure_gpu().starting_at(1, begin);
        let period = Duration::from_hz(60);
        let source = VsyncDouble {
            period,
            min_frame_period: period,
            deadline: begin + Duration::from_millis(5),
        };
        let frame = h.frame_with(Duration::from_millis(-3), 60, fence_signaled, Some(source));
        assert_eq!(frame.target().expected_present_time(), source.deadline);
        assert!(
            !frame.target().targets_vsyncs_ahead::<2>(period),
            "a late frame is not ahead"
        );
    }

    #[test]
    fn recalls_past_vsync() {
        let mut h = Harness::backpressure_gpu().starting_at(111, TimePoint::from_millis(1000));
        let period = Duration::from_hz(60);
        let frame_duration = Duration::from_millis(13);

        for _ in 0..5 {
            let fence = h.frame(frame_duration, 60).end().time;

            let frame = h.frame(frame_duration, 60);
            let (would_backpressure, present_fence) =
                frame.target().expected_signaled_present_fence(period, period);
            assert!(would_backpressure, "consecutive frames backpressure");
            assert_eq!(present_fence.fence_time, fence);
        }
    }

    #[test]
    fn would_backpressure_after_time() {
        let mut h = Harness::backpressure_gpu().starting_at(111, TimePoint::from_millis(1000));
        let period = Duration::from_hz(60);
        let frame_duration = Duration::from_millis(13);

        drop(h.frame(frame_duration, 60));
        {
            let frame = h.frame(frame_duration, 60);
            let (would_backpressure, _) =
                frame.target().expected_signaled_present_fence(period, period);
            assert!(would_backpressure, "back-to-back frame");
        }
        h.frame_begin_time += period;
        {
            let frame = h.frame(frame_duration, 60);
            let (would_backpressure, _) =
                frame.target().expected_signaled_present_fence(period, period);
            assert!(!would_backpressure, "a skipped vsync drains the display");
        }
    }

    #[test]
    fn recalls_past_vsync_two_vsyncs_ahead() {
        let mut h = Harness::backpressure_gpu().starting_at(222, TimePoint::from_millis(2000));
        let period = Duration::from_hz(120);
        let frame_duration = Duration::from_millis(10);

        let mut previous = FenceTimePtr::NO_FENCE;
        let mut current = FenceTimePtr::NO_FENCE;
        for _ in 0..5 {
            let mut frame = h.frame(frame_duration, 120);
            assert_eq!(
                frame
                    .target()
                    .expected_signaled_present_fence(period, period)
                    .1
                    .fence_time,
                previous,
                "two vsyncs ahead inspects the fence two frames back"
            );
            previous = core::mem::replace(&mut current, frame.end().time);
        }
    }

    #[test]
    fn recalls_past_vsync_five_vsyncs_ahead() {
        let mut h = Harness::backpressure_gpu().starting_at(222, TimePoint::from_millis(2000));
        let period = Duration::from_hz(120);
        let frame_duration = Duration::from_millis(40);

        let mut first = FenceTimePtr::NO_FENCE;
        for _ in 0..5 {
            let fence = h.frame(frame_duration, 120).end().time;
            if first == FenceTimePtr::NO_FENCE {
                first = fence;
            }
        }

        let frame = h.frame(frame_duration, 120);
        assert_eq!(
            frame
                .target()
                .expected_signaled_present_fence(period, period)
                .1
                .fence_time,
            first,
            "the oldest retained fence is still reachable"
        );
    }

    #[test]
    fn recalls_past_vsync_two_vsyncs_ahead_with_faster_vsync() {
        let mut h = Harness::backpressure_gpu().starting_at(222, TimePoint::from_millis(2000));
        let period = Duration::from_hz(120);
        let vsync_period = Duration::from_hz(240);
        let frame_duration = Duration::from_millis(10);

        let mut previous = FenceTimePtr::NO_FENCE;
        let mut current = FenceTimePtr::NO_FENCE;
        for _ in 0..5 {
            let mut frame = h.frame(frame_duration, 120);
            assert_eq!(
                frame
                    .target()
                    .expected_signaled_present_fence(vsync_period, period)
                    .1
                    .fence_time,
                previous
            );
            previous = core::mem::replace(&mut current, frame.end().time);
        }
    }

    #[test]
    fn does_not_detect_early_present_if_no_fence() {
        let h = Harness::backpressure_gpu();
        let period = Duration::from_hz(60);
        assert_eq!(
            h.target()
                .expected_signaled_present_fence(period, period)
                .1
                .fence_time,
            FenceTimePtr::NO_FENCE
        );
        assert!(!h.target().would_present_early(period, period));
        assert_eq!(
            *h.target().present_fence_for_previous_frame(),
            FenceTimePtr::NO_FENCE
        );
    }

    /// Runs three frames whose present fences stay pending, then one whose
    /// fence signals at its begin time.
    fn run_until_signaled_fence(h: &mut Harness, frame_duration: Duration, refresh_hz: u32) {
        let period = Duration::from_hz(refresh_hz);
        for _ in 0..3 {
            drop(h.frame(frame_duration, refresh_hz));
            assert!(
                !h.target().would_present_early(period, period),
                "not early while past present fences are pending"
            );
            assert_eq!(h.target().earliest_present_time(), None);
        }

        let mut frame = h.frame(frame_duration, refresh_hz);
        let begin = frame.begin_time;
        frame.end().raw.signal(begin);
    }

    #[test]
    fn detects_early_present() {
        let mut h = Harness::backpressure_gpu().starting_at(333, TimePoint::from_millis(3000));
        let period = Duration::from_hz(60);
        run_until_signaled_fence(&mut h, Duration::from_millis(10), 60);

        let frame = h.frame(Duration::from_millis(10), 60);
        assert!(frame.target().would_present_early(period, period));
        assert_eq!(
            frame.target().earliest_present_time(),
            Some(frame.target().expected_present_time() - period - HWC_MIN_WORK_DURATION)
        );
    }

    #[test]
    fn detects_early_present_after_long_period() {
        let mut h = Harness::backpressure_gpu().starting_at(333, TimePoint::from_millis(3000));
        let period = Duration::from_hz(60);
        run_until_signaled_fence(&mut h, Duration::from_millis(10), 60);

        h.frame_begin_time += period * 10;

        let frame = h.frame(Duration::from_millis(10), 60);
        assert!(frame.target().would_present_early(period, period));
        assert_eq!(
            frame.target().earliest_present_time(),
            Some(frame.target().expected_present_time() - period - HWC_MIN_WORK_DURATION)
        );
    }

    #[test]
    fn detects_early_present_with_expected_present_support() {
        let mut h = Harness::new(
            FeatureFlags::BACKPRESSURE_GPU_COMPOSITION | FeatureFlags::EXPECTED_PRESENT_TIME,
        )
        .starting_at(333, TimePoint::from_millis(3000));
        let period = Duration::from_hz(60);
        run_until_signaled_fence(&mut h, Duration::from_millis(10), 60);

        let frame = h.frame(Duration::from_millis(10), 60);
        assert!(frame.target().would_present_early(period, period));
        assert_eq!(
            frame.target().earliest_present_time(),
            None,
            "displays taking an expected present time need no earliest time"
        );
    }

    #[test]
    fn detects_early_present_two_vsyncs_ahead() {
        let mut h = Harness::backpressure_gpu().starting_at(444, TimePoint::from_millis(4000));
        let period = Duration::from_hz(120);
        run_until_signaled_fence(&mut h, Duration::from_millis(10), 120);

        assert!(
            !h.target().would_present_early(period, period),
            "two vsyncs ahead, the inspected fence is still pending"
        );
        assert_eq!(h.target().earliest_present_time(), None);

        drop(h.frame(Duration::from_millis(10), 120));

        let frame = h.frame(Duration::from_millis(10), 120);
        assert!(frame.target().would_present_early(period, period));
        assert_eq!(
            frame.target().earliest_present_time(),
            Some(frame.target().expected_present_time() - period - HWC_MIN_WORK_DURATION)
        );
    }

    #[test]
    fn detects_early_present_three_vsyncs_ahead() {
        let mut h = Harness::backpressure_gpu().starting_at(555, TimePoint::from_millis(5000));
        let period = Duration::from_hz(144);

        drop(h.frame(Duration::from_millis(16), 144));

        assert!(
            h.target().targets_vsyncs_ahead::<3>(period),
            "16ms spans more than two 144Hz periods"
        );
        assert!(h.target().would_present_early(period, period));
        assert_eq!(
            h.target().earliest_present_time(),
            Some(h.target().expected_present_time() - period - HWC_MIN_WORK_DURATION)
        );
    }

    #[test]
    fn vsyncs_ahead_boundary_is_strict() {
        let period = Duration::from_millis(8);
        let mut h = Harness::backpressure_gpu().starting_at(1, TimePoint::from_millis(100));
        drop(h.frame(Duration::from_millis(16), 120));
        assert!(
            !h.target().targets_vsyncs_ahead::<3>(period),
            "exactly two periods is not three vsyncs ahead"
        );
        assert!(h.target().targets_vsyncs_ahead::<2>(period));
    }

    #[test]
    fn detects_missed_frames() {
        let mut h = Harness::backpressure_gpu().starting_at(555, TimePoint::from_millis(5000));
        let period = Duration::from_hz(60);
        let duration = Duration::from_millis(10);

        assert!(!h.target().is_frame_pending());
        assert!(!h.target().did_miss_frame());
        assert!(!h.target().did_miss_hwc_frame());

        {
            let frame = h.frame(duration, 60);
            assert!(!frame.target().is_frame_pending());
            assert!(
                !frame.target().did_miss_frame(),
                "no miss without a past present fence"
            );
            assert!(!frame.target().did_miss_hwc_frame());
        }
        {
            let mut frame = h.frame_with(duration, 60, fence_pending, None);
            assert!(frame.target().is_frame_pending());
            assert!(
                frame.target().did_miss_frame(),
                "a pending past present fence is a miss"
            );
            assert!(frame.target().did_miss_hwc_frame());
            frame.end_with(CompositionCoverageFlags::GPU);
        }
        {
            let frame = h.frame_with(duration, 60, fence_pending, None);
            assert!(frame.target().is_frame_pending());
            assert!(frame.target().did_miss_frame(), "the GPU frame missed");
            assert!(!frame.target().did_miss_hwc_frame());
            assert!(frame.target().did_miss_gpu_frame());
        }
        {
            let mut frame = h.frame(duration, 60);
            assert!(!frame.target().is_frame_pending());
            let expected = frame.target().expected_present_time();
            frame.end().raw.signal(expected + period / 2 + Duration(1));
        }
        {
            let mut frame = h.frame(duration, 60);
            assert!(!frame.target().is_frame_pending());
            let expected = frame.target().expected_present_time();
            frame.end().raw.signal(expected + period / 2);
            assert!(
                frame.target().did_miss_frame(),
                "signalled later than the slop"
            );
            assert!(frame.target().did_miss_hwc_frame());
        }
        {
            let frame = h.frame(duration, 60);
            assert!(!frame.target().is_frame_pending());
            assert!(
                !frame.target().did_miss_frame(),
                "signalled within the slop"
            );
            assert!(!frame.target().did_miss_hwc_frame());
            assert_eq!(
                frame.target().last_signaled_frame_time().lateness(),
                period / 2
            );
        }
    }

    #[test]
    fn late_present_fence_is_classified_as_missed() {
        let mut h = Harness::backpressure_gpu().starting_at(1, TimePoint::from_millis(100));
        let period = Duration::from_hz(60);
        {
            let mut frame = h.frame(Duration::from_millis(10), 60);
            let expected = frame.target().expected_present_time();
            frame.end().raw.signal(expected + period);
        }
        let frame = h.frame(Duration::from_millis(10), 60);
        assert!(frame.target().did_miss_frame(), "a vsync late is a miss");
        drop(frame);

        {
            let mut frame = h.frame(Duration::from_millis(10), 60);
            let expected = frame.target().expected_present_time();
            frame.end().raw.signal(expected);
        }
        let frame = h.frame(Duration::from_millis(10), 60);
        assert!(!frame.target().did_miss_frame(), "on time is not a miss");
    }

    #[test]
    fn fence_just_past_its_target_is_within_the_slop() {
        let mut h = Harness::backpressure_gpu().starting_at(1, TimePoint::from_millis(100));
        {
            let mut frame = h.frame(Duration::from_millis(10), 60);
            let expected = frame.target().expected_present_time();
            frame.end().raw.signal(expected + Duration(1));
        }
        let frame = h.frame(Duration::from_millis(10), 60);
        assert!(
            !frame.target().did_miss_frame(),
            "one nanosecond late is absorbed by the slop"
        );
        assert_eq!(
            frame.target().last_signaled_frame_time().lateness(),
            Duration(1),
            "lateness is still recorded"
        );
    }

    #[test]
    fn counters_accumulate_and_dump() {
        let mut h = Harness::backpressure_gpu().starting_at(1, TimePoint::from_millis(100));
        drop(h.frame(Duration::from_millis(10), 60));
        {
            let mut frame = h.frame_with(Duration::from_millis(10), 60, fence_pending, None);
            frame.end_with(CompositionCoverageFlags::GPU);
        }
        drop(h.frame_with(Duration::from_millis(10), 60, fence_pending, None));

        assert_eq!(h.targeter.frame_missed_count(), 2);
        assert_eq!(h.targeter.hwc_frame_missed_count(), 1);
        assert_eq!(h.targeter.gpu_frame_missed_count(), 1);

        let mut out = String::new();
        h.targeter.dump(&mut out).expect("writing to a String");
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("Total missed frame count: 2"));
        assert_eq!(lines.next(), Some("HWC missed frame count: 1"));
        assert_eq!(lines.next(), Some("GPU missed frame count: 1"));
        assert!(
            out.contains("present fence"),
            "history follows the counters"
        );
    }

    #[test]
    fn phases_follow_the_frame() {
        let mut h = Harness::backpressure_gpu();
        assert_eq!(h.targeter.phase(), FramePhase::Idle);
        {
            let frame = h.frame(Duration::from_millis(10), 60);
            assert_eq!(frame.harness.targeter.phase(), FramePhase::Begun);
        }
        assert_eq!(h.targeter.phase(), FramePhase::Ended);
    }

    #[test]
    fn previous_frame_fence_is_the_newest() {
        let mut h = Harness::backpressure_gpu().starting_at(7, TimePoint::from_millis(10));
        let first = h.frame(Duration::from_millis(10), 60).end().time;
        assert_eq!(*h.target().present_fence_for_previous_frame(), first);
        let second = h.frame(Duration::from_millis(10), 60).end().time;
        assert_eq!(*h.target().present_fence_for_previous_frame(), second);
        assert_eq!(h.target().present_fences().count(), 2);
    }

    #[test]
    fn default_pending_check_polls_the_fence() {
        let raw = Arc::new(ManualFence::new());
        let fence = FenceTimePtr::new(raw.clone());
        assert!(is_fence_pending(&fence, PRESENT_FENCE_GRACE));
        raw.signal(TimePoint(1));
        assert!(!is_fence_pending(&fence, Duration::ZERO));
    }
}
