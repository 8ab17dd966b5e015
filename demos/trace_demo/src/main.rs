// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Simulated display loop that exercises frame targeting and fence
//! dependency tracing.
//!
//! Runs 40 synthetic frames at 60 Hz through a
//! [`FrameTargeter`](fencepost_core::targeter::FrameTargeter), with a few
//! present fences landing late. A
//! [`DependencyMonitor`](fencepost_core::dependency::DependencyMonitor) tracks
//! the scanout buffer's acquire, read, and release fences; one frame reads the
//! buffer after releasing it. Events go to a
//! [`PrettyPrintSink`](fencepost_debug::pretty::PrettyPrintSink) on stdout and
//! a shared [`RecorderSink`](fencepost_debug::recorder::RecorderSink), which is
//! exported as a Chrome trace.

use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter};
use std::sync::{Arc, Mutex, PoisonError};

use fencepost_core::backend::{FixedVsyncSource, VsyncSource};
use fencepost_core::dependency::DependencyMonitor;
use fencepost_core::display::DisplayId;
use fencepost_core::fence::{FenceTimePtr, ManualFence};
use fencepost_core::targeter::FrameTargeter;
use fencepost_core::time::{Duration, TimePoint};
use fencepost_core::timing::{
    BeginFrameArgs, CompositeResult, CompositionCoverageFlags, FeatureFlags, VsyncId,
};
use fencepost_core::trace::{
    BlockResolvedEvent, ClobberEvent, FenceAddedEvent, FrameEndEvent, FrameTargetEvent,
    PresentFenceEvent, TraceSink, Tracer, ViolationEvent,
};

use fencepost_debug::pretty::PrettyPrintSink;
use fencepost_debug::recorder::RecorderSink;

const FRAME_COUNT: i64 = 40;
/// Every ninth frame presents one vsync late.
const LATE_EVERY: i64 = 9;
/// The frame whose buffer read completes after the buffer was released.
const BAD_READ_FRAME: i64 = 12;

/// Forwards every event to stdout and to a recorder shared between sinks.
struct DemoSink {
    pretty: PrettyPrintSink,
    recorder: Arc<Mutex<RecorderSink>>,
}

impl DemoSink {
    fn new(recorder: &Arc<Mutex<RecorderSink>>) -> Self {
        Self {
            pretty: PrettyPrintSink::new(Box::new(io::stdout())),
            recorder: Arc::clone(recorder),
        }
    }

    fn both(&mut self, f: impl Fn(&mut dyn TraceSink)) {
        f(&mut self.pretty);
        let mut recorder = self.recorder.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *recorder);
    }
}

impl TraceSink for DemoSink {
    fn on_frame_target(&mut self, e: &FrameTargetEvent) {
        self.both(|s| s.on_frame_target(e));
    }

    fn on_present_fence(&mut self, e: &PresentFenceEvent) {
        self.both(|s| s.on_present_fence(e));
    }

    fn on_frame_end(&mut self, e: &FrameEndEvent) {
        self.both(|s| s.on_frame_end(e));
    }

    fn on_fence_added(&mut self, e: &FenceAddedEvent<'_>) {
        self.both(|s| s.on_fence_added(e));
    }

    fn on_clobber(&mut self, e: &ClobberEvent<'_>) {
        self.both(|s| s.on_clobber(e));
    }

    fn on_block_resolved(&mut self, e: &BlockResolvedEvent<'_>) {
        self.both(|s| s.on_block_resolved(e));
    }

    fn on_violation(&mut self, e: &ViolationEvent<'_>) {
        self.both(|s| s.on_violation(e));
    }
}

fn signaled(t: TimePoint) -> FenceTimePtr {
    FenceTimePtr::new(Arc::new(ManualFence::signaled_at(t)))
}

/// Runs `frame_count` frames, recording into `recorder`, and returns the
/// targeter and monitor dumps.
fn simulate(
    frame_count: i64,
    recorder: &Arc<Mutex<RecorderSink>>,
) -> Result<String, fmt::Error> {
    let period = Duration::from_hz(60);
    let start = TimePoint::from_millis(1_000);
    let display = DisplayId::from_port(0);

    let mut frame_sink = DemoSink::new(recorder);

    // -- targeting and dependency tracking ---------------------------------
    let source = FixedVsyncSource::new(period, start);
    let mut targeter = FrameTargeter::new(display, FeatureFlags::empty());
    let monitor = DependencyMonitor::with_sink(DemoSink::new(recorder));
    monitor.set_token("scanout");

    // Present fences that have not signalled yet, with their landing time.
    let mut in_flight: Vec<(Arc<ManualFence>, TimePoint)> = Vec::new();
    let mut vsync_id = VsyncId(0);

    for frame in 0..frame_count {
        let begin = start + period * frame + Duration::from_millis(1);
        vsync_id = vsync_id.next();

        // The display signals every present fence whose vsync has passed.
        in_flight.retain(|(fence, lands)| {
            if *lands <= begin {
                fence.signal(*lands);
                false
            } else {
                true
            }
        });

        let args = BeginFrameArgs {
            frame_begin_time: begin,
            vsync_id,
            expected_vsync_time: source.vsync_deadline_after(begin),
            sf_work_duration: period - Duration::from_millis(2),
            hwc_min_work_duration: Duration::from_millis(2),
            debug_present_time_delay: None,
        };
        targeter.begin_frame(&args, &source);

        let mut tracer = Tracer::new(&mut frame_sink);
        tracer.frame_target(targeter.target());

        let target = targeter.target();
        let present_at = target.expected_present_time();
        if target.would_backpressure_hwc() {
            // Skip composition; the previous frame is still on screen.
            targeter.end_frame(&CompositeResult::default());
            continue;
        }

        // Scanout buffer: acquired at begin, read by the compositor, released
        // at present.
        let acquired = begin + Duration::from_millis(2);
        let released = present_at;
        let read_done = if frame == BAD_READ_FRAME {
            released + Duration::from_millis(1)
        } else {
            begin + Duration::from_millis(6)
        };
        monitor.add_ingress(signaled(acquired), "acquire");
        monitor.add_access_completion(signaled(read_done), "composite");
        monitor.add_egress(signaled(released), "release");

        let present = Arc::new(ManualFence::new());
        targeter.set_present_fence(present.clone());
        tracer.present_fence(&PresentFenceEvent {
            display,
            vsync_id,
            expected_present_time: present_at,
        });
        let lands = if frame % LATE_EVERY == LATE_EVERY - 1 {
            present_at + period
        } else {
            present_at
        };
        in_flight.push((present, lands));

        let coverage = if frame % 4 == 0 {
            CompositionCoverageFlags::GPU
        } else {
            CompositionCoverageFlags::HWC
        };
        targeter.end_frame(&CompositeResult {
            composition_coverage: coverage,
        });
        tracer.frame_end(&FrameEndEvent {
            display,
            vsync_id,
            coverage,
        });
    }

    let mut summary = String::new();
    targeter.dump(&mut summary)?;
    monitor.dump(&mut summary)?;
    Ok(summary)
}

fn main() -> io::Result<()> {
    let recorder = Arc::new(Mutex::new(RecorderSink::new()));
    let summary = simulate(FRAME_COUNT, &recorder).map_err(io::Error::other)?;
    println!("{summary}");

    // -- export Chrome trace -----------------------------------------------
    let path = "trace.json";
    let mut writer = BufWriter::new(File::create(path)?);
    let bytes = recorder
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .as_bytes()
        .to_vec();
    fencepost_debug::chrome::export(&bytes, &mut writer)?;

    println!("Wrote {path} ({FRAME_COUNT} frames)");
    Ok(())
}
