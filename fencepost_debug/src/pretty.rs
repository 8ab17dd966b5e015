// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are printed in milliseconds.

use std::io::Write;

use fencepost_core::fence::SignalTime;
use fencepost_core::time::TimePoint;
use fencepost_core::trace::{
    BlockResolvedEvent, ClobberEvent, FenceAddedEvent, FenceStage, FrameEndEvent,
    FrameTargetEvent, PresentFenceEvent, TraceSink, ViolationEvent,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write + Send>> {
    writer: W,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink").finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self { writer }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self { writer }
    }

    /// Consumes the sink and returns the destination.
    #[must_use]
    pub fn into_writer(self) -> W {
        self.writer
    }
}

fn ms(t: TimePoint) -> f64 {
    t.nanos() as f64 / 1_000_000.0
}

fn signal(t: SignalTime) -> String {
    match t {
        SignalTime::Pending => "pending".to_owned(),
        SignalTime::Invalid => "invalid".to_owned(),
        SignalTime::Signaled(t) => format!("{:.3}ms", ms(t)),
    }
}

fn stage_name(stage: FenceStage) -> &'static str {
    match stage {
        FenceStage::Ingress => "ingress",
        FenceStage::Access => "access",
        FenceStage::Egress => "egress",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_frame_target(&mut self, e: &FrameTargetEvent) {
        let earliest = e
            .earliest_present_time
            .map_or_else(|| "-".to_owned(), |t| format!("{:.3}ms", ms(t)));
        let missed = match (e.frame_missed, e.hwc_frame_missed, e.gpu_frame_missed) {
            (false, ..) => "ok",
            (true, _, true) => "MISSED(gpu)",
            (true, true, false) => "MISSED(hwc)",
            (true, false, false) => "MISSED",
        };
        let _ = writeln!(
            self.writer,
            "[target] display={} vsync={} begin={:.3}ms present={:.3}ms earliest={earliest} \
             pending={} prev={missed} backpressure={}",
            e.display,
            e.vsync_id.0,
            ms(e.frame_begin_time),
            ms(e.expected_present_time),
            e.frame_pending,
            e.would_backpressure_hwc,
        );
    }

    fn on_present_fence(&mut self, e: &PresentFenceEvent) {
        let _ = writeln!(
            self.writer,
            "[present] display={} vsync={} expected={:.3}ms",
            e.display,
            e.vsync_id.0,
            ms(e.expected_present_time),
        );
    }

    fn on_frame_end(&mut self, e: &FrameEndEvent) {
        let _ = writeln!(
            self.writer,
            "[end] display={} vsync={} coverage={:?}",
            e.display, e.vsync_id.0, e.coverage,
        );
    }

    fn on_fence_added(&mut self, e: &FenceAddedEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[fence] {} block={} {} <{}>",
            e.token,
            e.block_id,
            stage_name(e.stage),
            e.annotation,
        );
    }

    fn on_clobber(&mut self, e: &ClobberEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[clobber] {} block={} unresolved",
            e.token, e.block_id,
        );
    }

    fn on_block_resolved(&mut self, e: &BlockResolvedEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[resolved] {} block={} ingress={} egress={} accesses={}",
            e.token,
            e.block_id,
            signal(e.ingress),
            signal(e.egress),
            e.access_count,
        );
    }

    fn on_violation(&mut self, e: &ViolationEvent<'_>) {
        let _ = writeln!(
            self.writer,
            "[violation] {} block={} {} <{}> at {} vs {}",
            e.token,
            e.block_id,
            e.kind.describe(),
            e.annotation,
            signal(e.observed),
            signal(e.reference),
        );
    }
}
