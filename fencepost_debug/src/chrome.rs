// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][format] JSON to the given writer.
//!
//! Frame events are grouped per display (`pid` is the display id). Dependency
//! events share `pid` 0 on their own thread lane; records without a time of
//! their own are placed at the most recent timestamp seen in the stream.
//!
//! [format]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use fencepost_core::fence::SignalTime;
use fencepost_core::time::TimePoint;

use crate::recorder::{RecordedEvent, decode};

const FRAME_TID: u64 = 0;
const DEPENDENCY_TID: u64 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
/// Each frame target becomes a complete (`X`) slice spanning begin time to
/// expected present time.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut clock = TimePoint::default();

    for recorded in decode(bytes) {
        if let Some(t) = recorded.timestamp() {
            clock = t;
        }
        let ts = to_us(clock);
        match recorded {
            RecordedEvent::FrameTarget(e) => {
                events.push(json!({
                    "ph": "X",
                    "name": format!("vsync {}", e.vsync_id.0),
                    "cat": "Frame",
                    "ts": ts,
                    "dur": to_us(e.expected_present_time) - ts,
                    "pid": e.display.0,
                    "tid": FRAME_TID,
                    "args": {
                        "earliest_present_us": e.earliest_present_time.map(to_us),
                        "frame_pending": e.frame_pending,
                        "frame_missed": e.frame_missed,
                        "hwc_frame_missed": e.hwc_frame_missed,
                        "gpu_frame_missed": e.gpu_frame_missed,
                        "would_backpressure_hwc": e.would_backpressure_hwc,
                    }
                }));
                if e.frame_missed {
                    events.push(json!({
                        "ph": "i",
                        "name": "MissedFrame",
                        "cat": "Frame",
                        "ts": ts,
                        "pid": e.display.0,
                        "tid": FRAME_TID,
                        "s": "p",
                    }));
                }
            }
            RecordedEvent::PresentFence(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "PresentFence",
                    "cat": "Frame",
                    "ts": ts,
                    "pid": e.display.0,
                    "tid": FRAME_TID,
                    "s": "t",
                    "args": {
                        "vsync_id": e.vsync_id.0,
                    }
                }));
            }
            RecordedEvent::FrameEnd(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "FrameEnd",
                    "cat": "Frame",
                    "ts": ts,
                    "pid": e.display.0,
                    "tid": FRAME_TID,
                    "s": "t",
                    "args": {
                        "vsync_id": e.vsync_id.0,
                        "coverage": format!("{:?}", e.coverage),
                    }
                }));
            }
            RecordedEvent::FenceAdded { block_id, stage } => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("{stage:?}"),
                    "cat": "Dependency",
                    "ts": ts,
                    "pid": 0,
                    "tid": DEPENDENCY_TID,
                    "s": "t",
                    "args": {
                        "block_id": block_id,
                    }
                }));
            }
            RecordedEvent::Clobber { block_id } => {
                events.push(json!({
                    "ph": "i",
                    "name": "Clobber",
                    "cat": "Dependency",
                    "ts": ts,
                    "pid": 0,
                    "tid": DEPENDENCY_TID,
                    "s": "g",
                    "args": {
                        "block_id": block_id,
                    }
                }));
            }
            RecordedEvent::BlockResolved {
                block_id,
                ingress,
                egress,
                access_count,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "BlockResolved",
                    "cat": "Dependency",
                    "ts": ts,
                    "pid": 0,
                    "tid": DEPENDENCY_TID,
                    "s": "t",
                    "args": {
                        "block_id": block_id,
                        "ingress_us": signal_us(ingress),
                        "egress_us": signal_us(egress),
                        "access_count": access_count,
                    }
                }));
            }
            RecordedEvent::Violation {
                block_id,
                kind,
                observed,
                reference,
            } => {
                events.push(json!({
                    "ph": "i",
                    "name": "Violation",
                    "cat": "Dependency",
                    "ts": ts,
                    "pid": 0,
                    "tid": DEPENDENCY_TID,
                    "s": "g",
                    "args": {
                        "block_id": block_id,
                        "kind": kind.describe(),
                        "observed_us": signal_us(observed),
                        "reference_us": signal_us(reference),
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn to_us(t: TimePoint) -> f64 {
    t.nanos() as f64 / 1000.0
}

fn signal_us(t: SignalTime) -> Option<f64> {
    t.timestamp().map(to_us)
}
