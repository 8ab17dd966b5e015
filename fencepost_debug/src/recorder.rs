// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records. [`decode`] reads them back
//! as an iterator of [`RecordedEvent`].
//!
//! Dependency events drop their token and annotation strings; only the block
//! id and the timing data are stored.

use fencepost_core::display::DisplayId;
use fencepost_core::fence::SignalTime;
use fencepost_core::time::TimePoint;
use fencepost_core::timing::{CompositionCoverageFlags, VsyncId};
use fencepost_core::trace::{
    BlockResolvedEvent, ClobberEvent, FenceAddedEvent, FenceStage, FrameEndEvent,
    FrameTargetEvent, PresentFenceEvent, TraceSink, ViolationEvent, ViolationKind,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_FRAME_TARGET: u8 = 1;
const TAG_PRESENT_FENCE: u8 = 2;
const TAG_FRAME_END: u8 = 3;
const TAG_FENCE_ADDED: u8 = 4;
const TAG_CLOBBER: u8 = 5;
const TAG_BLOCK_RESOLVED: u8 = 6;
const TAG_VIOLATION: u8 = 7;

// Bits of the frame-target status byte.
const STATUS_PENDING: u8 = 1 << 0;
const STATUS_MISSED: u8 = 1 << 1;
const STATUS_HWC_MISSED: u8 = 1 << 2;
const STATUS_GPU_MISSED: u8 = 1 << 3;
const STATUS_BACKPRESSURE: u8 = 1 << 4;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_option_i64(&mut self, v: Option<i64>) {
        match v {
            Some(val) => {
                self.write_u8(1);
                self.write_i64(val);
            }
            None => {
                self.write_u8(0);
                self.write_i64(0);
            }
        }
    }

    fn write_signal(&mut self, t: SignalTime) {
        self.write_i64(t.to_raw());
    }

    fn write_stage(&mut self, stage: FenceStage) {
        self.write_u8(match stage {
            FenceStage::Ingress => 0,
            FenceStage::Access => 1,
            FenceStage::Egress => 2,
        });
    }

    fn write_kind(&mut self, kind: ViolationKind) {
        self.write_u8(match kind {
            ViolationKind::AccessAfterEgress => 0,
            ViolationKind::AccessBeforeIngress => 1,
            ViolationKind::InvalidAccess => 2,
            ViolationKind::EgressBeforeIngress => 3,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_frame_target(&mut self, e: &FrameTargetEvent) {
        self.write_u8(TAG_FRAME_TARGET);
        self.write_u64(e.display.0);
        self.write_i64(e.vsync_id.0);
        self.write_i64(e.frame_begin_time.nanos());
        self.write_i64(e.expected_present_time.nanos());
        self.write_option_i64(e.earliest_present_time.map(TimePoint::nanos));
        let mut status = 0;
        for (set, bit) in [
            (e.frame_pending, STATUS_PENDING),
            (e.frame_missed, STATUS_MISSED),
            (e.hwc_frame_missed, STATUS_HWC_MISSED),
            (e.gpu_frame_missed, STATUS_GPU_MISSED),
            (e.would_backpressure_hwc, STATUS_BACKPRESSURE),
        ] {
            if set {
                status |= bit;
            }
        }
        self.write_u8(status);
    }

    fn on_present_fence(&mut self, e: &PresentFenceEvent) {
        self.write_u8(TAG_PRESENT_FENCE);
        self.write_u64(e.display.0);
        self.write_i64(e.vsync_id.0);
        self.write_i64(e.expected_present_time.nanos());
    }

    fn on_frame_end(&mut self, e: &FrameEndEvent) {
        self.write_u8(TAG_FRAME_END);
        self.write_u64(e.display.0);
        self.write_i64(e.vsync_id.0);
        self.write_u8(e.coverage.bits());
    }

    fn on_fence_added(&mut self, e: &FenceAddedEvent<'_>) {
        self.write_u8(TAG_FENCE_ADDED);
        self.write_i64(e.block_id);
        self.write_stage(e.stage);
    }

    fn on_clobber(&mut self, e: &ClobberEvent<'_>) {
        self.write_u8(TAG_CLOBBER);
        self.write_i64(e.block_id);
    }

    fn on_block_resolved(&mut self, e: &BlockResolvedEvent<'_>) {
        self.write_u8(TAG_BLOCK_RESOLVED);
        self.write_i64(e.block_id);
        self.write_signal(e.ingress);
        self.write_signal(e.egress);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "access counts are clamped to u32::MAX first"
        )]
        self.write_u32(e.access_count.min(u32::MAX as usize) as u32);
    }

    fn on_violation(&mut self, e: &ViolationEvent<'_>) {
        self.write_u8(TAG_VIOLATION);
        self.write_i64(e.block_id);
        self.write_kind(e.kind);
        self.write_signal(e.observed);
        self.write_signal(e.reference);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordedEvent {
    /// A [`FrameTargetEvent`].
    FrameTarget(FrameTargetEvent),
    /// A [`PresentFenceEvent`].
    PresentFence(PresentFenceEvent),
    /// A [`FrameEndEvent`].
    FrameEnd(FrameEndEvent),
    /// A fence was added to a dependency block.
    FenceAdded {
        /// Block the fence belongs to.
        block_id: i64,
        /// Stage of the usage cycle.
        stage: FenceStage,
    },
    /// An unresolved block was overwritten.
    Clobber {
        /// The overwritten block.
        block_id: i64,
    },
    /// A block resolved.
    BlockResolved {
        /// The resolved block.
        block_id: i64,
        /// Ingress signal time.
        ingress: SignalTime,
        /// Egress signal time.
        egress: SignalTime,
        /// Number of access fences.
        access_count: u32,
    },
    /// An ordering anomaly.
    Violation {
        /// The offending block.
        block_id: i64,
        /// What went wrong.
        kind: ViolationKind,
        /// Signal time of the offending fence.
        observed: SignalTime,
        /// Signal time it was compared against.
        reference: SignalTime,
    },
}

impl RecordedEvent {
    /// Returns the time this event is anchored at, if it carries one.
    ///
    /// Frame events use their begin or expected present time; resolutions use
    /// the egress time and violations the offending fence's signal time.
    #[must_use]
    pub fn timestamp(&self) -> Option<TimePoint> {
        match self {
            Self::FrameTarget(e) => Some(e.frame_begin_time),
            Self::PresentFence(e) => Some(e.expected_present_time),
            Self::BlockResolved { egress, .. } => egress.timestamp(),
            Self::Violation { observed, .. } => observed.timestamp(),
            Self::FrameEnd(_) | Self::FenceAdded { .. } | Self::Clobber { .. } => None,
        }
    }
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_u8(&mut self) -> Option<u8> {
        let v = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(v)
    }

    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        if self.remaining() < N {
            return None;
        }
        let v = self.data[self.pos..self.pos + N].try_into().ok()?;
        self.pos += N;
        Some(v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    fn read_i64(&mut self) -> Option<i64> {
        self.read_array().map(i64::from_le_bytes)
    }

    fn read_option_i64(&mut self) -> Option<Option<i64>> {
        let present = self.read_u8()?;
        let val = self.read_i64()?;
        Some(if present != 0 { Some(val) } else { None })
    }

    fn read_signal(&mut self) -> Option<SignalTime> {
        self.read_i64().map(SignalTime::from_raw)
    }

    fn read_stage(&mut self) -> Option<FenceStage> {
        match self.read_u8()? {
            0 => Some(FenceStage::Ingress),
            1 => Some(FenceStage::Access),
            2 => Some(FenceStage::Egress),
            _ => None,
        }
    }

    fn read_kind(&mut self) -> Option<ViolationKind> {
        match self.read_u8()? {
            0 => Some(ViolationKind::AccessAfterEgress),
            1 => Some(ViolationKind::AccessBeforeIngress),
            2 => Some(ViolationKind::InvalidAccess),
            3 => Some(ViolationKind::EgressBeforeIngress),
            _ => None,
        }
    }

    fn decode_frame_target(&mut self) -> Option<RecordedEvent> {
        let display = DisplayId(self.read_u64()?);
        let vsync_id = VsyncId(self.read_i64()?);
        let frame_begin_time = TimePoint(self.read_i64()?);
        let expected_present_time = TimePoint(self.read_i64()?);
        let earliest_present_time = self.read_option_i64()?.map(TimePoint);
        let status = self.read_u8()?;
        Some(RecordedEvent::FrameTarget(FrameTargetEvent {
            display,
            vsync_id,
            frame_begin_time,
            expected_present_time,
            earliest_present_time,
            frame_pending: status & STATUS_PENDING != 0,
            frame_missed: status & STATUS_MISSED != 0,
            hwc_frame_missed: status & STATUS_HWC_MISSED != 0,
            gpu_frame_missed: status & STATUS_GPU_MISSED != 0,
            would_backpressure_hwc: status & STATUS_BACKPRESSURE != 0,
        }))
    }

    fn decode_present_fence(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PresentFence(PresentFenceEvent {
            display: DisplayId(self.read_u64()?),
            vsync_id: VsyncId(self.read_i64()?),
            expected_present_time: TimePoint(self.read_i64()?),
        }))
    }

    fn decode_frame_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::FrameEnd(FrameEndEvent {
            display: DisplayId(self.read_u64()?),
            vsync_id: VsyncId(self.read_i64()?),
            coverage: CompositionCoverageFlags::from_bits_truncate(self.read_u8()?),
        }))
    }

    fn decode_fence_added(&mut self) -> Option<RecordedEvent> {
        let block_id = self.read_i64()?;
        let stage = self.read_stage()?;
        Some(RecordedEvent::FenceAdded { block_id, stage })
    }

    fn decode_clobber(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Clobber {
            block_id: self.read_i64()?,
        })
    }

    fn decode_block_resolved(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BlockResolved {
            block_id: self.read_i64()?,
            ingress: self.read_signal()?,
            egress: self.read_signal()?,
            access_count: self.read_u32()?,
        })
    }

    fn decode_violation(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Violation {
            block_id: self.read_i64()?,
            kind: self.read_kind()?,
            observed: self.read_signal()?,
            reference: self.read_signal()?,
        })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_FRAME_TARGET => self.decode_frame_target(),
            TAG_PRESENT_FENCE => self.decode_present_fence(),
            TAG_FRAME_END => self.decode_frame_end(),
            TAG_FENCE_ADDED => self.decode_fence_added(),
            TAG_CLOBBER => self.decode_clobber(),
            TAG_BLOCK_RESOLVED => self.decode_block_resolved(),
            TAG_VIOLATION => self.decode_violation(),
            _ => None, // unknown tag: stop
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_target() -> FrameTargetEvent {
        FrameTargetEvent {
            display: DisplayId(3),
            vsync_id: VsyncId(17),
            frame_begin_time: TimePoint::from_millis(100),
            expected_present_time: TimePoint::from_millis(111),
            earliest_present_time: Some(TimePoint::from_millis(110)),
            frame_pending: false,
            frame_missed: true,
            hwc_frame_missed: false,
            gpu_frame_missed: true,
            would_backpressure_hwc: false,
        }
    }

    #[test]
    fn frame_target_preserves_status_bits() {
        let mut rec = RecorderSink::new();
        let event = sample_target();
        rec.on_frame_target(&event);

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events, vec![RecordedEvent::FrameTarget(event)]);
    }

    #[test]
    fn dependency_events_drop_strings() {
        let mut rec = RecorderSink::new();
        rec.on_fence_added(&FenceAddedEvent {
            token: "scanout",
            block_id: 4,
            stage: FenceStage::Egress,
            annotation: "release",
        });
        rec.on_block_resolved(&BlockResolvedEvent {
            token: "scanout",
            block_id: 4,
            ingress: SignalTime::Signaled(TimePoint(10)),
            egress: SignalTime::Invalid,
            access_count: 2,
        });
        rec.on_violation(&ViolationEvent {
            token: "scanout",
            block_id: 4,
            kind: ViolationKind::InvalidAccess,
            annotation: "blit",
            observed: SignalTime::Invalid,
            reference: SignalTime::Signaled(TimePoint(10)),
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(
            events,
            vec![
                RecordedEvent::FenceAdded {
                    block_id: 4,
                    stage: FenceStage::Egress,
                },
                RecordedEvent::BlockResolved {
                    block_id: 4,
                    ingress: SignalTime::Signaled(TimePoint(10)),
                    egress: SignalTime::Invalid,
                    access_count: 2,
                },
                RecordedEvent::Violation {
                    block_id: 4,
                    kind: ViolationKind::InvalidAccess,
                    observed: SignalTime::Invalid,
                    reference: SignalTime::Signaled(TimePoint(10)),
                },
            ]
        );
    }

    #[test]
    fn mixed_sequence_keeps_order() {
        let mut rec = RecorderSink::new();
        rec.on_frame_target(&sample_target());
        rec.on_clobber(&ClobberEvent {
            token: "t",
            block_id: 1,
        });
        rec.on_present_fence(&PresentFenceEvent {
            display: DisplayId(3),
            vsync_id: VsyncId(17),
            expected_present_time: TimePoint::from_millis(111),
        });
        rec.on_frame_end(&FrameEndEvent {
            display: DisplayId(3),
            vsync_id: VsyncId(17),
            coverage: CompositionCoverageFlags::HWC | CompositionCoverageFlags::GPU,
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], RecordedEvent::FrameTarget(_)));
        assert_eq!(events[1], RecordedEvent::Clobber { block_id: 1 });
        assert!(matches!(events[2], RecordedEvent::PresentFence(_)));
        let RecordedEvent::FrameEnd(end) = &events[3] else {
            panic!("expected FrameEnd, got {:?}", events[3]);
        };
        assert_eq!(
            end.coverage,
            CompositionCoverageFlags::HWC | CompositionCoverageFlags::GPU
        );
    }

    #[test]
    fn decode_empty() {
        assert_eq!(decode(&[]).count(), 0);
    }

    #[test]
    fn decode_stops_on_unknown_tag() {
        let mut rec = RecorderSink::new();
        rec.on_clobber(&ClobberEvent {
            token: "t",
            block_id: 5,
        });
        let mut bytes = rec.into_bytes();
        bytes.push(0xFF);
        rec = RecorderSink::new();
        rec.on_clobber(&ClobberEvent {
            token: "t",
            block_id: 6,
        });
        bytes.extend_from_slice(rec.as_bytes());

        let events: Vec<_> = decode(&bytes).collect();
        assert_eq!(events, vec![RecordedEvent::Clobber { block_id: 5 }]);
    }

    #[test]
    fn decode_stops_on_truncated_record() {
        let mut rec = RecorderSink::new();
        rec.on_frame_target(&sample_target());
        let bytes = rec.into_bytes();

        assert_eq!(decode(&bytes[..bytes.len() - 1]).count(), 0);
    }

    #[test]
    fn timestamps_anchor_on_event_times() {
        let target = RecordedEvent::FrameTarget(sample_target());
        assert_eq!(target.timestamp(), Some(TimePoint::from_millis(100)));

        let resolved = RecordedEvent::BlockResolved {
            block_id: 1,
            ingress: SignalTime::Signaled(TimePoint(5)),
            egress: SignalTime::Pending,
            access_count: 0,
        };
        assert_eq!(resolved.timestamp(), None);
        assert_eq!(RecordedEvent::Clobber { block_id: 1 }.timestamp(), None);
    }
}
