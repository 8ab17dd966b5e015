// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Present-time targeting and fence dependency tracking for display
//! compositors.
//!
//! `fencepost_core` holds the timing decisions a compositor's scheduler makes
//! once per vsync, plus a diagnostic validator for the fences that guard
//! shared graphics buffers. It is `no_std` compatible (with `alloc`); the
//! dependency monitor needs the `std` feature for its lock.
//!
//! # Architecture
//!
//! ```text
//!   VsyncSource + BeginFrameArgs
//!       │
//!       ▼
//!   FrameTargeter::begin_frame() ──► FrameTarget (expected present time,
//!       │                             pending / missed / backpressure)
//!       ▼
//!   compose ──► set_present_fence() ──► end_frame(CompositeResult)
//!                     │
//!                     └──► present fence history (5 deep), inspected by
//!                          the next begin_frame()
//!
//!   producer ──add_ingress──►┐
//!   consumers ─add_access──► DependencyMonitor ──► TraceSink (clobbers,
//!   producer ──add_egress──►┘                       resolutions, violations)
//! ```
//!
//! **[`targeter`]**: [`FrameTargeter`](targeter::FrameTargeter) computes the
//! expected present time, detects missed frames, and decides on backpressure
//! by walking a [`ring`] of recent present fences.
//!
//! **[`dependency`]**: [`DependencyMonitor`](dependency::DependencyMonitor)
//! records ingress, access-completion, and egress fences per usage cycle and
//! reports ordering anomalies once every fence of a cycle has signalled.
//!
//! **[`fence`]**: Non-blocking fence handles with cached signal times.
//!
//! **[`ring`]**: Fixed-capacity circular history with relative indexing.
//!
//! **[`time`]** and **[`timing`]**: Nanosecond time points and durations,
//! and the per-frame inputs and outcomes.
//!
//! **[`backend`]**: The [`VsyncSource`](backend::VsyncSource) contract.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types,
//! a `log`-backed sink, and the zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables the [`dependency`] module.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![cfg_attr(not(test), no_std)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;
#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod backend;
#[cfg(any(feature = "std", test))]
pub mod dependency;
pub mod display;
pub mod fence;
pub mod ring;
pub mod targeter;
pub mod time;
pub mod timing;
pub mod trace;
