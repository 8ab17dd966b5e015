// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fence handles and lazily resolved signal times.
//!
//! A fence marks a future point in time, such as "this buffer may now be
//! read" or "this frame reached the screen". The core never waits on one: it
//! only polls [`Fence::signal_time`], which must return
//! [`SignalTime::Pending`] instead of blocking.
//!
//! - [`Fence`]: the raw, platform-provided fence.
//! - [`FenceTime`]: wraps a raw fence and caches its signal time once it is
//!   no longer pending.
//! - [`FenceTimePtr`]: a shared handle to a [`FenceTime`], with
//!   [`FenceTimePtr::NO_FENCE`] meaning "no dependency".
//! - [`ManualFence`]: a raw fence signalled by hand, for simulations and
//!   tests.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicI64, Ordering};

use crate::time::{Duration, TimePoint};

/// Signal state of a fence at the moment it was polled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalTime {
    /// Not signalled yet.
    Pending,
    /// No usable timestamp: the fence is absent or signalled with an error.
    Invalid,
    /// Signalled at the given time.
    Signaled(TimePoint),
}

impl SignalTime {
    /// Raw encoding of [`SignalTime::Pending`].
    pub const RAW_PENDING: i64 = i64::MAX;
    /// Raw encoding of [`SignalTime::Invalid`].
    pub const RAW_INVALID: i64 = -1;

    /// Returns `true` while the fence has not signalled.
    #[inline]
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns the signal time if the fence signalled with a usable timestamp.
    #[inline]
    #[must_use]
    pub const fn timestamp(self) -> Option<TimePoint> {
        match self {
            Self::Signaled(t) => Some(t),
            Self::Pending | Self::Invalid => None,
        }
    }

    /// Returns `true` if this carries a usable timestamp.
    #[inline]
    #[must_use]
    pub const fn is_valid_timestamp(self) -> bool {
        matches!(self, Self::Signaled(_))
    }

    /// Decodes the raw encoding used by sync-file style APIs: `i64::MAX` is
    /// pending, negative values are invalid.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        if raw == Self::RAW_PENDING {
            Self::Pending
        } else if raw < 0 {
            Self::Invalid
        } else {
            Self::Signaled(TimePoint(raw))
        }
    }

    /// Inverse of [`from_raw`](Self::from_raw).
    #[inline]
    #[must_use]
    pub const fn to_raw(self) -> i64 {
        match self {
            Self::Pending => Self::RAW_PENDING,
            Self::Invalid => Self::RAW_INVALID,
            Self::Signaled(t) => t.0,
        }
    }
}

/// A platform fence that can be polled for its signal time.
pub trait Fence: Send + Sync + fmt::Debug {
    /// Polls the fence. Must not block.
    fn signal_time(&self) -> SignalTime;

    /// Polls the fence, allowing the implementation to wait up to `grace`
    /// for a fence that is about to fire.
    ///
    /// The default never waits.
    fn wait(&self, grace: Duration) -> SignalTime {
        _ = grace;
        self.signal_time()
    }
}

/// A raw fence paired with its cached signal time.
///
/// Once the raw fence reports anything other than
/// [`Pending`](SignalTime::Pending) the result is cached and the raw fence is
/// not polled again.
pub struct FenceTime {
    fence: Arc<dyn Fence>,
    cached: AtomicI64,
}

impl FenceTime {
    /// Wraps a raw fence.
    #[must_use]
    pub fn new(fence: Arc<dyn Fence>) -> Self {
        Self {
            fence,
            cached: AtomicI64::new(SignalTime::RAW_PENDING),
        }
    }

    /// Polls the fence, updating the cache once it resolves.
    pub fn signal_time(&self) -> SignalTime {
        let cached = self.cached_signal_time();
        if !cached.is_pending() {
            return cached;
        }
        self.store(self.fence.signal_time())
    }

    /// Like [`signal_time`](Self::signal_time), but lets the raw fence wait
    /// up to `grace`.
    pub fn wait(&self, grace: Duration) -> SignalTime {
        let cached = self.cached_signal_time();
        if !cached.is_pending() {
            return cached;
        }
        self.store(self.fence.wait(grace))
    }

    /// Returns the last observed signal time without polling.
    #[must_use]
    pub fn cached_signal_time(&self) -> SignalTime {
        SignalTime::from_raw(self.cached.load(Ordering::Acquire))
    }

    fn store(&self, observed: SignalTime) -> SignalTime {
        if !observed.is_pending() {
            self.cached.store(observed.to_raw(), Ordering::Release);
        }
        observed
    }
}

impl fmt::Debug for FenceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FenceTime")
            .field("fence", &self.fence)
            .field("cached", &self.cached_signal_time())
            .finish()
    }
}

/// Shared handle to a [`FenceTime`].
///
/// Clones refer to the same fence; equality is identity. The default value is
/// [`NO_FENCE`](Self::NO_FENCE).
#[derive(Clone, Default)]
pub struct FenceTimePtr(Option<Arc<FenceTime>>);

impl FenceTimePtr {
    /// The absent fence. Reports [`SignalTime::Invalid`].
    pub const NO_FENCE: Self = Self(None);

    /// Wraps a raw fence in a fresh [`FenceTime`].
    #[must_use]
    pub fn new(fence: Arc<dyn Fence>) -> Self {
        Self(Some(Arc::new(FenceTime::new(fence))))
    }

    /// Returns `false` for [`NO_FENCE`](Self::NO_FENCE).
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Polls the fence. See [`FenceTime::signal_time`].
    #[must_use]
    pub fn signal_time(&self) -> SignalTime {
        self.0
            .as_ref()
            .map_or(SignalTime::Invalid, |fence| fence.signal_time())
    }

    /// Polls the fence with a grace period. See [`FenceTime::wait`].
    #[must_use]
    pub fn wait(&self, grace: Duration) -> SignalTime {
        self.0
            .as_ref()
            .map_or(SignalTime::Invalid, |fence| fence.wait(grace))
    }

    /// Last observed signal time, without polling.
    #[must_use]
    pub fn cached_signal_time(&self) -> SignalTime {
        self.0
            .as_ref()
            .map_or(SignalTime::Invalid, |fence| fence.cached_signal_time())
    }
}

impl PartialEq for FenceTimePtr {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Eq for FenceTimePtr {}

impl fmt::Debug for FenceTimePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(fence) => write!(f, "FenceTimePtr({:?})", fence.cached_signal_time()),
            None => f.write_str("NO_FENCE"),
        }
    }
}

/// A raw fence that is signalled by hand.
///
/// Starts pending. [`signal`](Self::signal) and [`fail`](Self::fail) may be
/// called from any thread.
#[derive(Debug)]
pub struct ManualFence {
    raw: AtomicI64,
}

impl Default for ManualFence {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFence {
    /// Creates a pending fence.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: AtomicI64::new(SignalTime::RAW_PENDING),
        }
    }

    /// Creates a fence that already signalled at `t`.
    #[must_use]
    pub const fn signaled_at(t: TimePoint) -> Self {
        Self {
            raw: AtomicI64::new(t.0),
        }
    }

    /// Signals the fence at `t`.
    pub fn signal(&self, t: TimePoint) {
        self.raw.store(t.0, Ordering::Release);
    }

    /// Signals the fence with an error, leaving no usable timestamp.
    pub fn fail(&self) {
        self.raw.store(SignalTime::RAW_INVALID, Ordering::Release);
    }
}

impl Fence for ManualFence {
    fn signal_time(&self) -> SignalTime {
        SignalTime::from_raw(self.raw.load(Ordering::Acquire))
    }
}
