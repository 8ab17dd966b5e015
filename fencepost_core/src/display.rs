// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display identification.
//!
//! [`DisplayId`] is a lightweight handle naming the physical display a
//! [`FrameTargeter`](crate::targeter::FrameTargeter) belongs to. The
//! compositor assigns these; core only carries them into traces and dumps.

use core::fmt;

/// Identifies a physical display.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DisplayId(pub u64);

impl DisplayId {
    /// Builds an id from a connector port, the way single-port displays are
    /// usually keyed.
    #[inline]
    #[must_use]
    pub const fn from_port(port: u8) -> Self {
        Self(port as u64)
    }
}

impl fmt::Debug for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DisplayId({})", self.0)
    }
}

impl fmt::Display for DisplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
