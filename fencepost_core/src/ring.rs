// Copyright 2026 the Fencepost Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fixed-capacity circular history.
//!
//! [`RingBuffer`] stores the last `N` values written through
//! [`next`](RingBuffer::next) inline, without heap allocation. Writing into a
//! full buffer overwrites the oldest slot.
//!
//! # Indexing
//!
//! Two views are provided:
//!
//! - [`get`](RingBuffer::get) / [`iter`](RingBuffer::iter) address elements
//!   oldest first: position `0` is [`front`](RingBuffer::front) and position
//!   `len() - 1` is [`back`](RingBuffer::back).
//! - `ring[k]` with `k <= 0` addresses the element `|k|` steps behind
//!   [`back`](RingBuffer::back), so `ring[0]` is the newest element and
//!   `ring[-(len() - 1)]` is the oldest.
//!
//! Out-of-range access is a caller contract violation and panics.

use core::ops::{Index, IndexMut};

/// A circular buffer holding at most `N` elements.
#[derive(Clone, Debug)]
pub struct RingBuffer<T, const N: usize> {
    slots: [T; N],
    // Slot of the newest element. Meaningless while `len == 0`.
    head: usize,
    len: usize,
}

impl<T: Default, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default, const N: usize> RingBuffer<T, N> {
    /// Creates an empty buffer, filling the inline storage with defaults.
    #[must_use]
    pub fn new() -> Self {
        const { assert!(N > 0, "ring buffer capacity must be non-zero") };
        Self {
            slots: core::array::from_fn(|_| T::default()),
            head: N - 1,
            len: 0,
        }
    }
}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Advances the write cursor and returns the slot to fill.
    ///
    /// The slot still holds whatever value it held before; callers overwrite
    /// or reset it. Once the buffer is full this is the slot of the previous
    /// [`front`](Self::front), which then advances.
    pub fn next(&mut self) -> &mut T {
        self.head = (self.head + 1) % N;
        if self.len < N {
            self.len += 1;
        }
        &mut self.slots[self.head]
    }

    /// Number of valid elements, in `0..=N`.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if nothing has been written yet.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` once `N` elements have been written.
    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// The oldest retained element.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    #[must_use]
    pub fn front(&self) -> &T {
        self.get(0)
    }

    /// The most recently written element.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    #[must_use]
    pub fn back(&self) -> &T {
        assert!(self.len > 0, "back() on an empty ring buffer");
        &self.slots[self.head]
    }

    /// The most recently written element, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is empty.
    pub fn back_mut(&mut self) -> &mut T {
        assert!(self.len > 0, "back_mut() on an empty ring buffer");
        &mut self.slots[self.head]
    }

    /// The element at oldest-first position `pos`.
    ///
    /// # Panics
    ///
    /// Panics if `pos >= len()`.
    #[must_use]
    pub fn get(&self, pos: usize) -> &T {
        &self.slots[self.slot(pos)]
    }

    /// The element at oldest-first position `pos`, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `pos >= len()`.
    pub fn get_mut(&mut self, pos: usize) -> &mut T {
        let slot = self.slot(pos);
        &mut self.slots[slot]
    }

    /// Iterates oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        (0..self.len).map(move |pos| &self.slots[self.slot(pos)])
    }

    fn slot(&self, pos: usize) -> usize {
        assert!(
            pos < self.len,
            "ring buffer position {pos} out of range for length {}",
            self.len
        );
        // `head` is the newest slot; the oldest is `len - 1` steps behind it.
        (self.head + N + 1 + pos - self.len) % N
    }

    fn relative_pos(&self, k: isize) -> usize {
        assert!(k <= 0, "ring buffer relative index must be <= 0, got {k}");
        let back = k.unsigned_abs();
        assert!(
            back < self.len,
            "ring buffer relative index {k} out of range for length {}",
            self.len
        );
        self.len - 1 - back
    }
}

impl<T, const N: usize> Index<isize> for RingBuffer<T, N> {
    type Output = T;

    fn index(&self, k: isize) -> &T {
        self.get(self.relative_pos(k))
    }
}

impl<T, const N: usize> IndexMut<isize> for RingBuffer<T, N> {
    fn index_mut(&mut self, k: isize) -> &mut T {
        let pos = self.relative_pos(k);
        self.get_mut(pos)
    }
}
