//! Lazy id sequences over a sparse id space.
//!
//! An [`IdCursor`] is a plain position: a live id or the end marker. It
//! holds no reference, so it can be stored, copied, and later handed back to
//! reposition an iterator. Moving it needs the [`IdAllocator`] it belongs to.
//! [`IdIter`] pairs a cursor range with a borrowed allocator and implements
//! the standard iterator traits.

use std::marker::PhantomData;

use crate::ids::IdAllocator;

/// Position in an id sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct IdCursor {
    at: Option<u32>,
}

impl IdCursor {
    /// Position on the first live id (or end, if there is none).
    pub fn begin(ids: &IdAllocator) -> Self {
        Self { at: ids.first() }
    }

    /// The past-the-end position.
    pub const fn end() -> Self {
        Self { at: None }
    }

    /// Position on `id` if it is live, otherwise end.
    pub fn find(ids: &IdAllocator, id: u32) -> Self {
        Self {
            at: ids.is_live(id).then_some(id),
        }
    }

    pub fn current(&self) -> Option<u32> {
        self.at
    }

    pub fn is_end(&self) -> bool {
        self.at.is_none()
    }

    /// Step to the next live id. No-op at end.
    pub fn advance(&mut self, ids: &IdAllocator) {
        if let Some(id) = self.at {
            self.at = id.checked_add(1).and_then(|n| ids.next_live(n));
        }
    }

    /// Step to the previous live id. From end, moves to the last live id;
    /// from the first id, stays put.
    pub fn retreat(&mut self, ids: &IdAllocator) {
        match self.at {
            None => self.at = ids.last(),
            Some(id) => {
                if let Some(prev) = ids.prev_live(id) {
                    self.at = Some(prev);
                }
            }
        }
    }

    /// Re-anchor after the allocator changed underneath: stays on the same
    /// id if still live, otherwise moves to the next live one.
    pub fn resync(&mut self, ids: &IdAllocator) {
        if let Some(id) = self.at {
            if !ids.is_live(id) {
                self.at = ids.next_live(id);
            }
        }
    }
}

/// Ascending sequence of live ids, converted to `K` on the way out.
///
/// Cloning an `IdIter` restarts nothing; it forks the current position.
pub struct IdIter<'a, K> {
    ids: &'a IdAllocator,
    front: Option<u32>,
    /// One past the last id still to be yielded from the back.
    back: u32,
    _key: PhantomData<fn() -> K>,
}

impl<'a, K> IdIter<'a, K> {
    pub fn new(ids: &'a IdAllocator) -> Self {
        Self::starting_at(ids, IdCursor::begin(ids))
    }

    /// Sequence from `cursor` to the end.
    pub fn starting_at(ids: &'a IdAllocator, cursor: IdCursor) -> Self {
        Self {
            ids,
            front: cursor.current(),
            back: ids.high_water(),
            _key: PhantomData,
        }
    }

    /// Current front position.
    pub fn cursor(&self) -> IdCursor {
        IdCursor { at: self.front }
    }
}

impl<K> Clone for IdIter<'_, K> {
    fn clone(&self) -> Self {
        Self {
            ids: self.ids,
            front: self.front,
            back: self.back,
            _key: PhantomData,
        }
    }
}

impl<K: From<u32>> Iterator for IdIter<'_, K> {
    type Item = K;

    fn next(&mut self) -> Option<K> {
        let id = self.front.filter(|&id| id < self.back)?;
        self.front = id.checked_add(1).and_then(|n| self.ids.next_live(n));
        Some(K::from(id))
    }
}

impl<K: From<u32>> DoubleEndedIterator for IdIter<'_, K> {
    fn next_back(&mut self) -> Option<K> {
        let front = self.front?;
        let id = self.ids.prev_live(self.back).filter(|&id| id >= front)?;
        self.back = id;
        Some(K::from(id))
    }
}

impl<K: From<u32>> std::iter::FusedIterator for IdIter<'_, K> {}
