//! Editor-decorated packet iterators.
//!
//! A packet iterator is a cursor over the live ids of one directory plus an
//! editor that turns each packet into a typed view. It behaves like a
//! bidirectional cursor (`get`, `move_next`, `move_prev`) and also
//! implements [`Iterator`], yielding `(id, view)` pairs from the current
//! position onwards.
//!
//! [`PacketIter`] borrows the directory shared; [`PacketIterMut`] borrows it
//! exclusively and can rewrite or remove the packet under the cursor. The
//! two compare equal when they sit on the same id of the same directory.

use tile_types::{PacketId, TagId};

use crate::cursor::IdCursor;
use crate::directory::Directory;
use crate::editor::PacketEditor;
use crate::error::{PacketError, PacketResult};
use crate::manager::{PacketManager, PacketManagerMut};

/// Where an iterator currently points.
///
/// Positions compare by tag and cursor only, so a position recorded before a
/// reopen still matches one taken afterwards. They can be fed back through
/// [`SubDirManager::resume`](crate::SubDirManager::resume).
#[derive(Clone, Copy, Debug)]
pub struct Position {
    /// Address of the directory, only meaningful while the iterator's borrow
    /// lives. Iterator equality checks it; position equality does not.
    dir: usize,
    tag: TagId,
    cursor: IdCursor,
}

impl Position {
    pub(crate) fn new(dir: &Directory, cursor: IdCursor) -> Self {
        Self {
            dir: dir as *const Directory as usize,
            tag: dir.tag(),
            cursor,
        }
    }

    pub fn tag(&self) -> TagId {
        self.tag
    }

    /// Current id, `None` at end.
    pub fn id(&self) -> Option<PacketId> {
        self.cursor.current().map(PacketId::new)
    }

    pub fn is_end(&self) -> bool {
        self.cursor.is_end()
    }

    /// Same position in the very same directory object.
    fn same_place(&self, other: &Position) -> bool {
        self.dir == other.dir && self == other
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag && self.cursor == other.cursor
    }
}

impl Eq for Position {}

impl std::hash::Hash for Position {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.tag.hash(state);
        self.cursor.hash(state);
    }
}

/// Shared typed iterator over one directory's packets.
pub struct PacketIter<'a, E> {
    mgr: PacketManager<'a>,
    editor: &'a E,
    cursor: IdCursor,
}

impl<'a, E: PacketEditor> PacketIter<'a, E> {
    pub fn new(mgr: PacketManager<'a>, editor: &'a E, cursor: IdCursor) -> Self {
        Self { mgr, editor, cursor }
    }

    pub fn manager(&self) -> PacketManager<'a> {
        self.mgr
    }

    pub fn editor(&self) -> &'a E {
        self.editor
    }

    pub fn id(&self) -> Option<PacketId> {
        self.cursor.current().map(PacketId::new)
    }

    pub fn is_end(&self) -> bool {
        self.cursor.is_end()
    }

    pub fn cursor(&self) -> IdCursor {
        self.cursor
    }

    pub fn position(&self) -> Position {
        Position::new(self.mgr.directory(), self.cursor)
    }

    /// Typed view of the packet under the cursor.
    pub fn get(&self) -> PacketResult<E::View> {
        let id = self.id().ok_or_else(|| past_end(self.mgr.tag()))?;
        self.editor.decode(self.mgr.get(id)?)
    }

    pub fn move_next(&mut self) {
        self.cursor.advance(self.mgr.directory().table().ids());
    }

    /// Step back. From end this lands on the last live id.
    pub fn move_prev(&mut self) {
        self.cursor.retreat(self.mgr.directory().table().ids());
    }
}

impl<E> Clone for PacketIter<'_, E> {
    fn clone(&self) -> Self {
        Self {
            mgr: self.mgr,
            editor: self.editor,
            cursor: self.cursor,
        }
    }
}

impl<E: PacketEditor> Iterator for PacketIter<'_, E> {
    type Item = PacketResult<(PacketId, E::View)>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.id()?;
        let item = self.get().map(|view| (id, view));
        self.move_next();
        Some(item)
    }
}

impl<E> std::fmt::Debug for PacketIter<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketIter")
            .field("tag", &self.mgr.tag())
            .field("cursor", &self.cursor)
            .finish()
    }
}

/// Exclusive typed iterator over one directory's packets.
pub struct PacketIterMut<'a, E> {
    mgr: PacketManagerMut<'a>,
    editor: &'a E,
    cursor: IdCursor,
}

impl<'a, E: PacketEditor> PacketIterMut<'a, E> {
    pub fn new(mgr: PacketManagerMut<'a>, editor: &'a E, cursor: IdCursor) -> Self {
        Self { mgr, editor, cursor }
    }

    pub fn id(&self) -> Option<PacketId> {
        self.cursor.current().map(PacketId::new)
    }

    pub fn is_end(&self) -> bool {
        self.cursor.is_end()
    }

    pub fn cursor(&self) -> IdCursor {
        self.cursor
    }

    pub fn position(&self) -> Position {
        Position::new(self.mgr.directory(), self.cursor)
    }

    pub fn get(&self) -> PacketResult<E::View> {
        let id = self.id().ok_or_else(|| past_end(self.mgr.tag()))?;
        self.editor.decode(self.mgr.get(id)?)
    }

    /// Encode `view` and overwrite the packet under the cursor.
    pub fn set(&mut self, view: &E::View) -> PacketResult<()> {
        let id = self.id().ok_or_else(|| past_end(self.mgr.tag()))?;
        let bytes = self.editor.encode(view)?;
        self.mgr.set(id, bytes)
    }

    /// Remove the packet under the cursor and move to the next live id.
    pub fn remove(&mut self) -> PacketResult<()> {
        let id = self.id().ok_or_else(|| past_end(self.mgr.tag()))?;
        self.mgr.remove(id)?;
        self.cursor.resync(self.mgr.directory().table().ids());
        Ok(())
    }

    pub fn move_next(&mut self) {
        self.cursor.advance(self.mgr.directory().table().ids());
    }

    pub fn move_prev(&mut self) {
        self.cursor.retreat(self.mgr.directory().table().ids());
    }

    /// Shared iterator at the same position. Borrows `self`.
    pub fn as_shared(&self) -> PacketIter<'_, E> {
        PacketIter::new(self.mgr.reader(), self.editor, self.cursor)
    }
}

impl<E: PacketEditor> Iterator for PacketIterMut<'_, E> {
    type Item = PacketResult<(PacketId, E::View)>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.id()?;
        let item = self.get().map(|view| (id, view));
        self.move_next();
        Some(item)
    }
}

impl<E> std::fmt::Debug for PacketIterMut<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketIterMut")
            .field("tag", &self.mgr.tag())
            .field("cursor", &self.cursor)
            .finish()
    }
}

fn past_end(tag: TagId) -> PacketError {
    PacketError::InvalidArgument(format!("iterator over directory {tag} is at end"))
}

// ---------------------------------------------------------------
// Equality, including across the shared and exclusive variants
// ---------------------------------------------------------------

impl<E: PacketEditor, F: PacketEditor> PartialEq<PacketIter<'_, F>> for PacketIter<'_, E> {
    fn eq(&self, other: &PacketIter<'_, F>) -> bool {
        self.position().same_place(&other.position())
    }
}

impl<E: PacketEditor, F: PacketEditor> PartialEq<PacketIterMut<'_, F>> for PacketIter<'_, E> {
    fn eq(&self, other: &PacketIterMut<'_, F>) -> bool {
        self.position().same_place(&other.position())
    }
}

impl<E: PacketEditor, F: PacketEditor> PartialEq<PacketIter<'_, F>> for PacketIterMut<'_, E> {
    fn eq(&self, other: &PacketIter<'_, F>) -> bool {
        self.position().same_place(&other.position())
    }
}

impl<E: PacketEditor, F: PacketEditor> PartialEq<PacketIterMut<'_, F>> for PacketIterMut<'_, E> {
    fn eq(&self, other: &PacketIterMut<'_, F>) -> bool {
        self.position().same_place(&other.position())
    }
}
