//! Sub-directory management and iteration.
//!
//! Child directories are enumerated with the same cursor machinery as
//! packets, one level up. A [`DirectoryEditor`] turns each child into a
//! typed view; it is handed the child and the file's [`Storage`], which
//! every manager and iterator borrows but never owns.

use tile_types::{Compression, DataType, PacketId, TagId};
use tracing::debug;

use crate::cursor::{IdCursor, IdIter};
use crate::directory::{Directory, DirectoryConfig};
use crate::editor::PacketEditor;
use crate::error::{PacketError, PacketResult};
use crate::iter::{PacketIter, Position};
use crate::manager::{PacketManager, PacketManagerMut};
use crate::storage::Storage;

/// Produces a typed view of a child directory.
pub trait DirectoryEditor {
    type View;

    fn view(&self, dir: &Directory, storage: &Storage) -> PacketResult<Self::View>;
}

/// Summary of a directory's declaration and statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct DirectoryInfo {
    pub tag: TagId,
    pub data_type: DataType,
    pub compression: Compression,
    pub count: usize,
    pub total_size: u64,
    pub stored_size: u64,
    pub child_count: usize,
    pub compression_ratio: f64,
}

/// Editor yielding [`DirectoryInfo`].
#[derive(Clone, Copy, Debug, Default)]
pub struct InfoEditor;

impl DirectoryEditor for InfoEditor {
    type View = DirectoryInfo;

    fn view(&self, dir: &Directory, _storage: &Storage) -> PacketResult<DirectoryInfo> {
        Ok(DirectoryInfo {
            tag: dir.tag(),
            data_type: dir.data_type(),
            compression: dir.compression(),
            count: dir.count(),
            total_size: dir.total_size(),
            stored_size: dir.stored_size(),
            child_count: dir.child_count(),
            compression_ratio: dir.compression_ratio(),
        })
    }
}

/// Read-only access to the children of one directory.
#[derive(Clone, Copy)]
pub struct SubDirManager<'a> {
    dir: &'a Directory,
    storage: &'a Storage,
}

impl<'a> SubDirManager<'a> {
    pub fn new(dir: &'a Directory, storage: &'a Storage) -> Self {
        Self { dir, storage }
    }

    pub fn directory(&self) -> &'a Directory {
        self.dir
    }

    pub fn count(&self) -> usize {
        self.dir.child_count()
    }

    pub fn exist(&self, tag: TagId) -> bool {
        self.dir.has_child(tag)
    }

    pub fn begin_tag(&self) -> IdCursor {
        IdCursor::begin(self.dir.child_ids())
    }

    pub fn end_tag(&self) -> IdCursor {
        IdCursor::end()
    }

    pub fn find_tag(&self, tag: TagId) -> IdCursor {
        IdCursor::find(self.dir.child_ids(), tag.get())
    }

    /// Live child tags in ascending order.
    pub fn tags(&self) -> IdIter<'a, TagId> {
        IdIter::new(self.dir.child_ids())
    }

    pub fn child(&self, tag: TagId) -> PacketResult<&'a Directory> {
        self.dir.child(tag).ok_or(PacketError::DirectoryNotFound(tag))
    }

    /// Packet operations on child `tag`.
    pub fn packets(&self, tag: TagId) -> PacketResult<PacketManager<'a>> {
        Ok(PacketManager::new(self.child(tag)?, self.storage))
    }

    /// Children of child `tag`.
    pub fn sub_dirs(&self, tag: TagId) -> PacketResult<SubDirManager<'a>> {
        Ok(SubDirManager::new(self.child(tag)?, self.storage))
    }

    pub fn iter<E: DirectoryEditor>(&self, editor: &'a E) -> SubDirIter<'a, E> {
        SubDirIter {
            mgr: *self,
            editor,
            cursor: self.begin_tag(),
        }
    }

    /// Iterator positioned on child `tag` (at end if absent).
    pub fn find<E: DirectoryEditor>(&self, tag: TagId, editor: &'a E) -> SubDirIter<'a, E> {
        SubDirIter {
            mgr: *self,
            editor,
            cursor: self.find_tag(tag),
        }
    }

    /// Packet iterator over child `tag`, positioned directly on packet `id`.
    ///
    /// Used to resume at a previously recorded [`Position`] without walking
    /// the packets before it.
    pub fn create<E: PacketEditor>(
        &self,
        tag: TagId,
        id: PacketId,
        editor: &'a E,
    ) -> PacketResult<PacketIter<'a, E>> {
        let mgr = self.packets(tag)?;
        if !mgr.exist(id) {
            return Err(PacketError::NotFound { tag, id });
        }
        Ok(mgr.find(id, editor))
    }

    /// [`create`](Self::create) from a recorded position.
    pub fn resume<E: PacketEditor>(
        &self,
        position: &Position,
        editor: &'a E,
    ) -> PacketResult<PacketIter<'a, E>> {
        let id = position.id().ok_or_else(|| {
            PacketError::InvalidArgument("cannot resume from an end position".into())
        })?;
        self.create(position.tag(), id, editor)
    }
}

impl std::fmt::Debug for SubDirManager<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubDirManager")
            .field("tag", &self.dir.tag())
            .field("children", &self.count())
            .finish()
    }
}

/// Exclusive access to the children of one directory.
pub struct SubDirManagerMut<'a> {
    dir: &'a mut Directory,
    storage: &'a mut Storage,
}

impl<'a> SubDirManagerMut<'a> {
    pub fn new(dir: &'a mut Directory, storage: &'a mut Storage) -> Self {
        Self { dir, storage }
    }

    pub fn reader(&self) -> SubDirManager<'_> {
        SubDirManager::new(&*self.dir, &*self.storage)
    }

    /// Create a child under the lowest free tag.
    pub fn create_dir(&mut self, config: DirectoryConfig) -> PacketResult<TagId> {
        let tag = self.dir.insert_child(config)?;
        debug!(parent = %self.dir.tag(), %tag, "created directory");
        Ok(tag)
    }

    /// Create a child under a caller-chosen tag.
    pub fn create_dir_with_tag(&mut self, tag: TagId, config: DirectoryConfig) -> PacketResult<()> {
        self.dir.insert_child_at(tag, config)?;
        debug!(parent = %self.dir.tag(), %tag, "created directory");
        Ok(())
    }

    /// Remove child `tag` together with all of its packets and descendants.
    pub fn remove_dir(&mut self, tag: TagId) -> PacketResult<()> {
        let child = self
            .dir
            .take_child(tag)
            .ok_or(PacketError::DirectoryNotFound(tag))?;
        let mut slots = Vec::new();
        child.collect_slots(&mut slots);
        let freed: u64 = slots.iter().map(|s| s.len).sum();
        for slot in slots {
            self.storage.release(slot);
        }
        debug!(parent = %self.dir.tag(), %tag, freed, "removed directory");
        Ok(())
    }

    pub fn packets_mut(&mut self, tag: TagId) -> PacketResult<PacketManagerMut<'_>> {
        let child = self
            .dir
            .child_mut(tag)
            .ok_or(PacketError::DirectoryNotFound(tag))?;
        Ok(PacketManagerMut::new(child, &mut *self.storage))
    }

    pub fn sub_dirs_mut(&mut self, tag: TagId) -> PacketResult<SubDirManagerMut<'_>> {
        let child = self
            .dir
            .child_mut(tag)
            .ok_or(PacketError::DirectoryNotFound(tag))?;
        Ok(SubDirManagerMut::new(child, &mut *self.storage))
    }

    pub fn iter_mut<'s, E: DirectoryEditor>(&'s mut self, editor: &'s E) -> SubDirIterMut<'s, E> {
        let cursor = self.reader().begin_tag();
        SubDirIterMut {
            mgr: SubDirManagerMut::new(&mut *self.dir, &mut *self.storage),
            editor,
            cursor,
        }
    }

    pub fn find_mut<'s, E: DirectoryEditor>(
        &'s mut self,
        tag: TagId,
        editor: &'s E,
    ) -> SubDirIterMut<'s, E> {
        let cursor = self.reader().find_tag(tag);
        SubDirIterMut {
            mgr: SubDirManagerMut::new(&mut *self.dir, &mut *self.storage),
            editor,
            cursor,
        }
    }
}

impl std::fmt::Debug for SubDirManagerMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubDirManagerMut")
            .field("tag", &self.dir.tag())
            .field("children", &self.dir.child_count())
            .finish()
    }
}

/// Shared typed iterator over child directories.
pub struct SubDirIter<'a, E> {
    mgr: SubDirManager<'a>,
    editor: &'a E,
    cursor: IdCursor,
}

impl<'a, E: DirectoryEditor> SubDirIter<'a, E> {
    pub fn tag(&self) -> Option<TagId> {
        self.cursor.current().map(TagId::new)
    }

    pub fn is_end(&self) -> bool {
        self.cursor.is_end()
    }

    pub fn cursor(&self) -> IdCursor {
        self.cursor
    }

    pub fn get(&self) -> PacketResult<E::View> {
        let child = self.mgr.child(self.current()?)?;
        self.editor.view(child, self.mgr.storage)
    }

    /// Packet operations on the child under the cursor.
    pub fn packets(&self) -> PacketResult<PacketManager<'a>> {
        self.mgr.packets(self.current()?)
    }

    pub fn move_next(&mut self) {
        self.cursor.advance(self.mgr.dir.child_ids());
    }

    pub fn move_prev(&mut self) {
        self.cursor.retreat(self.mgr.dir.child_ids());
    }

    fn current(&self) -> PacketResult<TagId> {
        self.tag().ok_or_else(|| past_end(self.mgr.dir.tag()))
    }

    fn identity(&self) -> (usize, IdCursor) {
        (self.mgr.dir as *const Directory as usize, self.cursor)
    }
}

impl<E> Clone for SubDirIter<'_, E> {
    fn clone(&self) -> Self {
        Self {
            mgr: self.mgr,
            editor: self.editor,
            cursor: self.cursor,
        }
    }
}

impl<E: DirectoryEditor> Iterator for SubDirIter<'_, E> {
    type Item = PacketResult<(TagId, E::View)>;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.tag()?;
        let item = self.get().map(|view| (tag, view));
        self.move_next();
        Some(item)
    }
}

/// Exclusive typed iterator over child directories.
pub struct SubDirIterMut<'a, E> {
    mgr: SubDirManagerMut<'a>,
    editor: &'a E,
    cursor: IdCursor,
}

impl<'a, E: DirectoryEditor> SubDirIterMut<'a, E> {
    pub fn tag(&self) -> Option<TagId> {
        self.cursor.current().map(TagId::new)
    }

    pub fn is_end(&self) -> bool {
        self.cursor.is_end()
    }

    pub fn get(&self) -> PacketResult<E::View> {
        let reader = self.mgr.reader();
        let child = reader.child(self.current()?)?;
        self.editor.view(child, reader.storage)
    }

    /// Exclusive packet operations on the child under the cursor.
    pub fn packets_mut(&mut self) -> PacketResult<PacketManagerMut<'_>> {
        let tag = self.current()?;
        self.mgr.packets_mut(tag)
    }

    /// Remove the child under the cursor (recursively) and move on to the
    /// next live tag.
    pub fn remove(&mut self) -> PacketResult<()> {
        let tag = self.current()?;
        self.mgr.remove_dir(tag)?;
        self.cursor.resync(self.mgr.dir.child_ids());
        Ok(())
    }

    pub fn move_next(&mut self) {
        self.cursor.advance(self.mgr.dir.child_ids());
    }

    pub fn move_prev(&mut self) {
        self.cursor.retreat(self.mgr.dir.child_ids());
    }

    fn current(&self) -> PacketResult<TagId> {
        self.tag().ok_or_else(|| past_end(self.mgr.dir.tag()))
    }

    fn identity(&self) -> (usize, IdCursor) {
        (&*self.mgr.dir as *const Directory as usize, self.cursor)
    }
}

impl<E: DirectoryEditor> Iterator for SubDirIterMut<'_, E> {
    type Item = PacketResult<(TagId, E::View)>;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.tag()?;
        let item = self.get().map(|view| (tag, view));
        self.move_next();
        Some(item)
    }
}

fn past_end(tag: TagId) -> PacketError {
    PacketError::InvalidArgument(format!("sub-directory iterator of {tag} is at end"))
}

impl<E: DirectoryEditor, F: DirectoryEditor> PartialEq<SubDirIter<'_, F>> for SubDirIter<'_, E> {
    fn eq(&self, other: &SubDirIter<'_, F>) -> bool {
        self.identity() == other.identity()
    }
}

impl<E: DirectoryEditor, F: DirectoryEditor> PartialEq<SubDirIterMut<'_, F>> for SubDirIter<'_, E> {
    fn eq(&self, other: &SubDirIterMut<'_, F>) -> bool {
        self.identity() == other.identity()
    }
}

impl<E: DirectoryEditor, F: DirectoryEditor> PartialEq<SubDirIter<'_, F>> for SubDirIterMut<'_, E> {
    fn eq(&self, other: &SubDirIter<'_, F>) -> bool {
        self.identity() == other.identity()
    }
}
