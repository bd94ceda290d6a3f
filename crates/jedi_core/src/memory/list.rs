//! # List Allocator
//!
//! A doubly-linked pool of fixed-size items: elevators, triggers, queued
//! messages, animated-texture state. Items are appended at the tail and can
//! be deleted from anywhere, including from inside an iteration over the
//! same list.
//!
//! Payloads live in a [`ChunkedSlotArray`], so an item never moves. The
//! `prev`/`next` links are kept beside the payloads, indexed by the same
//! slot, and are never visible to the payload type.
//!
//! ## Iteration
//!
//! The list carries one built-in cursor. [`ListAllocator::next_item`] and
//! [`ListAllocator::prev_item`] walk it; past either end the cursor falls
//! back to the sentinel and the following call starts over from the
//! opposite end.
//!
//! ```rust,ignore
//! while let Some(id) = elevators.next_item() {
//!     if finished(id) {
//!         elevators.delete_item(id)?; // the walk continues with the successor
//!     }
//! }
//! ```

use std::fmt;

use bytemuck::Pod;
use tracing::{debug, error, warn};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::chunked::{ChunkedSlotArray, SlotIndex};
use crate::memory::region::Region;

/// Items per storage chunk.
pub const LIST_CHUNK_ITEMS: u32 = 64;

/// Identifier of an item in a [`ListAllocator`].
///
/// Ids of deleted items may be reused by later insertions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct ItemId(u32);

impl ItemId {
    /// Returns the raw id.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    #[inline]
    const fn slot(self) -> SlotIndex {
        SlotIndex::new(self.0)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item {}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Links {
    prev: Option<ItemId>,
    next: Option<ItemId>,
    live: bool,
}

/// Position of the built-in iterator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Cursor {
    /// Before the head and after the tail.
    Sentinel,
    /// On a live item.
    At(ItemId),
    /// The item under the cursor was deleted; remembers its neighbors.
    Detached {
        prev: Option<ItemId>,
        next: Option<ItemId>,
    },
}

impl Cursor {
    /// Moves the cursor off `id`, which is being unlinked from between
    /// `prev` and `next`.
    fn unlink(self, id: ItemId, prev: Option<ItemId>, next: Option<ItemId>) -> Self {
        match self {
            Self::At(current) if current == id => Self::Detached { prev, next },
            Self::Detached { prev: p, next: n } => Self::Detached {
                prev: if p == Some(id) { prev } else { p },
                next: if n == Some(id) { next } else { n },
            },
            other => other,
        }
    }
}

/// A doubly-linked pool of `T` items with a resumable cursor.
///
/// Storage comes from the [`Region`] passed to the allocating calls. The
/// list holds no back-reference to it.
#[derive(Debug)]
pub struct ListAllocator<T> {
    items: ChunkedSlotArray<T>,
    links: Vec<Links>,
    head: Option<ItemId>,
    tail: Option<ItemId>,
    count: usize,
    cursor: Cursor,
    saved: Option<Cursor>,
    ref_count: u32,
}

impl<T: Pod> ListAllocator<T> {
    /// Creates an empty list whose items are stored in `region`.
    ///
    /// # Errors
    ///
    /// * [`MemoryError::InvalidItemSize`] if `T` is zero-sized or larger than
    ///   64 KiB
    /// * [`MemoryError::BlockOverflow`] if a single item does not fit in one
    ///   of the region's blocks
    /// * any other region error while reserving the first chunk
    pub fn new(region: &mut Region) -> MemoryResult<Self> {
        let items_per_chunk = Self::items_per_chunk(region.block_size());
        let items = ChunkedSlotArray::new(items_per_chunk, 1, region)?;
        debug!(
            region = region.name(),
            item_size = ChunkedSlotArray::<T>::ELEMENT_SIZE,
            items_per_chunk,
            "list allocator created"
        );
        Ok(Self {
            items,
            links: Vec::with_capacity(LIST_CHUNK_ITEMS as usize),
            head: None,
            tail: None,
            count: 0,
            cursor: Cursor::Sentinel,
            saved: None,
            ref_count: 0,
        })
    }

    /// Releases every item's storage back to the region.
    pub fn free(self, region: &mut Region) {
        self.items.release(region);
    }

    /// Number of live items.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether the list holds no items.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether `id` names a live item.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: ItemId) -> bool {
        self.live_links(id).is_some()
    }

    /// Appends a zeroed item at the tail.
    ///
    /// # Errors
    ///
    /// Returns the region error if storage cannot grow.
    pub fn new_item(&mut self, region: &mut Region) -> MemoryResult<ItemId> {
        let id = ItemId(self.items.alloc(region)?.get());
        let index = id.0 as usize;
        if self.links.len() <= index {
            self.links.resize(index + 1, Links::default());
        }

        self.links[index] = Links {
            prev: self.tail,
            next: None,
            live: true,
        };
        match self.tail {
            Some(tail) => self.links[tail.0 as usize].next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.count += 1;
        Ok(id)
    }

    /// Unlinks and frees an item in O(1).
    ///
    /// A cursor resting on the item (or on a remembered neighbor of a
    /// previously deleted item) is moved to the item's neighbors first, so
    /// the next step of an ongoing walk lands on the survivor that followed
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::StaleItem`] if `id` is not live.
    pub fn delete_item(&mut self, id: ItemId) -> MemoryResult<()> {
        let Some(&Links { prev, next, .. }) = self.live_links(id) else {
            error!(%id, "deleting item that is not in the list");
            return Err(MemoryError::StaleItem(id.0));
        };

        match prev {
            Some(prev) => self.links[prev.0 as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.links[next.0 as usize].prev = prev,
            None => self.tail = prev,
        }

        self.cursor = self.cursor.unlink(id, prev, next);
        self.saved = self.saved.map(|saved| saved.unlink(id, prev, next));
        self.links[id.0 as usize] = Links::default();
        self.count -= 1;
        self.items.free(id.slot())
    }

    /// Returns an item's payload.
    #[must_use]
    pub fn get<'r>(&self, region: &'r Region, id: ItemId) -> Option<&'r T> {
        self.live_links(id)?;
        self.items.get(region, id.slot())
    }

    /// Returns an item's payload mutably.
    pub fn get_mut<'r>(&self, region: &'r mut Region, id: ItemId) -> Option<&'r mut T> {
        self.live_links(id)?;
        self.items.get_mut(region, id.slot())
    }

    /// Returns the item at position `index` (0 = head) and parks the cursor
    /// on it. The cursor is left alone when `index` is out of range.
    pub fn by_index(&mut self, index: usize) -> Option<ItemId> {
        let id = self.ids().nth(index)?;
        self.cursor = Cursor::At(id);
        Some(id)
    }

    /// Returns the position of `id` counted from the head.
    #[must_use]
    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.ids().position(|item| item == id)
    }

    /// Parks the cursor on the head and returns it.
    pub fn head(&mut self) -> Option<ItemId> {
        self.cursor = self.head.map_or(Cursor::Sentinel, Cursor::At);
        self.head
    }

    /// Parks the cursor on the tail and returns it.
    pub fn tail(&mut self) -> Option<ItemId> {
        self.cursor = self.tail.map_or(Cursor::Sentinel, Cursor::At);
        self.tail
    }

    /// Returns the item under the cursor without moving it.
    #[must_use]
    pub fn current(&self) -> Option<ItemId> {
        match self.cursor {
            Cursor::At(id) => Some(id),
            Cursor::Sentinel | Cursor::Detached { .. } => None,
        }
    }

    /// Advances the cursor.
    ///
    /// From the sentinel this returns the head; past the tail it returns
    /// `None` and resets to the sentinel.
    pub fn next_item(&mut self) -> Option<ItemId> {
        let next = match self.cursor {
            Cursor::Sentinel => self.head,
            Cursor::At(id) => self.live_links(id).and_then(|links| links.next),
            // Items appended since the delete follow `prev`.
            Cursor::Detached { prev, next } => next.or_else(|| match prev {
                Some(prev) => self.live_links(prev).and_then(|links| links.next),
                None => self.head,
            }),
        };
        self.cursor = next.map_or(Cursor::Sentinel, Cursor::At);
        next
    }

    /// Moves the cursor backwards. Mirror image of [`Self::next_item`].
    ///
    /// Insertion only happens at the tail, so the remembered predecessor of
    /// a deleted item is always current.
    pub fn prev_item(&mut self) -> Option<ItemId> {
        let prev = match self.cursor {
            Cursor::Sentinel => self.tail,
            Cursor::At(id) => self.live_links(id).and_then(|links| links.prev),
            Cursor::Detached { prev, .. } => prev,
        };
        self.cursor = prev.map_or(Cursor::Sentinel, Cursor::At);
        prev
    }

    /// Checkpoints the cursor so a nested walk can reuse it.
    ///
    /// There is a single checkpoint: saving again before restoring replaces
    /// the outer position.
    pub fn save_iter(&mut self) {
        if self.saved.is_some() {
            warn!("nested save_iter, outer cursor checkpoint overwritten");
        }
        self.saved = Some(self.cursor);
    }

    /// Returns the cursor to the last checkpoint and clears it.
    pub fn restore_iter(&mut self) {
        match self.saved.take() {
            Some(cursor) => self.cursor = cursor,
            None => warn!("restore_iter without a saved cursor"),
        }
    }

    /// Increments the advisory reference count and returns the new value.
    pub fn add_ref(&mut self) -> u32 {
        self.ref_count = self.ref_count.saturating_add(1);
        self.ref_count
    }

    /// Decrements the advisory reference count and returns the new value.
    ///
    /// The count never blocks deletion or [`Self::free`]; owners decide what
    /// reaching zero means.
    pub fn release(&mut self) -> u32 {
        if self.ref_count == 0 {
            warn!("list allocator released below zero references");
        }
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count
    }

    /// Current advisory reference count.
    #[inline]
    #[must_use]
    pub const fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Iterates live items from head to tail without touching the cursor.
    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        std::iter::successors(self.head, move |id| self.links.get(id.0 as usize).and_then(|links| links.next))
            .take(self.count)
    }

    /// Checks the chain: every link is mirrored, the walk from the head ends
    /// at the tail, and the count matches both the walk and the storage.
    #[must_use]
    pub fn validate(&self) -> bool {
        let mut prev: Option<ItemId> = None;
        let mut walked = 0usize;
        let mut cursor = self.head;

        while let Some(id) = cursor {
            let Some(links) = self.live_links(id) else {
                error!(%id, "list chain reaches a dead item");
                return false;
            };
            if links.prev != prev {
                error!(%id, "list prev link mismatch");
                return false;
            }
            walked += 1;
            if walked > self.count {
                error!(count = self.count, "list chain longer than its count");
                return false;
            }
            prev = Some(id);
            cursor = links.next;
        }

        if prev != self.tail || walked != self.count || self.items.len() != self.count {
            error!(walked, count = self.count, "list tail or count mismatch");
            return false;
        }
        true
    }

    /// Up to [`LIST_CHUNK_ITEMS`] items per chunk, fewer when a full chunk
    /// would not fit in one region block.
    fn items_per_chunk(block_size: usize) -> u32 {
        let item_size = ChunkedSlotArray::<T>::ELEMENT_SIZE.max(1);
        let fit = (block_size / item_size).clamp(1, LIST_CHUNK_ITEMS as usize);
        u32::try_from(fit).unwrap_or(LIST_CHUNK_ITEMS)
    }

    fn live_links(&self, id: ItemId) -> Option<&Links> {
        self.links.get(id.0 as usize).filter(|links| links.live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::Zeroable;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
    #[repr(C)]
    struct Trigger {
        sector: u32,
        flags: u32,
    }

    fn setup(items: u32) -> (Region, ListAllocator<Trigger>, Vec<ItemId>) {
        let mut region = Region::new("level", 4096).unwrap();
        let mut list: ListAllocator<Trigger> = ListAllocator::new(&mut region).unwrap();
        let ids = (0..items)
            .map(|sector| {
                let id = list.new_item(&mut region).unwrap();
                list.get_mut(&mut region, id).unwrap().sector = sector;
                id
            })
            .collect();
        (region, list, ids)
    }

    fn walk(list: &mut ListAllocator<Trigger>) -> Vec<ItemId> {
        std::iter::from_fn(|| list.next_item()).collect()
    }

    #[test]
    fn test_append_order_and_count() {
        let (region, mut list, ids) = setup(4);

        assert_eq!(list.len(), 4);
        assert_eq!(list.head(), Some(ids[0]));
        assert_eq!(list.tail(), Some(ids[3]));
        assert_eq!(list.ids().collect::<Vec<_>>(), ids);
        assert_eq!(list.get(&region, ids[2]).unwrap().sector, 2);
        assert!(list.validate());
    }

    #[test]
    fn test_delete_relinks_neighbors() {
        let (mut region, mut list, ids) = setup(5);

        list.delete_item(ids[0]).unwrap();
        list.delete_item(ids[2]).unwrap();
        list.delete_item(ids[4]).unwrap();

        assert_eq!(list.ids().collect::<Vec<_>>(), vec![ids[1], ids[3]]);
        assert_eq!(list.head(), Some(ids[1]));
        assert_eq!(list.tail(), Some(ids[3]));
        assert!(list.get(&region, ids[2]).is_none());
        assert!(list.validate());

        assert!(matches!(list.delete_item(ids[2]), Err(MemoryError::StaleItem(_))));

        // Freed slot is reused by the next insertion, at the tail.
        let again = list.new_item(&mut region).unwrap();
        assert_eq!(list.tail(), Some(again));
        assert_eq!(list.get(&region, again).unwrap().sector, 0);
    }

    #[test]
    fn test_next_restarts_from_head() {
        let (_region, mut list, ids) = setup(3);

        assert_eq!(walk(&mut list), ids);
        assert_eq!(list.next_item(), Some(ids[0]));
        assert_eq!(list.current(), Some(ids[0]));
    }

    #[test]
    fn test_prev_from_sentinel_starts_at_tail() {
        let (_region, mut list, ids) = setup(3);

        assert_eq!(list.prev_item(), Some(ids[2]));
        assert_eq!(list.prev_item(), Some(ids[1]));
        assert_eq!(list.prev_item(), Some(ids[0]));
        assert_eq!(list.prev_item(), None);
        assert_eq!(list.prev_item(), Some(ids[2]));
    }

    #[test]
    fn test_delete_current_during_walk() {
        let (_region, mut list, ids) = setup(6);
        let mut visited = Vec::new();

        while let Some(id) = list.next_item() {
            visited.push(id);
            if id.get() % 2 == 0 {
                list.delete_item(id).unwrap();
            }
        }

        assert_eq!(visited, ids);
        assert_eq!(list.len(), 3);
        assert!(list.validate());
    }

    #[test]
    fn test_delete_neighbors_of_detached_cursor() {
        let (_region, mut list, ids) = setup(5);

        assert_eq!(list.by_index(2), Some(ids[2]));
        list.delete_item(ids[2]).unwrap();
        assert_eq!(list.current(), None);
        // The remembered successor goes away too.
        list.delete_item(ids[3]).unwrap();
        assert_eq!(list.next_item(), Some(ids[4]));

        list.by_index(1);
        list.delete_item(ids[1]).unwrap();
        list.delete_item(ids[0]).unwrap();
        assert_eq!(list.prev_item(), None);
        assert_eq!(list.prev_item(), Some(ids[4]));
    }

    #[test]
    fn test_walk_reaches_items_appended_after_deleting_tail() {
        let (mut region, mut list, ids) = setup(2);

        assert_eq!(list.next_item(), Some(ids[0]));
        assert_eq!(list.next_item(), Some(ids[1]));
        list.delete_item(ids[1]).unwrap();
        let appended = list.new_item(&mut region).unwrap();
        assert_eq!(list.next_item(), Some(appended));
        assert_eq!(list.next_item(), None);

        // Same when the deleted item was the only one.
        assert_eq!(list.by_index(0), Some(ids[0]));
        list.delete_item(ids[0]).unwrap();
        list.delete_item(appended).unwrap();
        let first = list.new_item(&mut region).unwrap();
        assert_eq!(list.next_item(), Some(first));
        assert!(list.validate());
    }

    #[test]
    fn test_index_stable_until_earlier_delete() {
        let (_region, mut list, ids) = setup(5);

        assert_eq!(list.index_of(ids[3]), Some(3));
        list.delete_item(ids[4]).unwrap();
        assert_eq!(list.index_of(ids[3]), Some(3));
        list.delete_item(ids[1]).unwrap();
        assert_eq!(list.index_of(ids[3]), Some(2));
        assert_eq!(list.index_of(ids[1]), None);
        assert_eq!(list.by_index(9), None);
    }

    #[test]
    fn test_save_and_restore_iter() {
        let (_region, mut list, ids) = setup(4);

        assert_eq!(list.next_item(), Some(ids[0]));
        assert_eq!(list.next_item(), Some(ids[1]));
        list.save_iter();
        assert_eq!(walk(&mut list), vec![ids[2], ids[3]]);
        assert_eq!(walk(&mut list), ids);
        list.restore_iter();
        assert_eq!(list.next_item(), Some(ids[2]));
    }

    #[test]
    fn test_nested_save_overwrites_checkpoint() {
        let (_region, mut list, ids) = setup(4);

        list.by_index(1);
        list.save_iter();
        list.by_index(3);
        list.save_iter();
        list.head();
        list.restore_iter();
        assert_eq!(list.current(), Some(ids[3]));

        // Checkpoint consumed; restoring again leaves the cursor alone.
        list.restore_iter();
        assert_eq!(list.current(), Some(ids[3]));
    }

    #[test]
    fn test_saved_cursor_survives_delete() {
        let (_region, mut list, ids) = setup(3);

        list.by_index(1);
        list.save_iter();
        list.delete_item(ids[1]).unwrap();
        list.restore_iter();
        assert_eq!(list.next_item(), Some(ids[2]));
    }

    #[test]
    fn test_ref_count_is_advisory() {
        let (_region, mut list, ids) = setup(1);

        assert_eq!(list.add_ref(), 1);
        assert_eq!(list.add_ref(), 2);
        list.delete_item(ids[0]).unwrap();
        assert_eq!(list.release(), 1);
        assert_eq!(list.release(), 0);
        assert_eq!(list.release(), 0);
        assert_eq!(list.ref_count(), 0);
    }

    #[test]
    fn test_empty_list_iteration() {
        let mut region = Region::new("level", 1024).unwrap();
        let mut list: ListAllocator<Trigger> = ListAllocator::new(&mut region).unwrap();

        assert_eq!(list.next_item(), None);
        assert_eq!(list.prev_item(), None);
        assert_eq!(list.head(), None);
        assert!(list.is_empty());
        assert!(list.validate());
        list.free(&mut region);
    }

    #[derive(Clone, Copy, Pod, Zeroable)]
    #[repr(C)]
    struct Script {
        words: [u64; 256],
    }

    #[test]
    fn test_large_items_use_smaller_chunks() {
        let mut region = Region::new("level", 64 * 1024).unwrap();
        let mut list: ListAllocator<Script> = ListAllocator::new(&mut region).unwrap();
        assert_eq!(list.items.elems_per_chunk(), 32);

        let ids: Vec<ItemId> = (0..40).map(|_| list.new_item(&mut region).unwrap()).collect();
        list.get_mut(&mut region, ids[39]).unwrap().words[255] = 7;
        assert_eq!(list.get(&region, ids[39]).unwrap().words[255], 7);
        assert_eq!(list.len(), 40);
        assert_eq!(region.block_info().0, 2);

        // A single item larger than a block cannot be stored at all.
        let mut small = Region::new("level", 1024).unwrap();
        assert!(matches!(
            ListAllocator::<Script>::new(&mut small),
            Err(MemoryError::BlockOverflow { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_sized_items() {
        let mut region = Region::new("level", 1024).unwrap();
        let result = ListAllocator::<()>::new(&mut region);
        assert!(matches!(result, Err(MemoryError::InvalidItemSize { size: 0, .. })));
    }
}
