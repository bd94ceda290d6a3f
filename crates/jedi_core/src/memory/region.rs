//! # Region Allocator
//!
//! A block-based arena for allocations that share one lifetime: the whole
//! game, one level, or one level's resources.
//!
//! Allocations are bump-allocated out of fixed-size blocks. Individual
//! allocations may be freed or resized, but the region is built for bulk
//! release: [`Region::clear`] drops every allocation at once without
//! visiting them.
//!
//! ```text
//! Region "level" (block_size = 64 KiB, max = 8 MiB)
//! ├── Block 0  [alloc|alloc|free|alloc|........top.........]
//! ├── Block 1  [alloc|alloc|.............top...............]
//! └── ...      appended on demand, never moved
//! ```

use std::fmt;

use tracing::{debug, error, trace};

use crate::error::{MemoryError, MemoryResult};

/// Alignment (in bytes) of every allocation handed out by a region.
pub const ALLOC_ALIGN: usize = 8;

/// Default hard ceiling for a single region (8 MiB).
pub const DEFAULT_MAX_BYTES: usize = 8 * 1024 * 1024;

/// Rounds `size` up to [`ALLOC_ALIGN`].
#[inline]
const fn align_up(size: usize) -> Option<usize> {
    match size.checked_add(ALLOC_ALIGN - 1) {
        Some(v) => Some(v & !(ALLOC_ALIGN - 1)),
        None => None,
    }
}

/// Location of one allocation inside a [`Region`].
///
/// Handles are plain values. They stay valid until the allocation is freed,
/// relocated by [`Region::realloc`], or the region is cleared. Clearing bumps
/// the region epoch, so handles from before a clear are rejected instead of
/// aliasing new allocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[must_use]
pub struct RegionHandle {
    block: u32,
    offset: u32,
    len: u32,
    epoch: u32,
}

impl RegionHandle {
    /// Requested length of the allocation in bytes.
    #[inline]
    #[must_use]
    pub const fn len(self) -> usize {
        self.len as usize
    }

    /// Whether the allocation is zero-length. Regions never hand these out.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// Region epoch at the time of allocation.
    #[inline]
    #[must_use]
    pub const fn epoch(self) -> u32 {
        self.epoch
    }

    /// Index of the block holding the allocation.
    #[inline]
    #[must_use]
    pub const fn block(self) -> usize {
        self.block as usize
    }

    /// Byte offset of the allocation inside its block.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.offset as usize
    }

    /// Bytes actually reserved in the block (length rounded to alignment).
    #[inline]
    const fn reserved(self) -> usize {
        (self.len as usize + ALLOC_ALIGN - 1) & !(ALLOC_ALIGN - 1)
    }
}

impl fmt::Display for RegionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RegionHandle(block={}, off={}, len={}, epoch={})",
            self.block, self.offset, self.len, self.epoch
        )
    }
}

/// A freed range inside a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Span {
    offset: usize,
    len: usize,
}

/// One fixed-size chunk of region memory.
///
/// Backed by `u64` words so every offset that is a multiple of
/// [`ALLOC_ALIGN`] is suitably aligned for `bytemuck` casts.
struct Block {
    words: Box<[u64]>,
    /// Bump pointer in bytes.
    top: usize,
    /// Freed ranges below `top`, reused first-fit.
    freed: Vec<Span>,
    /// Bytes currently handed out.
    live: usize,
}

impl Block {
    fn new(size: usize) -> Self {
        Self {
            words: vec![0u64; size / ALLOC_ALIGN].into_boxed_slice(),
            top: 0,
            freed: Vec::new(),
            live: 0,
        }
    }

    fn size(&self) -> usize {
        self.words.len() * ALLOC_ALIGN
    }

    fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }

    /// Reserves `len` aligned bytes, preferring freed ranges over the bump pointer.
    fn try_reserve(&mut self, len: usize) -> Option<usize> {
        if let Some(pos) = self.freed.iter().position(|span| span.len >= len) {
            let span = &mut self.freed[pos];
            let offset = span.offset;
            if span.len == len {
                self.freed.swap_remove(pos);
            } else {
                span.offset += len;
                span.len -= len;
            }
            self.live += len;
            return Some(offset);
        }

        if self.size() - self.top < len {
            return None;
        }
        let offset = self.top;
        self.top += len;
        self.live += len;
        Some(offset)
    }

    /// Grows the topmost allocation in place.
    fn try_extend(&mut self, offset: usize, old_len: usize, new_len: usize) -> bool {
        if offset + old_len != self.top || offset + new_len > self.size() {
            return false;
        }
        self.top = offset + new_len;
        self.live += new_len - old_len;
        true
    }

    fn release(&mut self, offset: usize, len: usize) {
        self.live -= len;
        if offset + len != self.top {
            self.freed.push(Span { offset, len });
            return;
        }

        // Topmost allocation: roll the bump pointer back over any freed
        // ranges that now touch it.
        self.top = offset;
        loop {
            let top = self.top;
            let Some(pos) = self.freed.iter().position(|span| span.offset + span.len == top) else {
                break;
            };
            self.top = self.freed.swap_remove(pos).offset;
        }
    }

    /// Whether any byte of the range is already free.
    fn is_released(&self, offset: usize, len: usize) -> bool {
        offset + len > self.top
            || self
                .freed
                .iter()
                .any(|span| offset < span.offset + span.len && span.offset < offset + len)
    }

    fn reset(&mut self) {
        self.top = 0;
        self.freed.clear();
        self.live = 0;
    }
}

/// A growable arena of fixed-size blocks.
///
/// # Thread Safety
///
/// Regions are NOT thread-safe. The whole runtime runs on one logical
/// update thread.
///
/// # Example
///
/// ```rust,ignore
/// let mut level = Region::new("level", 64 * 1024)?;
///
/// let handle = level.alloc(128)?;
/// level.bytes_mut(handle)?[0] = 7;
///
/// // Level unload: every handle from this region becomes stale.
/// level.clear();
/// ```
pub struct Region {
    name: String,
    block_size: usize,
    max_blocks: usize,
    blocks: Vec<Block>,
    epoch: u32,
}

impl Region {
    /// Creates a region with one block of `block_size` bytes and the default
    /// 8 MiB ceiling.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidSize`] if `block_size` is zero or does
    /// not fit in 32 bits.
    pub fn new(name: &str, block_size: usize) -> MemoryResult<Self> {
        Self::with_limit(name, block_size, DEFAULT_MAX_BYTES.max(block_size))
    }

    /// Creates a region with an explicit byte ceiling.
    ///
    /// # Arguments
    ///
    /// * `name` - Name used in log lines and errors
    /// * `block_size` - Size of each block; rounded up to [`ALLOC_ALIGN`]
    /// * `max_bytes` - Hard ceiling; the region never holds more than
    ///   `max_bytes / block_size` blocks
    ///
    /// # Errors
    ///
    /// Returns an error if the block size is unusable or larger than the
    /// ceiling.
    pub fn with_limit(name: &str, block_size: usize, max_bytes: usize) -> MemoryResult<Self> {
        let Some(block_size) = align_up(block_size).filter(|&size| size > 0 && size <= u32::MAX as usize)
        else {
            error!(region = name, block_size, "invalid region block size");
            return Err(MemoryError::InvalidSize { size: block_size });
        };

        if max_bytes < block_size {
            error!(region = name, block_size, max_bytes, "region ceiling below one block");
            return Err(MemoryError::RegionExhausted {
                region: name.to_owned(),
                requested: block_size,
                capacity: max_bytes,
            });
        }

        let max_blocks = (max_bytes / block_size).min(u32::MAX as usize);
        debug!(region = name, block_size, max_blocks, "region created");

        Ok(Self {
            name: name.to_owned(),
            block_size,
            max_blocks,
            blocks: vec![Block::new(block_size)],
            epoch: 0,
        })
    }

    /// Returns the region name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the current epoch. Incremented by every [`Region::clear`].
    #[inline]
    #[must_use]
    pub const fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Returns the size of one block in bytes.
    #[inline]
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns the hard ceiling in bytes.
    #[inline]
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_blocks * self.block_size
    }

    /// Returns the bytes currently handed out (after alignment).
    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.blocks.iter().map(|block| block.live).sum()
    }

    /// Returns the bytes currently reserved from the system.
    #[inline]
    #[must_use]
    pub fn memory_capacity(&self) -> usize {
        self.blocks.len() * self.block_size
    }

    /// Returns `(block_count, block_size)`.
    #[inline]
    #[must_use]
    pub fn block_info(&self) -> (usize, usize) {
        (self.blocks.len(), self.block_size)
    }

    /// Allocates `size` zeroed bytes.
    ///
    /// Grows the region by one block when no existing block has room.
    ///
    /// # Errors
    ///
    /// * [`MemoryError::InvalidSize`] for zero-sized requests
    /// * [`MemoryError::BlockOverflow`] if `size` exceeds the block size
    /// * [`MemoryError::RegionExhausted`] if growing would pass the ceiling
    pub fn alloc(&mut self, size: usize) -> MemoryResult<RegionHandle> {
        let reserved = self.reserved_size(size)?;
        let (block, offset) = self.reserve(reserved)?;
        self.blocks[block].bytes_mut()[offset..offset + reserved].fill(0);
        trace!(region = %self.name, block, offset, size, "alloc");
        Ok(self.handle(block, offset, size))
    }

    /// Resizes an allocation, preserving its first `min(old, new)` bytes.
    ///
    /// Shrinks and growth of the topmost allocation of a block happen in
    /// place; anything else relocates. **The returned handle is the only
    /// valid reference afterwards.**
    ///
    /// # Errors
    ///
    /// Fails for stale or foreign handles and for the same reasons as
    /// [`Region::alloc`]. On failure the original allocation is untouched.
    pub fn realloc(&mut self, handle: RegionHandle, new_size: usize) -> MemoryResult<RegionHandle> {
        self.validate_handle(handle)?;
        let new_reserved = self.reserved_size(new_size)?;
        let old_reserved = handle.reserved();
        let (block, offset) = (handle.block(), handle.offset());

        if new_reserved <= old_reserved {
            if new_reserved < old_reserved {
                self.blocks[block].release(offset + new_reserved, old_reserved - new_reserved);
            }
            return Ok(self.handle(block, offset, new_size));
        }

        if self.blocks[block].try_extend(offset, old_reserved, new_reserved) {
            self.blocks[block].bytes_mut()[offset + handle.len()..offset + new_reserved].fill(0);
            return Ok(self.handle(block, offset, new_size));
        }

        let target = self.alloc(new_size)?;
        self.copy_bytes(handle, target, handle.len());
        self.blocks[block].release(offset, old_reserved);
        trace!(region = %self.name, from = %handle, to = %target, "realloc relocated");
        Ok(target)
    }

    /// Returns an allocation to its block.
    ///
    /// # Errors
    ///
    /// Rejects stale handles, handles outside the region and (in debug
    /// builds) ranges that are already free.
    pub fn free(&mut self, handle: RegionHandle) -> MemoryResult<()> {
        self.validate_handle(handle)?;
        let block = &mut self.blocks[handle.block()];
        if cfg!(debug_assertions) && block.is_released(handle.offset(), handle.reserved()) {
            error!(region = %self.name, %handle, "region allocation freed twice");
            return Err(MemoryError::InvalidHandle {
                block: handle.block(),
                offset: handle.offset(),
                len: handle.len(),
            });
        }
        block.release(handle.offset(), handle.reserved());
        Ok(())
    }

    /// Drops every allocation at once.
    ///
    /// Cost is proportional to the block count, not the allocation count.
    /// Blocks beyond the first are returned to the system and every
    /// outstanding handle becomes stale.
    pub fn clear(&mut self) {
        let released = self.blocks.len().saturating_sub(1);
        self.blocks.truncate(1);
        if let Some(first) = self.blocks.first_mut() {
            first.reset();
        }
        self.epoch = self.epoch.wrapping_add(1);
        debug!(region = %self.name, released_blocks = released, epoch = self.epoch, "region cleared");
    }

    /// Returns the bytes of an allocation.
    ///
    /// # Errors
    ///
    /// Rejects stale handles and handles outside the region.
    pub fn bytes(&self, handle: RegionHandle) -> MemoryResult<&[u8]> {
        self.validate_handle(handle)?;
        let start = handle.offset();
        Ok(&self.blocks[handle.block()].bytes()[start..start + handle.len()])
    }

    /// Returns the bytes of an allocation mutably.
    ///
    /// # Errors
    ///
    /// Rejects stale handles and handles outside the region.
    pub fn bytes_mut(&mut self, handle: RegionHandle) -> MemoryResult<&mut [u8]> {
        self.validate_handle(handle)?;
        let start = handle.offset();
        Ok(&mut self.blocks[handle.block()].bytes_mut()[start..start + handle.len()])
    }

    fn handle(&self, block: usize, offset: usize, len: usize) -> RegionHandle {
        RegionHandle {
            block: block as u32,
            offset: offset as u32,
            len: len as u32,
            epoch: self.epoch,
        }
    }

    fn reserved_size(&self, size: usize) -> MemoryResult<usize> {
        if size == 0 || size > u32::MAX as usize {
            return Err(MemoryError::InvalidSize { size });
        }
        let reserved = align_up(size).ok_or(MemoryError::InvalidSize { size })?;
        if reserved > self.block_size {
            error!(
                region = %self.name,
                requested = reserved,
                block_size = self.block_size,
                "allocation larger than a region block"
            );
            return Err(MemoryError::BlockOverflow {
                region: self.name.clone(),
                requested: reserved,
                block_size: self.block_size,
            });
        }
        Ok(reserved)
    }

    fn reserve(&mut self, reserved: usize) -> MemoryResult<(usize, usize)> {
        for (index, block) in self.blocks.iter_mut().enumerate() {
            if let Some(offset) = block.try_reserve(reserved) {
                return Ok((index, offset));
            }
        }

        if self.blocks.len() >= self.max_blocks {
            error!(
                region = %self.name,
                requested = reserved,
                used = self.memory_used(),
                capacity = self.max_bytes(),
                "region exhausted"
            );
            return Err(MemoryError::RegionExhausted {
                region: self.name.clone(),
                requested: reserved,
                capacity: self.max_bytes(),
            });
        }

        let mut block = Block::new(self.block_size);
        let Some(offset) = block.try_reserve(reserved) else {
            return Err(MemoryError::BlockOverflow {
                region: self.name.clone(),
                requested: reserved,
                block_size: self.block_size,
            });
        };
        self.blocks.push(block);
        debug!(
            region = %self.name,
            blocks = self.blocks.len(),
            capacity = self.memory_capacity(),
            "region grew"
        );
        Ok((self.blocks.len() - 1, offset))
    }

    fn validate_handle(&self, handle: RegionHandle) -> MemoryResult<()> {
        if handle.epoch != self.epoch {
            return Err(MemoryError::StaleHandle {
                handle_epoch: handle.epoch,
                region_epoch: self.epoch,
            });
        }
        let in_bounds = self
            .blocks
            .get(handle.block())
            .is_some_and(|block| handle.offset() + handle.reserved() <= block.top);
        if handle.is_empty() || !in_bounds {
            return Err(MemoryError::InvalidHandle {
                block: handle.block(),
                offset: handle.offset(),
                len: handle.len(),
            });
        }
        Ok(())
    }

    fn copy_bytes(&mut self, from: RegionHandle, to: RegionHandle, len: usize) {
        let (src, dst) = (from.block(), to.block());
        let source = from.offset()..from.offset() + len;
        let target = to.offset()..to.offset() + len;
        if src == dst {
            self.blocks[src].bytes_mut().copy_within(source, to.offset());
        } else if src < dst {
            let (low, high) = self.blocks.split_at_mut(dst);
            high[0].bytes_mut()[target].copy_from_slice(&low[src].bytes()[source]);
        } else {
            let (low, high) = self.blocks.split_at_mut(src);
            low[dst].bytes_mut()[target].copy_from_slice(&high[0].bytes()[source]);
        }
    }
}

impl fmt::Debug for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("name", &self.name)
            .field("block_size", &self.block_size)
            .field("blocks", &self.blocks.len())
            .field("max_blocks", &self.max_blocks)
            .field("used", &self.memory_used())
            .field("epoch", &self.epoch)
            .finish()
    }
}
