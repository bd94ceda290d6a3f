//! # Chunked Slot Array
//!
//! Fixed-size elements grouped into fixed-capacity chunks carved out of a
//! [`Region`]. Chunks are only ever appended, so an element never moves
//! once its slot is handed out.
//!
//! ```text
//! index ──► chunks[index / per_chunk] + (index % per_chunk) * size_of::<T>()
//!
//! chunks:     [chunk 0][chunk 1][chunk 2]      (RegionHandles, append-only)
//! high_water: next never-used dense index
//! free_slots: LIFO stack of released indices
//! ```
//!
//! ## Snapshot Format
//!
//! ```text
//! [4 bytes: element size]        little-endian u32
//! [4 bytes: elements per chunk]
//! [4 bytes: chunk count]
//! [4 bytes: high-water mark]
//! [4 bytes: free slot count]
//! [chunk count × elements per chunk × element size: raw chunk bytes]
//! [free slot count × 4 bytes: free slot index, little-endian i32]
//! ```

use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::mem;

use bytemuck::Pod;
use tracing::{debug, error, trace};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::region::{Region, RegionHandle, ALLOC_ALIGN};

/// The free-slot list grows by this many entries at a time.
pub const FREE_LIST_STEP: usize = 256;

/// Largest element (or list item) size supported, in bytes.
pub const MAX_ELEMENT_SIZE: usize = 64 * 1024;

/// Size of the scalar snapshot header in bytes.
pub const SNAPSHOT_HEADER_LEN: usize = 5 * mem::size_of::<u32>();

/// Dense index of a slot in a [`ChunkedSlotArray`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlotIndex(u32);

impl SlotIndex {
    /// Creates a slot index from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the raw index.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pool of `T` values with stable storage and O(1) alloc/free.
///
/// Element storage lives in the [`Region`] passed to each call; the array
/// itself only holds chunk handles and bookkeeping. Clearing that region
/// invalidates the array (every access then fails cleanly).
///
/// # Example
///
/// ```rust,ignore
/// let mut array: ChunkedSlotArray<Sector> = ChunkedSlotArray::new(64, 1, &mut level)?;
/// let slot = array.alloc(&mut level)?;
/// array.get_mut(&mut level, slot).unwrap().floor_height = 16;
/// array.free(slot)?;
/// ```
#[derive(Debug)]
pub struct ChunkedSlotArray<T> {
    elems_per_chunk: u32,
    chunks: Vec<RegionHandle>,
    high_water: u32,
    free_slots: Vec<u32>,
    _marker: PhantomData<T>,
}

impl<T: Pod> ChunkedSlotArray<T> {
    /// Size of one element in bytes.
    pub const ELEMENT_SIZE: usize = mem::size_of::<T>();

    /// Creates an array and pre-allocates `initial_chunks` chunks.
    ///
    /// # Errors
    ///
    /// * [`MemoryError::InvalidItemSize`] for zero-sized or oversized `T`
    /// * [`MemoryError::UnsupportedAlignment`] if `T` needs more than
    ///   [`ALLOC_ALIGN`] alignment
    /// * any region allocation error for the initial chunks
    pub fn new(elems_per_chunk: u32, initial_chunks: u32, region: &mut Region) -> MemoryResult<Self> {
        let chunk_bytes = Self::chunk_bytes(elems_per_chunk)?;
        let mut array = Self {
            elems_per_chunk,
            chunks: Vec::with_capacity(initial_chunks as usize),
            high_water: 0,
            free_slots: Vec::with_capacity(FREE_LIST_STEP),
            _marker: PhantomData,
        };

        for _ in 0..initial_chunks {
            match region.alloc(chunk_bytes) {
                Ok(chunk) => array.chunks.push(chunk),
                Err(err) => {
                    array.release(region);
                    return Err(err);
                }
            }
        }

        debug!(
            region = region.name(),
            element_size = Self::ELEMENT_SIZE,
            elems_per_chunk,
            initial_chunks,
            "chunked slot array created"
        );
        Ok(array)
    }

    /// Number of live (allocated, not freed) slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.high_water as usize - self.free_slots.len()
    }

    /// Whether no slot is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of dense indices ever handed out since the last clear.
    #[inline]
    #[must_use]
    pub const fn high_water(&self) -> u32 {
        self.high_water
    }

    /// Number of chunks owned by the array.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Elements per chunk.
    #[inline]
    #[must_use]
    pub const fn elems_per_chunk(&self) -> u32 {
        self.elems_per_chunk
    }

    /// Total slots available without growing.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.elems_per_chunk as usize
    }

    /// Number of slots waiting on the free-list.
    #[inline]
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free_slots.len()
    }

    /// Whether `index` is currently on the free-list. O(free slots).
    #[must_use]
    pub fn is_free(&self, index: SlotIndex) -> bool {
        self.free_slots.contains(&index.0)
    }

    /// Whether `index` was handed out and has not been freed since.
    #[must_use]
    pub fn is_live(&self, index: SlotIndex) -> bool {
        index.0 < self.high_water && !self.is_free(index)
    }

    /// Returns every live slot in index order.
    #[must_use]
    pub fn live_slots(&self) -> Vec<SlotIndex> {
        let mut free = vec![false; self.high_water as usize];
        for &slot in &self.free_slots {
            free[slot as usize] = true;
        }
        free.iter()
            .enumerate()
            .filter_map(|(index, &is_free)| (!is_free).then_some(SlotIndex(index as u32)))
            .collect()
    }

    /// Allocates a zeroed slot.
    ///
    /// Reuses the most recently freed slot if there is one (LIFO), otherwise
    /// takes the next dense index, appending a chunk when the index crosses
    /// a chunk boundary.
    ///
    /// # Errors
    ///
    /// Returns the region error if a new chunk cannot be allocated.
    pub fn alloc(&mut self, region: &mut Region) -> MemoryResult<SlotIndex> {
        // The slot is only taken once its bytes have been zeroed, so a
        // failing region leaves the free-list and high-water mark intact.
        if let Some(&index) = self.free_slots.last() {
            self.element_bytes_mut(region, index)?.fill(0);
            self.free_slots.pop();
            return Ok(SlotIndex(index));
        }

        let index = self.high_water;
        if index == u32::MAX {
            error!(high_water = index, "chunked slot array index space exhausted");
            return Err(MemoryError::SlotOutOfRange { index, high_water: index });
        }
        if index as usize >= self.capacity() {
            let chunk = region.alloc(Self::ELEMENT_SIZE * self.elems_per_chunk as usize)?;
            self.chunks.push(chunk);
            trace!(region = region.name(), chunks = self.chunks.len(), "chunk appended");
        }

        self.high_water += 1;
        if let Err(err) = self.element_bytes_mut(region, index).map(|bytes| bytes.fill(0)) {
            self.high_water -= 1;
            return Err(err);
        }
        Ok(SlotIndex(index))
    }

    /// Returns a slot to the free-list.
    ///
    /// The slot's bytes are left untouched until it is reallocated.
    ///
    /// # Errors
    ///
    /// * [`MemoryError::SlotOutOfRange`] for indices never handed out
    /// * [`MemoryError::DoubleFree`] (debug builds only) if the slot is already free
    pub fn free(&mut self, index: SlotIndex) -> MemoryResult<()> {
        if index.0 >= self.high_water {
            error!(%index, high_water = self.high_water, "freeing slot beyond high water");
            return Err(MemoryError::SlotOutOfRange {
                index: index.0,
                high_water: self.high_water,
            });
        }
        if cfg!(debug_assertions) && self.free_slots.contains(&index.0) {
            error!(%index, "slot freed twice");
            return Err(MemoryError::DoubleFree(index.0));
        }

        if self.free_slots.len() == self.free_slots.capacity() {
            self.free_slots.reserve_exact(FREE_LIST_STEP);
        }
        self.free_slots.push(index.0);
        Ok(())
    }

    /// Zeroes every chunk and forgets all slots, keeping the chunks.
    ///
    /// # Errors
    ///
    /// Fails if the backing region was cleared underneath the array.
    pub fn clear(&mut self, region: &mut Region) -> MemoryResult<()> {
        for &chunk in &self.chunks {
            region.bytes_mut(chunk)?.fill(0);
        }
        self.free_slots.clear();
        self.high_water = 0;
        Ok(())
    }

    /// Returns the element at `index`.
    ///
    /// Freed slots below the high-water mark still resolve; callers own
    /// the live/free distinction.
    #[must_use]
    pub fn get<'r>(&self, region: &'r Region, index: SlotIndex) -> Option<&'r T> {
        let bytes = self.element_bytes(region, index.0).ok()?;
        bytemuck::try_from_bytes(bytes).ok()
    }

    /// Returns the element at `index` mutably.
    pub fn get_mut<'r>(&self, region: &'r mut Region, index: SlotIndex) -> Option<&'r mut T> {
        let bytes = self.element_bytes_mut(region, index.0).ok()?;
        bytemuck::try_from_bytes_mut(bytes).ok()
    }

    /// Returns the chunk handle and byte offset backing `index`.
    ///
    /// The pair never changes for the lifetime of the array.
    #[must_use]
    pub fn location(&self, index: SlotIndex) -> Option<(RegionHandle, usize)> {
        if index.0 >= self.high_water {
            return None;
        }
        let chunk = *self.chunks.get((index.0 / self.elems_per_chunk) as usize)?;
        let offset = (index.0 % self.elems_per_chunk) as usize * Self::ELEMENT_SIZE;
        Some((chunk, offset))
    }

    /// Writes the array to `out` in the snapshot format.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors or if the backing region was cleared.
    pub fn serialize<W: Write>(&self, region: &Region, out: &mut W) -> MemoryResult<()> {
        let header = [
            Self::ELEMENT_SIZE as u32,
            self.elems_per_chunk,
            self.chunks.len() as u32,
            self.high_water,
            self.free_slots.len() as u32,
        ];
        for field in header {
            out.write_all(&field.to_le_bytes())?;
        }

        for &chunk in &self.chunks {
            out.write_all(region.bytes(chunk)?)?;
        }

        for &slot in &self.free_slots {
            let slot = i32::try_from(slot)
                .map_err(|_| MemoryError::SnapshotMismatch(format!("free slot {slot} does not fit in i32")))?;
            out.write_all(&slot.to_le_bytes())?;
        }
        Ok(())
    }

    /// Rebuilds an array from a snapshot, allocating fresh chunks in `region`.
    ///
    /// Chunks are recreated before free-slot indices are resolved against
    /// them, so the occupied/free partition and every element byte match
    /// the serialized array.
    ///
    /// # Errors
    ///
    /// * [`MemoryError::SnapshotMismatch`] if the header does not describe a
    ///   valid array of `T`
    /// * [`MemoryError::Io`] on truncated input
    /// * any region allocation error
    pub fn restore<R: Read>(input: &mut R, region: &mut Region) -> MemoryResult<Self> {
        let element_size = read_u32(input)?;
        let elems_per_chunk = read_u32(input)?;
        let chunk_count = read_u32(input)?;
        let high_water = read_u32(input)?;
        let free_count = read_u32(input)?;

        if element_size as usize != Self::ELEMENT_SIZE {
            return Err(MemoryError::SnapshotMismatch(format!(
                "element size {element_size}, expected {}",
                Self::ELEMENT_SIZE
            )));
        }
        if u64::from(high_water) > u64::from(chunk_count) * u64::from(elems_per_chunk) {
            return Err(MemoryError::SnapshotMismatch(format!(
                "high water {high_water} beyond {chunk_count} chunks of {elems_per_chunk}"
            )));
        }
        if free_count > high_water {
            return Err(MemoryError::SnapshotMismatch(format!(
                "{free_count} free slots but high water is {high_water}"
            )));
        }

        let mut array = Self::new(elems_per_chunk, 0, region)?;
        if let Err(err) = array.read_body(input, region, chunk_count, high_water, free_count) {
            array.release(region);
            return Err(err);
        }
        Ok(array)
    }

    /// Returns every chunk to the region, consuming the array.
    ///
    /// Chunks of a region that has since been cleared are skipped.
    pub fn release(self, region: &mut Region) {
        for &chunk in self.chunks.iter().rev() {
            if let Err(err) = region.free(chunk) {
                trace!(%err, %chunk, "chunk already released");
            }
        }
    }

    fn read_body<R: Read>(
        &mut self,
        input: &mut R,
        region: &mut Region,
        chunk_count: u32,
        high_water: u32,
        free_count: u32,
    ) -> MemoryResult<()> {
        let chunk_bytes = Self::ELEMENT_SIZE * self.elems_per_chunk as usize;
        for _ in 0..chunk_count {
            let chunk = region.alloc(chunk_bytes)?;
            self.chunks.push(chunk);
            input.read_exact(region.bytes_mut(chunk)?)?;
        }
        self.high_water = high_water;

        let wanted = (free_count as usize).div_ceil(FREE_LIST_STEP) * FREE_LIST_STEP;
        self.free_slots.reserve_exact(wanted.saturating_sub(self.free_slots.capacity()));
        for _ in 0..free_count {
            let raw = read_i32(input)?;
            let slot = u32::try_from(raw)
                .ok()
                .filter(|&slot| slot < high_water)
                .ok_or_else(|| MemoryError::SnapshotMismatch(format!("free slot {raw} out of range")))?;
            self.free_slots.push(slot);
        }
        Ok(())
    }

    fn chunk_bytes(elems_per_chunk: u32) -> MemoryResult<usize> {
        let size = Self::ELEMENT_SIZE;
        if size == 0 || size > MAX_ELEMENT_SIZE {
            error!(size, max = MAX_ELEMENT_SIZE, "invalid chunked slot element size");
            return Err(MemoryError::InvalidItemSize {
                size,
                max: MAX_ELEMENT_SIZE,
            });
        }
        if mem::align_of::<T>() > ALLOC_ALIGN {
            error!(align = mem::align_of::<T>(), "chunked slot element over-aligned");
            return Err(MemoryError::UnsupportedAlignment {
                align: mem::align_of::<T>(),
                max: ALLOC_ALIGN,
            });
        }
        if elems_per_chunk == 0 {
            return Err(MemoryError::InvalidSize { size: 0 });
        }
        size.checked_mul(elems_per_chunk as usize)
            .ok_or(MemoryError::InvalidSize { size: usize::MAX })
    }

    fn element_bytes<'r>(&self, region: &'r Region, index: u32) -> MemoryResult<&'r [u8]> {
        let (chunk, offset) = self.resolve(index)?;
        Ok(&region.bytes(chunk)?[offset..offset + Self::ELEMENT_SIZE])
    }

    fn element_bytes_mut<'r>(&self, region: &'r mut Region, index: u32) -> MemoryResult<&'r mut [u8]> {
        let (chunk, offset) = self.resolve(index)?;
        Ok(&mut region.bytes_mut(chunk)?[offset..offset + Self::ELEMENT_SIZE])
    }

    fn resolve(&self, index: u32) -> MemoryResult<(RegionHandle, usize)> {
        self.location(SlotIndex(index)).ok_or(MemoryError::SlotOutOfRange {
            index,
            high_water: self.high_water,
        })
    }
}

fn read_u32<R: Read>(input: &mut R) -> MemoryResult<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(input: &mut R) -> MemoryResult<i32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}
