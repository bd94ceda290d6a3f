//! # Memory Error Types
//!
//! All errors that can occur in the region, slot and list allocators.

use thiserror::Error;

/// Errors that can occur in the memory system.
///
/// Exhaustion and misuse are programmer errors in this runtime. They are
/// logged where they are detected and handed back to the caller, which
/// decides whether to recover.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Zero-sized (or otherwise unusable) allocation request.
    #[error("invalid allocation size: {size} bytes")]
    InvalidSize {
        /// The requested size.
        size: usize,
    },

    /// A single allocation that can never fit inside one block.
    #[error("allocation of {requested} bytes exceeds block size {block_size} in region '{region}'")]
    BlockOverflow {
        /// Name of the region.
        region: String,
        /// Bytes requested (after alignment).
        requested: usize,
        /// Size of a single block.
        block_size: usize,
    },

    /// The region hit its configured byte ceiling.
    #[error("region '{region}' exhausted: requested {requested} bytes, capacity {capacity} bytes")]
    RegionExhausted {
        /// Name of the region.
        region: String,
        /// Bytes requested (after alignment).
        requested: usize,
        /// Hard ceiling of the region.
        capacity: usize,
    },

    /// Handle issued before the last `clear()` of its region.
    #[error("stale handle: epoch {handle_epoch}, region epoch {region_epoch}")]
    StaleHandle {
        /// Epoch stored in the handle.
        handle_epoch: u32,
        /// Current epoch of the region.
        region_epoch: u32,
    },

    /// Handle that does not describe memory owned by the region.
    #[error("invalid handle: block {block}, offset {offset}, len {len}")]
    InvalidHandle {
        /// Block index stored in the handle.
        block: usize,
        /// Byte offset stored in the handle.
        offset: usize,
        /// Length stored in the handle.
        len: usize,
    },

    /// Slot index at or beyond the high-water mark.
    #[error("slot {index} out of range (high water {high_water})")]
    SlotOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of slots ever handed out.
        high_water: u32,
    },

    /// A slot was released while already on the free-list.
    #[error("slot {0} freed twice")]
    DoubleFree(u32),

    /// List item that is not currently linked.
    #[error("list item {0} is not live")]
    StaleItem(u32),

    /// Item or element size outside the supported range.
    #[error("invalid item size {size} bytes (supported: 1..={max})")]
    InvalidItemSize {
        /// The element size.
        size: usize,
        /// Maximum supported size.
        max: usize,
    },

    /// Element type needs stricter alignment than regions provide.
    #[error("unsupported alignment {align} (regions align to {max})")]
    UnsupportedAlignment {
        /// Alignment required by the type.
        align: usize,
        /// Alignment provided by regions.
        max: usize,
    },

    /// Snapshot header does not describe a compatible array.
    #[error("snapshot mismatch: {0}")]
    SnapshotMismatch(String),

    /// Reading or writing a snapshot stream failed.
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
