//! # Memory Management
//!
//! Region-backed pools for everything that lives as long as the game, a
//! level, or a level's resources.
//!
//! ## Design Philosophy
//!
//! Storage is handed out as small copyable handles instead of pointers:
//! - A [`Region`] owns the bytes and can drop all of them at once
//! - A [`ChunkedSlotArray`] and a [`ListAllocator`] give stable indices
//!   on top of a region
//! - A [`PoolAllocator`] keeps generation-checked records off the region

mod chunked;
mod list;
mod pool;
mod region;

pub use chunked::{ChunkedSlotArray, SlotIndex, FREE_LIST_STEP, MAX_ELEMENT_SIZE, SNAPSHOT_HEADER_LEN};
pub use list::{ItemId, ListAllocator, LIST_CHUNK_ITEMS};
pub use pool::{PoolAllocator, PoolHandle};
pub use region::{Region, RegionHandle, ALLOC_ALIGN, DEFAULT_MAX_BYTES};
