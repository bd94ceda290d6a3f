//! # Jedi Core
//!
//! Level-lifetime memory for the Jedi runtime:
//! - Block-based regions with O(block count) bulk clear
//! - Chunked slot arrays whose elements never move
//! - Doubly-linked item lists that tolerate deletion mid-iteration
//!
//! ## Architecture Rules
//!
//! 1. **No raw pointers** - Every allocation is addressed by a `Copy` handle
//! 2. **Explicit ownership** - The region is passed to every call that
//!    touches storage; nothing holds a back-reference
//! 3. **Stale handles fail loudly** - Cleared regions and freed slots are
//!    detected, logged and reported as errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use jedi_core::{ListAllocator, Region};
//!
//! let mut level = Region::new("level", 64 * 1024)?;
//! let mut elevators: ListAllocator<Elevator> = ListAllocator::new(&mut level)?;
//! let id = elevators.new_item(&mut level)?;
//! // ...
//! level.clear(); // every level allocation gone at once
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod error;
pub mod memory;

pub use error::{MemoryError, MemoryResult};
pub use memory::{
    ChunkedSlotArray, ItemId, ListAllocator, PoolAllocator, PoolHandle, Region, RegionHandle,
    SlotIndex,
};
