// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Fixed-capacity arena used for all track memory.
//!
//! The arena models the secondary RAM bank of the hardware: one region of a fixed
//! size, carved into fixed-size blocks. Allocations take the first run of free blocks
//! large enough for the request and are returned explicitly with [`Arena::free`] or
//! [`Arena::free_value`]. The arena does no reference counting of its own; that is
//! left to [`SharedBuffer`].
//!
//! Buffers live in the region itself. Values placed with [`Arena::allocate`] are
//! handles onto such buffers; their own size is reserved in the region so the
//! capacity limit covers them too.

use std::{fmt, mem, ops::Deref, ops::DerefMut, sync::Arc};

use bytemuck::Pod;
use parking_lot::Mutex;
use tracing::{debug, error};

mod shared;

pub use shared::SharedBuffer;

/// Size of the hardware's secondary RAM bank.
pub const DEFAULT_ARENA_SIZE: usize = 524288;

/// Allocation granularity.
pub const DEFAULT_ARENA_BLOCK_SIZE: usize = 64;

/// The region is stored in words so every block starts suitably aligned.
const WORD: usize = mem::size_of::<u64>();

/// Errors raised by the arena and by buffers carved from it.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ArenaError {
    #[error("arena exhausted: requested {requested} bytes, {available} bytes available")]
    OutOfMemory { requested: usize, available: usize },

    #[error("index {index} is out of bounds for a buffer of length {len}")]
    OutOfBounds { index: usize, len: usize },
}

/// A reservation of arena blocks. Must be handed back with [`Arena::free`].
#[must_use = "regions must be returned to the arena with Arena::free"]
#[derive(Debug, PartialEq, Eq)]
pub struct Region {
    first_block: usize,
    blocks: usize,
    bytes: usize,
}

impl Region {
    /// Number of bytes that were requested for this region.
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

/// A value that is accounted against the arena. Derefs to the value.
pub struct Allocated<T> {
    value: T,
    region: Region,
}

impl<T> Allocated<T> {
    /// The region backing this value.
    pub fn region(&self) -> &Region {
        &self.region
    }
}

impl<T> Deref for Allocated<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> DerefMut for Allocated<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Allocated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocated")
            .field("value", &self.value)
            .field("region", &self.region)
            .finish()
    }
}

/// The block map behind an arena.
struct Slab {
    block_size: usize,
    /// The memory region, `block_size / WORD` words per block.
    memory: Vec<u64>,
    /// True for blocks that belong to a live region.
    in_use: Vec<bool>,
    used_blocks: usize,
    live_allocations: usize,
}

impl Slab {
    fn available(&self) -> usize {
        (self.in_use.len() - self.used_blocks) * self.block_size
    }

    fn reserve(&mut self, bytes: usize) -> Result<Region, ArenaError> {
        let blocks = bytes.div_ceil(self.block_size).max(1);

        let mut run_start = 0;
        let mut run_len = 0;
        for index in 0..self.in_use.len() {
            if self.in_use[index] {
                run_start = index + 1;
                run_len = 0;
                continue;
            }

            run_len += 1;
            if run_len == blocks {
                self.in_use[run_start..run_start + blocks].fill(true);
                self.words_mut(run_start, blocks).fill(0);
                self.used_blocks += blocks;
                self.live_allocations += 1;
                return Ok(Region {
                    first_block: run_start,
                    blocks,
                    bytes,
                });
            }
        }

        Err(ArenaError::OutOfMemory {
            requested: bytes,
            available: self.available(),
        })
    }

    fn words_mut(&mut self, first_block: usize, blocks: usize) -> &mut [u64] {
        let words = self.block_size / WORD;
        &mut self.memory[first_block * words..(first_block + blocks) * words]
    }

    /// The requested bytes of a live region.
    fn bytes_mut(&mut self, region: &Region) -> &mut [u8] {
        let bytes = region.bytes;
        let words = self.words_mut(region.first_block, region.blocks);
        &mut bytemuck::cast_slice_mut::<u64, u8>(words)[..bytes]
    }

    fn release(&mut self, region: Region) {
        let end = region.first_block + region.blocks;
        if end > self.in_use.len() || self.in_use[region.first_block..end].contains(&false) {
            error!(
                first_block = region.first_block,
                blocks = region.blocks,
                "Region does not belong to this arena, ignoring"
            );
            return;
        }

        self.in_use[region.first_block..end].fill(false);
        self.used_blocks -= region.blocks;
        self.live_allocations -= 1;
    }
}

/// A cloneable handle to a fixed-capacity arena.
#[derive(Clone)]
pub struct Arena {
    slab: Arc<Mutex<Slab>>,
}

impl Arena {
    /// Creates an arena of `capacity` bytes split into blocks of `block_size` bytes.
    /// The block size is rounded up to a multiple of eight.
    pub fn new(capacity: usize, block_size: usize) -> Arena {
        let block_size = block_size.max(WORD).next_multiple_of(WORD);
        let blocks = capacity / block_size;
        debug!(capacity, block_size, blocks, "Created arena");
        Arena {
            slab: Arc::new(Mutex::new(Slab {
                block_size,
                memory: vec![0; blocks * block_size / WORD],
                in_use: vec![false; blocks],
                used_blocks: 0,
                live_allocations: 0,
            })),
        }
    }

    /// Reserves room for `count` values of `T`.
    pub fn allocate_array<T>(&self, count: usize) -> Result<Region, ArenaError> {
        let bytes = count.saturating_mul(mem::size_of::<T>());
        self.slab.lock().reserve(bytes)
    }

    /// Places `value` in the arena.
    pub fn allocate<T>(&self, value: T) -> Result<Allocated<T>, ArenaError> {
        let region = self.slab.lock().reserve(mem::size_of::<T>())?;
        Ok(Allocated { value, region })
    }

    /// Returns a region to the arena.
    pub fn free(&self, region: Region) {
        self.slab.lock().release(region);
    }

    /// Returns a value's space to the arena and hands the value back.
    pub fn free_value<T>(&self, allocated: Allocated<T>) -> T {
        let Allocated { value, region } = allocated;
        self.free(region);
        value
    }

    /// Runs `f` over the memory of `region` viewed as `count` values of `T`.
    ///
    /// The arena stays locked while `f` runs, so `f` must not call back into it.
    pub(crate) fn with_region<T: Pod, R>(
        &self,
        region: &Region,
        f: impl FnOnce(&mut [T]) -> R,
    ) -> R {
        let mut slab = self.slab.lock();
        f(bytemuck::cast_slice_mut(slab.bytes_mut(region)))
    }

    /// Total bytes managed by the arena.
    pub fn capacity(&self) -> usize {
        let slab = self.slab.lock();
        slab.in_use.len() * slab.block_size
    }

    /// Bytes currently reserved, rounded up to whole blocks.
    pub fn used(&self) -> usize {
        let slab = self.slab.lock();
        slab.used_blocks * slab.block_size
    }

    /// Bytes that are not reserved. May be fragmented.
    pub fn available(&self) -> usize {
        self.slab.lock().available()
    }

    /// Number of regions that have not been freed.
    pub fn live_allocations(&self) -> usize {
        self.slab.lock().live_allocations
    }
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new(DEFAULT_ARENA_SIZE, DEFAULT_ARENA_BLOCK_SIZE)
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slab = self.slab.lock();
        f.debug_struct("Arena")
            .field("block_size", &slab.block_size)
            .field("blocks", &slab.in_use.len())
            .field("used_blocks", &slab.used_blocks)
            .field("live_allocations", &slab.live_allocations)
            .finish()
    }
}
