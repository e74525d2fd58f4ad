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
use std::{fmt, marker::PhantomData, sync::Arc};

use bytemuck::Pod;

use super::{Arena, ArenaError, Region};

struct Inner<T> {
    arena: Arena,
    region: Option<Region>,
    len: usize,
    _element: PhantomData<T>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            self.arena.free(region);
        }
    }
}

/// A fixed-length, reference-counted buffer living in an [`Arena`] region.
///
/// Clones share the same storage. The region is released when the last clone is
/// dropped. Every access is bounds checked against the length given at creation.
/// Accesses lock the arena, so closures passed to [`SharedBuffer::with`] and
/// [`SharedBuffer::with_mut`] must not touch another buffer.
pub struct SharedBuffer<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Pod> SharedBuffer<T> {
    /// Creates a zeroed buffer of `count` elements.
    pub fn make(count: usize, arena: &Arena) -> Result<SharedBuffer<T>, ArenaError> {
        let region = arena.allocate_array::<T>(count)?;
        Ok(SharedBuffer {
            inner: Arc::new(Inner {
                arena: arena.clone(),
                region: Some(region),
                len: count,
                _element: PhantomData,
            }),
        })
    }

    /// Reads one element.
    pub fn get(&self, index: usize) -> Option<T> {
        self.with(|data| data.get(index).copied())
    }

    /// Writes one element.
    pub fn set(&self, index: usize, value: T) -> Result<(), ArenaError> {
        self.with_mut(|data| {
            let len = data.len();
            match data.get_mut(index) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(ArenaError::OutOfBounds { index, len }),
            }
        })
    }

    /// Sets every element to `value`.
    pub fn fill(&self, value: T) {
        self.with_mut(|data| data.fill(value));
    }

    /// Copies `src` into the buffer starting at `offset`.
    pub fn copy_from(&self, offset: usize, src: &[T]) -> Result<(), ArenaError> {
        self.with_mut(|data| {
            let len = data.len();
            let end = offset + src.len();
            if end > len {
                return Err(ArenaError::OutOfBounds {
                    index: end.saturating_sub(1),
                    len,
                });
            }
            data[offset..end].copy_from_slice(src);
            Ok(())
        })
    }

    /// Copies out of the buffer starting at `offset` until `dst` is full.
    pub fn copy_to(&self, offset: usize, dst: &mut [T]) -> Result<(), ArenaError> {
        self.with(|data| {
            let len = data.len();
            let end = offset + dst.len();
            if end > len {
                return Err(ArenaError::OutOfBounds {
                    index: end.saturating_sub(1),
                    len,
                });
            }
            dst.copy_from_slice(&data[offset..end]);
            Ok(())
        })
    }

    /// Runs `f` with read access to the whole buffer.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.with_mut(|data| f(data))
    }

    /// Runs `f` with write access to the whole buffer.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [T]) -> R) -> R {
        match &self.inner.region {
            Some(region) => self.inner.arena.with_region(region, f),
            None => f(&mut []),
        }
    }
}

impl<T> SharedBuffer<T> {
    /// Number of elements.
    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Number of live handles to this buffer.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// True if both handles view the same storage.
    pub fn ptr_eq(&self, other: &SharedBuffer<T>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Clone for SharedBuffer<T> {
    fn clone(&self) -> Self {
        SharedBuffer {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for SharedBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("len", &self.len())
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
