//! Page-aligned I/O buffers.
//!
//! `O_DIRECT` transfers need the user buffer aligned to the device's
//! logical block size. Over-allocating by one alignment unit and slicing
//! at the first aligned address gives that without a custom allocator.

use crate::error::MeasureError;

/// Alignment of every buffer handed to the kernel.
pub const IO_ALIGN: usize = 4096;

/// A zero-filled byte buffer whose usable region starts on an
/// [`IO_ALIGN`] boundary.
#[derive(Debug)]
pub struct AlignedBuffer {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuffer {
    /// Allocate `len` zeroed bytes, reporting allocation failure instead
    /// of aborting.
    pub fn zeroed(len: usize) -> Result<Self, MeasureError> {
        let capacity = len
            .checked_add(IO_ALIGN)
            .ok_or(MeasureError::Allocation { size: len })?;
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| MeasureError::Allocation { size: len })?;
        storage.resize(capacity, 0);

        let offset = storage.as_ptr().align_offset(IO_ALIGN);
        if offset > IO_ALIGN {
            return Err(MeasureError::Allocation { size: len });
        }

        Ok(Self {
            storage,
            offset,
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}
