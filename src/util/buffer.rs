//! Buffer management and alignment for device transfers
//!
//! This module provides the page-aligned memory the device reads into and
//! writes from, and the shared command buffer every worker transfers through.

use anyhow::Context;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr;

/// Alignment of transfer buffers (one page)
pub const DMA_ALIGNMENT: usize = 4096;

const CACHE_LINE: usize = 64;

/// Zero-initialized, aligned heap buffer
///
/// A zero-sized buffer owns no allocation and returns a null pointer.
pub struct AlignedBuffer {
    ptr: *mut u8,
    size: usize,
    layout: Option<Layout>,
}

// The buffer owns its allocation; sharing rules are imposed by the wrapper.
unsafe impl Send for AlignedBuffer {}

impl AlignedBuffer {
    /// Allocate `size` zeroed bytes aligned to `alignment`
    ///
    /// # Errors
    /// Fails if `alignment` is not a power of two, the size overflows, or the
    /// allocator returns null.
    pub fn new(size: usize, alignment: usize) -> crate::Result<Self> {
        if size == 0 {
            return Ok(Self {
                ptr: ptr::null_mut(),
                size: 0,
                layout: None,
            });
        }

        let layout = Layout::from_size_align(size, alignment)
            .with_context(|| format!("Invalid buffer layout: size={} alignment={}", size, alignment))?;

        let ptr = unsafe { alloc_zeroed(layout) };
        if ptr.is_null() {
            anyhow::bail!("Failed to allocate {} byte buffer", size);
        }

        Ok(Self {
            ptr,
            size,
            layout: Some(layout),
        })
    }

    #[inline(always)]
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    #[inline(always)]
    pub fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline(always)]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the buffer as a slice
    pub fn as_slice(&self) -> &[u8] {
        if self.size == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.size) }
    }

    /// Get the buffer as a mutable slice
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        if self.size == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.size) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            unsafe { dealloc(self.ptr, layout) };
        }
    }
}

/// Command buffer shared by all workers
///
/// Sized by the pattern in blocks. Workers transfer into and out of whatever
/// block range a command names, with no synchronization between workers:
/// **range disjointness is not enforced**, and two workers may move data
/// through the same blocks concurrently. The benchmark measures throughput, not
/// data integrity, so the buffer contents are meaningless.
///
/// Ranges outside the buffer are rejected.
pub struct SharedBuffer {
    buffer: AlignedBuffer,
    blocks: u64,
    block_shift: u32,
}

// Workers only hand raw pointers to the device; no Rust references to the
// contents are created while workers run.
unsafe impl Sync for SharedBuffer {}
unsafe impl Send for SharedBuffer {}

impl SharedBuffer {
    /// Allocate a buffer of `blocks` blocks of `1 << block_shift` bytes
    pub fn allocate(blocks: u64, block_shift: u32) -> crate::Result<Self> {
        let bytes = blocks
            .checked_shl(block_shift)
            .filter(|bytes| bytes >> block_shift == blocks)
            .and_then(|bytes| usize::try_from(bytes).ok())
            .with_context(|| format!("Buffer of {} blocks (shift {}) is too large", blocks, block_shift))?;

        let buffer = AlignedBuffer::new(bytes, DMA_ALIGNMENT)
            .with_context(|| format!("Failed to allocate buffer of {} blocks", blocks))?;

        Ok(Self {
            buffer,
            blocks,
            block_shift,
        })
    }

    /// Size in blocks
    #[inline]
    pub fn blocks(&self) -> u64 {
        self.blocks
    }

    /// Size in bytes
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.buffer.size()
    }

    /// Pointer to the first byte of block `target_block`
    ///
    /// # Errors
    /// Fails when `[target_block, target_block + block_count)` does not lie
    /// inside the buffer.
    pub fn block_ptr(&self, target_block: u64, block_count: u32) -> crate::Result<*mut u8> {
        let end = target_block.checked_add(block_count as u64);
        match end {
            Some(end) if end <= self.blocks => {
                let offset = (target_block << self.block_shift) as usize;
                Ok(unsafe { self.buffer.as_mut_ptr().add(offset) })
            }
            _ => anyhow::bail!(
                "Command range [{}, +{}) lies outside the {}-block buffer",
                target_block,
                block_count,
                self.blocks
            ),
        }
    }

    /// Write every byte once so the whole buffer is resident before the run
    pub fn prime(&mut self) {
        for (i, byte) in self.buffer.as_mut_slice().iter_mut().enumerate() {
            *byte = (i % 251) as u8;
        }
    }

    /// Read one byte of every cache line in a block range
    ///
    /// Pulls the range into the CPU cache right before a transfer. The range
    /// must already have been validated with `block_ptr`.
    pub fn touch(&self, target_block: u64, block_count: u32) {
        if self.buffer.size() == 0 {
            return;
        }
        let start = (target_block << self.block_shift) as usize;
        let len = (block_count as usize) << self.block_shift;
        let end = (start + len).min(self.buffer.size());
        let base = self.buffer.as_ptr();

        let mut offset = start;
        while offset < end {
            unsafe {
                ptr::read_volatile(base.add(offset));
            }
            offset += CACHE_LINE;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_buffer_creation() {
        let buffer = AlignedBuffer::new(8192, 4096).unwrap();
        assert_eq!(buffer.size(), 8192);
        assert_eq!(buffer.as_slice().as_ptr() as usize % 4096, 0);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_aligned_buffer_rejects_bad_alignment() {
        assert!(AlignedBuffer::new(4096, 3000).is_err());
    }

    #[test]
    fn test_aligned_buffer_zero_size() {
        let mut buffer = AlignedBuffer::new(0, 4096).unwrap();
        assert_eq!(buffer.size(), 0);
        assert!(buffer.as_slice().is_empty());
        assert!(buffer.as_mut_slice().is_empty());
    }

    #[test]
    fn test_shared_buffer_block_ptr() {
        let buffer = SharedBuffer::allocate(10, 9).unwrap();
        assert_eq!(buffer.blocks(), 10);
        assert_eq!(buffer.size_bytes(), 5120);

        let base = buffer.block_ptr(0, 1).unwrap();
        let third = buffer.block_ptr(3, 7).unwrap();
        assert_eq!(third as usize - base as usize, 3 * 512);
        assert_eq!(base as usize % DMA_ALIGNMENT, 0);
    }

    #[test]
    fn test_shared_buffer_rejects_out_of_range() {
        let buffer = SharedBuffer::allocate(10, 9).unwrap();
        assert!(buffer.block_ptr(9, 2).is_err());
        assert!(buffer.block_ptr(10, 1).is_err());
        assert!(buffer.block_ptr(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_shared_buffer_zero_blocks() {
        let buffer = SharedBuffer::allocate(0, 12).unwrap();
        assert_eq!(buffer.size_bytes(), 0);
        assert!(buffer.block_ptr(0, 1).is_err());
        buffer.touch(0, 0);
    }

    #[test]
    fn test_shared_buffer_too_large() {
        assert!(SharedBuffer::allocate(u64::MAX, 12).is_err());
    }

    #[test]
    fn test_prime_and_touch() {
        let mut buffer = SharedBuffer::allocate(4, 9).unwrap();
        buffer.prime();
        assert_eq!(buffer.buffer.as_slice()[1], 1);
        assert_eq!(buffer.buffer.as_slice()[251], 0);
        buffer.touch(1, 3);
    }
}
