//! Framed input buffer
//!
//! Holds the bytes of one command (its line plus any raw blocks) while it
//! is being assembled. The buffer is either growable, doubling its size in
//! steps of at most [`GROWTH_STEP_MAX`] bytes up to `max_size`, or backed by
//! a fixed static slice that never grows.
//!
//! Overflow is sticky: once flagged, every further byte is rejected until
//! [`FramedBuffer::reset`] is called.

use alloc::vec::Vec;

/// Largest single growth step for a growable buffer
pub const GROWTH_STEP_MAX: usize = 2048;

/// Default upper bound for a growable buffer
pub const DEFAULT_MAX_SIZE: usize = 24 * 1024;

/// Default initial allocation for a growable buffer
pub const DEFAULT_INITIAL_SIZE: usize = 1024;

/// Errors raised while appending to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferError {
    /// `max_size` reached, or the buffer was already overflowed
    Overflow,
    /// Growing the allocation failed
    AllocFailed,
}

#[derive(Debug)]
enum Storage {
    Growable { bytes: Vec<u8>, size: usize },
    Fixed { bytes: &'static mut [u8], len: usize },
}

/// Bounded byte store with sticky overflow detection
#[derive(Debug)]
pub struct FramedBuffer {
    storage: Storage,
    max_size: usize,
    overflow: bool,
}

impl Default for FramedBuffer {
    fn default() -> Self {
        Self::growable(DEFAULT_INITIAL_SIZE, DEFAULT_MAX_SIZE)
    }
}

impl FramedBuffer {
    /// Create a growable buffer
    ///
    /// `initial_size` is clamped to `1..=max_size`. If the initial
    /// allocation fails the buffer starts empty and grows on demand.
    pub fn growable(initial_size: usize, max_size: usize) -> Self {
        let size = initial_size.clamp(1, max_size.max(1));
        let mut bytes = Vec::new();
        let size = if bytes.try_reserve_exact(size).is_ok() {
            size
        } else {
            0
        };
        Self {
            storage: Storage::Growable { bytes, size },
            max_size,
            overflow: false,
        }
    }

    /// Create a buffer over a fixed static slice; growth is disabled
    pub fn fixed(bytes: &'static mut [u8]) -> Self {
        let max_size = bytes.len();
        Self {
            storage: Storage::Fixed { bytes, len: 0 },
            max_size,
            overflow: false,
        }
    }

    /// Upper bound on the number of stored bytes
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of stored bytes
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Growable { bytes, .. } => bytes.len(),
            Storage::Fixed { len, .. } => *len,
        }
    }

    /// True when no bytes are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current allocated size (equal to `max_size` for a fixed buffer)
    pub fn size(&self) -> usize {
        match &self.storage {
            Storage::Growable { size, .. } => *size,
            Storage::Fixed { bytes, .. } => bytes.len(),
        }
    }

    /// True once an append has failed; cleared by [`reset`](Self::reset)
    pub fn is_overflowed(&self) -> bool {
        self.overflow
    }

    /// Flag the buffer as overflowed without appending
    pub fn mark_overflow(&mut self) {
        self.overflow = true;
    }

    /// Stored bytes
    pub fn as_slice(&self) -> &[u8] {
        match &self.storage {
            Storage::Growable { bytes, .. } => bytes,
            Storage::Fixed { bytes, len } => &bytes[..*len],
        }
    }

    /// Append one byte
    pub fn add(&mut self, byte: u8) -> Result<(), BufferError> {
        if self.overflow {
            return Err(BufferError::Overflow);
        }
        if self.len() >= self.max_size {
            self.overflow = true;
            return Err(BufferError::Overflow);
        }

        let max_size = self.max_size;
        match &mut self.storage {
            Storage::Growable { bytes, size } => {
                if bytes.len() == *size {
                    let step = (*size).clamp(1, GROWTH_STEP_MAX);
                    let new_size = (*size + step).min(max_size);
                    if bytes.try_reserve_exact(new_size - bytes.len()).is_err() {
                        self.overflow = true;
                        return Err(BufferError::AllocFailed);
                    }
                    *size = new_size;
                }
                bytes.push(byte);
            }
            Storage::Fixed { bytes, len } => {
                if *len == bytes.len() {
                    self.overflow = true;
                    return Err(BufferError::Overflow);
                }
                bytes[*len] = byte;
                *len += 1;
            }
        }
        Ok(())
    }

    /// Drop the last stored byte (used to strip line terminators)
    pub fn pop(&mut self) -> Option<u8> {
        match &mut self.storage {
            Storage::Growable { bytes, .. } => bytes.pop(),
            Storage::Fixed { bytes, len } => {
                if *len == 0 {
                    return None;
                }
                *len -= 1;
                Some(bytes[*len])
            }
        }
    }

    /// Logical truncate to zero length and clear the overflow flag
    ///
    /// The allocation is kept for the next command.
    pub fn reset(&mut self) {
        match &mut self.storage {
            Storage::Growable { bytes, .. } => bytes.clear(),
            Storage::Fixed { len, .. } => *len = 0,
        }
        self.overflow = false;
    }
}
