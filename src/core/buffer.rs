// src/core/buffer.rs

//! Append-only output accumulator.
//!
//! Growth goes through a [`ByteAllocator`] rather than straight to the global
//! allocator, so running out of memory is an ordinary `Err` the exec session can
//! clean up after instead of an abort.

use crate::constants::OUTPUT_TERMINATOR;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Could not grow output buffer to {requested} bytes.")]
pub struct AllocError {
    pub requested: usize,
}

/// Capability used by [`GrowableByteBuffer`] to obtain more storage.
///
/// Implementations must leave `storage` untouched on failure.
pub trait ByteAllocator {
    /// Ensures `storage.capacity() >= new_capacity`.
    fn grow(&mut self, storage: &mut Vec<u8>, new_capacity: usize) -> Result<(), AllocError>;
}

/// Allocator backed by the process heap, reporting failures instead of aborting.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

impl ByteAllocator for SystemAllocator {
    fn grow(&mut self, storage: &mut Vec<u8>, new_capacity: usize) -> Result<(), AllocError> {
        let additional = new_capacity.saturating_sub(storage.len());
        storage
            .try_reserve_exact(additional)
            .map_err(|_| AllocError {
                requested: new_capacity,
            })
    }
}

impl<A: ByteAllocator + ?Sized> ByteAllocator for &mut A {
    fn grow(&mut self, storage: &mut Vec<u8>, new_capacity: usize) -> Result<(), AllocError> {
        (**self).grow(storage, new_capacity)
    }
}

/// An append-only byte accumulator with amortized doubling growth.
///
/// One byte of capacity is always kept spare so [`finalize`](Self::finalize) can
/// append the terminator without allocating.
#[derive(Debug)]
pub struct GrowableByteBuffer<A: ByteAllocator = SystemAllocator> {
    storage: Vec<u8>,
    allocator: A,
}

impl<A: ByteAllocator> GrowableByteBuffer<A> {
    /// Performs the initial allocation. Fails with `AllocError` if even that is refused.
    pub fn new(mut allocator: A, initial_capacity: usize) -> Result<Self, AllocError> {
        let mut storage = Vec::new();
        allocator.grow(&mut storage, initial_capacity.max(1))?;
        Ok(Self { storage, allocator })
    }

    /// Bytes appended so far.
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Current allocation size. Always greater than `len()`.
    pub fn capacity(&self) -> usize {
        self.storage.capacity()
    }

    /// The bytes appended so far, without any terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage
    }

    /// Appends `chunk`, at least doubling capacity when it does not fit.
    /// On failure the buffer still holds exactly the bytes appended before.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), AllocError> {
        if chunk.is_empty() {
            return Ok(());
        }
        let needed = self
            .storage
            .len()
            .checked_add(chunk.len())
            .and_then(|n| n.checked_add(1))
            .ok_or(AllocError {
                requested: usize::MAX,
            })?;
        if needed > self.storage.capacity() {
            let doubled = self.storage.capacity().saturating_mul(2);
            let new_capacity = doubled.max(needed);
            log::trace!(
                "Growing output buffer: {} -> {} bytes",
                self.storage.capacity(),
                new_capacity
            );
            self.allocator.grow(&mut self.storage, new_capacity)?;
        }
        self.storage.extend_from_slice(chunk);
        Ok(())
    }

    /// Appends the terminator and freezes the contents. Consuming `self` means
    /// nothing can be appended afterwards.
    pub fn finalize(mut self) -> CapturedOutput {
        self.storage.push(OUTPUT_TERMINATOR);
        CapturedOutput {
            bytes: self.storage,
        }
    }
}

/// Frozen, terminator-suffixed output of a finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    bytes: Vec<u8>,
}

impl CapturedOutput {
    /// The captured bytes, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        self.bytes.split_last().map(|(_, body)| body).unwrap_or(&[])
    }

    /// The captured bytes followed by the terminator, for C-string style consumers.
    pub fn as_bytes_with_terminator(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the captured bytes, not counting the terminator.
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// Whether the child wrote nothing to stdout.
    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }

    /// Takes ownership of the bytes, dropping the terminator.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.bytes.pop();
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Refuses to grow past a fixed number of bytes.
    struct CappedAllocator {
        max: usize,
        calls: usize,
    }

    impl ByteAllocator for CappedAllocator {
        fn grow(&mut self, storage: &mut Vec<u8>, new_capacity: usize) -> Result<(), AllocError> {
            self.calls += 1;
            if new_capacity > self.max {
                return Err(AllocError {
                    requested: new_capacity,
                });
            }
            SystemAllocator.grow(storage, new_capacity)
        }
    }

    #[test]
    fn test_finalize_appends_terminator() {
        let mut buffer = GrowableByteBuffer::new(SystemAllocator, 1).unwrap();
        buffer.append(b"hello").unwrap();
        let output = buffer.finalize();

        assert_eq!(output.as_bytes(), b"hello");
        assert_eq!(output.as_bytes_with_terminator(), b"hello\0");
        assert_eq!(output.into_bytes(), b"hello".to_vec());
    }

    #[test]
    fn test_empty_buffer_finalizes_to_terminator_only() {
        let buffer = GrowableByteBuffer::new(SystemAllocator, 1).unwrap();
        let output = buffer.finalize();
        assert!(output.is_empty());
        assert_eq!(output.as_bytes_with_terminator(), b"\0");
    }

    #[test]
    fn test_growth_at_least_doubles() {
        // --- Setup ---
        let mut buffer = GrowableByteBuffer::new(SystemAllocator, 8).unwrap();
        let before = buffer.capacity();

        // --- Execute ---
        buffer.append(&[b'x'; 8]).unwrap();

        // --- Assert ---
        assert!(buffer.capacity() >= before * 2);
        assert!(buffer.len() < buffer.capacity());
    }

    #[test]
    fn test_allocation_failure_keeps_previous_contents() {
        // --- Setup ---
        let mut allocator = CappedAllocator { max: 16, calls: 0 };
        let mut buffer = GrowableByteBuffer::new(&mut allocator, 4).unwrap();
        buffer.append(b"0123456789").unwrap();

        // --- Execute ---
        let result = buffer.append(&[b'z'; 32]);

        // --- Assert ---
        assert!(matches!(result, Err(AllocError { requested }) if requested > 16));
        assert_eq!(buffer.as_bytes(), b"0123456789");
    }

    #[test]
    fn test_initial_allocation_failure() {
        let allocator = CappedAllocator { max: 0, calls: 0 };
        assert!(GrowableByteBuffer::new(allocator, 1).is_err());
    }

    #[test]
    fn test_growth_is_amortized() {
        let mut allocator = CappedAllocator {
            max: usize::MAX,
            calls: 0,
        };
        {
            let mut buffer = GrowableByteBuffer::new(&mut allocator, 1).unwrap();
            for _ in 0..4096 {
                buffer.append(b"a").unwrap();
            }
            assert_eq!(buffer.len(), 4096);
        }
        // One initial allocation plus ~log2(4096) regrowths.
        assert!(allocator.calls <= 14, "too many regrowths: {}", allocator.calls);
    }

    proptest! {
        #[test]
        fn test_chunking_never_drops_or_duplicates(
            chunks in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..300), 0..40),
            initial in 1usize..64,
        ) {
            let mut buffer = GrowableByteBuffer::new(SystemAllocator, initial).unwrap();
            let mut expected = Vec::new();
            for chunk in &chunks {
                buffer.append(chunk).unwrap();
                expected.extend_from_slice(chunk);
            }
            prop_assert!(buffer.len() <= buffer.capacity());
            let output = buffer.finalize();
            prop_assert_eq!(output.as_bytes(), expected.as_slice());
        }
    }
}
