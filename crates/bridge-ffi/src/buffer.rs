//! The byte-buffer ownership contract at the C boundary.
//!
//! A [`ByteBuffer`] is a `{ptr, len, cap}` triple describing memory
//! allocated by Rust's allocator. Exactly one side owns it at any time:
//!
//! - [`ByteBuffer::from_vec`] transfers ownership *out* of Rust. The
//!   receiver must eventually release it with `idcard_buffer_free` (or
//!   hand it back across an API that documents the transfer).
//! - [`ByteBuffer::into_vec`] transfers ownership back *into* Rust and
//!   consumes the descriptor; after the call the producer must neither
//!   read nor free the memory again.
//! - [`ByteBuffer::as_slice`] is a borrowed view, valid only for the
//!   duration of the call that received the buffer. It must not be
//!   retained past return.
//!
//! The invariant `len <= cap` always holds. Violations of the contract
//! (a non-null descriptor whose length exceeds its capacity, or a null
//! pointer with a non-zero extent) are unrecoverable misuse and fail
//! fast with a panic instead of corrupting memory.
//!
//! The length/capacity split lets a producer over-allocate and later
//! shrink the logical view with [`truncate`](ByteBuffer::truncate)
//! without reallocating.

use std::mem::ManuallyDrop;
use std::ptr;

/// An owned byte sequence crossing the C boundary.
///
/// Plain-old-data by design: it is passed by value through `extern "C"`
/// signatures, so the ownership rules above are a protocol, not something
/// the type system can enforce on the foreign side.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ByteBuffer {
    ptr: *mut u8,
    len: usize,
    cap: usize,
}

impl ByteBuffer {
    /// The null buffer: no memory, zero extent. Used to signal absence or
    /// failure.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
            cap: 0,
        }
    }

    /// Transfers ownership of `vec`'s allocation into a descriptor.
    ///
    /// The allocation is *not* freed when the descriptor goes out of
    /// scope; it must come back through [`into_vec`](Self::into_vec) or
    /// `idcard_buffer_free`.
    #[must_use]
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let mut vec = ManuallyDrop::new(vec);
        Self {
            ptr: vec.as_mut_ptr(),
            len: vec.len(),
            cap: vec.capacity(),
        }
    }

    /// Whether this is the null buffer.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        self.ptr.is_null()
    }

    /// Returns the logical length.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the logical view is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shrinks the logical view without touching the allocation.
    ///
    /// # Panics
    ///
    /// Panics if `len` is greater than the current length.
    pub fn truncate(&mut self, len: usize) {
        assert!(
            len <= self.len,
            "byte buffer truncation beyond current length"
        );
        self.len = len;
    }

    /// Borrows the buffer contents for the duration of the current call.
    ///
    /// # Safety
    ///
    /// The descriptor must either be null (yields an empty slice) or
    /// describe a live allocation of at least `len` readable bytes that
    /// stays valid for the returned lifetime.
    ///
    /// # Panics
    ///
    /// Fails fast if the descriptor violates its invariants (`len > cap`,
    /// or a null pointer with non-zero extent).
    #[must_use]
    pub unsafe fn as_slice(&self) -> &[u8] {
        if self.ptr.is_null() {
            assert!(
                self.len == 0 && self.cap == 0,
                "null byte buffer with non-zero extent"
            );
            return &[];
        }
        assert!(self.len <= self.cap, "byte buffer length exceeds capacity");

        std::slice::from_raw_parts(self.ptr, self.len)
    }

    /// Consumes the descriptor and takes ownership of the allocation.
    ///
    /// The backing memory must remain valid until this call completes and
    /// must not be freed by the producer afterwards; the returned `Vec`
    /// is now the sole owner.
    ///
    /// # Safety
    ///
    /// The descriptor must be null or originate from
    /// [`from_vec`](Self::from_vec) / `idcard_buffer_alloc` (i.e. Rust's
    /// allocator), and ownership must not have been transferred already.
    /// Calling this twice on copies of the same descriptor is a double
    /// free.
    ///
    /// # Panics
    ///
    /// Fails fast on invariant violations, as [`as_slice`](Self::as_slice).
    #[must_use]
    pub unsafe fn into_vec(self) -> Vec<u8> {
        if self.ptr.is_null() {
            assert!(
                self.len == 0 && self.cap == 0,
                "null byte buffer with non-zero extent"
            );
            return Vec::new();
        }
        assert!(self.len <= self.cap, "byte buffer length exceeds capacity");

        Vec::from_raw_parts(self.ptr, self.len, self.cap)
    }
}
