// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Zero-copy views over native-owned memory
//!
//! A `NativeBuf` aliases a region owned by the native loop and is only valid
//! for the duration of the callback that produced it. The lifetime parameter
//! ties it to that call; anything that must outlive the call has to go
//! through [`NativeBuf::to_vec`].

use std::fmt;
use std::ops::Deref;

#[derive(Clone, Copy)]
pub struct NativeBuf<'a> {
    bytes: &'a [u8],
}

impl<'a> NativeBuf<'a> {
    /// View `len` bytes at `ptr` without copying.
    ///
    /// Returns `None` for a null pointer with a non-zero length or for a
    /// length outside the addressable range. A zero length always yields an
    /// empty view and never touches `ptr`.
    ///
    /// # Safety
    ///
    /// For a non-zero `len`, `ptr` must point to `len` initialized bytes that
    /// stay valid and unmodified for `'a`.
    pub unsafe fn from_raw(ptr: *const u8, len: usize) -> Option<Self> {
        if len == 0 {
            return Some(Self::empty());
        }
        if ptr.is_null() || len > isize::MAX as usize {
            return None;
        }
        Some(Self {
            bytes: std::slice::from_raw_parts(ptr, len),
        })
    }

    /// Wrap bytes owned by the caller, used when the bridge itself produces a reply.
    pub fn from_slice(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn empty() -> Self {
        Self::from_slice(&[])
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.bytes
    }

    /// Copy the region into independently owned storage.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }
}

impl Deref for NativeBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl AsRef<[u8]> for NativeBuf<'_> {
    fn as_ref(&self) -> &[u8] {
        self.bytes
    }
}

impl fmt::Debug for NativeBuf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBuf").field("len", &self.bytes.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_reads_back_native_bytes() {
        let region: Box<[u8]> = vec![1, 2, 3, 4, 5].into_boxed_slice();
        let view = unsafe { NativeBuf::from_raw(region.as_ptr(), region.len()) }.expect("view");
        assert_eq!(view.as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(view.len(), 5);
    }

    #[test]
    fn zero_length_view_is_empty_even_for_null() {
        let view = unsafe { NativeBuf::from_raw(std::ptr::null(), 0) }.expect("empty view");
        assert!(view.is_empty());
        assert_eq!(view.to_vec(), Vec::<u8>::new());
    }

    #[test]
    fn null_pointer_with_length_is_rejected() {
        assert!(unsafe { NativeBuf::from_raw(std::ptr::null(), 4) }.is_none());
    }

    #[test]
    fn copied_bytes_outlive_the_region() {
        let copy = {
            let region = vec![9u8, 8, 7];
            let view = unsafe { NativeBuf::from_raw(region.as_ptr(), region.len()) }.unwrap();
            view.to_vec()
        };
        assert_eq!(copy, vec![9, 8, 7]);
    }
}
