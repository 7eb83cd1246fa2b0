use std::ptr;

use crate::{Memory, MemoryError, PointerWidth};

/// Direct access to the memory of the current process.
///
/// Used when the engine runs inside the process whose heap it inspects.
/// Only null addresses are rejected; everything else is dereferenced as is.
#[derive(Debug)]
pub struct RawMemory {
    width: PointerWidth,
}

impl RawMemory {
    /// # Safety
    /// Every address handed to the returned value must be valid for the
    /// requested access, and no other thread may touch that memory while
    /// it is accessed (the runtime has all mutators suspended).
    pub unsafe fn new() -> Self {
        Self {
            width: PointerWidth::native(),
        }
    }

    #[inline]
    fn check(address: usize, len: usize) -> Result<(), MemoryError> {
        if address == 0 || address.checked_add(len).is_none() {
            Err(MemoryError::OutOfBounds { address, len })
        } else {
            Ok(())
        }
    }
}

impl Memory for RawMemory {
    #[inline]
    fn width(&self) -> PointerWidth {
        self.width
    }

    #[inline]
    fn read_into(
        &self,
        address: usize,
        buf: &mut [u8],
    ) -> Result<(), MemoryError> {
        Self::check(address, buf.len())?;
        // SAFETY: guaranteed by the contract of `RawMemory::new`
        unsafe {
            ptr::copy_nonoverlapping(
                address as *const u8,
                buf.as_mut_ptr(),
                buf.len(),
            );
        }
        Ok(())
    }

    #[inline]
    fn write_from(
        &self,
        address: usize,
        bytes: &[u8],
    ) -> Result<(), MemoryError> {
        Self::check(address, bytes.len())?;
        // SAFETY: guaranteed by the contract of `RawMemory::new`
        unsafe {
            ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                address as *mut u8,
                bytes.len(),
            );
        }
        Ok(())
    }

    #[inline]
    fn with_bytes<R>(
        &self,
        address: usize,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, MemoryError> {
        Self::check(address, len)?;
        // SAFETY: guaranteed by the contract of `RawMemory::new`
        let bytes =
            unsafe { std::slice::from_raw_parts(address as *const u8, len) };
        Ok(f(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_writes_process_memory() {
        let mut words: Box<[usize]> = vec![0, 7, 0].into_boxed_slice();
        let base = words.as_mut_ptr() as usize;
        let step = size_of::<usize>();

        // SAFETY: only addresses inside `words` are used below
        let memory = unsafe { RawMemory::new() };
        assert_eq!(memory.read_word(base + step).unwrap(), 7);

        memory.write_word(base + 2 * step, 42).unwrap();
        assert_eq!(words[2], 42);
    }

    #[test]
    fn null_is_rejected() {
        // SAFETY: the only address used is null, which is checked
        let memory = unsafe { RawMemory::new() };
        assert!(memory.read_word(0).is_err());
    }
}
