use std::cell::RefCell;

use crate::{Memory, MemoryError, PointerWidth};

/// A contiguous run of bytes placed at a fixed base address.
#[derive(Debug)]
struct Region {
    start: usize,
    bytes: RefCell<Box<[u8]>>,
}

impl Region {
    #[inline]
    fn end(&self) -> usize {
        self.start + self.bytes.borrow().len()
    }
}

/// Heap image made of non-overlapping byte regions.
///
/// Addresses are plain numbers chosen by whoever builds the arena. Every
/// access must fall entirely inside one region, otherwise it fails with
/// [`MemoryError::OutOfBounds`]; nothing outside the regions can be read
/// or written by accident.
#[derive(Debug)]
pub struct Arena {
    width: PointerWidth,
    // sorted by start
    regions: Vec<Region>,
}

impl Arena {
    pub fn new(width: PointerWidth) -> Self {
        Self {
            width,
            regions: Vec::new(),
        }
    }

    /// Place `bytes` at `start`.
    pub fn add_region(
        &mut self,
        start: usize,
        bytes: Vec<u8>,
    ) -> Result<(), MemoryError> {
        let end = start
            .checked_add(bytes.len())
            .ok_or(MemoryError::OutOfBounds {
                address: start,
                len: bytes.len(),
            })?;
        if start == 0 {
            return Err(MemoryError::OutOfBounds {
                address: start,
                len: bytes.len(),
            });
        }

        let index = self.regions.partition_point(|r| r.start < start);
        let overlaps_prev =
            index > 0 && self.regions[index - 1].end() > start;
        let overlaps_next =
            index < self.regions.len() && self.regions[index].start < end;
        if overlaps_prev || overlaps_next {
            return Err(MemoryError::Overlap { start });
        }

        self.regions.insert(
            index,
            Region {
                start,
                bytes: RefCell::new(bytes.into_boxed_slice()),
            },
        );
        Ok(())
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// Find the region holding `[address, address + len)` and return it
    /// together with the offset of `address` inside it.
    fn locate(
        &self,
        address: usize,
        len: usize,
    ) -> Result<(&Region, usize), MemoryError> {
        let err = MemoryError::OutOfBounds { address, len };
        let index = self.regions.partition_point(|r| r.start <= address);
        let region = index
            .checked_sub(1)
            .and_then(|i| self.regions.get(i))
            .ok_or(err)?;
        let offset = address - region.start;
        let end = address.checked_add(len).ok_or(err)?;
        if end > region.end() {
            return Err(err);
        }
        Ok((region, offset))
    }
}

impl Memory for Arena {
    #[inline]
    fn width(&self) -> PointerWidth {
        self.width
    }

    fn read_into(
        &self,
        address: usize,
        buf: &mut [u8],
    ) -> Result<(), MemoryError> {
        let (region, offset) = self.locate(address, buf.len())?;
        buf.copy_from_slice(&region.bytes.borrow()[offset..offset + buf.len()]);
        Ok(())
    }

    fn write_from(
        &self,
        address: usize,
        bytes: &[u8],
    ) -> Result<(), MemoryError> {
        let (region, offset) = self.locate(address, bytes.len())?;
        region.bytes.borrow_mut()[offset..offset + bytes.len()]
            .copy_from_slice(bytes);
        Ok(())
    }

    fn with_bytes<R>(
        &self,
        address: usize,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, MemoryError> {
        let (region, offset) = self.locate(address, len)?;
        let bytes = region.bytes.borrow();
        Ok(f(&bytes[offset..offset + len]))
    }
}
