//! Decoder for the per-type layout descriptor ("GC descriptor").
//!
//! The descriptor sits directly in front of the type handle and is read
//! backwards from its last word:
//!
//! ```text
//!  explicit form (count > 0):
//!  lowest                          highest
//!  [size][offset] ... [size][offset][size][offset][count] | type handle
//!
//!  repeating form (count <= 0, n = |count| items):
//!  ... [item n-1] ... [item 1][item 0][start offset][count] | type handle
//!                                 ^ highest series
//! ```
//!
//! A series size is stored relative to the base size of the type, so the
//! scanned length of a series is `size + object size`. That way
//! variable-length instances share one descriptor.
//!
//! None of the accessors validate their arguments. A descriptor obtained
//! through [`GcDesc::for_type`] on a type whose flags say it may contain
//! references is well formed by construction of the runtime.

use crate::{Memory, MemoryError, PointerWidth, WidthTable};

pub struct GcDesc<'m, M: Memory> {
    pub(crate) memory: &'m M,
    pub(crate) table: &'static WidthTable,
    start: usize,
    size: usize,
}

impl<'m, M: Memory> GcDesc<'m, M> {
    /// View `size` bytes at `start` as a descriptor.
    pub fn new(memory: &'m M, start: usize, size: usize) -> Self {
        let table = memory.width().table();
        debug_assert!(size >= table.word, "descriptor without trailer");
        Self {
            memory,
            table,
            start,
            size,
        }
    }

    /// Locate the descriptor of the type identified by `type_handle`.
    ///
    /// The signed entry count is the word immediately preceding the handle;
    /// its absolute value sizes the blob that ends at the handle.
    pub fn for_type(
        memory: &'m M,
        type_handle: usize,
    ) -> Result<Self, MemoryError> {
        let width = memory.width();
        let word = width.bytes();
        let count_at = type_handle.checked_sub(word).ok_or(
            MemoryError::OutOfBounds {
                address: type_handle,
                len: word,
            },
        )?;
        let entries = (memory.read_signed_word(count_at)? as i32).unsigned_abs();
        let size = width.descriptor_bytes(entries as usize);
        let start = type_handle.checked_sub(size).ok_or(
            MemoryError::OutOfBounds {
                address: type_handle,
                len: size,
            },
        )?;
        Ok(Self::new(memory, start, size))
    }

    #[inline]
    pub fn width(&self) -> PointerWidth {
        self.memory.width()
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    fn end(&self) -> usize {
        self.start + self.size
    }

    /// Positive: number of explicit series.
    /// Zero or negative: repeating pattern with `|count|` items.
    #[inline]
    pub fn series_count(&self) -> Result<i32, MemoryError> {
        let word = self.memory.read_signed_word(self.end() - self.table.word)?;
        Ok(word as i32)
    }

    /// Address of the series entry closest to the trailer.
    #[inline]
    pub fn highest_series(&self) -> usize {
        self.end() - 3 * self.table.word
    }

    /// Address of the series entry furthest from the trailer.
    #[inline]
    pub fn lowest_series(&self) -> Result<usize, MemoryError> {
        let count = self.series_count()?.unsigned_abs() as usize;
        Ok(self.end() - self.width().descriptor_bytes(count))
    }

    /// Tail-relative size of the series at `series` (usually negative).
    #[inline]
    pub fn series_size(&self, series: usize) -> Result<i64, MemoryError> {
        self.memory
            .read_signed_word(series + self.table.series_size_at)
    }

    /// Start of the series at `series`, relative to the object start.
    #[inline]
    pub fn series_offset(&self, series: usize) -> Result<u64, MemoryError> {
        self.memory.read_word(series + self.table.series_offset_at)
    }

    /// Number of consecutive references in repeat item `index`.
    ///
    /// Items are laid out downwards from `series`.
    #[inline]
    pub fn pointers(
        &self,
        series: usize,
        index: usize,
    ) -> Result<u32, MemoryError> {
        self.read_item_field(self.item(series, index) + self.table.pointers_at)
    }

    /// Number of non-reference bytes following the references of
    /// repeat item `index`.
    #[inline]
    pub fn skip(&self, series: usize, index: usize) -> Result<u32, MemoryError> {
        self.read_item_field(self.item(series, index) + self.table.skip_at)
    }

    #[inline]
    fn item(&self, series: usize, index: usize) -> usize {
        series - index * self.table.item_stride
    }

    #[inline]
    fn read_item_field(&self, address: usize) -> Result<u32, MemoryError> {
        match self.width() {
            PointerWidth::Bits32 => self.memory.read_u16(address).map(u32::from),
            PointerWidth::Bits64 => self.memory.read_u32(address),
        }
    }
}
