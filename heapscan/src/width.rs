/// Addressing width of the heap being inspected.
///
/// Every width-dependent number the decoder uses lives in the matching
/// [`WidthTable`], so a descriptor is always read with one consistent set
/// of offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

/// Width-dependent sizes and sub-offsets of the layout descriptor.
///
/// ```text
/// series entry (two words):   [size: word][offset: word]
/// repeat item  (one word):    [pointers: half][skip: half]
/// trailer      (one word):    [series count: word]
/// ```
#[derive(Debug, PartialEq, Eq)]
pub struct WidthTable {
    /// Size of a pointer-sized word.
    pub word: usize,
    /// Distance between two consecutive series entries.
    pub series_stride: usize,
    /// Offset of the (signed) series size inside a series entry.
    pub series_size_at: usize,
    /// Offset of the series start offset inside a series entry.
    pub series_offset_at: usize,
    /// Distance between two consecutive repeat items.
    pub item_stride: usize,
    /// Offset of the pointer count inside a repeat item.
    pub pointers_at: usize,
    /// Offset of the skip byte count inside a repeat item.
    pub skip_at: usize,
    /// Width of the pointer count and skip fields.
    pub item_field: usize,
}

const TABLE_32: WidthTable = WidthTable {
    word: 4,
    series_stride: 8,
    series_size_at: 0,
    series_offset_at: 4,
    item_stride: 4,
    pointers_at: 0,
    skip_at: 2,
    item_field: 2,
};

const TABLE_64: WidthTable = WidthTable {
    word: 8,
    series_stride: 16,
    series_size_at: 0,
    series_offset_at: 8,
    item_stride: 8,
    pointers_at: 0,
    skip_at: 4,
    item_field: 4,
};

impl PointerWidth {
    /// Width of the process this crate is compiled for.
    pub const fn native() -> Self {
        if cfg!(target_pointer_width = "64") {
            Self::Bits64
        } else {
            Self::Bits32
        }
    }

    #[inline(always)]
    pub const fn table(self) -> &'static WidthTable {
        match self {
            Self::Bits32 => &TABLE_32,
            Self::Bits64 => &TABLE_64,
        }
    }

    #[inline(always)]
    pub const fn bytes(self) -> usize {
        self.table().word
    }

    /// Round `value` up to the next word boundary.
    #[inline]
    pub const fn align_up(self, value: usize) -> usize {
        let word = self.bytes();
        (value + word - 1) & !(word - 1)
    }

    /// Byte length of a descriptor holding `entries` series.
    #[inline]
    pub const fn descriptor_bytes(self, entries: usize) -> usize {
        self.bytes() * (1 + 2 * entries)
    }

    /// Parse the `32` / `64` spelling used on the command line.
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            32 => Some(Self::Bits32),
            64 => Some(Self::Bits64),
            _ => None,
        }
    }
}

impl Default for PointerWidth {
    fn default() -> Self {
        Self::native()
    }
}

impl std::fmt::Display for PointerWidth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bits32 => write!(f, "32-bit"),
            Self::Bits64 => write!(f, "64-bit"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_internally_consistent() {
        for width in [PointerWidth::Bits32, PointerWidth::Bits64] {
            let table = width.table();
            assert_eq!(table.series_stride, 2 * table.word);
            assert_eq!(table.series_offset_at, table.word);
            assert_eq!(table.item_stride, table.word);
            assert_eq!(table.skip_at, table.word / 2);
            assert_eq!(table.item_field * 2, table.word);
        }
    }

    #[test]
    fn align_up_rounds_to_word() {
        let w64 = PointerWidth::Bits64;
        assert_eq!(w64.align_up(0), 0);
        assert_eq!(w64.align_up(1), 8);
        assert_eq!(w64.align_up(8), 8);
        assert_eq!(w64.align_up(27), 32);

        let w32 = PointerWidth::Bits32;
        assert_eq!(w32.align_up(5), 8);
        assert_eq!(w32.align_up(12), 12);
    }

    #[test]
    fn descriptor_bytes_counts_trailer_and_two_words_per_series() {
        assert_eq!(PointerWidth::Bits64.descriptor_bytes(0), 8);
        assert_eq!(PointerWidth::Bits64.descriptor_bytes(2), 40);
        assert_eq!(PointerWidth::Bits32.descriptor_bytes(1), 12);
    }

    #[test]
    fn from_bits_accepts_only_known_widths() {
        assert_eq!(PointerWidth::from_bits(32), Some(PointerWidth::Bits32));
        assert_eq!(PointerWidth::from_bits(64), Some(PointerWidth::Bits64));
        assert_eq!(PointerWidth::from_bits(16), None);
    }
}
