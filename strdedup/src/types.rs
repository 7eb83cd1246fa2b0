use std::sync::OnceLock;

use bitflags::bitflags;
use heapscan::{Memory, MemoryError};

use crate::StringLayout;

bitflags! {
    /// Bits of the first `u32` of a type handle that tell whether its
    /// instances can hold references.
    #[derive(Debug, Copy, Clone, PartialEq, Eq)]
    pub struct TypeFlags: u32 {
        const CONTAINS_POINTERS = 0x0100_0000;
        const COLLECTIBLE = 0x1000_0000;
    }
}

impl TypeFlags {
    #[inline]
    pub fn read<M: Memory>(
        memory: &M,
        type_handle: usize,
    ) -> Result<Self, MemoryError> {
        memory.read_u32(type_handle).map(Self::from_bits_retain)
    }

    /// Instances need a descriptor walk. Collectible types carry a
    /// reference to their loader even without reference fields.
    #[inline]
    pub fn may_contain_references(self) -> bool {
        self.intersects(Self::CONTAINS_POINTERS | Self::COLLECTIBLE)
    }
}

/// The runtime's text type, once identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextType {
    pub handle: usize,
    pub layout: StringLayout,
}

/// Process-wide, single-assignment home of the [`TextType`].
///
/// Written at most once, from a type load notification or from the attach
/// payload; read by every pass afterwards.
#[derive(Debug, Default)]
pub struct TextTypeCell(OnceLock<TextType>);

impl TextTypeCell {
    pub const fn new() -> Self {
        Self(OnceLock::new())
    }

    /// Returns `false` if a text type was already recorded; the first one
    /// stays.
    pub fn set(&self, text: TextType) -> bool {
        self.0.set(text).is_ok()
    }

    #[inline]
    pub fn get(&self) -> Option<&TextType> {
        self.0.get()
    }
}

/// Name comparison used to recognize the text type: full length, ASCII
/// case folded.
#[inline]
pub fn is_text_type_name(name: &str, expected: &str) -> bool {
    name.eq_ignore_ascii_case(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapscan::{Arena, PointerWidth};

    #[test]
    fn flags_decide_whether_to_walk() {
        let mut arena = Arena::new(PointerWidth::Bits64);
        arena.add_region(0x100, vec![0; 12]).unwrap();
        arena.write_from(0x100, &0x0100_0000u32.to_ne_bytes()).unwrap();
        arena.write_from(0x104, &0x1000_0000u32.to_ne_bytes()).unwrap();
        arena.write_from(0x108, &0x0000_0200u32.to_ne_bytes()).unwrap();

        assert!(TypeFlags::read(&arena, 0x100).unwrap().may_contain_references());
        assert!(TypeFlags::read(&arena, 0x104).unwrap().may_contain_references());
        let plain = TypeFlags::read(&arena, 0x108).unwrap();
        assert!(!plain.may_contain_references());
        assert_eq!(plain.bits(), 0x200, "unknown bits are kept");
    }

    #[test]
    fn text_type_is_set_once() {
        let cell = TextTypeCell::new();
        let layout = StringLayout {
            length_offset: 8,
            buffer_offset: 12,
        };
        assert!(cell.get().is_none());
        assert!(cell.set(TextType { handle: 0x10, layout }));
        assert!(!cell.set(TextType { handle: 0x20, layout }));
        assert_eq!(cell.get().map(|t| t.handle), Some(0x10));
    }

    #[test]
    fn name_match_ignores_ascii_case_only() {
        assert!(is_text_type_name("System.String", "System.String"));
        assert!(is_text_type_name("system.STRING", "System.String"));
        assert!(!is_text_type_name("System.StringBuilder", "System.String"));
        assert!(!is_text_type_name("System.Strin", "System.String"));
    }
}
