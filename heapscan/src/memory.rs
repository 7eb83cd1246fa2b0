//! Access to the bytes of the inspected heap.
//!
//! All heap reads and the single kind of heap write (a reference slot
//! rewrite) go through [`Memory`]. Implementations decide how much
//! checking happens: [`Arena`](crate::Arena) bounds-checks every access
//! against its regions, [`RawMemory`](crate::RawMemory) trusts the caller.

use crate::PointerWidth;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// `len` bytes at `address` are not inside a single known region.
    OutOfBounds { address: usize, len: usize },
    /// A region starting at `start` would overlap an existing one.
    Overlap { start: usize },
    /// The region at `start` has no room left for `len` more bytes.
    Full { start: usize, len: usize },
}

impl std::fmt::Display for MemoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfBounds { address, len } => {
                write!(f, "{len} bytes at {address:#x} are out of bounds")
            }
            Self::Overlap { start } => {
                write!(f, "region at {start:#x} overlaps an existing region")
            }
            Self::Full { start, len } => {
                write!(f, "region at {start:#x} has no room for {len} bytes")
            }
        }
    }
}

impl std::error::Error for MemoryError {}

/// A reference-bearing word, named by its owner and byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub owner: usize,
    pub offset: usize,
}

impl Slot {
    #[inline(always)]
    pub fn new(owner: usize, offset: usize) -> Self {
        Self { owner, offset }
    }

    #[inline(always)]
    pub fn address(self) -> usize {
        self.owner + self.offset
    }
}

/// Byte-addressed view of a heap.
///
/// Methods take `&self`; writes are only ever issued while no other party
/// touches the heap (the collector has every mutator suspended), so
/// implementations are free to use interior mutability.
pub trait Memory {
    fn width(&self) -> PointerWidth;

    /// Copy `buf.len()` bytes starting at `address` into `buf`.
    fn read_into(&self, address: usize, buf: &mut [u8])
    -> Result<(), MemoryError>;

    /// Copy `bytes` to `address`.
    fn write_from(&self, address: usize, bytes: &[u8])
    -> Result<(), MemoryError>;

    /// Run `f` over a borrowed view of `len` bytes at `address`.
    fn with_bytes<R>(
        &self,
        address: usize,
        len: usize,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, MemoryError>;

    #[inline]
    fn read_u16(&self, address: usize) -> Result<u16, MemoryError> {
        let mut buf = [0; 2];
        self.read_into(address, &mut buf)?;
        Ok(u16::from_ne_bytes(buf))
    }

    #[inline]
    fn read_u32(&self, address: usize) -> Result<u32, MemoryError> {
        let mut buf = [0; 4];
        self.read_into(address, &mut buf)?;
        Ok(u32::from_ne_bytes(buf))
    }

    /// Read a pointer-sized word, zero-extended.
    #[inline]
    fn read_word(&self, address: usize) -> Result<u64, MemoryError> {
        match self.width() {
            PointerWidth::Bits32 => self.read_u32(address).map(u64::from),
            PointerWidth::Bits64 => {
                let mut buf = [0; 8];
                self.read_into(address, &mut buf)?;
                Ok(u64::from_ne_bytes(buf))
            }
        }
    }

    /// Read a pointer-sized word, sign-extended.
    #[inline]
    fn read_signed_word(&self, address: usize) -> Result<i64, MemoryError> {
        let word = self.read_word(address)?;
        Ok(match self.width() {
            PointerWidth::Bits32 => word as u32 as i32 as i64,
            PointerWidth::Bits64 => word as i64,
        })
    }

    /// Write a pointer-sized word; the value is truncated to the width.
    #[inline]
    fn write_word(&self, address: usize, value: u64) -> Result<(), MemoryError> {
        match self.width() {
            PointerWidth::Bits32 => {
                self.write_from(address, &(value as u32).to_ne_bytes())
            }
            PointerWidth::Bits64 => self.write_from(address, &value.to_ne_bytes()),
        }
    }
}
