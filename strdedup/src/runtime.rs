//! Services the hosting runtime provides to the engine.
//!
//! Everything the engine cannot know by looking at heap bytes alone
//! (segment boundaries, object sizes, generations, type names, the layout
//! of the text type) is asked for through [`Runtime`]. A real integration
//! forwards these calls to the runtime's profiling interface;
//! [`SimulatedRuntime`](crate::sim::SimulatedRuntime) answers them from a
//! heap image built in memory.

use crate::HostError;

/// One contiguous range of a generation, as reported during a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRange {
    pub start: usize,
    pub length: usize,
    pub generation: u32,
}

impl GenerationRange {
    #[inline]
    pub fn end(&self) -> usize {
        self.start + self.length
    }
}

/// Defining module and metadata token of a loaded type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassInfo {
    pub module: usize,
    pub token: u32,
}

/// Byte offsets of the length field and the first character inside an
/// instance of the runtime's text type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringLayout {
    pub length_offset: usize,
    pub buffer_offset: usize,
}

pub trait Runtime {
    /// All generation ranges of the heap at this point of the pause.
    fn generation_bounds(&self) -> Result<Vec<GenerationRange>, HostError>;

    /// Size in bytes of the object at `object`, header included.
    fn object_size(&self, object: usize) -> Result<usize, HostError>;

    fn object_generation(&self, object: usize) -> Result<u32, HostError>;

    /// Whether the range starting at `start` is a read-only (frozen)
    /// segment.
    fn is_frozen(&self, start: usize) -> Result<bool, HostError>;

    fn class_info(&self, type_handle: usize) -> Result<ClassInfo, HostError>;

    /// Fully qualified name of the type definition `token` in `module`.
    fn type_name(&self, module: usize, token: u32)
    -> Result<String, HostError>;

    fn string_layout(&self) -> Result<StringLayout, HostError>;
}
