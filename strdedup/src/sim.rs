//! Simulated heaps.
//!
//! [`HeapBuilder`] lays out type handles, layout descriptors, segments and
//! objects the way the runtime does, and produces an [`Arena`] holding the
//! bytes plus a [`SimulatedRuntime`] that answers the host queries about
//! them. Tests and the demo binary drive the engine against these.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use heapscan::{Arena, MemoryError, PointerWidth};

use crate::{
    ClassInfo, GenerationRange, HostError, Runtime, StringLayout, TypeFlags,
};

pub const TYPE_BASE: usize = 0x0010_0000;
const TYPE_STRIDE: usize = 0x1000;
pub const SEGMENT_BASE: usize = 0x0100_0000;
const SEGMENT_STRIDE: usize = 0x0010_0000;
const MODULE: usize = 0x7000_0000;
const FIRST_TOKEN: u32 = 0x0200_0001;

/// One explicit series, with its size as seen on an instance of the
/// type's base size.
#[derive(Debug, Clone, Copy)]
pub struct Series {
    pub offset: usize,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub enum TypeLayout {
    /// No references.
    Opaque,
    /// Explicit series, the first one listed ends up closest to the handle.
    Series(Vec<Series>),
    /// `(pointers, skip)` items repeated from `start` to the end of the
    /// object.
    Repeating { start: usize, pattern: Vec<(u32, u32)> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentId(usize);

#[derive(Debug)]
struct TypeImage {
    start: usize,
    bytes: Vec<u8>,
    handle: usize,
    name: String,
    token: u32,
}

#[derive(Debug)]
struct SegmentImage {
    start: usize,
    generation: u32,
    frozen: bool,
    bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct HeapBuilder {
    width: PointerWidth,
    types: Vec<TypeImage>,
    segments: Vec<SegmentImage>,
    sizes: HashMap<usize, usize>,
    string_type: usize,
    layout: StringLayout,
}

/// Store `value` as a word of `width` at `at` inside `bytes`.
fn put_word(width: PointerWidth, bytes: &mut [u8], at: usize, value: u64) {
    match width {
        PointerWidth::Bits32 => {
            bytes[at..at + 4].copy_from_slice(&(value as u32).to_ne_bytes())
        }
        PointerWidth::Bits64 => {
            bytes[at..at + 8].copy_from_slice(&value.to_ne_bytes())
        }
    }
}

/// Store a half-word field of a repeat item.
fn put_half(width: PointerWidth, bytes: &mut [u8], at: usize, value: u32) {
    match width {
        PointerWidth::Bits32 => {
            bytes[at..at + 2].copy_from_slice(&(value as u16).to_ne_bytes())
        }
        PointerWidth::Bits64 => {
            bytes[at..at + 4].copy_from_slice(&value.to_ne_bytes())
        }
    }
}

impl HeapBuilder {
    /// Empty heap whose only type is the text type `System.String`.
    pub fn new(width: PointerWidth) -> Self {
        let word = width.bytes();
        let mut builder = Self {
            width,
            types: Vec::new(),
            segments: Vec::new(),
            sizes: HashMap::new(),
            string_type: 0,
            layout: StringLayout {
                length_offset: word,
                buffer_offset: word + 4,
            },
        };
        builder.string_type = builder.define_type(
            "System.String",
            TypeFlags::empty(),
            TypeLayout::Opaque,
            word + 4 + 2,
        );
        builder
    }

    #[inline]
    pub fn width(&self) -> PointerWidth {
        self.width
    }

    pub fn string_type(&self) -> usize {
        self.string_type
    }

    pub fn string_layout(&self) -> StringLayout {
        self.layout
    }

    /// Define a type and return its handle.
    ///
    /// The handle points at `[flags: u32][base size: u32]`; the layout
    /// descriptor ends right before it.
    pub fn define_type(
        &mut self,
        name: &str,
        flags: TypeFlags,
        layout: TypeLayout,
        base_size: usize,
    ) -> usize {
        let width = self.width;
        let word = width.bytes();
        let descriptor = match &layout {
            // a bare zero count
            TypeLayout::Opaque => vec![0; word],
            TypeLayout::Series(series) => {
                let mut bytes = vec![0; width.descriptor_bytes(series.len())];
                // lowest series first, trailer last
                for (slot, s) in series.iter().rev().enumerate() {
                    let at = slot * 2 * word;
                    let size = s.size as i64 - base_size as i64;
                    put_word(width, &mut bytes, at, size as u64);
                    put_word(width, &mut bytes, at + word, s.offset as u64);
                }
                let trailer = bytes.len() - word;
                put_word(width, &mut bytes, trailer, series.len() as u64);
                bytes
            }
            TypeLayout::Repeating { start, pattern } => {
                let mut bytes = vec![0; width.descriptor_bytes(pattern.len())];
                let trailer = bytes.len() - word;
                let highest = bytes.len() - 3 * word;
                for (index, &(pointers, skip)) in pattern.iter().enumerate() {
                    let at = highest - index * word;
                    put_half(width, &mut bytes, at, pointers);
                    put_half(width, &mut bytes, at + word / 2, skip);
                }
                put_word(width, &mut bytes, trailer - word, *start as u64);
                let count = -(pattern.len() as i64);
                put_word(width, &mut bytes, trailer, count as u64);
                bytes
            }
        };

        let index = self.types.len();
        let start = TYPE_BASE + index * TYPE_STRIDE;
        let handle = start + descriptor.len();
        let mut bytes = descriptor;
        let header = bytes.len();
        bytes.resize(header + 2 * word.max(4), 0);
        bytes[header..header + 4].copy_from_slice(&flags.bits().to_ne_bytes());
        bytes[header + 4..header + 8]
            .copy_from_slice(&(base_size as u32).to_ne_bytes());
        assert!(bytes.len() <= TYPE_STRIDE, "layout of {name} is too large");

        self.types.push(TypeImage {
            start,
            bytes,
            handle,
            name: name.to_string(),
            token: FIRST_TOKEN + index as u32,
        });
        handle
    }

    pub fn segment(&mut self, generation: u32, frozen: bool) -> SegmentId {
        let index = self.segments.len();
        self.segments.push(SegmentImage {
            start: SEGMENT_BASE + index * SEGMENT_STRIDE,
            generation,
            frozen,
            bytes: Vec::new(),
        });
        SegmentId(index)
    }

    /// Allocate a zeroed object of `size` bytes whose first word is
    /// `type_handle`. Fails once the segment cannot hold it.
    pub fn alloc_object(
        &mut self,
        segment: SegmentId,
        type_handle: usize,
        size: usize,
    ) -> Result<usize, MemoryError> {
        let width = self.width;
        assert!(size >= width.bytes(), "object smaller than its header");
        let image = &mut self.segments[segment.0];
        let offset = image.bytes.len();
        let grown = offset + width.align_up(size);
        if grown > SEGMENT_STRIDE {
            return Err(MemoryError::Full {
                start: image.start,
                len: size,
            });
        }
        image.bytes.resize(grown, 0);
        put_word(width, &mut image.bytes, offset, type_handle as u64);

        let address = image.start + offset;
        self.sizes.insert(address, size);
        Ok(address)
    }

    /// Allocate a text object holding `bytes` as its characters.
    pub fn alloc_text_bytes(
        &mut self,
        segment: SegmentId,
        bytes: &[u8],
    ) -> Result<usize, MemoryError> {
        assert!(bytes.len() % 2 == 0, "text is made of 2-byte units");
        let size = self.layout.buffer_offset + bytes.len() + 2;
        let object = self.alloc_object(segment, self.string_type, size)?;

        let length = (bytes.len() / 2) as u32;
        self.write_bytes(object + self.layout.length_offset, &length.to_ne_bytes());
        self.write_bytes(object + self.layout.buffer_offset, bytes);
        Ok(object)
    }

    pub fn alloc_string(
        &mut self,
        segment: SegmentId,
        text: &str,
    ) -> Result<usize, MemoryError> {
        let bytes: Vec<u8> = text
            .encode_utf16()
            .flat_map(|unit| unit.to_ne_bytes())
            .collect();
        self.alloc_text_bytes(segment, &bytes)
    }

    pub fn write_ref(&mut self, object: usize, offset: usize, target: usize) {
        self.write_word(object + offset, target as u64);
    }

    pub fn write_word(&mut self, address: usize, value: u64) {
        let width = self.width;
        let (image, at) = self.locate(address);
        put_word(width, &mut image.bytes, at, value);
    }

    fn write_bytes(&mut self, address: usize, bytes: &[u8]) {
        let (image, at) = self.locate(address);
        image.bytes[at..at + bytes.len()].copy_from_slice(bytes);
    }

    /// Make the runtime report `size` for the object at `address`.
    pub fn report_size(&mut self, address: usize, size: usize) {
        self.sizes.insert(address, size);
    }

    fn locate(&mut self, address: usize) -> (&mut SegmentImage, usize) {
        self.segments
            .iter_mut()
            .find(|s| s.start <= address && address < s.start + s.bytes.len())
            .map(|s| {
                let at = address - s.start;
                (s, at)
            })
            .unwrap_or_else(|| panic!("{address:#x} is not inside a segment"))
    }

    pub fn build(self) -> Result<(Arena, SimulatedRuntime), MemoryError> {
        let mut arena = Arena::new(self.width);
        let mut classes = HashMap::new();
        let mut names = HashMap::new();
        for image in self.types {
            classes.insert(
                image.handle,
                ClassInfo {
                    module: MODULE,
                    token: image.token,
                },
            );
            names.insert((MODULE, image.token), image.name);
            arena.add_region(image.start, image.bytes)?;
        }

        let mut ranges = Vec::new();
        let mut frozen = HashSet::new();
        for image in self.segments {
            ranges.push(GenerationRange {
                start: image.start,
                length: image.bytes.len(),
                generation: image.generation,
            });
            if image.frozen {
                frozen.insert(image.start);
            }
            arena.add_region(image.start, image.bytes)?;
        }

        let runtime = SimulatedRuntime {
            ranges,
            frozen,
            sizes: self.sizes,
            classes,
            names,
            layout: self.layout,
            failing: RefCell::new(HashSet::new()),
        };
        Ok((arena, runtime))
    }
}

/// Host services answered from a [`HeapBuilder`] image.
///
/// Any operation can be made to fail with [`SimulatedRuntime::fail`];
/// operations are named after the [`Runtime`] methods.
#[derive(Debug)]
pub struct SimulatedRuntime {
    ranges: Vec<GenerationRange>,
    frozen: HashSet<usize>,
    sizes: HashMap<usize, usize>,
    classes: HashMap<usize, ClassInfo>,
    names: HashMap<(usize, u32), String>,
    layout: StringLayout,
    failing: RefCell<HashSet<&'static str>>,
}

impl SimulatedRuntime {
    pub fn fail(&self, operation: &'static str) {
        self.failing.borrow_mut().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.borrow_mut().remove(operation);
    }

    /// Generation count a collection notification would carry.
    pub fn generation_count(&self) -> usize {
        self.ranges
            .iter()
            .map(|r| r.generation as usize + 1)
            .max()
            .unwrap_or(0)
    }

    #[inline]
    fn check(&self, operation: &'static str) -> Result<(), HostError> {
        if self.failing.borrow().contains(operation) {
            Err(HostError::fail(operation))
        } else {
            Ok(())
        }
    }
}

impl Runtime for SimulatedRuntime {
    fn generation_bounds(&self) -> Result<Vec<GenerationRange>, HostError> {
        self.check("generation_bounds")?;
        Ok(self.ranges.clone())
    }

    fn object_size(&self, object: usize) -> Result<usize, HostError> {
        self.check("object_size")?;
        self.sizes.get(&object).copied().ok_or(HostError::new(
            "object_size",
            HostError::INVALID_ARG,
        ))
    }

    fn object_generation(&self, object: usize) -> Result<u32, HostError> {
        self.check("object_generation")?;
        self.ranges
            .iter()
            .find(|r| r.start <= object && object < r.end())
            .map(|r| r.generation)
            .ok_or(HostError::new("object_generation", HostError::INVALID_ARG))
    }

    fn is_frozen(&self, start: usize) -> Result<bool, HostError> {
        self.check("is_frozen")?;
        Ok(self.frozen.contains(&start))
    }

    fn class_info(&self, type_handle: usize) -> Result<ClassInfo, HostError> {
        self.check("class_info")?;
        self.classes
            .get(&type_handle)
            .copied()
            .ok_or(HostError::new("class_info", HostError::INVALID_ARG))
    }

    fn type_name(
        &self,
        module: usize,
        token: u32,
    ) -> Result<String, HostError> {
        self.check("type_name")?;
        self.names
            .get(&(module, token))
            .cloned()
            .ok_or(HostError::new("type_name", HostError::INVALID_ARG))
    }

    fn string_layout(&self) -> Result<StringLayout, HostError> {
        self.check("string_layout")?;
        Ok(self.layout)
    }
}
