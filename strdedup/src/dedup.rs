//! Content-addressed deduplication of text objects.
//!
//! For every reference slot the walker reports, [`Deduplicator`] checks
//! whether the slot points at an old enough text object. The first text
//! seen for a content hash becomes the candidate for that hash; a later
//! text with the same hash, the same length and byte-identical content has
//! its slot rewritten to the candidate. Texts whose hash matches but whose
//! content does not are left alone and do not replace the candidate.

use std::collections::HashMap;

use heapscan::{Memory, Slot, SlotVisitor};

use crate::{Error, ProfilerSettings, Runtime, TextType};

/// djb2 over `bytes`: seed 5381, `hash * 33 + byte`, wrapping.
#[inline]
pub fn djb2(bytes: &[u8]) -> u32 {
    bytes.iter().fold(5381u32, |hash, &byte| {
        hash.wrapping_mul(33).wrapping_add(u32::from(byte))
    })
}

/// Content hash to one candidate text object. Lives for a single pass.
#[derive(Debug, Default)]
pub struct DedupTable {
    candidates: HashMap<u32, usize, ahash::RandomState>,
}

impl DedupTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn candidate(&self, hash: u32) -> Option<usize> {
        self.candidates.get(&hash).copied()
    }

    /// Record `object` for `hash` unless a candidate exists already.
    #[inline]
    pub fn insert(&mut self, hash: u32, object: usize) -> bool {
        match self.candidates.entry(hash) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(object);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn clear(&mut self) {
        self.candidates.clear();
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DedupStats {
    /// Non-null slots handed to the visitor.
    pub references: usize,
    pub text_references: usize,
    /// Text references whose target was too young.
    pub young_skipped: usize,
    pub inserts: usize,
    /// Slots already pointing at the candidate.
    pub canonical: usize,
    pub rewrites: usize,
    /// Hash hits with different length or content.
    pub collisions: usize,
}

pub struct Deduplicator<'a, M: Memory, R: Runtime> {
    memory: &'a M,
    runtime: &'a R,
    text: TextType,
    char_size: usize,
    oldest_generation: u32,
    table: &'a mut DedupTable,
    stats: DedupStats,
}

impl<'a, M: Memory, R: Runtime> Deduplicator<'a, M, R> {
    pub fn new(
        memory: &'a M,
        runtime: &'a R,
        settings: &ProfilerSettings,
        text: TextType,
        table: &'a mut DedupTable,
    ) -> Self {
        Self {
            memory,
            runtime,
            text,
            char_size: settings.char_size,
            oldest_generation: settings.oldest_generation,
            table,
            stats: DedupStats::default(),
        }
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }

    /// Character count and address of the first character of `object`.
    #[inline]
    fn text_of(&self, object: usize) -> Result<(usize, usize), Error> {
        let layout = self.text.layout;
        let length = self.memory.read_u32(object + layout.length_offset)?;
        Ok((length as usize, object + layout.buffer_offset))
    }

    fn same_content(&self, a: usize, b: usize, len: usize) -> Result<bool, Error> {
        let memory = self.memory;
        let same = memory.with_bytes(a, len, |left| {
            memory.with_bytes(b, len, |right| left == right)
        })??;
        Ok(same)
    }
}

impl<M: Memory, R: Runtime> SlotVisitor for Deduplicator<'_, M, R> {
    type Error = Error;

    fn visit(&mut self, slot: Slot) -> Result<(), Error> {
        let target = self.memory.read_word(slot.address())? as usize;
        if target == 0 {
            return Ok(());
        }
        self.stats.references += 1;

        if self.memory.read_word(target)? as usize != self.text.handle {
            return Ok(());
        }
        self.stats.text_references += 1;

        if self.runtime.object_generation(target)? < self.oldest_generation {
            self.stats.young_skipped += 1;
            return Ok(());
        }

        let (length, data) = self.text_of(target)?;
        let bytes = length * self.char_size;
        let hash = self.memory.with_bytes(data, bytes, djb2)?;

        let Some(existing) = self.table.candidate(hash) else {
            self.table.insert(hash, target);
            self.stats.inserts += 1;
            return Ok(());
        };
        if existing == target {
            self.stats.canonical += 1;
            return Ok(());
        }

        let (existing_length, existing_data) = self.text_of(existing)?;
        if existing_length != length
            || !self.same_content(data, existing_data, bytes)?
        {
            self.stats.collisions += 1;
            return Ok(());
        }

        self.memory.write_word(slot.address(), existing as u64)?;
        self.stats.rewrites += 1;
        log::trace!(
            "slot {:#x}+{} now refers to {existing:#x} instead of {target:#x}",
            slot.owner,
            slot.offset
        );
        Ok(())
    }
}
