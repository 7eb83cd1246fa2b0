//! One collection pass over the old generation.
//!
//! Segments come from the runtime in whatever order it reports them. Inside
//! a segment objects are packed back to back, each starting on a word
//! boundary, so the next object is found from the current one's size. A
//! wrong size makes every later object in the segment unreadable, which is
//! why a size that cannot be right aborts the pass.

use std::time::Instant;

use heapscan::{GcDesc, Memory};

use crate::{
    DedupTable, Deduplicator, Error, GenerationRange, PassStats,
    ProfilerSettings, Runtime, TextType, TypeFlags,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooFewGenerations { found: usize, required: usize },
    /// No text type has been identified yet, nothing could match.
    TextTypeUnknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassStats),
    Skipped(SkipReason),
}

pub struct CollectionPass<'a, M: Memory, R: Runtime> {
    memory: &'a M,
    runtime: &'a R,
    settings: &'a ProfilerSettings,
    text: Option<TextType>,
    table: &'a mut DedupTable,
}

impl<'a, M: Memory, R: Runtime> CollectionPass<'a, M, R> {
    pub fn new(
        memory: &'a M,
        runtime: &'a R,
        settings: &'a ProfilerSettings,
        text: Option<TextType>,
        table: &'a mut DedupTable,
    ) -> Self {
        Self {
            memory,
            runtime,
            settings,
            text,
            table,
        }
    }

    /// Run the pass. `generation_count` is the count carried by the
    /// collection notification; without one it is derived from the
    /// enumerated generation ranges.
    ///
    /// The table is empty when this returns, whatever the outcome.
    pub fn run(
        self,
        generation_count: Option<usize>,
    ) -> Result<PassOutcome, Error> {
        let started = Instant::now();
        let mut table = scopeguard::guard(self.table, |table| table.clear());
        let required = self.settings.min_generations;

        if let Some(found) = generation_count.filter(|&n| n < required) {
            return Ok(PassOutcome::Skipped(SkipReason::TooFewGenerations {
                found,
                required,
            }));
        }
        let Some(text) = self.text else {
            return Ok(PassOutcome::Skipped(SkipReason::TextTypeUnknown));
        };

        let bounds = self.runtime.generation_bounds()?;
        let generations = match generation_count {
            Some(count) => count,
            None => bounds
                .iter()
                .map(|range| range.generation as usize + 1)
                .max()
                .unwrap_or(0),
        };
        if generations < required {
            return Ok(PassOutcome::Skipped(SkipReason::TooFewGenerations {
                found: generations,
                required,
            }));
        }

        let mut stats = PassStats {
            generations,
            ..Default::default()
        };
        let mut dedup = Deduplicator::new(
            self.memory,
            self.runtime,
            self.settings,
            text,
            &mut **table,
        );

        for range in &bounds {
            if range.generation < self.settings.oldest_generation {
                stats.segments_young += 1;
                continue;
            }
            if self.runtime.is_frozen(range.start)? {
                stats.segments_frozen += 1;
                continue;
            }
            stats.segments_scanned += 1;
            scan_segment(
                self.memory,
                self.runtime,
                range,
                &mut dedup,
                &mut stats,
            )?;
        }

        stats.dedup = dedup.stats();
        stats.elapsed = started.elapsed();
        Ok(PassOutcome::Completed(stats))
    }
}

fn scan_segment<M: Memory, R: Runtime>(
    memory: &M,
    runtime: &R,
    range: &GenerationRange,
    dedup: &mut Deduplicator<'_, M, R>,
    stats: &mut PassStats,
) -> Result<(), Error> {
    let width = memory.width();
    let end = range.end();
    let mut cursor = range.start;

    while cursor < end {
        let size = runtime.object_size(cursor)?;
        if size < width.bytes() || size > end - cursor {
            return Err(Error::InvalidObjectSize {
                address: cursor,
                size,
            });
        }
        stats.objects += 1;

        let type_handle = memory.read_word(cursor)? as usize;
        if TypeFlags::read(memory, type_handle)?.may_contain_references() {
            GcDesc::for_type(memory, type_handle)?.walk(cursor, size, dedup)?;
            stats.objects_walked += 1;
        }

        cursor = width.align_up(cursor + size);
    }
    Ok(())
}
