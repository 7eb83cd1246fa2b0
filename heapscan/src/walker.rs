use crate::{GcDesc, Memory, MemoryError, Slot};

/// Receives every non-null reference slot of a walked object.
///
/// The visitor may overwrite the slot it was handed; the walker never
/// reads that word again.
pub trait SlotVisitor {
    type Error: From<MemoryError>;

    fn visit(&mut self, slot: Slot) -> Result<(), Self::Error>;
}

impl<M: Memory> GcDesc<'_, M> {
    /// Visit every non-null reference slot of the object at `object`,
    /// whose total size is `size` bytes.
    ///
    /// Only words inside `[object, object + size)` are ever read.
    pub fn walk<V: SlotVisitor>(
        &self,
        object: usize,
        size: usize,
        visitor: &mut V,
    ) -> Result<(), V::Error> {
        let count = self.series_count()?;
        if count > 0 {
            self.walk_series(object, size, visitor)
        } else {
            let items = count.unsigned_abs() as usize;
            self.walk_repeating(object, size, items, visitor)
        }
    }

    fn walk_series<V: SlotVisitor>(
        &self,
        object: usize,
        size: usize,
        visitor: &mut V,
    ) -> Result<(), V::Error> {
        let end = object + size;
        let lowest = self.lowest_series()?;
        let mut series = self.highest_series();

        while series >= lowest {
            let offset = self.series_offset(series)? as i64;
            let start = object as i64 + offset;
            let stop = start + self.series_size(series)? + size as i64;

            let from = start.clamp(object as i64, end as i64) as usize;
            let to = stop.clamp(object as i64, end as i64) as usize;
            self.scan(object, end, from, to, visitor)?;

            match series.checked_sub(self.table.series_stride) {
                Some(next) => series = next,
                None => break,
            }
        }
        Ok(())
    }

    fn walk_repeating<V: SlotVisitor>(
        &self,
        object: usize,
        size: usize,
        items: usize,
        visitor: &mut V,
    ) -> Result<(), V::Error> {
        if items == 0 {
            return Ok(());
        }
        let word = self.table.word;
        let end = object + size;
        let limit = end.saturating_sub(word);
        let highest = self.highest_series();

        let mut cursor = object + self.series_offset(highest)? as usize;
        while cursor < limit {
            let unit_start = cursor;
            for index in 0..items {
                let run = self.pointers(highest, index)? as usize * word;
                let skip = self.skip(highest, index)? as usize;
                let stop = cursor + run;
                cursor = self.scan(object, end, cursor, stop, visitor)?;
                cursor += skip;
            }
            if cursor == unit_start {
                log::warn!(
                    "repeating descriptor at {:#x} does not advance, \
                     abandoning object {object:#x}",
                    self.start()
                );
                break;
            }
        }
        Ok(())
    }

    /// Visit non-null words from `from` while below `to`, never crossing
    /// `end`. Returns the address after the last word scanned.
    ///
    /// The first word of the object is its type handle and is never
    /// visited, whatever the descriptor says.
    #[inline]
    fn scan<V: SlotVisitor>(
        &self,
        object: usize,
        end: usize,
        from: usize,
        to: usize,
        visitor: &mut V,
    ) -> Result<usize, V::Error> {
        let word = self.table.word;
        let mut cursor = from.max(object + word);
        while cursor < to && cursor + word <= end {
            if self.memory.read_word(cursor)? != 0 {
                visitor.visit(Slot::new(object, cursor - object))?;
            }
            cursor += word;
        }
        Ok(cursor.max(to))
    }
}
