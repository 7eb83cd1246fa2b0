use std::time::Duration;

use crate::DedupStats;

/// What one completed pass did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub generations: usize,
    pub segments_scanned: usize,
    pub segments_young: usize,
    pub segments_frozen: usize,
    pub objects: usize,
    /// Objects whose type may hold references and got walked.
    pub objects_walked: usize,
    pub dedup: DedupStats,
    pub elapsed: Duration,
}

impl std::fmt::Display for PassStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} segments ({} young, {} frozen skipped), {} objects ({} walked), \
             {} text refs, {} rewritten, {} collisions in {:?}",
            self.segments_scanned,
            self.segments_young,
            self.segments_frozen,
            self.objects,
            self.objects_walked,
            self.dedup.text_references,
            self.dedup.rewrites,
            self.dedup.collisions,
            self.elapsed,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_names_the_counts_that_matter() {
        let stats = PassStats {
            segments_scanned: 2,
            segments_frozen: 1,
            objects: 10,
            objects_walked: 4,
            dedup: DedupStats {
                text_references: 6,
                rewrites: 3,
                ..Default::default()
            },
            ..Default::default()
        };
        let line = stats.to_string();
        assert!(line.starts_with("2 segments (0 young, 1 frozen skipped)"));
        assert!(line.contains("10 objects (4 walked)"));
        assert!(line.contains("3 rewritten, 0 collisions"));
    }
}
