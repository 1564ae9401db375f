use std::fmt;

use crate::patcher::ChunkOffsetPatcher;

/// Options controlling how the rewriter treats layouts it cannot patch safely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOptions {
    /// Fail on chunk offset tables that follow a shifted `mdat`, and on a
    /// second `mdat` reached with a nonzero size delta. When disabled these
    /// only log a warning and the offsets are left as they are.
    pub reject_ambiguous_layouts: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            reject_ambiguous_layouts: true,
        }
    }
}

/// Counters collected over one rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteStats {
    pub boxes_visited: u64,
    pub boxes_copied: u64,
    pub descriptors_rewritten: u64,
    pub descriptors_skipped: u64,
    pub chunk_offset_tables_patched: u64,
    /// Output length minus input length.
    pub size_delta: i64,
}

impl fmt::Display for RewriteStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} boxes ({} copied verbatim), {} descriptors rewritten, {} skipped, \
             {} chunk offset tables patched, size delta {:+}",
            self.boxes_visited,
            self.boxes_copied,
            self.descriptors_rewritten,
            self.descriptors_skipped,
            self.chunk_offset_tables_patched,
            self.size_delta
        )
    }
}

/// Per-file traversal state shared by every box frame.
#[derive(Debug, Default)]
pub(crate) struct RewriteSession {
    /// Net size change of all finalized boxes so far.
    size_diff: i64,
    /// `size_diff` when the first `mdat` started, once one has been seen.
    media_data_delta: Option<i64>,
    pub(crate) patcher: ChunkOffsetPatcher,
    pub(crate) stats: RewriteStats,
}

impl RewriteSession {
    pub(crate) fn size_diff(&self) -> i64 {
        self.size_diff
    }

    /// Adds the part of a box's size change that its children did not
    /// already account for.
    ///
    /// `own` is the box's total change (new size minus old size) and
    /// `children` the sum of the totals its direct children reported.
    pub(crate) fn record_box(&mut self, own: i64, children: i64) {
        self.size_diff += own - children;
    }

    pub(crate) fn media_data_seen(&self) -> bool {
        self.media_data_delta.is_some()
    }

    /// Size delta at the first `mdat`, or zero before one is reached.
    pub(crate) fn media_data_delta(&self) -> i64 {
        self.media_data_delta.unwrap_or(0)
    }

    pub(crate) fn enter_media_data(&mut self) {
        if self.media_data_delta.is_none() {
            self.media_data_delta = Some(self.size_diff);
        }
    }

    pub(crate) fn into_stats(mut self) -> RewriteStats {
        self.stats.size_delta = self.size_diff;
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_growth_is_counted_once() {
        let mut session = RewriteSession::default();

        // esds grows by 2
        session.record_box(2, 0);
        // mp4a, stsd, stbl, minf, mdia, trak, moov each grow by the same 2
        for _ in 0..7 {
            session.record_box(2, 2);
        }
        assert_eq!(session.size_diff(), 2);
    }

    #[test]
    fn test_siblings_accumulate() {
        let mut session = RewriteSession::default();
        session.record_box(2, 0);
        session.record_box(3, 0);
        session.record_box(5, 5);
        session.record_box(0, 0);
        assert_eq!(session.size_diff(), 5);
    }

    #[test]
    fn test_media_data_delta_is_frozen_at_first_mdat() {
        let mut session = RewriteSession::default();
        assert!(!session.media_data_seen());
        assert_eq!(session.media_data_delta(), 0);

        session.record_box(4, 0);
        session.enter_media_data();
        session.record_box(-1, 0);
        session.enter_media_data();

        assert!(session.media_data_seen());
        assert_eq!(session.media_data_delta(), 4);
        assert_eq!(session.into_stats().size_delta, 3);
    }

    #[test]
    fn test_stats_display() {
        let stats = RewriteStats {
            boxes_visited: 12,
            boxes_copied: 5,
            descriptors_rewritten: 1,
            descriptors_skipped: 0,
            chunk_offset_tables_patched: 1,
            size_delta: 2,
        };
        assert_eq!(
            stats.to_string(),
            "12 boxes (5 copied verbatim), 1 descriptors rewritten, 0 skipped, \
             1 chunk offset tables patched, size delta +2"
        );
    }
}
