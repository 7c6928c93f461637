//! Per-row annotation storage

use super::annotation::Annotation;

/// Annotations of one row, in arrival order
///
/// The engine emits events in sample order per decoder chain, so start
/// samples are non-decreasing across the sequence. Range queries rely on
/// that to stop scanning early.
#[derive(Debug, Clone, Default)]
pub struct RowData {
    annotations: Vec<Annotation>,
    max_sample: u64,
}

impl RowData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest end sample of any annotation, 0 when empty
    pub fn max_sample(&self) -> u64 {
        self.max_sample
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn push_annotation(&mut self, annotation: Annotation) {
        debug_assert!(
            self.annotations
                .last()
                .is_none_or(|last| last.start_sample() <= annotation.start_sample()),
            "annotation out of sample order"
        );
        self.max_sample = self.max_sample.max(annotation.end_sample());
        self.annotations.push(annotation);
    }

    /// Append copies of all annotations overlapping `[start_sample, end_sample)`
    pub fn get_annotation_subset(&self, dest: &mut Vec<Annotation>, start_sample: u64, end_sample: u64) {
        let stop = self
            .annotations
            .partition_point(|a| a.start_sample() < end_sample);
        dest.extend(
            self.annotations[..stop]
                .iter()
                .filter(|a| a.overlaps(start_sample, end_sample))
                .cloned(),
        );
    }
}
