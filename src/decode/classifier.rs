//! Routing of annotation classes to display rows

use super::decoder::Decoder;
use super::row::Row;
use std::collections::HashMap;

/// How an annotation was routed to its row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// The class is listed in one of the decoder's declared rows
    Mapped,
    /// The class has no row; the decoder's default row was used
    Fallback,
}

/// Maps `(decoder id, class id)` to the row that displays it
///
/// Built once per decode run from the stack's decoder metadata and read-only
/// while decoding. Keyed per decoder first so lookups borrow the decoder id.
#[derive(Debug, Clone, Default)]
pub struct ClassificationTable {
    classes: HashMap<String, HashMap<u32, Row>>,
    defaults: HashMap<String, Row>,
    /// Every row in pipeline then declaration order, default rows last per decoder
    rows: Vec<Row>,
}

impl ClassificationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table for a decoder stack
    pub fn build(stack: &[Decoder]) -> Self {
        let mut table = Self::new();

        for dec in stack {
            let info = dec.info();

            for (index, ann_row) in info.annotation_rows.iter().enumerate() {
                let row = Row::with_row(info.clone(), index);
                let classes = table.classes.entry(info.id.clone()).or_default();
                for &class in &ann_row.classes {
                    classes.entry(class).or_insert_with(|| row.clone());
                }
                if !table.rows.contains(&row) {
                    table.rows.push(row);
                }
            }

            if !table.defaults.contains_key(&info.id) {
                let row = Row::new(info.clone());
                table.defaults.insert(info.id.clone(), row.clone());
                table.rows.push(row);
            }
        }

        table
    }

    /// Row for an annotation of class `format` produced by `decoder`
    ///
    /// Returns `None` only if the decoder is not part of the stack.
    pub fn classify(&self, decoder: &str, format: u32) -> Option<(&Row, Routing)> {
        if let Some(row) = self.classes.get(decoder).and_then(|c| c.get(&format)) {
            return Some((row, Routing::Mapped));
        }
        self.defaults
            .get(decoder)
            .map(|row| (row, Routing::Fallback))
    }

    /// All rows known to this table
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.classes.clear();
        self.defaults.clear();
        self.rows.clear();
    }
}
