//! A concrete, in-memory columnar [`SourceReader`]: each column is a
//! `Vec<ColumnValue>` of uniform kind, addressed by row index. Reference
//! implementation of the on-disk columnar reader as an external
//! collaborator, enough to drive the engine and its tests without a real
//! storage layer.

use std::sync::Arc;

use branch_core::{ColumnDirectoryEntry, ColumnKind, ColumnValue, RowCursor, SourceReader};

use crate::error::ColumnError;

pub struct InMemoryColumnSource {
    directory: Vec<ColumnDirectoryEntry>,
    columns: Arc<Vec<Vec<ColumnValue>>>,
    row_count: usize,
}

impl InMemoryColumnSource {
    /// Builds a source from named columns; every column must carry the same
    /// number of rows and no two columns may share a name.
    pub fn new(columns: Vec<(&str, Vec<ColumnValue>)>) -> Result<Self, ColumnError> {
        let row_count = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let mut directory = Vec::with_capacity(columns.len());
        let mut data = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            if directory.iter().any(|e: &ColumnDirectoryEntry| e.name == name) {
                return Err(ColumnError::DuplicateColumn(name.to_string()));
            }
            if values.len() != row_count {
                return Err(ColumnError::RaggedColumn(name.to_string(), values.len(), row_count));
            }
            let kind = values.first().map(|v| v.kind()).unwrap_or(ColumnKind::Int64);
            directory.push(ColumnDirectoryEntry { name: name.to_string(), kind });
            data.push(values);
        }
        Ok(Self { directory, columns: Arc::new(data), row_count })
    }
}

impl SourceReader for InMemoryColumnSource {
    fn columns(&self) -> &[ColumnDirectoryEntry] {
        &self.directory
    }

    fn row_count(&self) -> usize {
        self.row_count
    }

    fn cursor_range(&self, start: usize, end: usize) -> Box<dyn RowCursor + Send> {
        Box::new(InMemoryCursor { columns: self.columns.clone(), start, end, cur: start, started: false })
    }
}

struct InMemoryCursor {
    columns: Arc<Vec<Vec<ColumnValue>>>,
    #[allow(dead_code)]
    start: usize,
    end: usize,
    cur: usize,
    started: bool,
}

impl RowCursor for InMemoryCursor {
    fn advance(&mut self) -> bool {
        if !self.started {
            self.started = true;
        } else {
            self.cur += 1;
        }
        self.cur < self.end
    }

    fn row_index(&self) -> usize {
        self.cur
    }

    fn column(&self, idx: usize) -> ColumnValue {
        self.columns[idx][self.cur].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_a_source_and_reads_rows_in_order() {
        let src = InMemoryColumnSource::new(vec![
            ("A", vec![ColumnValue::Int64(1), ColumnValue::Int64(2), ColumnValue::Int64(3)]),
        ])
        .unwrap();
        assert_eq!(src.row_count(), 3);
        let mut cursor = src.cursor_range(0, 3);
        let mut seen = Vec::new();
        while cursor.advance() {
            seen.push((cursor.row_index(), cursor.column(0)));
        }
        assert_eq!(
            seen,
            vec![
                (0, ColumnValue::Int64(1)),
                (1, ColumnValue::Int64(2)),
                (2, ColumnValue::Int64(3)),
            ]
        );
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let err = InMemoryColumnSource::new(vec![
            ("A", vec![ColumnValue::Int64(1), ColumnValue::Int64(2)]),
            ("B", vec![ColumnValue::Int64(1)]),
        ])
        .unwrap_err();
        assert!(matches!(err, ColumnError::RaggedColumn(..)));
    }

    #[test]
    fn duplicate_column_names_are_rejected() {
        let err = InMemoryColumnSource::new(vec![
            ("A", vec![ColumnValue::Int64(1)]),
            ("A", vec![ColumnValue::Int64(2)]),
        ])
        .unwrap_err();
        assert!(matches!(err, ColumnError::DuplicateColumn(_)));
    }

    #[test]
    fn a_contiguous_range_cursor_only_sees_its_own_rows() {
        let src = InMemoryColumnSource::new(vec![(
            "A",
            (0..10i64).map(ColumnValue::Int64).collect(),
        )])
        .unwrap();
        let mut cursor = src.cursor_range(3, 6);
        let mut rows = Vec::new();
        while cursor.advance() {
            rows.push(cursor.row_index());
        }
        assert_eq!(rows, vec![3, 4, 5]);
    }
}
