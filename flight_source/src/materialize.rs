//! Conversion of streamed Arrow record batches into engine batches.

use arrow::array::{Array, ArrayRef};
use arrow::datatypes::{DataType, FieldRef};
use arrow::record_batch::RecordBatch;

/// Adapts one streamed column into the engine's column type.
pub trait ColumnAdapter: Send + Sync {
    type Column;

    fn adapt(&self, field: &FieldRef, array: &ArrayRef) -> Self::Column;
}

/// A batch of adapted columns in stream field order.
#[derive(Debug, Clone)]
pub struct ColumnarBatch<C> {
    columns: Vec<C>,
    num_rows: usize,
}

impl<C> ColumnarBatch<C> {
    pub fn new(columns: Vec<C>, num_rows: usize) -> Self {
        Self { columns, num_rows }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&C> {
        self.columns.get(index)
    }

    pub fn columns(&self) -> &[C] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<C> {
        self.columns
    }
}

/// Materializes `batch` column by column. The row count is taken from the
/// batch itself rather than from the columns, so batches without columns keep
/// their row count.
pub fn materialize<A: ColumnAdapter>(adapter: &A, batch: &RecordBatch) -> ColumnarBatch<A::Column> {
    let schema = batch.schema();
    let columns = schema
        .fields()
        .iter()
        .zip(batch.columns())
        .map(|(field, array)| adapter.adapt(field, array))
        .collect();
    ColumnarBatch::new(columns, batch.num_rows())
}

/// Column view over an Arrow array.
#[derive(Debug, Clone)]
pub struct ArrowColumnVector {
    field: FieldRef,
    array: ArrayRef,
}

impl ArrowColumnVector {
    pub fn name(&self) -> &str {
        self.field.name()
    }

    pub fn data_type(&self) -> &DataType {
        self.array.data_type()
    }

    pub fn field(&self) -> &FieldRef {
        &self.field
    }

    pub fn array(&self) -> &ArrayRef {
        &self.array
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.array.null_count()
    }

    pub fn is_null(&self, row: usize) -> bool {
        self.array.is_null(row)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ArrowColumnAdapter;

impl ColumnAdapter for ArrowColumnAdapter {
    type Column = ArrowColumnVector;

    fn adapt(&self, field: &FieldRef, array: &ArrayRef) -> Self::Column {
        ArrowColumnVector {
            field: field.clone(),
            array: array.clone(),
        }
    }
}
