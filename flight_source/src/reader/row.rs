use arrow::array::{Array, ArrayRef, ArrowPrimitiveType, AsArray};
use arrow::datatypes::FieldRef;
use arrow::error::ArrowError;
use arrow::util::display::array_value_to_string;
use snafu::OptionExt;

use super::{ColumnarPartitionReader, NoCurrentBatchSnafu, PartitionReadError, PartitionReader};
use crate::materialize::{ArrowColumnAdapter, ArrowColumnVector, ColumnarBatch};

/// One row of a streamed batch, held as single-row slices of each column.
#[derive(Debug, Clone)]
pub struct Row {
    fields: Vec<FieldRef>,
    values: Vec<ArrayRef>,
}

impl Row {
    fn from_batch(batch: &ColumnarBatch<ArrowColumnVector>, row: usize) -> Self {
        let (fields, values) = batch
            .columns()
            .iter()
            .map(|column| (column.field().clone(), column.array().slice(row, 1)))
            .unzip();
        Row { fields, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&FieldRef> {
        self.fields.get(index)
    }

    pub fn value(&self, index: usize) -> Option<&ArrayRef> {
        self.values.get(index)
    }

    pub fn is_null(&self, index: usize) -> bool {
        self.values.get(index).is_none_or(|value| value.is_null(0))
    }

    /// Typed access to a primitive column. `None` for nulls, out of range
    /// indices and type mismatches.
    pub fn get_primitive<T: ArrowPrimitiveType>(&self, index: usize) -> Option<T::Native> {
        let array = self.values.get(index)?.as_primitive_opt::<T>()?;
        array.is_valid(0).then(|| array.value(0))
    }

    pub fn get_str(&self, index: usize) -> Option<&str> {
        let value = self.values.get(index)?;
        if let Some(array) = value.as_string_opt::<i32>() {
            return array.is_valid(0).then(|| array.value(0));
        }
        let array = value.as_string_opt::<i64>()?;
        array.is_valid(0).then(|| array.value(0))
    }

    /// Renders the value at `index` the way Arrow pretty printing does.
    pub fn display_value(&self, index: usize) -> Result<String, ArrowError> {
        let value = self.values.get(index).ok_or_else(|| {
            ArrowError::InvalidArgumentError(format!(
                "Column index {index} out of range for row of {} values",
                self.values.len()
            ))
        })?;
        array_value_to_string(value, 0)
    }
}

/// Row-at-a-time reader layered over the columnar reader.
///
/// Batches without rows are skipped, so `next` only returns `true` when a row
/// is positioned.
pub struct RowPartitionReader {
    inner: ColumnarPartitionReader<ArrowColumnAdapter>,
    batch: Option<ColumnarBatch<ArrowColumnVector>>,
    row: usize,
}

impl RowPartitionReader {
    pub fn new(inner: ColumnarPartitionReader<ArrowColumnAdapter>) -> Self {
        RowPartitionReader {
            inner,
            batch: None,
            row: 0,
        }
    }

    pub fn columnar(&self) -> &ColumnarPartitionReader<ArrowColumnAdapter> {
        &self.inner
    }
}

impl PartitionReader for RowPartitionReader {
    type Item = Row;

    fn next(&mut self) -> Result<bool, PartitionReadError> {
        let rows_left = self
            .batch
            .as_ref()
            .is_some_and(|batch| self.row + 1 < batch.num_rows());
        if rows_left {
            self.row += 1;
            return Ok(true);
        }
        self.batch = None;
        while self.inner.next()? {
            let batch = self.inner.get()?;
            if batch.num_rows() > 0 {
                self.batch = Some(batch);
                self.row = 0;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn get(&self) -> Result<Row, PartitionReadError> {
        let batch = self.batch.as_ref().context(NoCurrentBatchSnafu)?;
        Ok(Row::from_batch(batch, self.row))
    }

    fn close(&mut self) -> Result<(), PartitionReadError> {
        self.batch = None;
        self.inner.close()
    }
}
