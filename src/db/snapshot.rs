//! Builders for column and row snapshots.

use super::normalize::normalize;
use super::types::{ColumnDescriptor, ColumnSet, RowSnapshot};
use super::{format_driver_error, ResultMetadata, RowSource};
use crate::error::{Result, SqlRunError};

impl ColumnSet {
    /// Reads one descriptor per column, in column order.
    ///
    /// Any metadata access failure aborts the snapshot with a
    /// [`SqlRunError::MetadataRead`].
    pub fn read(metadata: &dyn ResultMetadata) -> Result<Self> {
        let to_error = |e: sqlx::Error| SqlRunError::metadata_read(format_driver_error(&e));

        let count = metadata.column_count().map_err(to_error)?;
        let mut columns = Vec::with_capacity(count);

        for index in 0..count {
            columns.push(ColumnDescriptor::new(
                metadata.type_name(index).map_err(to_error)?,
                metadata.label(index).map_err(to_error)?,
                metadata.display_size(index).map_err(to_error)?,
            ));
        }

        Ok(Self::from(columns))
    }
}

impl RowSnapshot {
    /// Reads and normalizes the first `width` columns of a positioned row.
    ///
    /// A failing column aborts the whole row with a [`SqlRunError::RowRead`].
    pub fn read(row: &dyn RowSource, width: usize) -> Result<Self> {
        let values = (0..width)
            .map(|index| {
                row.get(index)
                    .map(normalize)
                    .map_err(|e| SqlRunError::row_read(format_driver_error(&e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from(values))
    }
}
