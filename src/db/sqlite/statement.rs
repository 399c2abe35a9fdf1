//! Compiled SQLite statements.
//!
//! Statements are compiled one at a time from the front of the SQL text, so
//! each result of a multi-statement execution is classified by its own
//! column count before it runs.

use libsqlite3_sys as ffi;
use std::ffi::{c_int, CStr};
use std::ptr::{self, NonNull};

/// Result code returned by a failed SQLite call.
pub(super) type ResultCode = c_int;

/// Outcome of one `sqlite3_step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Step {
    Row,
    Done,
}

/// A cell as SQLite stores it.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum StoredCell {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl StoredCell {
    /// Name of the storage class, used when a column has no declared type.
    pub(super) fn storage_class(&self) -> &'static str {
        match self {
            StoredCell::Null => "NULL",
            StoredCell::Integer(_) => "INTEGER",
            StoredCell::Float(_) => "REAL",
            StoredCell::Text(_) => "TEXT",
            StoredCell::Blob(_) => "BLOB",
        }
    }
}

/// An owned `sqlite3_stmt`, finalized on drop.
pub(super) struct RawStatement {
    stmt: NonNull<ffi::sqlite3_stmt>,
}

// The statement is only touched while the connection lock is held.
unsafe impl Send for RawStatement {}

impl RawStatement {
    /// Compiles the first statement of `sql`.
    ///
    /// Returns the statement and the rest of the text, or `None` once only
    /// whitespace and comments remain.
    pub(super) fn prepare_next(
        db: NonNull<ffi::sqlite3>,
        mut sql: &str,
    ) -> Result<Option<(Self, &str)>, ResultCode> {
        loop {
            if sql.trim().is_empty() {
                return Ok(None);
            }

            let len = c_int::try_from(sql.len()).map_err(|_| ffi::SQLITE_TOOBIG)?;
            let mut stmt = ptr::null_mut();
            let mut tail = ptr::null();

            let rc = unsafe {
                ffi::sqlite3_prepare_v2(db.as_ptr(), sql.as_ptr().cast(), len, &mut stmt, &mut tail)
            };
            if rc != ffi::SQLITE_OK {
                return Err(rc);
            }

            let consumed = if tail.is_null() {
                sql.len()
            } else {
                (tail as usize).saturating_sub(sql.as_ptr() as usize)
            };
            let rest = sql.get(consumed..).unwrap_or("");

            match NonNull::new(stmt) {
                Some(stmt) => return Ok(Some((Self { stmt }, rest))),
                // A lone comment or a stray semicolon compiles to nothing.
                None if consumed == 0 => return Ok(None),
                None => sql = rest,
            }
        }
    }

    pub(super) fn column_count(&self) -> usize {
        let count = unsafe { ffi::sqlite3_column_count(self.stmt.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    pub(super) fn column_name(&self, index: usize) -> String {
        let name = unsafe { ffi::sqlite3_column_name(self.stmt.as_ptr(), column(index)) };
        owned_text(name).unwrap_or_default()
    }

    /// The type the column was declared with, if it comes straight from a
    /// table column.
    pub(super) fn declared_type(&self, index: usize) -> Option<String> {
        let declared = unsafe { ffi::sqlite3_column_decltype(self.stmt.as_ptr(), column(index)) };
        owned_text(declared).filter(|t| !t.is_empty())
    }

    pub(super) fn step(&mut self) -> Result<Step, ResultCode> {
        match unsafe { ffi::sqlite3_step(self.stmt.as_ptr()) } {
            ffi::SQLITE_ROW => Ok(Step::Row),
            ffi::SQLITE_DONE => Ok(Step::Done),
            rc => Err(rc),
        }
    }

    /// Reads one cell of the row the statement is positioned on.
    pub(super) fn cell(&self, index: usize) -> StoredCell {
        let stmt = self.stmt.as_ptr();
        let index = column(index);

        unsafe {
            match ffi::sqlite3_column_type(stmt, index) {
                ffi::SQLITE_INTEGER => StoredCell::Integer(ffi::sqlite3_column_int64(stmt, index)),
                ffi::SQLITE_FLOAT => StoredCell::Float(ffi::sqlite3_column_double(stmt, index)),
                ffi::SQLITE_TEXT => {
                    let text = ffi::sqlite3_column_text(stmt, index);
                    let bytes = raw_bytes(text.cast(), ffi::sqlite3_column_bytes(stmt, index));
                    StoredCell::Text(String::from_utf8_lossy(bytes).into_owned())
                }
                ffi::SQLITE_BLOB => {
                    let blob = ffi::sqlite3_column_blob(stmt, index);
                    let bytes = raw_bytes(blob.cast(), ffi::sqlite3_column_bytes(stmt, index));
                    StoredCell::Blob(bytes.to_vec())
                }
                _ => StoredCell::Null,
            }
        }
    }

    /// Reads every cell of the current row.
    pub(super) fn row(&self) -> Vec<StoredCell> {
        (0..self.column_count()).map(|i| self.cell(i)).collect()
    }
}

impl Drop for RawStatement {
    fn drop(&mut self) {
        unsafe {
            ffi::sqlite3_finalize(self.stmt.as_ptr());
        }
    }
}

/// Rows changed by the most recent statement, or 0 if `total_before` shows
/// the statement changed nothing.
///
/// `sqlite3_changes` keeps the count of the last INSERT, UPDATE or DELETE,
/// so DDL and queries that follow one would otherwise report it again.
pub(super) fn changes_since(db: NonNull<ffi::sqlite3>, total_before: i64) -> u64 {
    if total_changes(db) <= total_before {
        return 0;
    }
    let changes = unsafe { ffi::sqlite3_changes64(db.as_ptr()) };
    u64::try_from(changes).unwrap_or(0)
}

/// Rows changed since the connection was opened, triggers included.
pub(super) fn total_changes(db: NonNull<ffi::sqlite3>) -> i64 {
    unsafe { ffi::sqlite3_total_changes64(db.as_ptr()) }
}

/// The English description of a result code.
pub(super) fn describe(rc: ResultCode) -> String {
    owned_text(unsafe { ffi::sqlite3_errstr(rc) }).unwrap_or_else(|| format!("error code {rc}"))
}

fn column(index: usize) -> c_int {
    // Out-of-range indexes read as NULL.
    c_int::try_from(index).unwrap_or(c_int::MAX)
}

fn owned_text(text: *const std::ffi::c_char) -> Option<String> {
    if text.is_null() {
        return None;
    }
    let text = unsafe { CStr::from_ptr(text) };
    Some(text.to_string_lossy().into_owned())
}

unsafe fn raw_bytes<'a>(data: *const u8, len: c_int) -> &'a [u8] {
    match usize::try_from(len) {
        Ok(len) if len > 0 && !data.is_null() => std::slice::from_raw_parts(data, len),
        _ => &[],
    }
}
