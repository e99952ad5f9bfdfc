// SPDX-License-Identifier: Apache-2.0

//! Result materialization
//!
//! Turns the fragment stream of a batch (rows interleaved with
//! end-of-statement markers) into fully drained [`ResultSet`]s. Every value
//! is converted to its display string here; drivers only decode cells into
//! [`CellValue`]s.

use std::fmt;

use futures::{Stream, StreamExt};
use tracing::debug;

use crate::engine::error::{EngineError, EngineResult};
use crate::engine::limits::{Limits, Phase};
use crate::engine::types::{ColumnDescriptor, ResultSet};
use crate::engine::value::CellValue;

/// One item of a batch's output.
#[derive(Debug)]
pub enum Fragment<R> {
    Row(R),
    /// The current statement finished. Statements that produced no rows
    /// only ever emit this.
    StatementDone,
}

/// A driver row that can describe its columns and decode its cells.
pub trait ScanRow {
    type Error: fmt::Display;

    fn columns(&self) -> Result<Vec<ColumnDescriptor>, Self::Error>;

    fn scan(&self) -> Result<Vec<CellValue>, Self::Error>;
}

/// Outcome of a successful drain.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Drained {
    pub sets: Vec<ResultSet>,
    /// Statements the server reported as finished.
    pub statements: usize,
}

impl Drained {
    /// A statement that returned no rows. Its column shape is not visible
    /// in the stream and has to be asked for separately.
    pub fn is_single_empty_statement(&self) -> bool {
        self.sets.is_empty() && self.statements <= 1
    }
}

/// Drains `stream` to completion.
///
/// Any failure aborts the whole batch; sets completed before the failure
/// are dropped with it. Errors are classified by where they happen:
/// before the current statement has produced rows they are execution
/// errors, after that iteration errors.
pub async fn drain<S, R, E>(mut stream: S, limits: &Limits) -> EngineResult<Drained>
where
    S: Stream<Item = Result<Fragment<R>, E>> + Unpin,
    R: ScanRow,
    E: fmt::Display,
{
    let mut drained = Drained::default();
    let mut current: Option<ResultSet> = None;

    loop {
        let next = limits
            .guard(Phase::Fetch, async { Ok::<_, EngineError>(stream.next().await) })
            .await?;

        match next {
            None => break,
            Some(Err(e)) => {
                return Err(if current.is_some() {
                    EngineError::iteration_error(e.to_string())
                } else {
                    EngineError::execution_error(e.to_string())
                });
            }
            Some(Ok(Fragment::Row(row))) => {
                let mut set = match current.take() {
                    Some(set) => set,
                    None => open_set(&row)?,
                };
                push_row(&mut set, &row)?;
                current = Some(set);
            }
            Some(Ok(Fragment::StatementDone)) => {
                drained.statements += 1;
                if let Some(set) = current.take() {
                    debug!(
                        columns = set.column_count(),
                        rows = set.row_count(),
                        "Result set drained"
                    );
                    drained.sets.push(set);
                }
            }
        }
    }

    // Some drivers end the stream without a trailing marker.
    if let Some(set) = current.take() {
        drained.sets.push(set);
    }

    Ok(drained)
}

fn open_set<R: ScanRow>(row: &R) -> EngineResult<ResultSet> {
    let columns = row
        .columns()
        .map_err(|e| EngineError::metadata_error(e.to_string()))?;
    Ok(ResultSet::new(columns))
}

fn push_row<R: ScanRow>(set: &mut ResultSet, row: &R) -> EngineResult<()> {
    let cells = row
        .scan()
        .map_err(|e| EngineError::scan_error(e.to_string()))?;
    if cells.len() != set.column_count() {
        return Err(EngineError::scan_error(format!(
            "row has {} values but the result set has {} columns",
            cells.len(),
            set.column_count()
        )));
    }
    set.rows
        .push(cells.into_iter().map(CellValue::into_display_string).collect());
    Ok(())
}
