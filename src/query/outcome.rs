//! Folding streamed results into execution outcomes.

use super::sink::{ResultEvent, SinkEvent};
use crate::db::{ColumnSet, ResultSnapshot, RowSnapshot};
use crate::error::SqlRunError;

/// One result of an execution, fully materialized.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    RowSet(ResultSnapshot),
    UpdateCount(u64),
    Error(SqlRunError),
}

impl ExecutionOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ExecutionOutcome::Error(_))
    }
}

/// Folds the events of one submission into outcomes, in ordinal order.
///
/// An error on a row-set ordinal replaces the rows received before it.
pub fn collect_outcomes(events: impl IntoIterator<Item = ResultEvent>) -> Vec<ExecutionOutcome> {
    let mut outcomes = Vec::new();
    let mut open: Option<(usize, ColumnSet, Vec<RowSnapshot>)> = None;

    let close = |open: &mut Option<(usize, ColumnSet, Vec<RowSnapshot>)>,
                 outcomes: &mut Vec<ExecutionOutcome>| {
        if let Some((_, columns, rows)) = open.take() {
            outcomes.push(ExecutionOutcome::RowSet(ResultSnapshot::new(columns, rows)));
        }
    };

    for event in events {
        let same_ordinal = matches!(&open, Some((ordinal, _, _)) if *ordinal == event.ordinal);

        match event.payload {
            SinkEvent::Columns(columns) => {
                close(&mut open, &mut outcomes);
                open = Some((event.ordinal, columns, Vec::new()));
            }
            SinkEvent::Row(row) => {
                if !same_ordinal {
                    close(&mut open, &mut outcomes);
                    open = Some((event.ordinal, ColumnSet::default(), Vec::new()));
                }
                if let Some((_, _, rows)) = open.as_mut() {
                    rows.push(row);
                }
            }
            SinkEvent::UpdateCount(count) => {
                close(&mut open, &mut outcomes);
                outcomes.push(ExecutionOutcome::UpdateCount(count));
            }
            SinkEvent::Error(error) => {
                if same_ordinal {
                    open = None;
                } else {
                    close(&mut open, &mut outcomes);
                }
                outcomes.push(ExecutionOutcome::Error(error));
            }
        }
    }

    close(&mut open, &mut outcomes);
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnDescriptor, Value};
    use pretty_assertions::assert_eq;

    fn event(ordinal: usize, payload: SinkEvent) -> ResultEvent {
        ResultEvent {
            submission: 1,
            ordinal,
            payload,
        }
    }

    fn columns() -> ColumnSet {
        ColumnSet::from(vec![ColumnDescriptor::new("INT4", "n", 11)])
    }

    fn row(n: i32) -> RowSnapshot {
        RowSnapshot::from(vec![Value::Int(n)])
    }

    #[test]
    fn test_collect_mixed_results() {
        let outcomes = collect_outcomes(vec![
            event(0, SinkEvent::UpdateCount(2)),
            event(1, SinkEvent::Columns(columns())),
            event(1, SinkEvent::Row(row(1))),
            event(1, SinkEvent::Row(row(2))),
            event(2, SinkEvent::Columns(columns())),
        ]);

        assert_eq!(
            outcomes,
            vec![
                ExecutionOutcome::UpdateCount(2),
                ExecutionOutcome::RowSet(ResultSnapshot::new(columns(), vec![row(1), row(2)])),
                ExecutionOutcome::RowSet(ResultSnapshot::new(columns(), vec![])),
            ]
        );
    }

    #[test]
    fn test_error_replaces_partial_row_set() {
        let error = SqlRunError::row_read("connection reset");
        let outcomes = collect_outcomes(vec![
            event(0, SinkEvent::Columns(columns())),
            event(0, SinkEvent::Row(row(1))),
            event(0, SinkEvent::Error(error.clone())),
        ]);

        assert_eq!(outcomes, vec![ExecutionOutcome::Error(error)]);
        assert!(outcomes[0].is_error());
    }

    #[test]
    fn test_error_after_row_set_keeps_it() {
        let error = SqlRunError::more_results("boom");
        let outcomes = collect_outcomes(vec![
            event(0, SinkEvent::Columns(columns())),
            event(0, SinkEvent::Row(row(1))),
            event(1, SinkEvent::Error(error.clone())),
        ]);

        assert_eq!(outcomes.len(), 2);
        assert_eq!(
            outcomes[0],
            ExecutionOutcome::RowSet(ResultSnapshot::new(columns(), vec![row(1)]))
        );
        assert_eq!(outcomes[1], ExecutionOutcome::Error(error));
    }

    #[test]
    fn test_no_events_no_outcomes() {
        assert!(collect_outcomes(Vec::new()).is_empty());
    }
}
