//! Pairwise correlation matrices for the heatmaps.

use crate::analyzers::aggregate::select_columns;
use crate::analyzers::types::CorrelationMatrix;
use crate::analyzers::utility::pearson;
use crate::model::{KEY_COLUMNS, MergedTable, NumericColumn};
use crate::parser::SchemaError;

/// Restricts a correlation to rows where a key column equals a value.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub column: &'a str,
    pub value: &'a str,
}

/// Pearson correlation between numeric columns of `table`.
///
/// With `columns` empty every numeric column takes part. With a `scope`, only
/// rows whose key column matches the value are used.
pub fn correlation_matrix(
    table: &MergedTable,
    scope: Option<Scope<'_>>,
    columns: &[&str],
) -> Result<CorrelationMatrix, SchemaError> {
    let mask: Vec<bool> = match scope {
        Some(scope) => {
            if !KEY_COLUMNS.contains(&scope.column) {
                return Err(SchemaError::UnknownColumn(scope.column.to_string()));
            }
            table
                .records
                .iter()
                .map(|r| r.key.get(scope.column) == Some(scope.value))
                .collect()
        }
        None => vec![true; table.len()],
    };

    let selected = if columns.is_empty() {
        table.numeric_columns()
    } else {
        select_columns(table, columns)?
    };
    let selected: Vec<NumericColumn> = selected
        .into_iter()
        .map(|c| NumericColumn {
            values: c
                .values
                .iter()
                .zip(&mask)
                .filter(|(_, keep)| **keep)
                .map(|(v, _)| *v)
                .collect(),
            name: c.name,
        })
        .collect();

    Ok(matrix(selected))
}

/// Pearson correlation between the named columns, using only rows where every
/// one of them is present.
pub fn complete_case_matrix(
    table: &MergedTable,
    columns: &[&str],
) -> Result<CorrelationMatrix, SchemaError> {
    let selected = select_columns(table, columns)?;
    let complete: Vec<bool> = (0..table.len())
        .map(|i| selected.iter().all(|c| c.values[i].is_some()))
        .collect();

    Ok(matrix(
        selected
            .into_iter()
            .map(|c| NumericColumn {
                values: c
                    .values
                    .into_iter()
                    .zip(&complete)
                    .filter(|(_, keep)| **keep)
                    .map(|(v, _)| v)
                    .collect(),
                name: c.name,
            })
            .collect(),
    ))
}

fn matrix(selected: Vec<NumericColumn>) -> CorrelationMatrix {
    let values = selected
        .iter()
        .map(|a| {
            selected
                .iter()
                .map(|b| pearson(&a.values, &b.values))
                .collect()
        })
        .collect();

    CorrelationMatrix {
        columns: selected.into_iter().map(|c| c.name).collect(),
        values,
    }
}

/// All six grade columns of both subjects.
pub fn subject_grade_columns(table: &MergedTable) -> Vec<String> {
    [false, true]
        .iter()
        .flat_map(|&second| {
            ["G1", "G2", "G3"]
                .iter()
                .map(move |g| table.score_column(g, second))
        })
        .collect()
}
