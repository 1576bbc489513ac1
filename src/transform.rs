//! Raw backend results to canonical [`QueryResultSet`]s.

use std::collections::HashSet;

use crate::{
    typemap::canonical_type, Dialect, DriverError, DriverFlags, Header, QueryResultSet,
    QueryStats, RawResult, Result, Row, Value,
};

/// Number of `__<name>_<n>` suffixes probed before giving up on a duplicate.
const MAX_RENAME_ATTEMPTS: usize = 20;

/// Largest integer a double represents exactly (2^53 - 1).
const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// How integers wider than `i64` are surfaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IntMode {
    /// Normalize to plain numbers.
    #[default]
    Number,
    /// Keep the wide representation untruncated.
    BigInt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransformOptions {
    pub dialect: Dialect,
    pub int_mode: IntMode,
}

impl TransformOptions {
    pub fn from_flags(flags: &DriverFlags) -> Self {
        Self {
            dialect: flags.dialect,
            int_mode: if flags.support_big_int {
                IntMode::BigInt
            } else {
                IntMode::Number
            },
        }
    }
}

/// Converts one raw result into the canonical shape.
///
/// Duplicate column labels get unique internal names so no row value is
/// overwritten; `display_name` keeps the original label.
pub fn transform(raw: RawResult, options: TransformOptions) -> Result<QueryResultSet> {
    let RawResult {
        columns,
        column_types,
        rows,
        stats,
    } = raw;

    if !column_types.is_empty() && column_types.len() != columns.len() {
        return Err(DriverError::Transform(format!(
            "column type count mismatch: {} columns, {} types",
            columns.len(),
            column_types.len()
        )));
    }

    let mut used = HashSet::with_capacity(columns.len());
    let mut headers = Vec::with_capacity(columns.len());
    for (index, display_name) in columns.into_iter().enumerate() {
        let name = unique_internal_name(&display_name, &used)?;
        used.insert(name.clone());

        let original_type = column_types.get(index).cloned().flatten();
        headers.push(Header {
            name,
            display_name,
            column_type: canonical_type(options.dialect, original_type.as_deref()),
            original_type,
        });
    }

    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(row_index, row)| {
            if row.len() != headers.len() {
                return Err(DriverError::Transform(format!(
                    "row {row_index} has {} values, expected {}",
                    row.len(),
                    headers.len()
                )));
            }
            Ok(headers
                .iter()
                .zip(row)
                .map(|(header, value)| (header.name.clone(), normalize(value, options.int_mode)))
                .collect::<Row>())
        })
        .collect::<Result<Vec<_>>>()?;

    let last_insert_rowid = stats
        .last_insert_rowid
        .as_deref()
        .map(|text| parse_rowid(text, options.int_mode))
        .transpose()?;

    Ok(QueryResultSet {
        headers,
        rows,
        stats: QueryStats {
            rows_affected: stats.rows_affected,
            rows_read: stats.rows_read,
            rows_written: stats.rows_written,
            query_duration_ms: stats.query_duration_ms,
        },
        last_insert_rowid,
    })
}

fn unique_internal_name(display_name: &str, used: &HashSet<String>) -> Result<String> {
    if !used.contains(display_name) {
        return Ok(display_name.to_owned());
    }
    (0..MAX_RENAME_ATTEMPTS)
        .map(|attempt| format!("__{display_name}_{attempt}"))
        .find(|candidate| !used.contains(candidate))
        .ok_or_else(|| {
            DriverError::Transform(format!(
                "column '{display_name}' repeats more than {MAX_RENAME_ATTEMPTS} times"
            ))
        })
}

fn normalize(value: Value, int_mode: IntMode) -> Value {
    match (value, int_mode) {
        (Value::BigInt(text), IntMode::Number) => match text.parse::<f64>() {
            Ok(number) => Value::Float(number),
            Err(_) => Value::BigInt(text),
        },
        (value, _) => value,
    }
}

fn parse_rowid(text: &str, int_mode: IntMode) -> Result<Value> {
    let text = text.trim();
    if let Ok(rowid) = text.parse::<i64>() {
        if rowid.unsigned_abs() <= MAX_SAFE_INTEGER {
            return Ok(Value::Integer(rowid));
        }
        return Ok(match int_mode {
            IntMode::Number => Value::Float(rowid as f64),
            IntMode::BigInt => Value::BigInt(text.to_owned()),
        });
    }
    if text.parse::<u128>().is_ok() {
        return Ok(normalize(Value::BigInt(text.to_owned()), int_mode));
    }
    Err(DriverError::Transform(format!(
        "invalid last insert rowid '{text}'"
    )))
}
