use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};

use crate::{
    wire::{self, ExecuteStatement, NamedArg},
    DriverError, Params, RawResult, RawStats, Statement, Value,
};

/// Blobs are standard base64; padding is optional on the wire.
const BLOB_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

pub(crate) fn build_execute_statement(
    statement: Statement,
    want_rows: bool,
) -> Result<ExecuteStatement, DriverError> {
    let Statement { sql, params } = statement;
    match params {
        Params::Positional(values) => {
            let args = values
                .into_iter()
                .map(encode_value)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ExecuteStatement {
                sql,
                args: (!args.is_empty()).then_some(args),
                named_args: None,
                want_rows,
            })
        }
        Params::Named(values) => {
            let named_args = values
                .into_iter()
                .map(|(name, value)| {
                    let name = normalize_named_parameter_name(&name)?;
                    let value = encode_value(value)?;
                    Ok(NamedArg { name, value })
                })
                .collect::<Result<Vec<_>, DriverError>>()?;

            Ok(ExecuteStatement {
                sql,
                args: None,
                named_args: (!named_args.is_empty()).then_some(named_args),
                want_rows,
            })
        }
    }
}

pub(crate) fn decode_raw_result(result: wire::ExecuteResult) -> Result<RawResult, DriverError> {
    let (columns, column_types) = result
        .cols
        .into_iter()
        .map(|col| (col.name.unwrap_or_default(), col.decltype))
        .unzip();

    let rows = result
        .rows
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(decode_value)
                .collect::<Result<Vec<_>, DriverError>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawResult {
        columns,
        column_types,
        rows,
        stats: RawStats {
            rows_affected: result.affected_row_count,
            rows_read: result.rows_read,
            rows_written: result.rows_written,
            query_duration_ms: result.query_duration_ms,
            last_insert_rowid: result.last_insert_rowid,
        },
    })
}

pub(crate) fn decode_value(value: wire::Value) -> Result<Value, DriverError> {
    match value {
        wire::Value::Null {} => Ok(Value::Null),
        wire::Value::Integer { value } => match value.parse::<i64>() {
            Ok(parsed) => Ok(Value::Integer(parsed)),
            Err(_) if is_wide_integer(&value) => Ok(Value::BigInt(value)),
            Err(err) => Err(DriverError::Decode(format!(
                "invalid integer value '{value}': {err}"
            ))),
        },
        wire::Value::Float { value } => {
            if value.is_finite() {
                Ok(Value::Float(value))
            } else {
                Err(DriverError::Decode(format!(
                    "non-finite float value '{value}' is unsupported"
                )))
            }
        }
        wire::Value::Text { value } => Ok(Value::Text(value)),
        wire::Value::Blob { base64 } => BLOB_ENGINE
            .decode(base64.as_bytes())
            .map(Value::Blob)
            .map_err(|err| DriverError::Decode(format!("invalid base64 blob: {err}"))),
    }
}

fn encode_value(value: Value) -> Result<wire::Value, DriverError> {
    match value {
        Value::Null => Ok(wire::Value::Null {}),
        Value::Integer(value) => Ok(wire::Value::Integer {
            value: value.to_string(),
        }),
        Value::BigInt(value) => {
            if !is_wide_integer(&value) {
                return Err(DriverError::Decode(format!(
                    "invalid big integer value '{value}'"
                )));
            }
            Ok(wire::Value::Integer { value })
        }
        Value::Float(value) => {
            if !value.is_finite() {
                return Err(DriverError::Decode(format!(
                    "non-finite float value '{value}' is unsupported"
                )));
            }
            Ok(wire::Value::Float { value })
        }
        Value::Text(value) => Ok(wire::Value::Text { value }),
        Value::Blob(bytes) => Ok(wire::Value::Blob {
            base64: BLOB_ENGINE.encode(bytes),
        }),
    }
}

fn is_wide_integer(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn normalize_named_parameter_name(name: &str) -> Result<String, DriverError> {
    let normalized = name.trim_start_matches([':', '@', '$']);
    if normalized.is_empty() {
        return Err(DriverError::Decode(
            "named parameter name cannot be empty".to_owned(),
        ));
    }
    Ok(normalized.to_owned())
}

#[cfg(test)]
mod tests {
    use crate::{decode, wire, DriverError, Params, Statement, Value};

    #[test]
    fn build_positional_stmt() {
        let stmt = decode::build_execute_statement(
            Statement::new("SELECT ?", [Value::integer(1)]),
            true,
        )
        .expect("must build statement");
        assert!(stmt.args.is_some());
        assert!(stmt.named_args.is_none());
    }

    #[test]
    fn build_named_stmt_strips_prefix() {
        let stmt = decode::build_execute_statement(
            Statement::new("SELECT :name", Params::named([(":name", Value::text("kit"))])),
            true,
        )
        .expect("must build statement");

        let args = stmt.named_args.expect("must contain named args");
        assert_eq!(args[0].name, "name");
    }

    #[test]
    fn build_rejects_non_finite_float() {
        let err = decode::build_execute_statement(
            Statement::new("SELECT ?", [Value::float(f64::NAN)]),
            true,
        )
        .expect_err("must fail");

        assert!(matches!(err, DriverError::Decode(_)));
    }

    #[test]
    fn decode_integer_parse_error() {
        let value = wire::Value::Integer {
            value: "nope".to_owned(),
        };
        let err = decode::decode_value(value).expect_err("must fail");
        assert!(matches!(err, DriverError::Decode(_)));
    }

    #[test]
    fn decode_wide_integer_keeps_text() {
        let value = wire::Value::Integer {
            value: "18446744073709551615".to_owned(),
        };
        assert_eq!(
            decode::decode_value(value).expect("must decode"),
            Value::BigInt("18446744073709551615".to_owned())
        );
    }

    #[test]
    fn decode_blob_with_and_without_padding() {
        for base64 in ["AQID", "AQI=", "AQI"] {
            let decoded = decode::decode_value(wire::Value::Blob {
                base64: base64.to_owned(),
            })
            .expect("must decode");
            assert!(matches!(decoded, Value::Blob(_)));
        }
        let decoded = decode::decode_value(wire::Value::Blob {
            base64: "AQID".to_owned(),
        })
        .expect("must decode");
        assert_eq!(decoded, Value::Blob(vec![1, 2, 3]));
    }

    #[test]
    fn decode_raw_result_preserves_telemetry() {
        let decoded = decode::decode_raw_result(wire::ExecuteResult {
            cols: vec![
                wire::Col {
                    name: Some("id".to_owned()),
                    decltype: Some("INTEGER".to_owned()),
                },
                wire::Col {
                    name: None,
                    decltype: None,
                },
            ],
            rows: vec![vec![
                wire::Value::Integer {
                    value: "1".to_owned(),
                },
                wire::Value::Null {},
            ]],
            affected_row_count: 1,
            last_insert_rowid: Some("7".to_owned()),
            rows_read: Some(11),
            rows_written: Some(3),
            query_duration_ms: Some(1.75),
        })
        .expect("must decode");

        assert_eq!(decoded.columns, ["id", ""]);
        assert_eq!(decoded.column_types, [Some("INTEGER".to_owned()), None]);
        assert_eq!(decoded.rows[0], [Value::Integer(1), Value::Null]);
        assert_eq!(decoded.stats.rows_affected, 1);
        assert_eq!(decoded.stats.last_insert_rowid.as_deref(), Some("7"));
        assert_eq!(decoded.stats.rows_read, Some(11));
        assert_eq!(decoded.stats.rows_written, Some(3));
        assert_eq!(decoded.stats.query_duration_ms, Some(1.75));
    }
}
