//! Compilation of configured filters into `FilterExpr`.
//!
//! Filters arrive from the config file either as an operator array
//! (`["==", "natural", "water"]`, `["all", ["has", "name"], ...]`) or as a
//! string in the text form handled by [`parse_filter`]. Unknown operators
//! are rejected here, once, so evaluation never has to deal with them.

use super::ast::FilterExpr;
use super::parse_filter;
use serde_json::Value;

/// Compile a configured filter value.
pub fn compile_filter(value: &Value) -> Result<FilterExpr, String> {
    match value {
        Value::Null => Ok(FilterExpr::True),
        Value::Bool(true) => Ok(FilterExpr::True),
        Value::String(text) => parse_filter(text),
        Value::Array(items) => compile_array(items).map(FilterExpr::simplify),
        other => Err(format!(
            "expected an operator array or a filter string, got {}",
            other
        )),
    }
}

fn compile_array(items: &[Value]) -> Result<FilterExpr, String> {
    let (op, args) = match items.split_first() {
        Some((Value::String(op), args)) => (op.as_str(), args),
        Some((other, _)) => return Err(format!("operator must be a string, got {}", other)),
        None => return Err("empty filter array".to_string()),
    };

    match op {
        "has" => Ok(FilterExpr::Has(single_key(op, args)?)),
        "!has" => Ok(FilterExpr::NotHas(single_key(op, args)?)),
        "==" => {
            let (key, value) = key_value(op, args)?;
            Ok(FilterExpr::Equals { key, value })
        }
        "!=" => {
            let (key, value) = key_value(op, args)?;
            Ok(FilterExpr::NotEquals { key, value })
        }
        "in" => {
            let (key, values) = key_values(op, args)?;
            Ok(FilterExpr::In { key, values })
        }
        "!in" => {
            let (key, values) = key_values(op, args)?;
            Ok(FilterExpr::NotIn { key, values })
        }
        "all" => Ok(FilterExpr::All(nested(args)?)),
        "any" => Ok(FilterExpr::Any(nested(args)?)),
        "none" => Ok(FilterExpr::Not(Box::new(FilterExpr::Any(nested(args)?)))),
        "!" => match args {
            [inner] => Ok(FilterExpr::Not(Box::new(compile_filter(inner)?))),
            _ => Err(arity(op, "exactly 1 argument", args.len())),
        },
        unknown => Err(format!("unknown filter operator '{}'", unknown)),
    }
}

fn nested(args: &[Value]) -> Result<Vec<FilterExpr>, String> {
    args.iter().map(compile_filter).collect()
}

fn single_key(op: &str, args: &[Value]) -> Result<String, String> {
    match args {
        [key] => key_string(op, key),
        _ => Err(arity(op, "exactly 1 argument", args.len())),
    }
}

fn key_value(op: &str, args: &[Value]) -> Result<(String, String), String> {
    match args {
        [key, value] => Ok((key_string(op, key)?, scalar(op, value)?)),
        _ => Err(arity(op, "exactly 2 arguments", args.len())),
    }
}

fn key_values(op: &str, args: &[Value]) -> Result<(String, Vec<String>), String> {
    match args.split_first() {
        Some((key, values)) if !values.is_empty() => {
            let values = values
                .iter()
                .map(|v| scalar(op, v))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((key_string(op, key)?, values))
        }
        _ => Err(arity(op, "a key and at least 1 value", args.len())),
    }
}

fn key_string(op: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(key) if !key.is_empty() => Ok(key.clone()),
        other => Err(format!("'{}' expects a non-empty tag key, got {}", op, other)),
    }
}

/// Tag values are strings; numbers and booleans compare by their text.
fn scalar(op: &str, value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("'{}' expects a scalar value, got {}", op, other)),
    }
}

fn arity(op: &str, expected: &str, got: usize) -> String {
    format!("'{}' expects {}, got {}", op, expected, got)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn has_and_equals() {
        assert_eq!(
            compile_filter(&json!(["has", "landuse"])).unwrap(),
            FilterExpr::Has("landuse".into())
        );
        assert_eq!(
            compile_filter(&json!(["==", "natural", "water"])).unwrap(),
            FilterExpr::Equals {
                key: "natural".into(),
                value: "water".into()
            }
        );
    }

    #[test]
    fn numbers_compare_as_text() {
        assert_eq!(
            compile_filter(&json!(["==", "lanes", 2])).unwrap(),
            FilterExpr::Equals {
                key: "lanes".into(),
                value: "2".into()
            }
        );
    }

    #[test]
    fn nested_composites() {
        let expr = compile_filter(&json!([
            "all",
            ["has", "building"],
            ["!", ["==", "building", "no"]],
            ["any", ["in", "amenity", "school", "college"], ["!has", "shop"]]
        ]))
        .unwrap();
        let FilterExpr::All(parts) = expr else {
            panic!("expected All, got {expr:?}");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(
            parts[1],
            FilterExpr::NotEquals {
                key: "building".into(),
                value: "no".into()
            }
        );
        assert!(matches!(parts[2], FilterExpr::Any(_)));
    }

    #[test]
    fn none_negates_any() {
        let expr = compile_filter(&json!(["none", ["has", "a"], ["has", "b"]])).unwrap();
        assert_eq!(
            expr,
            FilterExpr::Not(Box::new(FilterExpr::Any(vec![
                FilterExpr::Has("a".into()),
                FilterExpr::Has("b".into()),
            ])))
        );
    }

    #[test]
    fn string_uses_text_form() {
        assert_eq!(
            compile_filter(&json!("place")).unwrap(),
            FilterExpr::Has("place".into())
        );
    }

    #[test]
    fn missing_filter_matches_all() {
        assert_eq!(compile_filter(&Value::Null).unwrap(), FilterExpr::True);
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = compile_filter(&json!(["~=", "name", "foo"])).unwrap_err();
        assert!(err.contains("unknown filter operator"), "{err}");
    }

    #[test]
    fn rejects_bad_arity_and_operands() {
        assert!(compile_filter(&json!(["has"])).is_err());
        assert!(compile_filter(&json!(["==", "natural"])).is_err());
        assert!(compile_filter(&json!(["in", "highway"])).is_err());
        assert!(compile_filter(&json!(["==", "natural", ["water"]])).is_err());
        assert!(compile_filter(&json!(["has", ""])).is_err());
        assert!(compile_filter(&json!([])).is_err());
        assert!(compile_filter(&json!([1, "a"])).is_err());
        assert!(compile_filter(&json!(42)).is_err());
        assert!(compile_filter(&json!(["all", ["bogus"]])).is_err());
    }
}
