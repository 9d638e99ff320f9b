//! AST types for layer filters.

use std::fmt;

/// A compiled filter expression.
///
/// Both the array form (`["has", "place"]`) and the text form (`place`)
/// compile into this type, so evaluation never sees an unknown operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpr {
    /// Matches every feature (no filter configured)
    True,

    /// Tag existence: `["has", key]` or `key`
    Has(String),

    /// Tag absence: `["!has", key]` or `!key`
    NotHas(String),

    /// Exact value: `["==", key, value]` or `key=value`
    Equals { key: String, value: String },

    /// Value mismatch, true when the tag is absent: `["!=", key, value]`
    NotEquals { key: String, value: String },

    /// Value membership: `["in", key, v1, v2]` or `key=v1|v2`
    In { key: String, values: Vec<String> },

    /// Negated membership, true when the tag is absent: `["!in", key, v1, v2]`
    NotIn { key: String, values: Vec<String> },

    /// Boolean NOT: `["!", expr]` or `!expr`
    Not(Box<FilterExpr>),

    /// Boolean AND: `["all", ...]` or `a & b`
    All(Vec<FilterExpr>),

    /// Boolean OR: `["any", ...]` or `a | b`
    Any(Vec<FilterExpr>),
}

impl FilterExpr {
    /// Flatten nested All/Any and drop redundant `True` terms.
    pub fn simplify(self) -> Self {
        match self {
            FilterExpr::All(exprs) => {
                let mut flat = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    match expr.simplify() {
                        FilterExpr::All(inner) => flat.extend(inner),
                        FilterExpr::True => {}
                        other => flat.push(other),
                    }
                }
                match flat.len() {
                    0 => FilterExpr::True,
                    1 => flat.remove(0),
                    _ => FilterExpr::All(flat),
                }
            }
            FilterExpr::Any(exprs) => {
                let mut flat = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    match expr.simplify() {
                        FilterExpr::Any(inner) => flat.extend(inner),
                        other => flat.push(other),
                    }
                }
                // An empty Any matches nothing, so it stays as-is.
                match flat.len() {
                    1 => flat.remove(0),
                    _ => FilterExpr::Any(flat),
                }
            }
            FilterExpr::Not(inner) => match inner.simplify() {
                FilterExpr::Has(key) => FilterExpr::NotHas(key),
                FilterExpr::NotHas(key) => FilterExpr::Has(key),
                FilterExpr::Equals { key, value } => FilterExpr::NotEquals { key, value },
                FilterExpr::NotEquals { key, value } => FilterExpr::Equals { key, value },
                FilterExpr::In { key, values } => FilterExpr::NotIn { key, values },
                FilterExpr::NotIn { key, values } => FilterExpr::In { key, values },
                FilterExpr::Not(twice) => *twice,
                other => FilterExpr::Not(Box::new(other)),
            },
            other => other,
        }
    }

    /// Tag keys referenced anywhere in the expression, in first-seen order.
    pub fn keys(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_keys(&mut out);
        out
    }

    fn collect_keys<'a>(&'a self, out: &mut Vec<&'a str>) {
        let key = match self {
            FilterExpr::True => None,
            FilterExpr::Has(key) | FilterExpr::NotHas(key) => Some(key),
            FilterExpr::Equals { key, .. }
            | FilterExpr::NotEquals { key, .. }
            | FilterExpr::In { key, .. }
            | FilterExpr::NotIn { key, .. } => Some(key),
            FilterExpr::Not(inner) => {
                inner.collect_keys(out);
                None
            }
            FilterExpr::All(exprs) | FilterExpr::Any(exprs) => {
                for expr in exprs {
                    expr.collect_keys(out);
                }
                None
            }
        };
        if let Some(key) = key
            && !out.contains(&key.as_str())
        {
            out.push(key);
        }
    }
}

impl fmt::Display for FilterExpr {
    /// Renders the expression in the text form accepted by `parse_filter`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterExpr::True => Ok(()),
            FilterExpr::Has(key) => write!(f, "{key}"),
            FilterExpr::NotHas(key) => write!(f, "!{key}"),
            FilterExpr::Equals { key, value } => {
                write!(f, "{key}=")?;
                write_value(f, value)
            }
            FilterExpr::NotEquals { key, value } => {
                write!(f, "{key}!=")?;
                write_value(f, value)
            }
            FilterExpr::In { key, values } => {
                write!(f, "{key}=")?;
                write_values(f, values)
            }
            FilterExpr::NotIn { key, values } => {
                write!(f, "!({key}=")?;
                write_values(f, values)?;
                f.write_str(")")
            }
            FilterExpr::Not(inner) => write!(f, "!({inner})"),
            FilterExpr::All(exprs) => write_joined(f, exprs, " & "),
            FilterExpr::Any(exprs) => write_joined(f, exprs, " | "),
        }
    }
}

/// Values outside the bare-key alphabet are quoted.
fn write_value(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    let bare = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | ':' | '-' | '.'));
    if bare {
        f.write_str(value)
    } else {
        write!(f, "\"{value}\"")
    }
}

fn write_values(f: &mut fmt::Formatter<'_>, values: &[String]) -> fmt::Result {
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            f.write_str("|")?;
        }
        write_value(f, value)?;
    }
    Ok(())
}

fn write_joined(f: &mut fmt::Formatter<'_>, exprs: &[FilterExpr], sep: &str) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        match expr {
            FilterExpr::All(_) | FilterExpr::Any(_) => write!(f, "({expr})")?,
            _ => write!(f, "{expr}")?,
        }
    }
    Ok(())
}
