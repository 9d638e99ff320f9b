//! Tag filters for layer selection.
//!
//! Array form (one operator per array, first element):
//!   ["has", key]              - tag exists
//!   ["!has", key]             - tag doesn't exist
//!   ["==", key, value]        - exact match
//!   ["!=", key, value]        - mismatch or absent
//!   ["in", key, v1, v2, ...]  - match any value
//!   ["!in", key, v1, ...]     - match none (or absent)
//!   ["all", f1, f2, ...]      - AND
//!   ["any", f1, f2, ...]      - OR
//!   ["none", f1, f2, ...]     - NOR
//!   ["!", f]                  - NOT
//!
//! Text form: see [`parse_filter`].

mod ast;
mod compile;
mod eval;
mod parser;

pub use ast::FilterExpr;
pub use compile::compile_filter;
pub use eval::evaluate_filter;
pub use parser::parse_filter;
