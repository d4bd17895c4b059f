//! The subscription language: parsing, static checking, constant folding
//! and three-valued evaluation of notification filters.
//!
//! ```
//! use event_router::subscription::{attributes, parse_and_validate, Truth};
//!
//! let filter = parse_and_validate("require (From-Alice) && size (Message) > 3").unwrap();
//!
//! let notification = attributes([("From-Alice", "yes"), ("Message", "hello")]);
//! assert_eq!(filter.evaluate(&notification), Truth::True);
//!
//! // A missing field leaves the filter undefined rather than false.
//! assert_eq!(filter.evaluate(&attributes([("Message", "hello")])), Truth::Bottom);
//! ```

mod fold;
mod lexer;
mod node;
mod parser;
mod unparse;
mod value;
pub(crate) mod wildcard;

pub use node::{
    CompareOp, DecomposeMode, EvalType, Literal, MathOp, Node, NodeError, StringOp,
    StringPredicate, Truth, CONST_FALSE, CONST_TRUE,
};
pub use parser::{parse, parse_and_validate, ParseError, MAX_NESTING};
pub use unparse::unparse;
pub use value::{attributes, parse_value_expr, union, Attributes, InvalidValueExpr, Value, ValueType};
