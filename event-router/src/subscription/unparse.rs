//! Canonical S-expression rendering of expression trees.

use super::node::{DecomposeMode, Literal, Node};
use super::value::write_opaque;
use std::fmt::{Display, Formatter, Write};

impl Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::Int32(value) => write!(f, "{value}"),
            Literal::Int64(value) => write!(f, "{value}L"),
            Literal::Real64(value) => write!(f, "{value:?}"),
            Literal::String(value) => write_quoted(f, value),
            Literal::Opaque(bytes) => write_opaque(f, bytes),
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Const(literal) => write!(f, "{literal}"),
            Node::Field(name) => write_field(f, name),
            Node::Require(name) => write_named("require", f, name),
            Node::Size(name) => write_named("size", f, name),
            Node::Nan(name) => write_named("nan", f, name),
            Node::TypeTest(name, value_type) => write_named(value_type.function_name(), f, name),
            Node::And(children) => write_list(f, "&&", children),
            Node::Or(children) => write_list(f, "||", children),
            Node::Xor(children) => write_list(f, "^^", children),
            Node::Not(child) => write!(f, "(! {child})"),
            Node::Compare(op, left, right) => write!(f, "({} {left} {right})", op.symbol()),
            Node::Math(op, left, right) => write!(f, "({} {left} {right})", op.symbol()),
            Node::Negate(child) => write!(f, "(- {child})"),
            Node::BitNot(child) => write!(f, "(~ {child})"),
            Node::StringMatch(expr, predicate) => {
                write!(f, "({} {expr} ", predicate.op().function_name())?;
                write_quoted(f, predicate.operand())?;
                f.write_char(')')
            }
            Node::FoldCase(expr) => write!(f, "(fold-case {expr})"),
            Node::Decompose(expr, DecomposeMode::Canonical) => write!(f, "(decompose {expr})"),
            Node::Decompose(expr, DecomposeMode::Compatibility) => {
                write!(f, "(decompose-compat {expr})")
            }
        }
    }
}

/// Renders `node` as its canonical S-expression.
pub fn unparse(node: &Node) -> String {
    node.to_string()
}

fn write_field(f: &mut Formatter<'_>, name: &str) -> std::fmt::Result {
    f.write_str("(field ")?;
    write_quoted(f, name)?;
    f.write_char(')')
}

fn write_named(function: &str, f: &mut Formatter<'_>, name: &str) -> std::fmt::Result {
    write!(f, "({function} ")?;
    write_field(f, name)?;
    f.write_char(')')
}

fn write_list(f: &mut Formatter<'_>, op: &str, children: &[Node]) -> std::fmt::Result {
    write!(f, "({op}")?;
    for child in children {
        write!(f, " {child}")?;
    }
    f.write_char(')')
}

fn write_quoted(f: &mut Formatter<'_>, text: &str) -> std::fmt::Result {
    f.write_char('\'')?;
    for c in text.chars() {
        if c == '\'' || c == '\\' {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    f.write_char('\'')
}
