//! Constant folding.
//!
//! [`Node::inline_constants`] is a pure rewrite: the input tree is left alone
//! and a new, equivalent tree is returned. Any sub-expression that evaluates
//! to a defined value with no attributes at all cannot depend on a field, so
//! it is replaced by that value.

use super::node::{Literal, Node, Scalar};
use super::value::Attributes;

impl Node {
    /// Returns an equivalent tree with field-independent parts collapsed to
    /// literals. Applying it twice gives the same tree as applying it once.
    pub fn inline_constants(&self) -> Node {
        match self {
            Node::Const(_)
            | Node::Field(_)
            | Node::Require(_)
            | Node::Size(_)
            | Node::Nan(_)
            | Node::TypeTest(..) => self.clone(),
            Node::And(children) => inline_junction(children, false, Node::And),
            Node::Or(children) => inline_junction(children, true, Node::Or),
            Node::Xor(children) => {
                collapse(Node::Xor(children.iter().map(Node::inline_constants).collect()))
            }
            Node::Not(child) => collapse(Node::Not(Box::new(child.inline_constants()))),
            Node::Compare(op, left, right) => collapse(Node::Compare(
                *op,
                Box::new(left.inline_constants()),
                Box::new(right.inline_constants()),
            )),
            Node::Math(op, left, right) => collapse(Node::Math(
                *op,
                Box::new(left.inline_constants()),
                Box::new(right.inline_constants()),
            )),
            Node::Negate(child) => collapse(Node::Negate(Box::new(child.inline_constants()))),
            Node::BitNot(child) => collapse(Node::BitNot(Box::new(child.inline_constants()))),
            Node::StringMatch(expr, predicate) => collapse(Node::StringMatch(
                Box::new(expr.inline_constants()),
                predicate.clone(),
            )),
            Node::FoldCase(expr) => collapse(Node::FoldCase(Box::new(expr.inline_constants()))),
            Node::Decompose(expr, mode) => {
                collapse(Node::Decompose(Box::new(expr.inline_constants()), *mode))
            }
        }
    }
}

/// Folds an AND (`absorbing == false`) or OR (`absorbing == true`).
///
/// The absorbing constant short-circuits the whole junction, the identity
/// constant is dropped, and a junction left with one child becomes that child.
fn inline_junction(children: &[Node], absorbing: bool, rebuild: fn(Vec<Node>) -> Node) -> Node {
    let mut kept = Vec::with_capacity(children.len());

    for child in children {
        match child.inline_constants() {
            Node::Const(Literal::Bool(value)) if value == absorbing => return Node::bool(absorbing),
            Node::Const(Literal::Bool(_)) => {}
            other => kept.push(other),
        }
    }

    match kept.len() {
        0 => Node::bool(!absorbing),
        1 => kept.swap_remove(0),
        _ => rebuild(kept),
    }
}

fn collapse(node: Node) -> Node {
    let empty = Attributes::new();
    let folded = node.eval(&empty).map(Scalar::into_literal);

    match folded {
        Some(literal) => Node::Const(literal),
        None => node,
    }
}

#[cfg(test)]
mod tests {
    use crate::subscription::node::{CompareOp, MathOp, Node, CONST_FALSE, CONST_TRUE};

    fn x_is_one() -> Node {
        Node::compare(CompareOp::Eq, Node::field("x"), Node::int32(1)).unwrap()
    }

    #[test]
    fn true_is_dropped_from_and() {
        let node = Node::and(vec![CONST_TRUE, x_is_one()]).unwrap();

        assert_eq!(node.inline_constants(), x_is_one());
    }

    #[test]
    fn false_absorbs_and() {
        let node = Node::and(vec![x_is_one(), CONST_FALSE, Node::Require("y".into())]).unwrap();

        assert_eq!(node.inline_constants(), CONST_FALSE);
    }

    #[test]
    fn true_absorbs_or() {
        let node = Node::or(vec![x_is_one(), CONST_TRUE]).unwrap();

        assert_eq!(node.inline_constants(), CONST_TRUE);
    }

    #[test]
    fn closed_arithmetic_collapses() {
        let sum = Node::math(MathOp::Add, Node::int32(1), Node::int32(2)).unwrap();
        let node = Node::compare(CompareOp::Lt, Node::field("x"), sum).unwrap();

        assert_eq!(
            node.inline_constants(),
            Node::compare(CompareOp::Lt, Node::field("x"), Node::int32(3)).unwrap()
        );
    }

    #[test]
    fn undefined_constants_are_kept() {
        let node = Node::math(MathOp::Div, Node::int32(1), Node::int32(0)).unwrap();

        assert_eq!(node.inline_constants(), node);
    }

    #[test]
    fn input_tree_is_untouched() {
        let node = Node::and(vec![CONST_TRUE, x_is_one()]).unwrap();
        let before = node.clone();

        let _ = node.inline_constants();

        assert_eq!(node, before);
    }
}
