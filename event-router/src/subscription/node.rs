//! Subscription expression trees and their three-valued evaluation.
//!
//! Trees are immutable once built. Every constructor that combines child
//! expressions type-checks them statically, so a tree that exists is one the
//! parser would accept. Evaluation never fails: absent or mistyped values make
//! the affected sub-expression BOTTOM.

use super::value::{Attributes, Value, ValueType};
use super::wildcard;
use regex::Regex;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use unicode_normalization::UnicodeNormalization;

/// Result of evaluating a boolean expression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Truth {
    True,
    False,
    /// Undefined: a field was missing, mistyped, or an operation did not apply.
    Bottom,
}

impl Truth {
    pub fn from_bool(value: bool) -> Self {
        if value {
            Truth::True
        } else {
            Truth::False
        }
    }

    pub fn is_true(self) -> bool {
        self == Truth::True
    }
}

/// A literal constant in an expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Real64(f64),
    String(String),
    Opaque(Vec<u8>),
}

impl Literal {
    pub fn eval_type(&self) -> EvalType {
        match self {
            Literal::Bool(_) => EvalType::Bool,
            Literal::Int32(_) => EvalType::Int32,
            Literal::Int64(_) => EvalType::Int64,
            Literal::Real64(_) => EvalType::Real64,
            Literal::String(_) => EvalType::String,
            Literal::Opaque(_) => EvalType::Opaque,
        }
    }
}

impl From<Value> for Literal {
    fn from(value: Value) -> Self {
        match value {
            Value::Int32(v) => Literal::Int32(v),
            Value::Int64(v) => Literal::Int64(v),
            Value::Real64(v) => Literal::Real64(v),
            Value::String(v) => Literal::String(v),
            Value::Opaque(v) => Literal::Opaque(v),
        }
    }
}

/// Static result type of a node, used for construction-time checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalType {
    Bool,
    Int32,
    Int64,
    Real64,
    /// Some numeric type not known until evaluation.
    Number,
    String,
    Opaque,
    /// Field references: anything, or nothing.
    Any,
}

impl EvalType {
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            EvalType::Int32 | EvalType::Int64 | EvalType::Real64 | EvalType::Number
        )
    }

    fn admits_integer(self) -> bool {
        matches!(
            self,
            EvalType::Int32 | EvalType::Int64 | EvalType::Number | EvalType::Any
        )
    }

    fn admits_number(self) -> bool {
        self == EvalType::Any || self.is_numeric()
    }

    fn admits_string(self) -> bool {
        matches!(self, EvalType::String | EvalType::Any)
    }
}

impl Display for EvalType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EvalType::Bool => "boolean",
            EvalType::Int32 => "int32",
            EvalType::Int64 => "int64",
            EvalType::Real64 => "real64",
            EvalType::Number => "number",
            EvalType::String => "string",
            EvalType::Opaque => "opaque",
            EvalType::Any => "any",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Lt,
    Le,
    Eq,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    fn test(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    /// Logical (zero-filling) right shift.
    Ushr,
}

impl MathOp {
    pub fn symbol(self) -> &'static str {
        match self {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
            MathOp::Mod => "%",
            MathOp::BitAnd => "&",
            MathOp::BitOr => "|",
            MathOp::BitXor => "^",
            MathOp::Shl => "<<",
            MathOp::Shr => ">>",
            MathOp::Ushr => ">>>",
        }
    }

    pub fn integer_only(self) -> bool {
        matches!(
            self,
            MathOp::BitAnd
                | MathOp::BitOr
                | MathOp::BitXor
                | MathOp::Shl
                | MathOp::Shr
                | MathOp::Ushr
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StringOp {
    BeginsWith,
    EndsWith,
    Contains,
    Wildcard,
    Regex,
}

impl StringOp {
    pub fn function_name(self) -> &'static str {
        match self {
            StringOp::BeginsWith => "begins-with",
            StringOp::EndsWith => "ends-with",
            StringOp::Contains => "contains",
            StringOp::Wildcard => "wildcard",
            StringOp::Regex => "regex",
        }
    }
}

/// A string predicate with its literal operand, pre-compiled where needed.
#[derive(Clone, Debug)]
pub struct StringPredicate {
    op: StringOp,
    operand: String,
    pattern: Option<Regex>,
}

impl StringPredicate {
    pub fn new(op: StringOp, operand: impl Into<String>) -> Result<Self, regex::Error> {
        let operand = operand.into();
        let pattern = match op {
            StringOp::Wildcard => Some(wildcard::to_regex(&operand, false)?),
            StringOp::Regex => Some(Regex::new(&format!("(?s){operand}"))?),
            StringOp::BeginsWith | StringOp::EndsWith | StringOp::Contains => None,
        };

        Ok(Self {
            op,
            operand,
            pattern,
        })
    }

    pub fn op(&self) -> StringOp {
        self.op
    }

    pub fn operand(&self) -> &str {
        &self.operand
    }

    fn test(&self, value: &str) -> bool {
        match (&self.pattern, self.op) {
            (Some(pattern), _) => pattern.is_match(value),
            (None, StringOp::BeginsWith) => value.starts_with(self.operand.as_str()),
            (None, StringOp::EndsWith) => value.ends_with(self.operand.as_str()),
            (None, _) => value.contains(self.operand.as_str()),
        }
    }
}

impl PartialEq for StringPredicate {
    fn eq(&self, other: &Self) -> bool {
        self.op == other.op && self.operand == other.operand
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecomposeMode {
    /// Unicode NFD.
    Canonical,
    /// Unicode NFKD.
    Compatibility,
}

/// A node in a subscription expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Const(Literal),
    Field(String),
    Require(String),
    Size(String),
    Nan(String),
    TypeTest(String, ValueType),
    And(Vec<Node>),
    Or(Vec<Node>),
    Xor(Vec<Node>),
    Not(Box<Node>),
    Compare(CompareOp, Box<Node>, Box<Node>),
    Math(MathOp, Box<Node>, Box<Node>),
    Negate(Box<Node>),
    BitNot(Box<Node>),
    StringMatch(Box<Node>, StringPredicate),
    FoldCase(Box<Node>),
    Decompose(Box<Node>, DecomposeMode),
}

pub const CONST_TRUE: Node = Node::Const(Literal::Bool(true));
pub const CONST_FALSE: Node = Node::Const(Literal::Bool(false));

/// Rejection of a badly typed or malformed sub-expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    IllegalChild(String),
    InvalidRegex { pattern: String, message: String },
}

impl Display for NodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeError::IllegalChild(message) => write!(f, "{message}"),
            NodeError::InvalidRegex { pattern, message } => {
                write!(f, "invalid regex \"{pattern}\": {message}")
            }
        }
    }
}

impl std::error::Error for NodeError {}

impl Node {
    pub fn field(name: impl Into<String>) -> Node {
        Node::Field(name.into())
    }

    pub fn string(value: impl Into<String>) -> Node {
        Node::Const(Literal::String(value.into()))
    }

    pub fn int32(value: i32) -> Node {
        Node::Const(Literal::Int32(value))
    }

    pub fn int64(value: i64) -> Node {
        Node::Const(Literal::Int64(value))
    }

    pub fn real64(value: f64) -> Node {
        Node::Const(Literal::Real64(value))
    }

    pub fn bool(value: bool) -> Node {
        Node::Const(Literal::Bool(value))
    }

    pub fn and(children: Vec<Node>) -> Result<Node, NodeError> {
        check_bool_children("&&", &children)?;
        Ok(Node::And(children))
    }

    pub fn or(children: Vec<Node>) -> Result<Node, NodeError> {
        check_bool_children("||", &children)?;
        Ok(Node::Or(children))
    }

    pub fn xor(children: Vec<Node>) -> Result<Node, NodeError> {
        check_bool_children("^^", &children)?;
        Ok(Node::Xor(children))
    }

    pub fn not(child: Node) -> Result<Node, NodeError> {
        check_bool_children("!", std::slice::from_ref(&child))?;
        Ok(Node::Not(Box::new(child)))
    }

    pub fn compare(op: CompareOp, left: Node, right: Node) -> Result<Node, NodeError> {
        for child in [&left, &right] {
            let child_type = child.eval_type();
            if matches!(child_type, EvalType::Bool | EvalType::Opaque) {
                return Err(NodeError::IllegalChild(format!(
                    "{} cannot have expression of type {child_type} as an argument",
                    op.symbol()
                )));
            }
        }

        let (left_type, right_type) = (left.eval_type(), right.eval_type());
        if left_type != EvalType::Any
            && right_type != EvalType::Any
            && left_type != right_type
            && !(left_type.is_numeric() && right_type.is_numeric())
        {
            return Err(NodeError::IllegalChild(format!(
                "{}: argument ({right}) cannot be compared to ({left})",
                op.symbol()
            )));
        }

        Ok(Node::Compare(op, Box::new(left), Box::new(right)))
    }

    /// `equals(a, b, c...)`: `a == b` for two arguments, otherwise the OR of
    /// `a == b`, `a == c` and so on.
    pub fn equals(mut args: Vec<Node>) -> Result<Node, NodeError> {
        if args.len() < 2 {
            return Err(NodeError::IllegalChild(
                "equals needs at least two arguments".to_string(),
            ));
        }

        let first = args.remove(0);
        if args.len() == 1 {
            return Node::compare(CompareOp::Eq, first, args.remove(0));
        }

        let comparisons = args
            .into_iter()
            .map(|arg| Node::compare(CompareOp::Eq, first.clone(), arg))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Node::Or(comparisons))
    }

    pub fn not_equals(left: Node, right: Node) -> Result<Node, NodeError> {
        Node::not(Node::compare(CompareOp::Eq, left, right)?)
    }

    pub fn math(op: MathOp, left: Node, right: Node) -> Result<Node, NodeError> {
        for child in [&left, &right] {
            let child_type = child.eval_type();
            if op.integer_only() && !child_type.admits_integer() {
                return Err(NodeError::IllegalChild(format!(
                    "\"{}\" needs an integer as an argument (was {child_type})",
                    op.symbol()
                )));
            }
            if !child_type.admits_number() {
                return Err(NodeError::IllegalChild(format!(
                    "\"{}\" needs a number as an argument (was {child_type})",
                    op.symbol()
                )));
            }
        }

        Ok(Node::Math(op, Box::new(left), Box::new(right)))
    }

    pub fn negate(child: Node) -> Result<Node, NodeError> {
        if !child.eval_type().admits_number() {
            return Err(NodeError::IllegalChild(
                "Unary minus requires a numeric argument".to_string(),
            ));
        }
        Ok(Node::Negate(Box::new(child)))
    }

    pub fn bit_not(child: Node) -> Result<Node, NodeError> {
        if !child.eval_type().admits_integer() {
            return Err(NodeError::IllegalChild(
                "~ requires an integer argument".to_string(),
            ));
        }
        Ok(Node::BitNot(Box::new(child)))
    }

    /// Builds `op(expr, operand)`, or the OR of one such test per operand.
    pub fn string_match(op: StringOp, expr: Node, operands: Vec<String>) -> Result<Node, NodeError> {
        check_string_child(op.function_name(), &expr)?;

        if operands.is_empty() {
            return Err(NodeError::IllegalChild(format!(
                "{} needs at least one string argument",
                op.function_name()
            )));
        }

        let mut tests = operands
            .into_iter()
            .map(|operand| {
                StringPredicate::new(op, operand.clone())
                    .map(|predicate| Node::StringMatch(Box::new(expr.clone()), predicate))
                    .map_err(|err| NodeError::InvalidRegex {
                        pattern: operand,
                        message: err.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if tests.len() == 1 {
            Ok(tests.remove(0))
        } else {
            Ok(Node::Or(tests))
        }
    }

    pub fn fold_case(expr: Node) -> Result<Node, NodeError> {
        check_string_child("fold-case", &expr)?;
        Ok(Node::FoldCase(Box::new(expr)))
    }

    pub fn decompose(expr: Node, mode: DecomposeMode) -> Result<Node, NodeError> {
        let name = match mode {
            DecomposeMode::Canonical => "decompose",
            DecomposeMode::Compatibility => "decompose-compat",
        };
        check_string_child(name, &expr)?;
        Ok(Node::Decompose(Box::new(expr), mode))
    }

    /// Static result type.
    pub fn eval_type(&self) -> EvalType {
        match self {
            Node::Const(literal) => literal.eval_type(),
            Node::Field(_) => EvalType::Any,
            Node::Require(_)
            | Node::Nan(_)
            | Node::TypeTest(..)
            | Node::And(_)
            | Node::Or(_)
            | Node::Xor(_)
            | Node::Not(_)
            | Node::Compare(..)
            | Node::StringMatch(..) => EvalType::Bool,
            Node::Size(_) => EvalType::Int32,
            Node::Math(op, left, right) => {
                promoted_type(*op, left.eval_type(), right.eval_type())
            }
            Node::Negate(child) | Node::BitNot(child) => child.eval_type(),
            Node::FoldCase(_) | Node::Decompose(..) => EvalType::String,
        }
    }

    /// Evaluates against a notification. Only boolean results can be TRUE
    /// or FALSE; anything else is BOTTOM.
    pub fn evaluate(&self, attributes: &Attributes) -> Truth {
        match self.eval(attributes) {
            Some(Scalar::Bool(value)) => Truth::from_bool(value),
            _ => Truth::Bottom,
        }
    }

    /// True when the expression evaluates to exactly TRUE.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        self.evaluate(attributes).is_true()
    }

    pub fn is_const(&self) -> bool {
        matches!(self, Node::Const(_))
    }

    /// Evaluates to a raw scalar. `None` is BOTTOM.
    pub(crate) fn eval<'a>(&'a self, attributes: &'a Attributes) -> Option<Scalar<'a>> {
        match self {
            Node::Const(literal) => Some(Scalar::from_literal(literal)),
            Node::Field(name) => attributes.get(name).map(Scalar::from_value),
            Node::Require(name) => attributes.contains_key(name).then_some(Scalar::Bool(true)),
            Node::Size(name) => match attributes.get(name) {
                Some(Value::String(value)) => Some(Scalar::Int32(saturating_len(
                    value.encode_utf16().count(),
                ))),
                Some(Value::Opaque(value)) => Some(Scalar::Int32(saturating_len(value.len()))),
                _ => None,
            },
            Node::Nan(name) => match attributes.get(name) {
                Some(Value::Real64(value)) => Some(Scalar::Bool(value.is_nan())),
                _ => None,
            },
            Node::TypeTest(name, value_type) => attributes
                .get(name)
                .map(|value| Scalar::Bool(value.value_type() == *value_type)),
            Node::And(children) => truth_to_scalar(evaluate_and(children, attributes)),
            Node::Or(children) => truth_to_scalar(evaluate_or(children, attributes)),
            Node::Xor(children) => truth_to_scalar(evaluate_xor(children, attributes)),
            Node::Not(child) => match child.evaluate(attributes) {
                Truth::True => Some(Scalar::Bool(false)),
                Truth::False => Some(Scalar::Bool(true)),
                Truth::Bottom => None,
            },
            Node::Compare(op, left, right) => {
                let left = left.eval(attributes)?;
                let right = right.eval(attributes)?;
                compare(*op, &left, &right).map(Scalar::Bool)
            }
            Node::Math(op, left, right) => {
                let left = left.eval(attributes)?;
                let right = right.eval(attributes)?;
                arithmetic(*op, &left, &right)
            }
            Node::Negate(child) => match child.eval(attributes)? {
                Scalar::Int32(value) => Some(Scalar::Int32(value.wrapping_neg())),
                Scalar::Int64(value) => Some(Scalar::Int64(value.wrapping_neg())),
                Scalar::Real64(value) => Some(Scalar::Real64(-value)),
                _ => None,
            },
            Node::BitNot(child) => match child.eval(attributes)? {
                Scalar::Int32(value) => Some(Scalar::Int32(!value)),
                Scalar::Int64(value) => Some(Scalar::Int64(!value)),
                _ => None,
            },
            Node::StringMatch(expr, predicate) => match expr.eval(attributes)? {
                Scalar::Str(value) => Some(Scalar::Bool(predicate.test(&value))),
                _ => None,
            },
            Node::FoldCase(expr) => match expr.eval(attributes)? {
                Scalar::Str(value) => Some(Scalar::Str(Cow::Owned(value.to_lowercase()))),
                _ => None,
            },
            Node::Decompose(expr, mode) => match expr.eval(attributes)? {
                Scalar::Str(value) => Some(Scalar::Str(Cow::Owned(match mode {
                    DecomposeMode::Canonical => value.nfd().collect(),
                    DecomposeMode::Compatibility => value.nfkd().collect(),
                }))),
                _ => None,
            },
        }
    }
}

/// An intermediate evaluation result.
#[derive(Clone, Debug)]
pub(crate) enum Scalar<'a> {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Real64(f64),
    Str(Cow<'a, str>),
    Opaque(Cow<'a, [u8]>),
}

impl<'a> Scalar<'a> {
    fn from_value(value: &'a Value) -> Self {
        match value {
            Value::Int32(v) => Scalar::Int32(*v),
            Value::Int64(v) => Scalar::Int64(*v),
            Value::Real64(v) => Scalar::Real64(*v),
            Value::String(v) => Scalar::Str(Cow::Borrowed(v)),
            Value::Opaque(v) => Scalar::Opaque(Cow::Borrowed(v)),
        }
    }

    fn from_literal(literal: &'a Literal) -> Self {
        match literal {
            Literal::Bool(v) => Scalar::Bool(*v),
            Literal::Int32(v) => Scalar::Int32(*v),
            Literal::Int64(v) => Scalar::Int64(*v),
            Literal::Real64(v) => Scalar::Real64(*v),
            Literal::String(v) => Scalar::Str(Cow::Borrowed(v)),
            Literal::Opaque(v) => Scalar::Opaque(Cow::Borrowed(v)),
        }
    }

    pub(crate) fn into_literal(self) -> Literal {
        match self {
            Scalar::Bool(v) => Literal::Bool(v),
            Scalar::Int32(v) => Literal::Int32(v),
            Scalar::Int64(v) => Literal::Int64(v),
            Scalar::Real64(v) => Literal::Real64(v),
            Scalar::Str(v) => Literal::String(v.into_owned()),
            Scalar::Opaque(v) => Literal::Opaque(v.into_owned()),
        }
    }
}

fn truth_to_scalar(truth: Truth) -> Option<Scalar<'static>> {
    match truth {
        Truth::True => Some(Scalar::Bool(true)),
        Truth::False => Some(Scalar::Bool(false)),
        Truth::Bottom => None,
    }
}

fn evaluate_and(children: &[Node], attributes: &Attributes) -> Truth {
    let mut bottom = false;

    for child in children {
        match child.evaluate(attributes) {
            Truth::False => return Truth::False,
            Truth::Bottom => bottom = true,
            Truth::True => {}
        }
    }

    if bottom {
        Truth::Bottom
    } else {
        Truth::True
    }
}

fn evaluate_or(children: &[Node], attributes: &Attributes) -> Truth {
    let mut bottom = false;

    for child in children {
        match child.evaluate(attributes) {
            Truth::True => return Truth::True,
            Truth::Bottom => bottom = true,
            Truth::False => {}
        }
    }

    if bottom {
        Truth::Bottom
    } else {
        Truth::False
    }
}

fn evaluate_xor(children: &[Node], attributes: &Attributes) -> Truth {
    let mut parity = false;

    for child in children {
        match child.evaluate(attributes) {
            Truth::Bottom => return Truth::Bottom,
            Truth::True => parity = !parity,
            Truth::False => {}
        }
    }

    Truth::from_bool(parity)
}

enum NumericPair {
    Int32(i32, i32),
    Int64(i64, i64),
    Real64(f64, f64),
}

/// Upconverts two numbers to the more precise of their types.
fn promote(left: &Scalar<'_>, right: &Scalar<'_>) -> Option<NumericPair> {
    use Scalar::{Int32, Int64, Real64};

    Some(match (left, right) {
        (Int32(a), Int32(b)) => NumericPair::Int32(*a, *b),
        (Int64(a), Int64(b)) => NumericPair::Int64(*a, *b),
        (Int32(a), Int64(b)) => NumericPair::Int64(i64::from(*a), *b),
        (Int64(a), Int32(b)) => NumericPair::Int64(*a, i64::from(*b)),
        (Real64(a), Real64(b)) => NumericPair::Real64(*a, *b),
        (Real64(a), Int32(b)) => NumericPair::Real64(*a, f64::from(*b)),
        (Real64(a), Int64(b)) => NumericPair::Real64(*a, *b as f64),
        (Int32(a), Real64(b)) => NumericPair::Real64(f64::from(*a), *b),
        (Int64(a), Real64(b)) => NumericPair::Real64(*a as f64, *b),
        _ => return None,
    })
}

fn compare(op: CompareOp, left: &Scalar<'_>, right: &Scalar<'_>) -> Option<bool> {
    let ordering = match (left, right) {
        (Scalar::Str(a), Scalar::Str(b)) => a.as_ref().cmp(b.as_ref()),
        (Scalar::Bool(a), Scalar::Bool(b)) => a.cmp(b),
        _ => match promote(left, right)? {
            NumericPair::Int32(a, b) => a.cmp(&b),
            NumericPair::Int64(a, b) => a.cmp(&b),
            NumericPair::Real64(a, b) => a.total_cmp(&b),
        },
    };

    Some(op.test(ordering))
}

fn arithmetic(op: MathOp, left: &Scalar<'_>, right: &Scalar<'_>) -> Option<Scalar<'static>> {
    match promote(left, right)? {
        NumericPair::Int32(a, b) => int32_math(op, a, b).map(Scalar::Int32),
        NumericPair::Int64(a, b) => int64_math(op, a, b).map(Scalar::Int64),
        NumericPair::Real64(a, b) => real64_math(op, a, b).map(Scalar::Real64),
    }
}

fn int32_math(op: MathOp, a: i32, b: i32) -> Option<i32> {
    Some(match op {
        MathOp::Add => a.wrapping_add(b),
        MathOp::Sub => a.wrapping_sub(b),
        MathOp::Mul => a.wrapping_mul(b),
        MathOp::Div => a.checked_div(b).or_else(|| (b != 0).then(|| a.wrapping_div(b)))?,
        MathOp::Mod => a.checked_rem(b).or_else(|| (b != 0).then(|| a.wrapping_rem(b)))?,
        MathOp::BitAnd => a & b,
        MathOp::BitOr => a | b,
        MathOp::BitXor => a ^ b,
        MathOp::Shl => a.wrapping_shl(b as u32),
        MathOp::Shr => a.wrapping_shr(b as u32),
        MathOp::Ushr => (a as u32).wrapping_shr(b as u32) as i32,
    })
}

fn int64_math(op: MathOp, a: i64, b: i64) -> Option<i64> {
    Some(match op {
        MathOp::Add => a.wrapping_add(b),
        MathOp::Sub => a.wrapping_sub(b),
        MathOp::Mul => a.wrapping_mul(b),
        MathOp::Div => a.checked_div(b).or_else(|| (b != 0).then(|| a.wrapping_div(b)))?,
        MathOp::Mod => a.checked_rem(b).or_else(|| (b != 0).then(|| a.wrapping_rem(b)))?,
        MathOp::BitAnd => a & b,
        MathOp::BitOr => a | b,
        MathOp::BitXor => a ^ b,
        MathOp::Shl => a.wrapping_shl(b as u32),
        MathOp::Shr => a.wrapping_shr(b as u32),
        MathOp::Ushr => (a as u64).wrapping_shr(b as u32) as i64,
    })
}

fn real64_math(op: MathOp, a: f64, b: f64) -> Option<f64> {
    match op {
        MathOp::Add => Some(a + b),
        MathOp::Sub => Some(a - b),
        MathOp::Mul => Some(a * b),
        MathOp::Div => Some(a / b),
        MathOp::Mod => Some(a % b),
        _ => None,
    }
}

fn promoted_type(op: MathOp, left: EvalType, right: EvalType) -> EvalType {
    match (left, right) {
        (EvalType::Int32, EvalType::Int32) => EvalType::Int32,
        (EvalType::Int32 | EvalType::Int64, EvalType::Int32 | EvalType::Int64) => EvalType::Int64,
        (EvalType::Real64, other) | (other, EvalType::Real64)
            if !op.integer_only() && matches!(other, EvalType::Int32 | EvalType::Int64 | EvalType::Real64) =>
        {
            EvalType::Real64
        }
        _ => EvalType::Number,
    }
}

fn saturating_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

fn check_bool_children(op: &str, children: &[Node]) -> Result<(), NodeError> {
    match children
        .iter()
        .find(|child| child.eval_type() != EvalType::Bool)
    {
        Some(child) => Err(NodeError::IllegalChild(format!(
            "{op} requires boolean arguments ({child})"
        ))),
        None => Ok(()),
    }
}

fn check_string_child(function: &str, child: &Node) -> Result<(), NodeError> {
    let child_type = child.eval_type();
    if child_type.admits_string() {
        Ok(())
    } else {
        Err(NodeError::IllegalChild(format!(
            "{function} requires a string argument (was {child_type})"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::value::attributes;

    fn field_eq(name: &str, value: Node) -> Node {
        Node::compare(CompareOp::Eq, Node::field(name), value).unwrap()
    }

    #[test]
    fn and_is_false_as_soon_as_any_child_is_false() {
        let node = Node::and(vec![
            Node::Require("missing".to_string()),
            field_eq("x", Node::int32(1)),
        ])
        .unwrap();

        assert_eq!(node.evaluate(&attributes([("x", 2)])), Truth::False);
        assert_eq!(node.evaluate(&attributes([("x", 1)])), Truth::Bottom);
    }

    #[test]
    fn or_is_true_as_soon_as_any_child_is_true() {
        let node = Node::or(vec![
            Node::Require("missing".to_string()),
            field_eq("x", Node::int32(1)),
        ])
        .unwrap();

        assert_eq!(node.evaluate(&attributes([("x", 1)])), Truth::True);
        assert_eq!(node.evaluate(&attributes([("x", 2)])), Truth::Bottom);
    }

    #[test]
    fn xor_is_bottom_when_any_child_is_bottom() {
        let node = Node::xor(vec![
            field_eq("x", Node::int32(1)),
            field_eq("y", Node::int32(1)),
        ])
        .unwrap();

        assert_eq!(node.evaluate(&attributes([("x", 1)])), Truth::Bottom);
        assert_eq!(node.evaluate(&attributes([("x", 1), ("y", 2)])), Truth::True);
        assert_eq!(node.evaluate(&attributes([("x", 1), ("y", 1)])), Truth::False);
    }

    #[test]
    fn not_keeps_bottom() {
        let node = Node::not(field_eq("x", Node::int32(1))).unwrap();

        assert_eq!(node.evaluate(&Attributes::new()), Truth::Bottom);
        assert_eq!(node.evaluate(&attributes([("x", 2)])), Truth::True);
    }

    #[test]
    fn comparisons_upconvert_numbers() {
        let node = Node::compare(CompareOp::Lt, Node::field("x"), Node::real64(2.5)).unwrap();

        assert!(node.matches(&attributes([("x", 2)])));
        assert!(node.matches(&attributes([("x", 2i64)])));
        assert!(!node.matches(&attributes([("x", 3i64)])));
    }

    #[test]
    fn mismatched_comparisons_are_bottom() {
        let node = field_eq("x", Node::int32(1));

        assert_eq!(node.evaluate(&attributes([("x", "1")])), Truth::Bottom);
        assert_eq!(node.evaluate(&attributes([("x", vec![1u8])])), Truth::Bottom);
        assert_eq!(node.evaluate(&Attributes::new()), Truth::Bottom);
    }

    #[test]
    fn size_and_nan_need_the_right_types() {
        let size = Node::compare(CompareOp::Eq, Node::Size("s".into()), Node::int32(3)).unwrap();
        let nan = Node::Nan("r".into());

        assert!(size.matches(&attributes([("s", "abc")])));
        assert!(size.matches(&attributes([("s", vec![1u8, 2, 3])])));
        assert!(size.matches(&attributes([("s", "\u{e9}\u{1F600}")])));
        assert_eq!(size.evaluate(&attributes([("s", 3)])), Truth::Bottom);
        assert_eq!(nan.evaluate(&attributes([("r", f64::NAN)])), Truth::True);
        assert_eq!(nan.evaluate(&attributes([("r", 1.0)])), Truth::False);
        assert_eq!(nan.evaluate(&attributes([("r", 1)])), Truth::Bottom);
    }

    #[test]
    fn integer_division_by_zero_is_bottom() {
        let node = Node::compare(
            CompareOp::Eq,
            Node::math(MathOp::Div, Node::field("x"), Node::int32(0)).unwrap(),
            Node::int32(0),
        )
        .unwrap();

        assert_eq!(node.evaluate(&attributes([("x", 10)])), Truth::Bottom);
    }

    #[test]
    fn shifts_follow_operand_width() {
        let ushr = Node::math(MathOp::Ushr, Node::int32(-1), Node::int32(28)).unwrap();
        let shl = Node::math(MathOp::Shl, Node::int32(1), Node::int32(33)).unwrap();
        let empty = Attributes::new();

        assert_eq!(ushr.eval(&empty).map(Scalar::into_literal), Some(Literal::Int32(15)));
        assert_eq!(shl.eval(&empty).map(Scalar::into_literal), Some(Literal::Int32(2)));
    }

    #[test]
    fn string_predicates() {
        let begins = Node::string_match(
            StringOp::BeginsWith,
            Node::field("s"),
            vec!["he".into(), "xy".into()],
        )
        .unwrap();
        let regex =
            Node::string_match(StringOp::Regex, Node::field("s"), vec!["l+o$".into()]).unwrap();
        let folded = Node::compare(
            CompareOp::Eq,
            Node::fold_case(Node::field("s")).unwrap(),
            Node::string("hello"),
        )
        .unwrap();

        let hello = attributes([("s", "hello")]);
        assert!(begins.matches(&hello));
        assert!(regex.matches(&hello));
        assert!(folded.matches(&attributes([("s", "HeLLo")])));
        assert_eq!(begins.evaluate(&attributes([("s", 1)])), Truth::Bottom);
    }

    #[test]
    fn decompose_strips_to_base_characters() {
        let node = Node::string_match(
            StringOp::BeginsWith,
            Node::decompose(Node::field("s"), DecomposeMode::Canonical).unwrap(),
            vec!["e".into()],
        )
        .unwrap();

        assert!(node.matches(&attributes([("s", "\u{e9}t\u{e9}")])));
    }

    #[test]
    fn construction_rejects_bad_types() {
        assert!(Node::and(vec![Node::string("a"), Node::string("b")]).is_err());
        assert!(Node::compare(CompareOp::Gt, Node::int32(5), Node::string("name")).is_err());
        assert!(Node::math(MathOp::Add, Node::int32(1), Node::string("x")).is_err());
        assert!(Node::math(MathOp::Shl, Node::real64(1.0), Node::int32(2)).is_err());
        assert!(Node::negate(Node::string("x")).is_err());
        assert!(Node::bit_not(Node::string("x")).is_err());
        assert!(Node::fold_case(Node::int32(1)).is_err());
        assert!(Node::equals(vec![Node::string("a"), Node::string("b"), Node::int32(1)]).is_err());
        assert!(matches!(
            Node::string_match(StringOp::Regex, Node::field("s"), vec!["(abc".into()]),
            Err(NodeError::InvalidRegex { .. })
        ));
    }
}
