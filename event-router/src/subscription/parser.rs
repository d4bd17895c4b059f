//! Recursive-descent parser for subscription expressions.
//!
//! Binary levels, loosest first: `||`, `^^`, `&&`, prefix `!`, comparison
//! (non-associative), `|`, `^`, `&`, shifts, `-`, `+`, `*`, `/`, `%`, then
//! prefix `-` / `~`. Operators in one level associate to the left.
//!
//! Nesting is bounded by [`MAX_NESTING`]. Parentheses, function calls,
//! prefix operators and each chained arithmetic operator take one level.

use super::lexer::{tokenize, Token, TokenKind};
use super::node::{
    CompareOp, DecomposeMode, EvalType, Literal, MathOp, Node, NodeError, StringOp,
};
use super::value::ValueType;
use std::fmt::{Display, Formatter};

/// Deepest nesting accepted in one expression.
pub const MAX_NESTING: usize = 64;

/// Why an expression was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Lexical or grammatical error at a 1-based column.
    Syntax { column: usize, message: String },
    /// Well-formed but badly typed, or a function misused.
    IllegalExpression(String),
    InvalidRegex { pattern: String, message: String },
    /// Parsed, but does not produce a boolean.
    NotBoolean(String),
    /// Reduces to a constant: it would match everything or nothing.
    Constant(bool),
}

impl ParseError {
    /// True for expressions that are valid but constant.
    pub fn is_trivial(&self) -> bool {
        matches!(self, ParseError::Constant(_))
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::Syntax { column, message } => {
                write!(f, "Parse error at column {column}: {message}")
            }
            ParseError::IllegalExpression(message) => write!(f, "{message}"),
            ParseError::InvalidRegex { pattern, message } => {
                write!(f, "Invalid regex \"{pattern}\": {message}")
            }
            ParseError::NotBoolean(expr) => {
                write!(f, "Expression does not evaluate to boolean: {expr}")
            }
            ParseError::Constant(value) => {
                write!(f, "Expression is constant (always {value})")
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<NodeError> for ParseError {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::IllegalChild(message) => ParseError::IllegalExpression(message),
            NodeError::InvalidRegex { pattern, message } => {
                ParseError::InvalidRegex { pattern, message }
            }
        }
    }
}

/// Parses an expression without simplifying it.
pub fn parse(text: &str) -> Result<Node, ParseError> {
    let mut parser = Parser {
        tokens: tokenize(text)?,
        pos: 0,
        depth: 0,
    };

    let node = parser.expression()?;
    parser.expect(&TokenKind::Eof)?;
    Ok(node)
}

/// Parses a subscription: the result is constant-folded and must be a
/// non-constant boolean expression.
pub fn parse_and_validate(text: &str) -> Result<Node, ParseError> {
    let node = parse(text)?.inline_constants();

    match node {
        Node::Const(Literal::Bool(value)) => Err(ParseError::Constant(value)),
        ref other if other.eval_type() != EvalType::Bool => {
            Err(ParseError::NotBoolean(other.to_string()))
        }
        other => Ok(other),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

/// Arithmetic operator for `kind` and its precedence, tightest highest.
fn math_op(kind: &TokenKind) -> Option<(MathOp, u8)> {
    let op = match kind {
        TokenKind::Pipe => (MathOp::BitOr, 1),
        TokenKind::Caret => (MathOp::BitXor, 2),
        TokenKind::Amp => (MathOp::BitAnd, 3),
        TokenKind::Shl => (MathOp::Shl, 4),
        TokenKind::Shr => (MathOp::Shr, 4),
        TokenKind::Ushr => (MathOp::Ushr, 4),
        TokenKind::Minus => (MathOp::Sub, 5),
        TokenKind::Plus => (MathOp::Add, 6),
        TokenKind::Star => (MathOp::Mul, 7),
        TokenKind::Slash => (MathOp::Div, 8),
        TokenKind::Percent => (MathOp::Mod, 9),
        _ => return None,
    };
    Some(op)
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|token| &token.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn column(&self) -> usize {
        self.tokens.get(self.pos).map_or(0, |token| token.column)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::Syntax {
                column: self.column(),
                message: format!("Expression nested more than {MAX_NESTING} levels deep"),
            });
        }
        self.depth += 1;
        Ok(())
    }

    /// Runs `parse` one nesting level down.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.descend()?;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn unexpected(&self) -> ParseError {
        ParseError::Syntax {
            column: self.column(),
            message: format!("Unexpected {}", self.peek().describe()),
        }
    }

    fn expression(&mut self) -> Result<Node, ParseError> {
        self.junction(&TokenKind::OrOr, Node::or, Self::xor_level)
    }

    fn xor_level(&mut self) -> Result<Node, ParseError> {
        self.junction(&TokenKind::XorXor, Node::xor, Self::and_level)
    }

    fn and_level(&mut self) -> Result<Node, ParseError> {
        self.junction(&TokenKind::AndAnd, Node::and, Self::not_level)
    }

    /// `a op b op c` becomes one n-ary node.
    fn junction(
        &mut self,
        op: &TokenKind,
        build: fn(Vec<Node>) -> Result<Node, NodeError>,
        next: fn(&mut Self) -> Result<Node, ParseError>,
    ) -> Result<Node, ParseError> {
        let first = next(self)?;
        if self.peek() != op {
            return Ok(first);
        }

        let mut children = vec![first];
        while self.eat(op) {
            children.push(next(self)?);
        }
        Ok(build(children)?)
    }

    fn not_level(&mut self) -> Result<Node, ParseError> {
        if self.eat(&TokenKind::Bang) {
            let child = self.nested(Self::not_level)?;
            return Ok(Node::not(child)?);
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Node, ParseError> {
        let left = self.arithmetic(1)?;

        let op = match self.peek() {
            TokenKind::EqEq => CompareOp::Eq,
            TokenKind::NotEq => {
                self.advance();
                let right = self.arithmetic(1)?;
                return Ok(Node::not_equals(left, right)?);
            }
            TokenKind::Lt => CompareOp::Lt,
            TokenKind::Le => CompareOp::Le,
            TokenKind::Gt => CompareOp::Gt,
            TokenKind::Ge => CompareOp::Ge,
            _ => return Ok(left),
        };

        self.advance();
        let right = self.arithmetic(1)?;
        Ok(Node::compare(op, left, right)?)
    }

    /// Arithmetic operators binding at least as tightly as
    /// `min_precedence`, by precedence climbing.
    fn arithmetic(&mut self, min_precedence: u8) -> Result<Node, ParseError> {
        let mut left = self.unary()?;
        let mut chained = 0;

        while let Some((op, precedence)) =
            math_op(self.peek()).filter(|(_, precedence)| *precedence >= min_precedence)
        {
            self.advance();
            self.descend()?;
            chained += 1;
            let right = self.arithmetic(precedence + 1)?;
            left = Node::math(op, left, right)?;
        }

        self.depth -= chained;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Node, ParseError> {
        if self.eat(&TokenKind::Minus) {
            let child = self.nested(Self::unary)?;
            return Ok(Node::negate(child)?);
        }
        if self.eat(&TokenKind::Tilde) {
            let child = self.nested(Self::unary)?;
            return Ok(Node::bit_not(child)?);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node, ParseError> {
        match self.peek().clone() {
            TokenKind::LParen => {
                self.advance();
                self.nested(|parser| {
                    let node = parser.expression()?;
                    parser.expect(&TokenKind::RParen)?;
                    Ok(node)
                })
            }
            TokenKind::Ident(name) => {
                self.advance();
                if self.peek() == &TokenKind::LParen {
                    self.advance();
                    self.nested(|parser| parser.function(&name))
                } else {
                    Ok(Node::Field(name))
                }
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(Node::string(text))
            }
            TokenKind::Int32(value) => {
                self.advance();
                Ok(Node::int32(value))
            }
            TokenKind::Int64(value) => {
                self.advance();
                Ok(Node::int64(value))
            }
            TokenKind::Real64(value) => {
                self.advance();
                Ok(Node::real64(value))
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Parses a call after its opening parenthesis.
    fn function(&mut self, name: &str) -> Result<Node, ParseError> {
        let args = self.arguments()?;

        let node = match name {
            "require" => Node::Require(single_field(name, args)?),
            "size" => Node::Size(single_field(name, args)?),
            "nan" => Node::Nan(single_field(name, args)?),
            "int32" => Node::TypeTest(single_field(name, args)?, ValueType::Int32),
            "int64" => Node::TypeTest(single_field(name, args)?, ValueType::Int64),
            "real64" => Node::TypeTest(single_field(name, args)?, ValueType::Real64),
            "string" => Node::TypeTest(single_field(name, args)?, ValueType::String),
            "opaque" => Node::TypeTest(single_field(name, args)?, ValueType::Opaque),
            "begins-with" => string_function(StringOp::BeginsWith, args)?,
            "ends-with" => string_function(StringOp::EndsWith, args)?,
            "contains" => string_function(StringOp::Contains, args)?,
            "wildcard" => string_function(StringOp::Wildcard, args)?,
            "regex" => string_function(StringOp::Regex, args)?,
            "fold-case" => Node::fold_case(single_arg(name, args)?)?,
            "decompose" => Node::decompose(single_arg(name, args)?, DecomposeMode::Canonical)?,
            "decompose-compat" => {
                Node::decompose(single_arg(name, args)?, DecomposeMode::Compatibility)?
            }
            "equals" => Node::equals(args)?,
            unknown => {
                return Err(ParseError::IllegalExpression(format!(
                    "Unknown function: {unknown}"
                )))
            }
        };

        Ok(node)
    }

    fn arguments(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut args = Vec::new();

        if self.eat(&TokenKind::RParen) {
            return Ok(args);
        }

        loop {
            args.push(self.expression()?);
            if self.eat(&TokenKind::RParen) {
                return Ok(args);
            }
            self.expect(&TokenKind::Comma)?;
        }
    }
}

fn single_arg(function: &str, mut args: Vec<Node>) -> Result<Node, ParseError> {
    if args.len() != 1 {
        return Err(ParseError::IllegalExpression(format!(
            "{function}() takes exactly one argument"
        )));
    }
    Ok(args.remove(0))
}

fn single_field(function: &str, args: Vec<Node>) -> Result<String, ParseError> {
    match single_arg(function, args)? {
        Node::Field(name) => Ok(name),
        other => Err(ParseError::IllegalExpression(format!(
            "{function}() needs a field name argument, not {other}"
        ))),
    }
}

fn string_function(op: StringOp, mut args: Vec<Node>) -> Result<Node, ParseError> {
    if args.len() < 2 {
        return Err(ParseError::IllegalExpression(format!(
            "{}() needs an expression and at least one string",
            op.function_name()
        )));
    }

    let expr = args.remove(0);
    let operands = args
        .into_iter()
        .map(|arg| match arg {
            Node::Const(Literal::String(text)) => Ok(text),
            other => Err(ParseError::IllegalExpression(format!(
                "{}() needs string literal arguments, not {other}",
                op.function_name()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Node::string_match(op, expr, operands)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscription::unparse;

    fn assert_parses_to(text: &str, tree: &str) {
        match parse(text) {
            Ok(node) => assert_eq!(unparse(&node), tree, "parsing {text}"),
            Err(err) => panic!("{text} failed to parse: {err}"),
        }
    }

    #[test]
    fn fields_and_functions_as_fields() {
        assert_parses_to("hello", "(field 'hello')");
        assert_parses_to("_1", "(field '_1')");
        assert_parses_to("tricky=id", "(field 'tricky=id')");
        assert_parses_to("begins-with == 'hello'", "(== (field 'begins-with') 'hello')");
        assert_parses_to("int32 == 32", "(== (field 'int32') 32)");
    }

    #[test]
    fn logical_operators() {
        assert_parses_to(
            "field1 > 2 && field2 == 'hello\\'there'",
            "(&& (> (field 'field1') 2) (== (field 'field2') 'hello\\'there'))",
        );
        assert_parses_to(
            "(field1 != 10L || field2 < 3.2) ^^ (field3 == \"hello\")",
            "(^^ (|| (! (== (field 'field1') 10L)) (< (field 'field2') 3.2)) \
             (== (field 'field3') 'hello'))",
        );
        assert_parses_to(
            "a > 1 && b > 1 && c > 1",
            "(&& (> (field 'a') 1) (> (field 'b') 1) (> (field 'c') 1))",
        );
    }

    #[test]
    fn functions() {
        assert_parses_to("size (name)", "(size (field 'name'))");
        assert_parses_to("require(name)", "(require (field 'name'))");
        assert_parses_to("real64 (name)", "(real64 (field 'name'))");
        assert_parses_to("wildcard (name, 'hel*lo?')", "(wildcard (field 'name') 'hel*lo?')");
        assert_parses_to("decompose-compat (name)", "(decompose-compat (field 'name'))");
        assert_parses_to("equals (name, 'hello')", "(== (field 'name') 'hello')");
        assert_parses_to(
            "equals (name, 'hello', 42)",
            "(|| (== (field 'name') 'hello') (== (field 'name') 42))",
        );
        assert_parses_to(
            "contains (name, 'a', 'b')",
            "(|| (contains (field 'name') 'a') (contains (field 'name') 'b'))",
        );
        assert_parses_to("equals (name, 1 + 2)", "(== (field 'name') (+ 1 2))");
    }

    #[test]
    fn bad_functions() {
        for text in [
            "equals ('hello', 'there', 1)",
            "begins-with (name, 1)",
            "fold-case (1)",
            "decompose (1)",
            "regex (name, 1)",
            "foobar (name, 'hello')",
            "size ('name')",
        ] {
            assert!(parse(text).is_err(), "{text} should not parse");
        }
        assert!(matches!(
            parse("regex (name, '(abc')"),
            Err(ParseError::InvalidRegex { .. })
        ));
    }

    #[test]
    fn arithmetic_precedence() {
        assert_parses_to("1 + 2 + 3", "(+ (+ 1 2) 3)");
        assert_parses_to("1 - 2 - 3", "(- (- 1 2) 3)");
        assert_parses_to("1 - 2 + 3", "(- 1 (+ 2 3))");
        assert_parses_to("1 * 2 / 3", "(* 1 (/ 2 3))");
        assert_parses_to("-2", "(- 2)");
        assert_parses_to("~10", "(~ 10)");
        assert_parses_to("1 >>> 2", "(>>> 1 2)");
        assert_parses_to(
            "(name1 & 0x0F) >> name2",
            "(>> (& (field 'name1') 15) (field 'name2'))",
        );
        assert_parses_to(
            "(name1 << 2L) | name2 & 0xF0",
            "(| (<< (field 'name1') 2L) (& (field 'name2') 240))",
        );
    }

    #[test]
    fn type_errors() {
        for text in [
            "1 + 'hello'",
            "1.0 << 2",
            "1 << 2.0",
            "~'hello'",
            "- 'hello'",
            "--",
            "5 > 'name'",
            "field > 3 || 'name'",
            "'hello' && 'there'",
        ] {
            assert!(parse(text).is_err(), "{text} should not parse");
        }
    }

    #[test]
    fn syntax_errors() {
        for text in ["", "   ", "(1 > 2", "(1 > 2) (2 > 1)", "'", "a == 1 == 2"] {
            assert!(
                matches!(parse(text), Err(ParseError::Syntax { .. })),
                "{text} should be a syntax error"
            );
        }
    }

    fn parenthesised(depth: usize, inner: &str) -> String {
        format!("{}{inner}{}", "(".repeat(depth), ")".repeat(depth))
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        // The call to require() takes the last level.
        let text = parenthesised(MAX_NESTING - 1, "require(x)");
        assert!(parse_and_validate(&text).is_ok());

        assert!(parse_and_validate(&format!("{}require(x)", "!".repeat(8))).is_ok());
        assert!(parse_and_validate(&format!("x{} > 0", " + x".repeat(32))).is_ok());
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let too_deep = [
            parenthesised(MAX_NESTING, "require(x)"),
            // As long as the default Subscription.Max-Length allows.
            parenthesised(1019, "require(x)"),
            format!("{}require(x)", "!".repeat(MAX_NESTING + 1)),
            format!("{}x > 0", "~ ".repeat(MAX_NESTING + 1)),
            format!("x{} > 0", " + x".repeat(MAX_NESTING + 1)),
        ];

        for text in too_deep {
            match parse_and_validate(&text) {
                Err(ParseError::Syntax { message, .. }) => {
                    assert!(message.contains("nested"), "{message}")
                }
                other => panic!("expected a nesting error, got {other:?}"),
            }
        }
        assert_eq!(parenthesised(1019, "require(x)").len(), 2048);
    }

    #[test]
    fn validation_rejects_non_boolean_and_constant() {
        assert!(matches!(parse_and_validate("2"), Err(ParseError::NotBoolean(_))));
        assert!(matches!(parse_and_validate("'hello'"), Err(ParseError::NotBoolean(_))));
        assert_eq!(parse_and_validate("1 == 1"), Err(ParseError::Constant(true)));
        assert!(parse_and_validate("field > 5 || 1 == 1").unwrap_err().is_trivial());
        assert!(parse_and_validate("number == 1").is_ok());
    }

    #[test]
    fn realistic_subscriptions() {
        parse_and_validate(
            "(require (Message) && require (From) && \
             (fold-case (Group) == \"matthew@home\" || \
             fold-case (From) == \"matthew@home\")) || \
             (require (TICKERTEXT) && require (USER) && \
             fold-case (TICKERTAPE) == \"matthew@home\" || \
             fold-case (USER) == \"matthew@home\")",
        )
        .unwrap();

        parse_and_validate(
            "Presence-Protocol < 2000 && string (Groups) && string (User) && \
             equals (Presence-Info, 'initial', 'update', 'xyz') && \
             fold-case (User) != \"matthew@home\" && \
             (contains (fold-case (Groups), \"|dsto|\", \"|elvin|\") || \
             (equals (fold-case (User), \"foobar@dsto\", \"frodo@home\")))",
        )
        .unwrap();
    }
}
