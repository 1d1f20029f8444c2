//! Reader for the symbolic text produced by AST projection
//!
//! The text is parsed into a small untyped tree first and then evaluated
//! against a map of locals, so that loop counters introduced by
//! `Sum(body, (i, lo, hi))` are in scope while the body is evaluated.

use std::collections::BTreeMap;

use logos::Logos;

use super::expr::{Func, LoopOp, Sym};
use super::matrix::{DummyNames, SymMatrix, Value};
use crate::error::{CompileError, CompileResult};

/// Values visible to the evaluator by name
pub type Locals = BTreeMap<String, Value>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
enum SymToken {
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r"[A-Za-z_][A-Za-z_0-9]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("**")]
    Pow,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token(".")]
    Dot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Untyped syntax of the symbolic text
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Name(String),
    Neg(Box<Node>),
    Binary(BinOp, Box<Node>, Box<Node>),
    Call(String, Vec<Node>),
    List(Vec<Node>),
    Tuple(Vec<Node>),
    Attr(Box<Node>, String),
    Method(Box<Node>, String, Vec<Node>),
    Index(Box<Node>, Vec<Node>),
}

struct TextParser {
    tokens: Vec<SymToken>,
    pos: usize,
}

impl TextParser {
    fn new(text: &str) -> CompileResult<Self> {
        let mut tokens = Vec::new();
        let mut lexer = SymToken::lexer(text);
        while let Some(token) = lexer.next() {
            match token {
                Ok(t) => tokens.push(t),
                Err(()) => {
                    return Err(CompileError::symbolic(format!(
                        "unexpected '{}' at offset {} in '{}'",
                        lexer.slice(),
                        lexer.span().start,
                        text
                    )))
                }
            }
        }
        Ok(Self { tokens, pos: 0 })
    }

    fn current(&self) -> Option<&SymToken> {
        self.tokens.get(self.pos)
    }

    fn check(&self, expected: &SymToken) -> bool {
        self.current() == Some(expected)
    }

    fn advance(&mut self) -> Option<SymToken> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: SymToken) -> CompileResult<()> {
        if self.check(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(CompileError::symbolic(format!(
                "expected {:?}, got {:?}",
                expected,
                self.current()
            )))
        }
    }

    fn parse_all(&mut self) -> CompileResult<Node> {
        let node = self.parse_expr()?;
        if let Some(tok) = self.current() {
            return Err(CompileError::symbolic(format!("trailing {:?}", tok)));
        }
        Ok(node)
    }

    fn parse_expr(&mut self) -> CompileResult<Node> {
        let mut left = self.parse_term()?;
        loop {
            let op = match self.current() {
                Some(SymToken::Plus) => BinOp::Add,
                Some(SymToken::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_term()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_term(&mut self) -> CompileResult<Node> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current() {
                Some(SymToken::Star) => BinOp::Mul,
                Some(SymToken::Slash) => BinOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> CompileResult<Node> {
        if self.check(&SymToken::Minus) {
            self.advance();
            Ok(Node::Neg(Box::new(self.parse_unary()?)))
        } else {
            self.parse_power()
        }
    }

    fn parse_power(&mut self) -> CompileResult<Node> {
        let base = self.parse_postfix()?;
        if self.check(&SymToken::Pow) {
            self.advance();
            let exp = self.parse_unary()?;
            return Ok(Node::Binary(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> CompileResult<Node> {
        let mut node = self.parse_primary()?;
        loop {
            if self.check(&SymToken::Dot) {
                self.advance();
                let name = match self.advance() {
                    Some(SymToken::Ident(name)) => name,
                    other => {
                        return Err(CompileError::symbolic(format!(
                            "expected attribute name, got {:?}",
                            other
                        )))
                    }
                };
                node = if self.check(&SymToken::LParen) {
                    let args = self.parse_args(SymToken::LParen, SymToken::RParen)?;
                    Node::Method(Box::new(node), name, args)
                } else {
                    Node::Attr(Box::new(node), name)
                };
            } else if self.check(&SymToken::LBracket) {
                let indices = self.parse_args(SymToken::LBracket, SymToken::RBracket)?;
                node = Node::Index(Box::new(node), indices);
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_primary(&mut self) -> CompileResult<Node> {
        match self.advance() {
            Some(SymToken::Number(v)) => Ok(Node::Number(v)),
            Some(SymToken::Ident(name)) => {
                if self.check(&SymToken::LParen) {
                    let args = self.parse_args(SymToken::LParen, SymToken::RParen)?;
                    Ok(Node::Call(name, args))
                } else {
                    Ok(Node::Name(name))
                }
            }
            Some(SymToken::LParen) => {
                self.pos -= 1;
                let mut items = self.parse_args(SymToken::LParen, SymToken::RParen)?;
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(Node::Tuple(items))
                }
            }
            Some(SymToken::LBracket) => {
                self.pos -= 1;
                Ok(Node::List(self.parse_args(SymToken::LBracket, SymToken::RBracket)?))
            }
            other => Err(CompileError::symbolic(format!("unexpected {:?}", other))),
        }
    }

    fn parse_args(&mut self, open: SymToken, close: SymToken) -> CompileResult<Vec<Node>> {
        self.expect(open)?;
        let mut args = Vec::new();
        if !self.check(&close) {
            args.push(self.parse_expr()?);
            while self.check(&SymToken::Comma) {
                self.advance();
                args.push(self.parse_expr()?);
            }
        }
        self.expect(close)?;
        Ok(args)
    }
}

/// Parses symbolic text into values.
///
/// One parser is used per compilation so that summation counters created for
/// symbolic matrix products never clash.
#[derive(Debug, Default)]
pub struct SymbolicParser {
    dummies: DummyNames,
}

impl SymbolicParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and evaluate `text`, resolving names through `locals`
    pub fn parse(&mut self, text: &str, locals: &Locals) -> CompileResult<Value> {
        let node = TextParser::new(text)?.parse_all()?;
        let mut scope = Evaluator {
            locals,
            counters: Vec::new(),
            dummies: &mut self.dummies,
        };
        scope.eval(&node)
    }
}

struct Evaluator<'a> {
    locals: &'a Locals,
    counters: Vec<String>,
    dummies: &'a mut DummyNames,
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, node: &Node) -> CompileResult<Value> {
        match node {
            Node::Number(v) => Ok(Value::Scalar(Sym::Num(*v))),

            Node::Name(name) => {
                if self.counters.contains(name) {
                    return Ok(Value::Scalar(Sym::symbol(name.clone())));
                }
                self.locals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| CompileError::symbolic(format!("unknown name '{}'", name)))
            }

            Node::Neg(inner) => match self.eval(inner)? {
                Value::Scalar(s) => Ok(Value::Scalar(Sym::neg(s))),
                Value::Matrix(m) => Ok(Value::Matrix(m.scale(&Sym::Num(-1.0))?)),
            },

            Node::Binary(op, lhs, rhs) => {
                let (l, r) = (self.eval(lhs)?, self.eval(rhs)?);
                self.binary(*op, l, r)
            }

            Node::Call(name, args) => self.call(name, args),

            Node::Attr(target, name) => match (self.eval(target)?, name.as_str()) {
                (Value::Matrix(m), "T") => Ok(Value::Matrix(m.transpose())),
                (Value::Scalar(s), "T") => Ok(Value::Scalar(s)),
                (_, other) => Err(CompileError::unsupported(format!(".{}", other))),
            },

            Node::Method(target, name, args) => {
                let target = self.eval(target)?;
                match (name.as_str(), args.as_slice()) {
                    ("norm", []) => match target {
                        Value::Matrix(m) => Ok(Value::Scalar(m.norm(self.dummies)?)),
                        Value::Scalar(s) => Ok(Value::Scalar(Sym::func(Func::Abs, s))),
                    },
                    ("cross", [other]) => {
                        let other = self.eval(other)?;
                        match (target, other) {
                            (Value::Matrix(a), Value::Matrix(b)) => Ok(Value::Matrix(a.cross(&b)?)),
                            _ => Err(CompileError::symbolic("cross product of non-vectors")),
                        }
                    }
                    (other, _) => Err(CompileError::unsupported(format!(".{}()", other))),
                }
            }

            Node::Index(target, indices) => {
                let target = self.eval(target)?;
                let indices = indices
                    .iter()
                    .map(|i| self.eval(i)?.into_scalar("index"))
                    .collect::<CompileResult<Vec<_>>>()?;
                match (target, indices.as_slice()) {
                    (Value::Matrix(m), [i, j]) => Ok(Value::Scalar(m.element(i, j)?)),
                    (Value::Scalar(s), [i, j]) if i.is_zero() && j.is_zero() => Ok(Value::Scalar(s)),
                    _ => Err(CompileError::symbolic("invalid element access")),
                }
            }

            Node::List(_) | Node::Tuple(_) => {
                Err(CompileError::symbolic("bare list or tuple in expression"))
            }
        }
    }

    fn binary(&mut self, op: BinOp, l: Value, r: Value) -> CompileResult<Value> {
        use Value::{Matrix, Scalar};
        match (op, l, r) {
            (BinOp::Add, Scalar(a), Scalar(b)) => Ok(Scalar(Sym::add(vec![a, b]))),
            (BinOp::Add, Matrix(a), Matrix(b)) => Ok(Matrix(a.add(&b)?)),
            (BinOp::Sub, Scalar(a), Scalar(b)) => Ok(Scalar(Sym::sub(a, b))),
            (BinOp::Sub, Matrix(a), Matrix(b)) => Ok(Matrix(a.sub(&b)?)),
            (BinOp::Mul, Scalar(a), Scalar(b)) => Ok(Scalar(Sym::mul(vec![a, b]))),
            (BinOp::Mul, Scalar(s), Matrix(m)) | (BinOp::Mul, Matrix(m), Scalar(s)) => {
                Ok(Matrix(m.scale(&s)?))
            }
            (BinOp::Mul, Matrix(a), Matrix(b)) => Ok(Matrix(a.matmul(&b, self.dummies)?)),
            (BinOp::Div, Scalar(a), Scalar(b)) => Ok(Scalar(Sym::div(a, b))),
            (BinOp::Div, Matrix(m), Scalar(s)) => Ok(Matrix(m.scale(&Sym::recip(s))?)),
            (BinOp::Pow, Scalar(a), Scalar(b)) => Ok(Scalar(Sym::pow(a, b))),
            (op, _, _) => Err(CompileError::symbolic(format!(
                "operator {:?} does not apply to these operands",
                op
            ))),
        }
    }

    fn scalar_arg(&mut self, name: &str, args: &[Node]) -> CompileResult<Sym> {
        match args {
            [arg] => self.eval(arg)?.into_scalar(name),
            _ => Err(CompileError::symbolic(format!(
                "{} takes one argument, got {}",
                name,
                args.len()
            ))),
        }
    }

    fn call(&mut self, name: &str, args: &[Node]) -> CompileResult<Value> {
        let func = match name {
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "tan" => Some(Func::Tan),
            "cot" => Some(Func::Cot),
            "log" => Some(Func::Log),
            "Abs" => Some(Func::Abs),
            _ => None,
        };
        if let Some(func) = func {
            let arg = self.scalar_arg(name, args)?;
            return Ok(Value::Scalar(Sym::func(func, arg)));
        }

        match name {
            "sqrt" => Ok(Value::Scalar(Sym::sqrt(self.scalar_arg(name, args)?))),
            "Transpose" => match args {
                [arg] => match self.eval(arg)? {
                    Value::Matrix(m) => Ok(Value::Matrix(m.transpose())),
                    scalar => Ok(scalar),
                },
                _ => Err(CompileError::symbolic("Transpose takes one argument")),
            },
            "Matrix" => match args {
                [Node::List(items)] => self.matrix_literal(items),
                _ => Err(CompileError::symbolic("Matrix expects a list")),
            },
            "Sum" => self.aggregate(LoopOp::Sum, args),
            "Product" => self.aggregate(LoopOp::Product, args),
            other => Err(CompileError::unsupported(other)),
        }
    }

    fn matrix_literal(&mut self, items: &[Node]) -> CompileResult<Value> {
        if items.iter().all(|i| matches!(i, Node::List(_))) && !items.is_empty() {
            let mut rows = Vec::with_capacity(items.len());
            for item in items {
                if let Node::List(row) = item {
                    rows.push(
                        row.iter()
                            .map(|e| self.eval(e)?.into_scalar("matrix entry"))
                            .collect::<CompileResult<Vec<_>>>()?,
                    );
                }
            }
            Ok(Value::Matrix(SymMatrix::from_rows(rows)?))
        } else {
            let column = items
                .iter()
                .map(|e| self.eval(e)?.into_scalar("vector entry"))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(Value::Matrix(SymMatrix::column(column)))
        }
    }

    /// `Sum(body, (i, lo, hi), (j, lo, hi), ...)`; the first range is outermost
    fn aggregate(&mut self, op: LoopOp, args: &[Node]) -> CompileResult<Value> {
        let (body, ranges) = args
            .split_first()
            .ok_or_else(|| CompileError::symbolic(format!("{} needs a body", op.name())))?;
        if ranges.is_empty() {
            return Err(CompileError::symbolic(format!("{} needs at least one range", op.name())));
        }

        let mut bounds = Vec::with_capacity(ranges.len());
        for range in ranges {
            let (var, lower, upper) = match range {
                Node::Tuple(parts) => match parts.as_slice() {
                    [Node::Name(var), lower, upper] => (var.clone(), lower, upper),
                    _ => return Err(CompileError::symbolic("malformed loop range")),
                },
                _ => return Err(CompileError::symbolic("malformed loop range")),
            };
            let lower = self.eval(lower)?.into_scalar("loop bound")?;
            let upper = self.eval(upper)?.into_scalar("loop bound")?;
            self.counters.push(var.clone());
            bounds.push((var, lower, upper));
        }

        let body = self.eval(body);
        for _ in 0..bounds.len() {
            self.counters.pop();
        }

        let wrap = |inner: Sym| {
            bounds.iter().rev().fold(inner, |acc, (var, lower, upper)| {
                Sym::aggregate(op, acc, var.clone(), lower.clone(), upper.clone())
            })
        };

        match body? {
            Value::Scalar(s) => Ok(Value::Scalar(wrap(s))),
            Value::Matrix(m) => Ok(Value::Matrix(m.map_elements(&|e| wrap(e.clone()))?)),
        }
    }
}
