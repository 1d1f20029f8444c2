//! Parser for expression specifications
//!
//! Parses programs like:
//! - `number x`
//! - `vector v(3) : nodiff`
//! - `const N = 3`
//! - `expr main = x * sin(x) + v . v`
//! - `expr main = for i in [0, 2] sum(v[i]^2)`
//!
//! Declarations must come in order: constants, then variables, then named
//! expressions. Every node is typed by the [`Analyzer`] as it is built.

use tracing::{debug, warn};

use crate::analyzer::Analyzer;
use crate::ast::*;
use crate::error::{CompileError, CompileResult};
use crate::lexer::{tokenize_with, LexErrorPolicy, SpannedToken, Token};

/// Recursive descent parser over the token stream of one source text
pub struct Parser<'source> {
    source: &'source str,
    policy: LexErrorPolicy,
    tokens: Vec<SpannedToken>,
    pos: usize,
    analyzer: Analyzer,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            policy: LexErrorPolicy::default(),
            tokens: Vec::new(),
            pos: 0,
            analyzer: Analyzer::new(),
        }
    }

    /// Choose how illegal characters are handled
    pub fn with_lex_policy(mut self, policy: LexErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Line of the current token (or of the last one at end of input)
    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.line)
            .unwrap_or(1)
    }

    /// Advance to the next token
    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|t| t.token.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        match self.current() {
            Some(tok) => std::mem::discriminant(tok) == std::mem::discriminant(expected),
            None => false,
        }
    }

    fn error_here(&self, message: impl Into<String>) -> CompileError {
        let token = match self.current() {
            Some(tok) => tok.to_string(),
            None => "end of input".to_string(),
        };
        CompileError::syntax(self.line(), token, message)
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> CompileResult<Token> {
        if self.check(&expected) {
            self.advance()
                .ok_or_else(|| self.error_here("Unexpected end of input"))
        } else {
            Err(self.error_here(format!("Expected '{}'", expected)))
        }
    }

    fn expect_ident(&mut self) -> CompileResult<String> {
        match self.current() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("Expected identifier")),
        }
    }

    /// Parse a complete program
    pub fn parse_program(&mut self) -> CompileResult<Program> {
        let lexed = tokenize_with(self.source, self.policy)?;
        self.tokens = lexed.tokens;
        self.pos = 0;
        debug!(tokens = self.tokens.len(), "tokenized specification");

        let mut constants = Vec::new();
        while self.check(&Token::Const) {
            constants.push(self.parse_constant()?);
        }

        while self.check(&Token::Number) || self.check(&Token::Vector) || self.check(&Token::Matrix) {
            self.parse_variable()?;
        }

        let mut expressions = Vec::new();
        let mut seen_main = false;
        while self.check(&Token::Expr) {
            let decl = self.parse_named_expr()?;
            if seen_main {
                warn!(
                    line = decl.line,
                    "expression '{}' follows main and is not used", decl.name
                );
            }
            seen_main |= decl.name == MAIN_EXPRESSION;
            expressions.push(decl);
        }

        if self.current().is_some() {
            let message = if expressions.is_empty() && self.check(&Token::Const) {
                "Constants must be declared before variables"
            } else if !expressions.is_empty()
                && (self.check(&Token::Const)
                    || self.check(&Token::Number)
                    || self.check(&Token::Vector)
                    || self.check(&Token::Matrix))
            {
                "Declarations must come before expressions"
            } else {
                "Unexpected token"
            };
            return Err(self.error_here(message));
        }

        if !seen_main {
            return Err(self.error_here("Missing 'expr main = ...' declaration"));
        }

        let analyzer = std::mem::take(&mut self.analyzer);
        Ok(Program {
            constants,
            variables: analyzer.finish(),
            expressions,
        })
    }

    /// `const ID = Expr`
    fn parse_constant(&mut self) -> CompileResult<Constant> {
        let line = self.line();
        self.expect(Token::Const)?;
        let name = self.expect_ident()?;
        self.expect(Token::Equals)?;
        let value = self.parse_expr()?;
        self.analyzer.declare_constant(&name, &value, line)?;
        Ok(Constant { name, value, line })
    }

    /// `number ID`, `vector ID(dim)`, `matrix ID(dim, dim)`, with an optional usage
    fn parse_variable(&mut self) -> CompileResult<()> {
        let line = self.line();
        let kind = self.advance();
        let name = self.expect_ident()?;

        let ty = match kind {
            Some(Token::Vector) => {
                self.expect(Token::LParen)?;
                let size = self.parse_dim()?;
                self.expect(Token::RParen)?;
                ExprType::vector(size)
            }
            Some(Token::Matrix) => {
                self.expect(Token::LParen)?;
                let rows = self.parse_dim()?;
                self.expect(Token::Comma)?;
                let cols = self.parse_dim()?;
                self.expect(Token::RParen)?;
                ExprType::matrix(rows, cols)
            }
            _ => ExprType::number(),
        };

        let usage = if self.check(&Token::Colon) {
            self.advance();
            match self.current() {
                Some(Token::NoDiff) => {
                    self.advance();
                    Usage::NoDiff
                }
                Some(Token::Equivalent) => {
                    self.advance();
                    Usage::Equivalent
                }
                _ => return Err(self.error_here("Expected 'nodiff' or 'equivalent'")),
            }
        } else {
            Usage::Normal
        };

        self.analyzer.declare_variable(&name, ty, usage, line)
    }

    /// A dimension: integer literal or the name of a constant / number variable
    fn parse_dim(&mut self) -> CompileResult<Dim> {
        let line = self.line();
        match self.current() {
            Some(Token::Integer(n)) => {
                let n = *n;
                self.advance();
                self.analyzer.literal_dim(n, line)
            }
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                self.analyzer.resolve_dim(&name, line)
            }
            _ => Err(self.error_here("Expected an integer or a name as dimension")),
        }
    }

    /// `expr ID = Expr` or `expr main = Expr`
    fn parse_named_expr(&mut self) -> CompileResult<NamedExpr> {
        let line = self.line();
        self.expect(Token::Expr)?;
        let name = if self.check(&Token::Main) {
            self.advance();
            MAIN_EXPRESSION.to_string()
        } else {
            self.expect_ident()?
        };
        self.expect(Token::Equals)?;
        let value = self.parse_expr()?;
        self.analyzer.declare_expression(&name, value.ty.clone(), line)?;
        Ok(NamedExpr { name, value, line })
    }

    /// Parse an expression (handles operator precedence)
    pub fn parse_expr(&mut self) -> CompileResult<AstExpr> {
        self.parse_additive()
    }

    fn binary(&self, op: BinaryOp, left: AstExpr, right: AstExpr, line: usize) -> CompileResult<AstExpr> {
        self.analyzer
            .build(ExprNode::Binary(op, Box::new(left), Box::new(right)), line)
    }

    /// Parse additive expressions: a + b, a - b
    fn parse_additive(&mut self) -> CompileResult<AstExpr> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let line = self.line();
            let op = match self.current() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary(op, left, right, line)?;
        }

        Ok(left)
    }

    /// Parse multiplicative expressions: a * b, a / b, a . b
    fn parse_multiplicative(&mut self) -> CompileResult<AstExpr> {
        let mut left = self.parse_power()?;

        loop {
            let line = self.line();
            let op = match self.current() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Dot) => BinaryOp::Dot,
                _ => break,
            };
            self.advance();
            let right = self.parse_power()?;
            left = self.binary(op, left, right, line)?;
        }

        Ok(left)
    }

    /// Parse power and cross products: a ^ b, a # b (left associative)
    fn parse_power(&mut self) -> CompileResult<AstExpr> {
        let mut left = self.parse_unary()?;

        loop {
            let line = self.line();
            let op = match self.current() {
                Some(Token::Caret) => BinaryOp::Pow,
                Some(Token::Hash) => BinaryOp::Cross,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.binary(op, left, right, line)?;
        }

        Ok(left)
    }

    /// Parse unary expressions: -a
    fn parse_unary(&mut self) -> CompileResult<AstExpr> {
        if self.check(&Token::Minus) {
            let line = self.line();
            self.advance();
            let operand = self.parse_unary()?;
            self.analyzer.build(ExprNode::Neg(Box::new(operand)), line)
        } else {
            self.parse_postfix()
        }
    }

    /// Parse postfix transposes: a'
    fn parse_postfix(&mut self) -> CompileResult<AstExpr> {
        let mut expr = self.parse_primary()?;
        while self.check(&Token::Apostrophe) {
            let line = self.line();
            self.advance();
            expr = self
                .analyzer
                .build(ExprNode::PostfixTranspose(Box::new(expr)), line)?;
        }
        Ok(expr)
    }

    /// Parse primary expressions: literals, names, element access, calls,
    /// parenthesized expressions, collections and loops
    fn parse_primary(&mut self) -> CompileResult<AstExpr> {
        let line = self.line();
        match self.current() {
            Some(Token::Integer(n)) => {
                let n = *n as f64;
                self.advance();
                self.analyzer.build(ExprNode::Literal(n), line)
            }

            Some(Token::Double(n)) => {
                let n = *n;
                self.advance();
                self.analyzer.build(ExprNode::Literal(n), line)
            }

            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.advance();
                if self.check(&Token::LBracket) {
                    self.parse_index(name, line)
                } else {
                    self.analyzer.build(ExprNode::Symbol(name), line)
                }
            }

            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }

            Some(Token::LBracket) => self.parse_collection(),

            Some(Token::For) => self.parse_loop(),

            Some(tok) => match function_of(tok) {
                Some(func) => {
                    self.advance();
                    self.expect(Token::LParen)?;
                    let arg = self.parse_expr()?;
                    self.expect(Token::RParen)?;
                    self.analyzer.build(ExprNode::Call(func, Box::new(arg)), line)
                }
                None => Err(self.error_here("Unexpected token")),
            },

            None => Err(self.error_here("Unexpected end of input")),
        }
    }

    /// `ID[e]` or `ID[e][e]`
    fn parse_index(&mut self, target: String, line: usize) -> CompileResult<AstExpr> {
        let target_ty = self.analyzer.lookup(&target, line)?.ty.clone();
        let mut indices = Vec::new();
        while self.check(&Token::LBracket) && indices.len() < 2 {
            self.advance();
            indices.push(self.parse_expr()?);
            self.expect(Token::RBracket)?;
        }
        self.analyzer.build(
            ExprNode::Index {
                target,
                target_ty,
                indices,
            },
            line,
        )
    }

    /// `[e, e, ...]` or `[[e, e], [e, e]]`
    fn parse_collection(&mut self) -> CompileResult<AstExpr> {
        let line = self.line();
        self.expect(Token::LBracket)?;

        if self.check(&Token::LBracket) {
            let mut rows = Vec::new();
            loop {
                self.expect(Token::LBracket)?;
                rows.push(self.parse_expr_list()?);
                self.expect(Token::RBracket)?;
                if self.check(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(Token::RBracket)?;
            self.analyzer.build(ExprNode::MatrixLiteral(rows), line)
        } else {
            let items = self.parse_expr_list()?;
            self.expect(Token::RBracket)?;
            self.analyzer.build(ExprNode::VectorLiteral(items), line)
        }
    }

    fn parse_expr_list(&mut self) -> CompileResult<Vec<AstExpr>> {
        let mut items = vec![self.parse_expr()?];
        while self.check(&Token::Comma) {
            self.advance();
            items.push(self.parse_expr()?);
        }
        Ok(items)
    }

    /// `for ID in [e, e] ... sum(e)` / `product(e)`
    fn parse_loop(&mut self) -> CompileResult<AstExpr> {
        let line = self.line();
        let mut ranges = Vec::new();
        let mut scopes = Vec::new();

        while self.check(&Token::For) {
            self.advance();
            let counter = self.expect_ident()?;
            self.expect(Token::In)?;
            self.expect(Token::LBracket)?;
            let lower = self.parse_expr()?;
            self.expect(Token::Comma)?;
            let upper = self.parse_expr()?;
            self.expect(Token::RBracket)?;

            let counter_line = self.line();
            scopes.push((
                counter.clone(),
                self.analyzer.enter_loop(&counter, counter_line)?,
            ));
            ranges.push(LoopRange {
                counter,
                lower,
                upper,
            });
        }

        let kind = match self.current() {
            Some(Token::Sum) => LoopKind::Sum,
            Some(Token::Product) => LoopKind::Product,
            _ => return Err(self.error_here("Expected 'sum' or 'product' after loop ranges")),
        };
        self.advance();
        self.expect(Token::LParen)?;
        let body = self.parse_expr()?;
        self.expect(Token::RParen)?;

        for (counter, previous) in scopes.into_iter().rev() {
            self.analyzer.exit_loop(&counter, previous);
        }

        self.analyzer.build(
            ExprNode::Loop {
                kind,
                ranges,
                body: Box::new(body),
            },
            line,
        )
    }
}

fn function_of(token: &Token) -> Option<MathFunc> {
    let func = match token {
        Token::Abs => MathFunc::Abs,
        Token::Sqrt => MathFunc::Sqrt,
        Token::Sin => MathFunc::Sin,
        Token::Cos => MathFunc::Cos,
        Token::Tan => MathFunc::Tan,
        Token::Cot => MathFunc::Cot,
        Token::Ln => MathFunc::Ln,
        Token::Norm => MathFunc::Norm,
        Token::Transpose => MathFunc::Transpose,
        _ => return None,
    };
    Some(func)
}
