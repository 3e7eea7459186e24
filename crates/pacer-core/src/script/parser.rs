//! Recursive-descent parser producing [`Stmt`] lists.

use std::sync::Arc;

use super::ast::{BinOp, CmpOp, Expr, FunctionDef, Stmt, StmtKind, Target, UnaryOp};
use super::error::{ErrorKind, ScriptError};
use super::lexer::{Op, Spanned, Token, tokenize};

/// Deepest nesting of blocks, brackets and prefix operators accepted.
pub const MAX_NESTING: usize = 100;

/// Longest chain of one binary operator; chains build left-deep trees.
pub const MAX_OPERANDS: usize = 500;

/// Parse `source` into a statement list. Line numbers start at `first_line`.
pub fn parse(source: &str, first_line: usize) -> Result<Vec<Stmt>, ScriptError> {
    let tokens = tokenize(source, first_line)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        loop_depth: 0,
        function_depth: 0,
        nesting: 0,
    };
    parser.program()
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    loop_depth: usize,
    function_depth: usize,
    nesting: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.pos)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, ahead: usize) -> &Token {
        self.tokens
            .get(self.pos + ahead)
            .map(|s| &s.token)
            .unwrap_or(&Token::Eof)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        token
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::new(self.line(), ErrorKind::Syntax, message)
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ScriptError>) -> Result<T, ScriptError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error("too many nested blocks or brackets"));
        }
        self.nesting += 1;
        let result = parse(self);
        self.nesting -= 1;
        result
    }

    fn check_chain(&self, operands: usize) -> Result<(), ScriptError> {
        if operands > MAX_OPERANDS {
            return Err(self.error("expression too long"));
        }
        Ok(())
    }

    fn at_op(&self, op: Op) -> bool {
        *self.peek() == Token::Op(op)
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Token::Name(name) if name == word)
    }

    fn eat_op(&mut self, op: Op) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_op(&mut self, op: Op, what: &str) -> Result<(), ScriptError> {
        if self.eat_op(op) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{what}'")))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), ScriptError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{word}'")))
        }
    }

    fn expect_name(&mut self) -> Result<String, ScriptError> {
        match self.peek().clone() {
            Token::Name(name) if !is_keyword(&name) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn expect_newline(&mut self) -> Result<(), ScriptError> {
        match self.peek() {
            Token::Newline => {
                self.pos += 1;
                Ok(())
            }
            Token::Eof | Token::Dedent => Ok(()),
            _ => Err(self.error("invalid syntax")),
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Token::Eof => break,
                Token::Newline => {
                    self.pos += 1;
                }
                Token::Indent => {
                    return Err(ScriptError::new(
                        self.line(),
                        ErrorKind::Indentation,
                        "unexpected indent",
                    ));
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    /// Parse the block after a compound-statement colon.
    fn block(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.expect_op(Op::Colon, ":")?;

        if !matches!(self.peek(), Token::Newline) {
            // Body on the same line as the header.
            return self.simple_line();
        }
        self.pos += 1;

        if !matches!(self.peek(), Token::Indent) {
            return Err(ScriptError::new(
                self.line(),
                ErrorKind::Indentation,
                "expected an indented block",
            ));
        }
        self.pos += 1;

        let mut body = Vec::new();
        loop {
            match self.peek() {
                Token::Dedent => {
                    self.pos += 1;
                    break;
                }
                Token::Eof => break,
                Token::Newline => {
                    self.pos += 1;
                }
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        self.nested(Self::statement_at_level)
    }

    fn statement_at_level(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let line = self.line();
        let kind = match self.peek() {
            Token::Name(word) => match word.as_str() {
                "if" => Some(self.if_statement()?),
                "while" => {
                    self.pos += 1;
                    let test = self.expression()?;
                    self.loop_depth += 1;
                    let body = self.block();
                    self.loop_depth -= 1;
                    Some(StmtKind::While(test, body?))
                }
                "for" => {
                    self.pos += 1;
                    let name = self.expect_name()?;
                    self.expect_keyword("in")?;
                    let iter = self.expression()?;
                    self.loop_depth += 1;
                    let body = self.block();
                    self.loop_depth -= 1;
                    Some(StmtKind::For(name, iter, body?))
                }
                "def" => Some(self.def_statement()?),
                _ => None,
            },
            _ => None,
        };

        match kind {
            Some(kind) => Ok(vec![Stmt { line, kind }]),
            None => self.simple_line(),
        }
    }

    fn if_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.pos += 1;
        let mut branches = Vec::new();
        let test = self.expression()?;
        branches.push((test, self.block()?));

        let mut orelse = Vec::new();
        loop {
            if self.eat_keyword("elif") {
                let test = self.expression()?;
                branches.push((test, self.block()?));
            } else if self.eat_keyword("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }

        Ok(StmtKind::If { branches, orelse })
    }

    fn def_statement(&mut self) -> Result<StmtKind, ScriptError> {
        self.pos += 1;
        let name = self.expect_name()?;
        self.expect_op(Op::LParen, "(")?;

        let mut params = Vec::new();
        while !self.at_op(Op::RParen) {
            let param = self.expect_name()?;
            if params.contains(&param) {
                return Err(self.error(format!("duplicate argument '{param}'")));
            }
            params.push(param);
            if !self.eat_op(Op::Comma) {
                break;
            }
        }
        self.expect_op(Op::RParen, ")")?;

        // Loops do not extend into a nested function body.
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.block();
        self.function_depth -= 1;
        self.loop_depth = saved_loops;

        Ok(StmtKind::Def(Arc::new(FunctionDef {
            name,
            params,
            body: body?,
        })))
    }

    /// One or more `;`-free simple statements terminated by a newline.
    fn simple_line(&mut self) -> Result<Vec<Stmt>, ScriptError> {
        let line = self.line();
        let kind = self.simple_statement()?;
        self.expect_newline()?;
        Ok(vec![Stmt { line, kind }])
    }

    fn simple_statement(&mut self) -> Result<StmtKind, ScriptError> {
        if let Token::Name(word) = self.peek().clone() {
            match word.as_str() {
                "pass" => {
                    self.pos += 1;
                    return Ok(StmtKind::Pass);
                }
                "break" | "continue" => {
                    if self.loop_depth == 0 {
                        return Err(self.error(format!("'{word}' outside loop")));
                    }
                    self.pos += 1;
                    return Ok(if word == "break" {
                        StmtKind::Break
                    } else {
                        StmtKind::Continue
                    });
                }
                "return" => {
                    if self.function_depth == 0 {
                        return Err(self.error("'return' outside function"));
                    }
                    self.pos += 1;
                    let value = match self.peek() {
                        Token::Newline | Token::Eof | Token::Dedent => None,
                        _ => Some(self.expression()?),
                    };
                    return Ok(StmtKind::Return(value));
                }
                "global" => {
                    self.pos += 1;
                    let mut names = vec![self.expect_name()?];
                    while self.eat_op(Op::Comma) {
                        names.push(self.expect_name()?);
                    }
                    return Ok(StmtKind::Global(names));
                }
                "import" => {
                    self.pos += 1;
                    let mut modules = Vec::new();
                    loop {
                        let module = self.dotted_name()?;
                        let binding = if self.eat_keyword("as") {
                            self.expect_name()?
                        } else {
                            module.split('.').next().unwrap_or(&module).to_string()
                        };
                        modules.push((module, binding));
                        if !self.eat_op(Op::Comma) {
                            break;
                        }
                    }
                    return Ok(StmtKind::Import(modules));
                }
                "from" => {
                    self.pos += 1;
                    let module = self.dotted_name()?;
                    self.expect_keyword("import")?;
                    let parenthesised = self.eat_op(Op::LParen);
                    let mut names = Vec::new();
                    loop {
                        let name = self.expect_name()?;
                        let binding = if self.eat_keyword("as") {
                            self.expect_name()?
                        } else {
                            name.clone()
                        };
                        names.push((name, binding));
                        if !self.eat_op(Op::Comma) {
                            break;
                        }
                    }
                    if parenthesised {
                        self.expect_op(Op::RParen, ")")?;
                    }
                    return Ok(StmtKind::FromImport(module, names));
                }
                "elif" | "else" => return Err(self.error("invalid syntax")),
                _ => {}
            }
        }

        let expr = self.expression()?;

        let aug = match self.peek() {
            Token::Op(Op::PlusAssign) => Some(BinOp::Add),
            Token::Op(Op::MinusAssign) => Some(BinOp::Sub),
            Token::Op(Op::StarAssign) => Some(BinOp::Mul),
            Token::Op(Op::SlashAssign) => Some(BinOp::Div),
            _ => None,
        };
        if let Some(op) = aug {
            self.pos += 1;
            let target = self.target(expr)?;
            let value = self.expression()?;
            return Ok(StmtKind::AugAssign(target, op, value));
        }

        if self.eat_op(Op::Assign) {
            let target = self.target(expr)?;
            let value = self.expression()?;
            if self.at_op(Op::Assign) {
                return Err(self.error("chained assignment is not supported"));
            }
            return Ok(StmtKind::Assign(target, value));
        }

        Ok(StmtKind::Expr(expr))
    }

    fn dotted_name(&mut self) -> Result<String, ScriptError> {
        let mut name = self.expect_name()?;
        while self.eat_op(Op::Dot) {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn target(&self, expr: Expr) -> Result<Target, ScriptError> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Index(base, index) => Ok(Target::Index(*base, *index)),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn expression(&mut self) -> Result<Expr, ScriptError> {
        self.nested(Self::conditional)
    }

    fn conditional(&mut self) -> Result<Expr, ScriptError> {
        let body = self.or_expr()?;
        if self.eat_keyword("if") {
            let test = self.or_expr()?;
            self.expect_keyword("else")?;
            let orelse = self.expression()?;
            return Ok(Expr::IfElse {
                test: Box::new(test),
                body: Box::new(body),
                orelse: Box::new(orelse),
            });
        }
        Ok(body)
    }

    fn or_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.and_expr()?;
        let mut operands = 1;
        while self.eat_keyword("or") {
            operands += 1;
            self.check_chain(operands)?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.not_expr()?;
        let mut operands = 1;
        while self.eat_keyword("and") {
            operands += 1;
            self.check_chain(operands)?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr, ScriptError> {
        if self.eat_keyword("not") {
            let operand = self.nested(Self::not_expr)?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ScriptError> {
        let first = self.arith()?;
        let mut rest = Vec::new();

        loop {
            let op = match self.peek() {
                Token::Op(Op::Eq) => CmpOp::Eq,
                Token::Op(Op::Ne) => CmpOp::Ne,
                Token::Op(Op::Lt) => CmpOp::Lt,
                Token::Op(Op::Le) => CmpOp::Le,
                Token::Op(Op::Gt) => CmpOp::Gt,
                Token::Op(Op::Ge) => CmpOp::Ge,
                Token::Name(word) if word == "in" => CmpOp::In,
                Token::Name(word)
                    if word == "not"
                        && matches!(self.peek_at(1), Token::Name(next) if next == "in") =>
                {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.arith()?));
        }

        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn arith(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.term()?;
        let mut operands = 1;
        loop {
            let op = match self.peek() {
                Token::Op(Op::Plus) => BinOp::Add,
                Token::Op(Op::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            operands += 1;
            self.check_chain(operands)?;
            let right = self.term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.unary()?;
        let mut operands = 1;
        loop {
            let op = match self.peek() {
                Token::Op(Op::Star) => BinOp::Mul,
                Token::Op(Op::Slash) => BinOp::Div,
                Token::Op(Op::DoubleSlash) => BinOp::FloorDiv,
                Token::Op(Op::Percent) => BinOp::Mod,
                _ => break,
            };
            self.pos += 1;
            operands += 1;
            self.check_chain(operands)?;
            let right = self.unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ScriptError> {
        let op = match self.peek() {
            Token::Op(Op::Minus) => UnaryOp::Neg,
            Token::Op(Op::Plus) => UnaryOp::Pos,
            _ => return self.power(),
        };
        self.pos += 1;
        let operand = self.nested(Self::unary)?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.postfix()?;
        if self.eat_op(Op::DoubleStar) {
            // Right-associative, binds tighter than unary minus on the left.
            let exponent = self.nested(Self::unary)?;
            return Ok(Expr::Binary(Box::new(base), BinOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Expr, ScriptError> {
        let mut expr = self.atom()?;
        let mut operands = 1;
        loop {
            operands += 1;
            self.check_chain(operands)?;
            if self.eat_op(Op::LParen) {
                let mut args = Vec::new();
                while !self.at_op(Op::RParen) {
                    args.push(self.expression()?);
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                self.expect_op(Op::RParen, ")")?;
                expr = Expr::Call(Box::new(expr), args);
            } else if self.eat_op(Op::Dot) {
                let attr = self.expect_name()?;
                expr = Expr::Attr(Box::new(expr), attr);
            } else if self.eat_op(Op::LBracket) {
                let index = self.expression()?;
                self.expect_op(Op::RBracket, "]")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr, ScriptError> {
        match self.advance() {
            Token::Int(value) => Ok(Expr::Int(value)),
            Token::Float(value) => Ok(Expr::Float(value)),
            Token::Str(text) => Ok(Expr::Str(text)),
            Token::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                word if is_keyword(word) => {
                    self.pos -= 1;
                    Err(self.error("invalid syntax"))
                }
                _ => Ok(Expr::Name(name)),
            },
            Token::Op(Op::LParen) => {
                let inner = self.expression()?;
                self.expect_op(Op::RParen, ")")?;
                Ok(inner)
            }
            Token::Op(Op::LBracket) => {
                let mut items = Vec::new();
                while !self.at_op(Op::RBracket) {
                    items.push(self.expression()?);
                    if !self.eat_op(Op::Comma) {
                        break;
                    }
                }
                self.expect_op(Op::RBracket, "]")?;
                Ok(Expr::List(items))
            }
            Token::Indent => {
                self.pos -= 1;
                Err(ScriptError::new(
                    self.line(),
                    ErrorKind::Indentation,
                    "unexpected indent",
                ))
            }
            Token::Eof | Token::Newline | Token::Dedent => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("unexpected end of statement"))
            }
            _ => {
                self.pos -= 1;
                Err(self.error("invalid syntax"))
            }
        }
    }
}

fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "if" | "elif"
            | "else"
            | "while"
            | "for"
            | "in"
            | "def"
            | "return"
            | "global"
            | "import"
            | "from"
            | "as"
            | "pass"
            | "break"
            | "continue"
            | "and"
            | "or"
            | "not"
            | "True"
            | "False"
            | "None"
    )
}
