//! Recursive-descent parser for the verification-script subset.

use std::rc::Rc;

use crate::core::script::ast::{
    BinOp, CmpOp, Expr, FStringPart, FunctionDef, ImportNames, Param, Stmt, StmtKind, Target,
    UnaryOp,
};
use crate::core::script::error::{ScriptError, ScriptResult};
use crate::core::script::lexer::{FPart, Tok, Token, tokenize};

const MAX_NESTING: usize = 100;

const KEYWORDS: [&str; 35] = [
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

const UNSUPPORTED_STATEMENTS: [&str; 12] = [
    "while", "class", "with", "try", "async", "raise", "global", "nonlocal", "del", "yield",
    "await", "lambda",
];

/// Parse a whole script into statements.
pub fn parse_program(source: &str) -> ScriptResult<Vec<Stmt>> {
    let mut parser = Parser::new(tokenize(source)?);
    let mut body = Vec::new();
    loop {
        parser.skip_newlines();
        if parser.at(&Tok::Eof) {
            break;
        }
        body.extend(parser.statement()?);
    }
    Ok(body)
}

/// Parse a single expression (used for `sympify` strings and f-string fields).
pub fn parse_expression(source: &str) -> ScriptResult<Expr> {
    let mut parser = Parser::new(tokenize(source)?);
    parser.skip_newlines();
    let expr = parser.testlist()?;
    parser.skip_newlines();
    if !parser.at(&Tok::Eof) {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn peek(&self) -> &Tok {
        self.peek_at(0)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens
            .get(self.pos + offset)
            .or_else(|| self.tokens.last())
            .map_or(&Tok::Eof, |t| &t.tok)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn at_op(&self, op: &str) -> bool {
        matches!(self.peek(), Tok::Op(o) if *o == op)
    }

    fn at_keyword(&self, word: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == word)
    }

    fn eat_op(&mut self, op: &str) -> bool {
        if self.at_op(op) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_op(&mut self, op: &str) -> ScriptResult<()> {
        if self.eat_op(op) {
            return Ok(());
        }
        Err(self.error(format!("expected '{op}'")))
    }

    fn expect_keyword(&mut self, word: &str) -> ScriptResult<()> {
        if self.eat_keyword(word) {
            return Ok(());
        }
        Err(self.error(format!("expected '{word}'")))
    }

    fn expect_name(&mut self) -> ScriptResult<String> {
        match self.peek().clone() {
            Tok::Name(name) if !is_keyword(&name) => {
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(&Tok::Newline) {
            self.pos += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line(),
            message: message.into(),
        }
    }

    fn enter(&mut self) -> ScriptResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("expression is nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    // ---- statements ----

    fn statement(&mut self) -> ScriptResult<Vec<Stmt>> {
        let line = self.line();
        match self.peek().clone() {
            Tok::Indent => Err(ScriptError::Indentation { line }),
            Tok::Name(word) => match word.as_str() {
                "if" => Ok(vec![self.if_statement()?]),
                "for" => Ok(vec![self.for_statement()?]),
                "def" => Ok(vec![self.function_def()?]),
                w if UNSUPPORTED_STATEMENTS.contains(&w) => {
                    Err(ScriptError::Unsupported(format!("'{w}' statements")))
                }
                _ => self.simple_line(),
            },
            _ => self.simple_line(),
        }
    }

    fn simple_line(&mut self) -> ScriptResult<Vec<Stmt>> {
        let mut stmts = vec![self.simple_statement()?];
        while self.eat_op(";") {
            if self.at(&Tok::Newline) || self.at(&Tok::Eof) {
                break;
            }
            stmts.push(self.simple_statement()?);
        }
        if !self.at(&Tok::Eof) && !matches!(self.advance(), Tok::Newline) {
            self.pos -= 1;
            return Err(self.error("invalid syntax"));
        }
        Ok(stmts)
    }

    fn simple_statement(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        let kind = match self.peek().clone() {
            Tok::Name(word) => match word.as_str() {
                "pass" => {
                    self.pos += 1;
                    StmtKind::Pass
                }
                "break" => {
                    self.pos += 1;
                    StmtKind::Break
                }
                "continue" => {
                    self.pos += 1;
                    StmtKind::Continue
                }
                "return" => {
                    self.pos += 1;
                    let value = if self.starts_expression() {
                        Some(self.testlist()?)
                    } else {
                        None
                    };
                    StmtKind::Return(value)
                }
                "import" => self.import()?,
                "from" => self.import_from()?,
                "assert" => {
                    self.pos += 1;
                    let test = self.test()?;
                    let message = if self.eat_op(",") {
                        Some(self.test()?)
                    } else {
                        None
                    };
                    StmtKind::Assert { test, message }
                }
                w if UNSUPPORTED_STATEMENTS.contains(&w) => {
                    return Err(ScriptError::Unsupported(format!("'{w}' statements")));
                }
                _ => self.expression_statement()?,
            },
            _ => self.expression_statement()?,
        };
        Ok(Stmt { kind, line })
    }

    fn expression_statement(&mut self) -> ScriptResult<StmtKind> {
        let first = self.testlist()?;
        if self.at_op("=") {
            let mut targets = vec![self.to_target(first)?];
            self.pos += 1;
            let mut value = self.testlist()?;
            while self.eat_op("=") {
                targets.push(self.to_target(value)?);
                value = self.testlist()?;
            }
            return Ok(StmtKind::Assign { targets, value });
        }
        let aug = match self.peek() {
            Tok::Op("+=") => Some(BinOp::Add),
            Tok::Op("-=") => Some(BinOp::Sub),
            Tok::Op("*=") => Some(BinOp::Mul),
            Tok::Op("/=") => Some(BinOp::Div),
            Tok::Op("//=") => Some(BinOp::FloorDiv),
            Tok::Op("%=") => Some(BinOp::Mod),
            Tok::Op("**=") => Some(BinOp::Pow),
            _ => None,
        };
        if let Some(op) = aug {
            self.pos += 1;
            let target = self.to_target(first)?;
            if matches!(target, Target::Tuple(_)) {
                return Err(self.error("illegal expression for augmented assignment"));
            }
            let value = self.testlist()?;
            return Ok(StmtKind::AugAssign { target, op, value });
        }
        if self.eat_op(":") {
            // Annotated assignment; the annotation is evaluated nowhere.
            let target = self.to_target(first)?;
            self.test()?;
            if self.eat_op("=") {
                let value = self.testlist()?;
                return Ok(StmtKind::Assign {
                    targets: vec![target],
                    value,
                });
            }
            return Ok(StmtKind::Pass);
        }
        Ok(StmtKind::Expr(first))
    }

    fn to_target(&self, expr: Expr) -> ScriptResult<Target> {
        match expr {
            Expr::Name(name) => Ok(Target::Name(name)),
            Expr::Tuple(items) | Expr::List(items) => Ok(Target::Tuple(
                items
                    .into_iter()
                    .map(|item| self.to_target(item))
                    .collect::<ScriptResult<_>>()?,
            )),
            Expr::Subscript(container, index) => Ok(Target::Subscript(*container, *index)),
            Expr::Attribute(..) => Err(ScriptError::Unsupported(
                "attribute assignment".to_string(),
            )),
            _ => Err(self.error("cannot assign to expression")),
        }
    }

    fn import(&mut self) -> ScriptResult<StmtKind> {
        self.expect_keyword("import")?;
        let module = self.dotted_name()?;
        let alias = if self.eat_keyword("as") {
            Some(self.expect_name()?)
        } else {
            None
        };
        if self.at_op(",") {
            return Err(ScriptError::Unsupported(
                "importing several modules in one statement".to_string(),
            ));
        }
        Ok(StmtKind::Import { module, alias })
    }

    fn import_from(&mut self) -> ScriptResult<StmtKind> {
        self.expect_keyword("from")?;
        let module = self.dotted_name()?;
        self.expect_keyword("import")?;
        if self.eat_op("*") {
            return Ok(StmtKind::ImportFrom {
                module,
                names: ImportNames::Star,
            });
        }
        let parenthesized = self.eat_op("(");
        let mut names = Vec::new();
        loop {
            let name = self.expect_name()?;
            let alias = if self.eat_keyword("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            names.push((name, alias));
            if !self.eat_op(",") {
                break;
            }
            if parenthesized && self.at_op(")") {
                break;
            }
        }
        if parenthesized {
            self.expect_op(")")?;
        }
        Ok(StmtKind::ImportFrom {
            module,
            names: ImportNames::Names(names),
        })
    }

    fn dotted_name(&mut self) -> ScriptResult<String> {
        let mut name = self.expect_name()?;
        while self.eat_op(".") {
            name.push('.');
            name.push_str(&self.expect_name()?);
        }
        Ok(name)
    }

    fn block(&mut self) -> ScriptResult<Vec<Stmt>> {
        self.expect_op(":")?;
        if !self.at(&Tok::Newline) {
            return self.simple_line();
        }
        self.skip_newlines();
        if !self.at(&Tok::Indent) {
            return Err(self.error("expected an indented block"));
        }
        self.pos += 1;
        let mut body = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                Tok::Dedent => {
                    self.pos += 1;
                    break;
                }
                Tok::Eof => break,
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn if_statement(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.expect_keyword("if")?;
        let mut branches = Vec::new();
        let test = self.test()?;
        branches.push((test, self.block()?));
        let mut orelse = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat_keyword("elif") {
                let test = self.test()?;
                branches.push((test, self.block()?));
            } else if self.eat_keyword("else") {
                orelse = self.block()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If { branches, orelse },
            line,
        })
    }

    fn for_statement(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.expect_keyword("for")?;
        let target = self.for_target()?;
        self.expect_keyword("in")?;
        let iter = self.testlist()?;
        let body = self.block()?;
        self.skip_newlines();
        if self.at_keyword("else") {
            return Err(ScriptError::Unsupported("'for ... else' blocks".to_string()));
        }
        Ok(Stmt {
            kind: StmtKind::For { target, iter, body },
            line,
        })
    }

    fn for_target(&mut self) -> ScriptResult<Target> {
        let mut items = vec![self.arith()?];
        let mut tuple = false;
        while self.eat_op(",") {
            tuple = true;
            if self.at_keyword("in") {
                break;
            }
            items.push(self.arith()?);
        }
        let expr = if tuple {
            Expr::Tuple(items)
        } else {
            items.remove(0)
        };
        self.to_target(expr)
    }

    fn function_def(&mut self) -> ScriptResult<Stmt> {
        let line = self.line();
        self.expect_keyword("def")?;
        let name = self.expect_name()?;
        self.expect_op("(")?;
        let mut params: Vec<Param> = Vec::new();
        while !self.at_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return Err(ScriptError::Unsupported("variadic parameters".to_string()));
            }
            let param = self.expect_name()?;
            if self.eat_op(":") {
                self.test()?;
            }
            let default = if self.eat_op("=") {
                Some(self.test()?)
            } else {
                None
            };
            if default.is_none() && params.iter().any(|p| p.default.is_some()) {
                return Err(self.error("non-default argument follows default argument"));
            }
            params.push(Param {
                name: param,
                default,
            });
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        if self.eat_op("->") {
            self.test()?;
        }
        let body = self.block()?;
        Ok(Stmt {
            kind: StmtKind::FunctionDef(Rc::new(FunctionDef { name, params, body })),
            line,
        })
    }

    // ---- expressions ----

    fn starts_expression(&self) -> bool {
        match self.peek() {
            Tok::Name(n) => {
                !is_keyword(n) || matches!(n.as_str(), "not" | "None" | "True" | "False")
            }
            Tok::Int(_) | Tok::Float(_) | Tok::Str(_) | Tok::FStr(_) => true,
            Tok::Op(op) => matches!(*op, "(" | "[" | "{" | "-" | "+"),
            _ => false,
        }
    }

    fn testlist(&mut self) -> ScriptResult<Expr> {
        let first = self.test()?;
        if !self.at_op(",") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if !self.starts_expression() {
                break;
            }
            items.push(self.test()?);
        }
        Ok(Expr::Tuple(items))
    }

    fn test(&mut self) -> ScriptResult<Expr> {
        self.enter()?;
        let result = self.test_inner();
        self.leave();
        result
    }

    fn test_inner(&mut self) -> ScriptResult<Expr> {
        if self.at_keyword("lambda") {
            return Err(ScriptError::Unsupported("lambda expressions".to_string()));
        }
        let body = self.or_test()?;
        if !self.eat_keyword("if") {
            return Ok(body);
        }
        let test = self.or_test()?;
        self.expect_keyword("else")?;
        let orelse = self.test()?;
        Ok(Expr::IfExp {
            test: Box::new(test),
            body: Box::new(body),
            orelse: Box::new(orelse),
        })
    }

    fn or_test(&mut self) -> ScriptResult<Expr> {
        let mut left = self.and_test()?;
        while self.eat_keyword("or") {
            let right = self.and_test()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_test(&mut self) -> ScriptResult<Expr> {
        let mut left = self.not_test()?;
        while self.eat_keyword("and") {
            let right = self.not_test()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn not_test(&mut self) -> ScriptResult<Expr> {
        if self.eat_keyword("not") {
            self.enter()?;
            let operand = self.not_test();
            self.leave();
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand?)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> ScriptResult<Expr> {
        let left = self.arith()?;
        let mut chain = Vec::new();
        loop {
            let op = match self.peek() {
                Tok::Op("==") => CmpOp::Eq,
                Tok::Op("!=") => CmpOp::Ne,
                Tok::Op("<") => CmpOp::Lt,
                Tok::Op("<=") => CmpOp::Le,
                Tok::Op(">") => CmpOp::Gt,
                Tok::Op(">=") => CmpOp::Ge,
                Tok::Name(n) if n == "in" => CmpOp::In,
                Tok::Name(n) if n == "is" => {
                    if matches!(self.peek_at(1), Tok::Name(m) if m == "not") {
                        self.pos += 1;
                        CmpOp::IsNot
                    } else {
                        CmpOp::Is
                    }
                }
                Tok::Name(n)
                    if n == "not" && matches!(self.peek_at(1), Tok::Name(m) if m == "in") =>
                {
                    self.pos += 1;
                    CmpOp::NotIn
                }
                _ => break,
            };
            self.pos += 1;
            chain.push((op, self.arith()?));
        }
        if chain.is_empty() {
            return Ok(left);
        }
        Ok(Expr::Compare(Box::new(left), chain))
    }

    fn arith(&mut self) -> ScriptResult<Expr> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Tok::Op("+") => BinOp::Add,
                Tok::Op("-") => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> ScriptResult<Expr> {
        let mut left = self.factor()?;
        loop {
            let op = match self.peek() {
                Tok::Op("*") => BinOp::Mul,
                Tok::Op("/") => BinOp::Div,
                Tok::Op("//") => BinOp::FloorDiv,
                Tok::Op("%") => BinOp::Mod,
                Tok::Op("@") => {
                    return Err(ScriptError::Unsupported("matrix multiplication".to_string()));
                }
                _ => break,
            };
            self.pos += 1;
            let right = self.factor()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn factor(&mut self) -> ScriptResult<Expr> {
        let op = match self.peek() {
            Tok::Op("-") => Some(UnaryOp::Neg),
            Tok::Op("+") => Some(UnaryOp::Pos),
            Tok::Op("~") => {
                return Err(ScriptError::Unsupported("bitwise operators".to_string()));
            }
            _ => None,
        };
        let Some(op) = op else {
            return self.power();
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.factor();
        self.leave();
        Ok(Expr::Unary(op, Box::new(operand?)))
    }

    fn power(&mut self) -> ScriptResult<Expr> {
        let base = self.primary()?;
        if !self.eat_op("**") {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.factor();
        self.leave();
        Ok(Expr::Binary(BinOp::Pow, Box::new(base), Box::new(exponent?)))
    }

    fn primary(&mut self) -> ScriptResult<Expr> {
        let mut expr = self.atom()?;
        loop {
            if self.eat_op("(") {
                expr = self.call(expr)?;
            } else if self.eat_op("[") {
                let index = self.testlist()?;
                if self.at_op(":") {
                    return Err(ScriptError::Unsupported("slices".to_string()));
                }
                self.expect_op("]")?;
                expr = Expr::Subscript(Box::new(expr), Box::new(index));
            } else if self.eat_op(".") {
                let attr = match self.advance() {
                    Tok::Name(name) => name,
                    _ => return Err(self.error("expected an attribute name")),
                };
                expr = Expr::Attribute(Box::new(expr), attr);
            } else {
                return Ok(expr);
            }
        }
    }

    fn call(&mut self, func: Expr) -> ScriptResult<Expr> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.at_op(")") {
            if self.at_op("*") || self.at_op("**") {
                return Err(ScriptError::Unsupported("argument unpacking".to_string()));
            }
            if let Tok::Name(name) = self.peek().clone()
                && matches!(self.peek_at(1), Tok::Op("="))
            {
                self.pos += 2;
                kwargs.push((name, self.test()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error("positional argument follows keyword argument"));
                }
                let arg = self.test()?;
                if self.at_keyword("for") {
                    args.push(self.comprehension(arg)?);
                } else {
                    args.push(arg);
                }
            }
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op(")")?;
        Ok(Expr::Call {
            func: Box::new(func),
            args,
            kwargs,
        })
    }

    fn comprehension(&mut self, element: Expr) -> ScriptResult<Expr> {
        self.expect_keyword("for")?;
        let target = self.for_target()?;
        self.expect_keyword("in")?;
        let iter = self.or_test()?;
        let mut conditions = Vec::new();
        while self.eat_keyword("if") {
            conditions.push(self.or_test()?);
        }
        if self.at_keyword("for") {
            return Err(ScriptError::Unsupported("nested comprehensions".to_string()));
        }
        Ok(Expr::Comprehension {
            element: Box::new(element),
            target: Box::new(target),
            iter: Box::new(iter),
            conditions,
        })
    }

    fn atom(&mut self) -> ScriptResult<Expr> {
        let line = self.line();
        match self.advance() {
            Tok::Name(name) => match name.as_str() {
                "True" => Ok(Expr::Bool(true)),
                "False" => Ok(Expr::Bool(false)),
                "None" => Ok(Expr::None),
                "lambda" | "await" | "yield" => {
                    Err(ScriptError::Unsupported(format!("'{name}' expressions")))
                }
                n if is_keyword(n) => Err(ScriptError::Syntax {
                    line,
                    message: format!("unexpected keyword '{n}'"),
                }),
                _ => Ok(Expr::Name(name)),
            },
            Tok::Int(value) => Ok(Expr::Int(value)),
            Tok::Float(value) => Ok(Expr::Float(value)),
            tok @ (Tok::Str(_) | Tok::FStr(_)) => self.strings(tok, line),
            Tok::Op("(") => self.parenthesized(),
            Tok::Op("[") => self.list_display(),
            Tok::Op("{") => self.dict_display(),
            Tok::Indent => Err(ScriptError::Indentation { line }),
            Tok::Newline | Tok::Eof => Err(ScriptError::Syntax {
                line,
                message: "unexpected end of line".to_string(),
            }),
            other => Err(ScriptError::Syntax {
                line,
                message: format!("unexpected token {}", describe(&other)),
            }),
        }
    }

    /// Adjacent string literals concatenate; any f-string makes the result one.
    fn strings(&mut self, first: Tok, line: usize) -> ScriptResult<Expr> {
        let mut pieces = vec![first];
        while matches!(self.peek(), Tok::Str(_) | Tok::FStr(_)) {
            pieces.push(self.advance());
        }
        if pieces.iter().all(|p| matches!(p, Tok::Str(_))) {
            let text = pieces
                .into_iter()
                .filter_map(|p| match p {
                    Tok::Str(s) => Some(s),
                    _ => None,
                })
                .collect();
            return Ok(Expr::Str(text));
        }
        let mut parts = Vec::new();
        for piece in pieces {
            match piece {
                Tok::Str(s) => parts.push(FStringPart::Lit(s)),
                Tok::FStr(fparts) => {
                    for part in fparts {
                        match part {
                            FPart::Lit(s) => parts.push(FStringPart::Lit(s)),
                            FPart::Expr(src) => {
                                let expr = parse_expression(&src).map_err(|err| match err {
                                    ScriptError::Syntax { message, .. } => {
                                        ScriptError::Syntax { line, message }
                                    }
                                    other => other,
                                })?;
                                parts.push(FStringPart::Expr(expr));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(Expr::FString(parts))
    }

    fn parenthesized(&mut self) -> ScriptResult<Expr> {
        if self.eat_op(")") {
            return Ok(Expr::Tuple(Vec::new()));
        }
        self.enter()?;
        let result = self.parenthesized_inner();
        self.leave();
        result
    }

    fn parenthesized_inner(&mut self) -> ScriptResult<Expr> {
        let first = self.test()?;
        if self.at_keyword("for") {
            let comp = self.comprehension(first)?;
            self.expect_op(")")?;
            return Ok(comp);
        }
        if self.eat_op(")") {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op(")") {
                break;
            }
            items.push(self.test()?);
        }
        self.expect_op(")")?;
        Ok(Expr::Tuple(items))
    }

    fn list_display(&mut self) -> ScriptResult<Expr> {
        if self.eat_op("]") {
            return Ok(Expr::List(Vec::new()));
        }
        self.enter()?;
        let result = self.list_inner();
        self.leave();
        result
    }

    fn list_inner(&mut self) -> ScriptResult<Expr> {
        let first = self.test()?;
        if self.at_keyword("for") {
            let comp = self.comprehension(first)?;
            self.expect_op("]")?;
            return Ok(comp);
        }
        let mut items = vec![first];
        while self.eat_op(",") {
            if self.at_op("]") {
                break;
            }
            items.push(self.test()?);
        }
        self.expect_op("]")?;
        Ok(Expr::List(items))
    }

    fn dict_display(&mut self) -> ScriptResult<Expr> {
        let mut pairs = Vec::new();
        while !self.at_op("}") {
            let key = self.test()?;
            if !self.eat_op(":") {
                return Err(ScriptError::Unsupported("set literals".to_string()));
            }
            let value = self.test()?;
            pairs.push((key, value));
            if !self.eat_op(",") {
                break;
            }
        }
        self.expect_op("}")?;
        Ok(Expr::Dict(pairs))
    }
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn describe(tok: &Tok) -> String {
    match tok {
        Tok::Name(n) => format!("'{n}'"),
        Tok::Int(v) => format!("'{v}'"),
        Tok::Float(v) => format!("'{v}'"),
        Tok::Str(_) | Tok::FStr(_) => "string".to_string(),
        Tok::Op(op) => format!("'{op}'"),
        Tok::Newline => "newline".to_string(),
        Tok::Indent => "indent".to_string(),
        Tok::Dedent => "dedent".to_string(),
        Tok::Eof => "end of input".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_and_calls() {
        let program = parse_program("x = sp.Symbol('x')\nis_correct = sp.diff(x**2, x) == 2*x\n")
            .expect("parse");
        assert_eq!(program.len(), 2);
        let StmtKind::Assign { targets, value } = &program[1].kind else {
            panic!("expected assignment");
        };
        assert_eq!(targets, &vec![Target::Name("is_correct".to_string())]);
        assert!(matches!(value, Expr::Compare(_, chain) if chain[0].0 == CmpOp::Eq));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let expr = parse_expression("-x**2").expect("parse");
        let Expr::Unary(UnaryOp::Neg, inner) = expr else {
            panic!("expected negation at the top");
        };
        assert!(matches!(*inner, Expr::Binary(BinOp::Pow, _, _)));
    }

    #[test]
    fn parses_blocks_with_elif_and_else() {
        let source = "if a:\n    b = 1\nelif c:\n    b = 2\nelse:\n    b = 3\n";
        let program = parse_program(source).expect("parse");
        let StmtKind::If { branches, orelse } = &program[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn parses_function_with_defaults_and_tuple_unpacking() {
        let source = "def f(a, b=2):\n    return a + b\nx, y = f(1), f(2, b=3)\n";
        let program = parse_program(source).expect("parse");
        assert!(matches!(&program[0].kind, StmtKind::FunctionDef(def) if def.params.len() == 2));
        assert!(matches!(
            &program[1].kind,
            StmtKind::Assign { targets, .. } if matches!(targets[0], Target::Tuple(_))
        ));
    }

    #[test]
    fn generator_argument_becomes_comprehension() {
        let expr = parse_expression("all(v > 0 for v in values if v)").expect("parse");
        let Expr::Call { args, .. } = expr else {
            panic!("expected call");
        };
        assert!(matches!(&args[0], Expr::Comprehension { conditions, .. } if conditions.len() == 1));
    }

    #[test]
    fn rejects_unsupported_statements() {
        let err = parse_program("while True:\n    pass\n").expect_err("should fail");
        assert!(matches!(err, ScriptError::Unsupported(_)));
    }

    #[test]
    fn reports_syntax_error_line() {
        let err = parse_program("x = 1\ny = (2 +\n").expect_err("should fail");
        assert!(matches!(err, ScriptError::Syntax { .. }));
        let err = parse_program("a = 1\nb = = 2\n").expect_err("should fail");
        assert!(matches!(err, ScriptError::Syntax { line: 2, .. }));
    }

    #[test]
    fn unexpected_indent_is_reported() {
        let err = parse_program("x = 1\n    y = 2\n").expect_err("should fail");
        assert_eq!(err, ScriptError::Indentation { line: 2 });
    }
}
