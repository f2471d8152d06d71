use crate::core::script::error::{ScriptError, ScriptResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    /// f-string body split into literal and `{expr}` parts.
    FStr(Vec<FPart>),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FPart {
    Lit(String),
    Expr(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
}

const THREE_CHAR_OPS: [&str; 3] = ["**=", "//=", "..."];
const TWO_CHAR_OPS: [&str; 14] = [
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "%=", "->", "<<", ">>",
];
const ONE_CHAR_OPS: [&str; 21] = [
    "+", "-", "*", "/", "%", "<", ">", "=", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";",
    "@", "|", "^",
];

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    depth: usize,
    indents: Vec<usize>,
    tokens: Vec<Token>,
}

/// Tokenize a script, producing explicit `Indent`/`Dedent` tokens.
pub fn tokenize(source: &str) -> ScriptResult<Vec<Token>> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        depth: 0,
        indents: vec![0],
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok) {
        self.tokens.push(Token {
            tok,
            line: self.line,
        });
    }

    fn syntax(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            line: self.line,
            message: message.into(),
        }
    }

    fn run(&mut self) -> ScriptResult<()> {
        let mut at_line_start = true;
        while self.pos < self.chars.len() {
            if at_line_start && self.depth == 0 {
                at_line_start = false;
                if self.handle_indentation()? {
                    at_line_start = true;
                    continue;
                }
            }
            let Some(c) = self.peek(0) else { break };
            match c {
                ' ' | '\t' | '\r' | '\x0c' => self.pos += 1,
                '\\' if self.peek(1) == Some('\n') => {
                    self.pos += 2;
                    self.line += 1;
                }
                '#' => self.skip_comment(),
                '\n' => {
                    self.pos += 1;
                    if self.depth == 0 {
                        self.push(Tok::Newline);
                        at_line_start = true;
                    }
                    self.line += 1;
                }
                '0'..='9' => self.number()?,
                '.' if self.peek(1).is_some_and(|n| n.is_ascii_digit()) => self.number()?,
                '\'' | '"' => self.string(false, false)?,
                c if c.is_alphabetic() || c == '_' => self.word()?,
                _ => self.operator()?,
            }
        }
        if !matches!(
            self.tokens.last().map(|t| &t.tok),
            None | Some(Tok::Newline)
        ) {
            self.push(Tok::Newline);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent);
        }
        self.push(Tok::Eof);
        Ok(())
    }

    /// Returns true when the line was blank (or comment-only) and consumed.
    fn handle_indentation(&mut self) -> ScriptResult<bool> {
        let mut width = 0;
        while let Some(c) = self.peek(0) {
            match c {
                ' ' => width += 1,
                '\t' => width = (width / 8 + 1) * 8,
                '\x0c' | '\r' => {}
                _ => break,
            }
            self.pos += 1;
        }
        match self.peek(0) {
            None => return Ok(true),
            Some('#') => {
                self.skip_comment();
                if self.peek(0) == Some('\n') {
                    self.pos += 1;
                    self.line += 1;
                }
                return Ok(true);
            }
            Some('\n') => {
                self.pos += 1;
                self.line += 1;
                return Ok(true);
            }
            Some(_) => {}
        }
        let current = self.indents.last().copied().unwrap_or(0);
        if width > current {
            self.indents.push(width);
            self.push(Tok::Indent);
        } else if width < current {
            while self.indents.last().is_some_and(|&top| top > width) {
                self.indents.pop();
                self.push(Tok::Dedent);
            }
            if self.indents.last().copied().unwrap_or(0) != width {
                return Err(self.syntax("unindent does not match any outer indentation level"));
            }
        }
        Ok(false)
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek(0) {
            if c == '\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn number(&mut self) -> ScriptResult<()> {
        let start = self.pos;
        let mut is_float = false;
        self.digits();
        if self.peek(0) == Some('.') && self.peek(1) != Some('.') {
            is_float = true;
            self.pos += 1;
            self.digits();
        }
        if matches!(self.peek(0), Some('e' | 'E')) {
            let sign = usize::from(matches!(self.peek(1), Some('+' | '-')));
            if self.peek(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += 1 + sign;
                self.digits();
            }
        }
        if matches!(self.peek(0), Some('j' | 'J')) {
            return Err(ScriptError::Unsupported("complex literals".to_string()));
        }
        if self.peek(0).is_some_and(|c| c.is_alphanumeric() || c == '_') {
            return Err(self.syntax("invalid decimal literal"));
        }
        let text: String = self.chars[start..self.pos]
            .iter()
            .filter(|&&c| c != '_')
            .collect();
        let tok = if is_float {
            Tok::Float(
                text.parse()
                    .map_err(|_| self.syntax(format!("invalid number '{text}'")))?,
            )
        } else {
            match text.parse::<i64>() {
                Ok(value) => Tok::Int(value),
                Err(_) => Tok::Float(
                    text.parse()
                        .map_err(|_| self.syntax(format!("invalid number '{text}'")))?,
                ),
            }
        };
        self.push(tok);
        Ok(())
    }

    fn digits(&mut self) {
        while self
            .peek(0)
            .is_some_and(|c| c.is_ascii_digit() || c == '_')
        {
            self.pos += 1;
        }
    }

    fn word(&mut self) -> ScriptResult<()> {
        let start = self.pos;
        while self
            .peek(0)
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        if matches!(self.peek(0), Some('\'' | '"')) {
            let lower = word.to_ascii_lowercase();
            if !lower.is_empty()
                && lower.len() <= 2
                && lower.chars().all(|c| matches!(c, 'f' | 'r' | 'b' | 'u'))
            {
                return self.string(lower.contains('f'), lower.contains('r'));
            }
        }
        self.push(Tok::Name(word));
        Ok(())
    }

    fn string(&mut self, formatted: bool, raw: bool) -> ScriptResult<()> {
        let start_line = self.line;
        let Some(quote) = self.peek(0) else {
            return Err(self.syntax("unterminated string literal"));
        };
        let triple = self.peek(1) == Some(quote) && self.peek(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };
        let mut body = String::new();
        loop {
            let Some(c) = self.peek(0) else {
                self.line = start_line;
                return Err(self.syntax("unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    self.pos += 1;
                    break;
                }
                if self.peek(1) == Some(quote) && self.peek(2) == Some(quote) {
                    self.pos += 3;
                    break;
                }
            }
            if c == '\n' {
                if !triple {
                    return Err(self.syntax("unterminated string literal"));
                }
                self.line += 1;
            }
            if c == '\\' && !raw {
                self.pos += 1;
                let Some(escaped) = self.peek(0) else {
                    continue;
                };
                match escaped {
                    'n' => body.push('\n'),
                    't' => body.push('\t'),
                    'r' => body.push('\r'),
                    '0' => body.push('\0'),
                    '\\' | '\'' | '"' => body.push(escaped),
                    '\n' => self.line += 1,
                    other => {
                        body.push('\\');
                        body.push(other);
                    }
                }
                self.pos += 1;
                continue;
            }
            body.push(c);
            self.pos += 1;
        }
        let tok = if formatted {
            Tok::FStr(split_fstring(&body).map_err(|message| self.syntax(message))?)
        } else {
            Tok::Str(body)
        };
        self.tokens.push(Token {
            tok,
            line: start_line,
        });
        Ok(())
    }

    fn operator(&mut self) -> ScriptResult<()> {
        let rest: String = self.chars[self.pos..].iter().take(3).collect();
        let op = THREE_CHAR_OPS
            .iter()
            .chain(TWO_CHAR_OPS.iter())
            .chain(ONE_CHAR_OPS.iter())
            .find(|op| rest.starts_with(**op))
            .copied();
        let Some(op) = op else {
            let c = self.peek(0).unwrap_or(' ');
            return Err(self.syntax(format!("invalid character '{c}'")));
        };
        match op {
            "(" | "[" | "{" => self.depth += 1,
            ")" | "]" | "}" => {
                if self.depth == 0 {
                    return Err(self.syntax(format!("unmatched '{op}'")));
                }
                self.depth -= 1;
            }
            _ => {}
        }
        self.pos += op.chars().count();
        self.push(Tok::Op(op));
        Ok(())
    }
}

/// Split an f-string body into literal text and embedded expressions.
///
/// Conversions (`!r`) and format specs (`:.3f`) are dropped; the value is
/// rendered with `str()`.
fn split_fstring(body: &str) -> Result<Vec<FPart>, String> {
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '{' => {
                if !literal.is_empty() {
                    parts.push(FPart::Lit(std::mem::take(&mut literal)));
                }
                let mut depth = 0usize;
                let mut expr = String::new();
                let mut cut = false;
                i += 1;
                loop {
                    let Some(&inner) = chars.get(i) else {
                        return Err("f-string: expecting '}'".to_string());
                    };
                    i += 1;
                    match inner {
                        '}' if depth == 0 => break,
                        '(' | '[' | '{' => depth += 1,
                        ')' | ']' | '}' => depth = depth.saturating_sub(1),
                        ':' if depth == 0 => cut = true,
                        '!' if depth == 0 && chars.get(i) != Some(&'=') => cut = true,
                        _ => {}
                    }
                    if !cut {
                        expr.push(inner);
                    }
                }
                if expr.trim().is_empty() {
                    return Err("f-string: empty expression not allowed".to_string());
                }
                parts.push(FPart::Expr(expr.trim().to_string()));
            }
            '}' => return Err("f-string: single '}' is not allowed".to_string()),
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        parts.push(FPart::Lit(literal));
    }
    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source)
            .expect("tokenize")
            .into_iter()
            .map(|t| t.tok)
            .collect()
    }

    #[test]
    fn emits_indent_and_dedent_around_blocks() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(toks.contains(&Tok::Indent));
        assert!(toks.contains(&Tok::Dedent));
        assert_eq!(toks.last(), Some(&Tok::Eof));
    }

    #[test]
    fn joins_lines_inside_brackets() {
        let toks = kinds("f = (x +\n     1)\n");
        let newlines = toks.iter().filter(|t| **t == Tok::Newline).count();
        assert_eq!(newlines, 1);
        assert!(!toks.contains(&Tok::Indent));
    }

    #[test]
    fn blank_and_comment_lines_do_not_change_indentation() {
        let toks = kinds("def f():\n    a = 1\n\n    # note\n    return a\n");
        assert_eq!(toks.iter().filter(|t| **t == Tok::Indent).count(), 1);
    }

    #[test]
    fn numbers_strings_and_operators() {
        let toks = kinds("a = 1_000 ** 2.5e-1 // 'b' \"c\"");
        assert!(toks.contains(&Tok::Int(1000)));
        assert!(toks.contains(&Tok::Float(0.25)));
        assert!(toks.contains(&Tok::Op("**")));
        assert!(toks.contains(&Tok::Op("//")));
        assert!(toks.contains(&Tok::Str("b".to_string())));
    }

    #[test]
    fn fstring_parts_drop_format_spec() {
        let toks = kinds("f'value {x:.3f} and {{braces}}'");
        assert_eq!(
            toks[0],
            Tok::FStr(vec![
                FPart::Lit("value ".to_string()),
                FPart::Expr("x".to_string()),
                FPart::Lit(" and {braces}".to_string()),
            ])
        );
    }

    #[test]
    fn bad_dedent_is_a_syntax_error() {
        let err = tokenize("if x:\n    y = 1\n  z = 2\n").expect_err("should fail");
        assert!(matches!(err, ScriptError::Syntax { line: 3, .. }));
    }

    #[test]
    fn unterminated_string_is_a_syntax_error() {
        let err = tokenize("x = 'abc\n").expect_err("should fail");
        assert!(matches!(err, ScriptError::Syntax { .. }));
    }
}
