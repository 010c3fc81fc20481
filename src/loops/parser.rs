//! Lexer and recursive descent parser for loop nest templates.
//!
//! ```text
//! nest      := statement*
//! statement := modifier* "loop" "(" dims ")" "{" statement* "}"
//!            | "call" "(" IDENT "(" args? ")" ")" ";"
//! dims      := INT ("," INT)* | INT ".." "N" "-" INT
//! modifier  := "grouped" | "serpentine" | "square_wave"
//!            | "omp" "(" IDENT ("," INT)? ")" | "affinity" "(" IDENT ")"
//! ```
//!
//! `//` starts a comment running to the end of the line.

use std::{iter::Peekable, str::CharIndices};

#[cfg(feature = "error-backtrace")]
use colored::Colorize;

use crate::error::{CompileError, Result};

#[cfg(feature = "error-backtrace")]
macro_rules! function {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        type_name_of(f)
            .rsplit("::")
            .find(|&part| part != "f" && part != "{{closure}}")
            .expect("Short function name")
    }};
}

macro_rules! report_error {
    ($self:expr, $message:expr $(,)?) => {{
        let message = $message.to_string();

        #[cfg(feature = "error-backtrace")]
        let message = format!(
            "{}: {}\n{}",
            "backtrace".blue(),
            format!(
                "{}::{} {}",
                module_path!(),
                function!(),
                format!("(at {}:{}:{})", file!(), line!(), column!()).white()
            ),
            message
        );

        return Err($self.error(message));
    }};
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Integer,
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Comma,
    Semicolon,
    Minus,
    DotDot,
}

#[derive(Debug, Clone, Copy)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ScheduleKind {
    Static,
    Dynamic,
    Guided,
    Auto,
    Runtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub kind: ScheduleKind,
    pub chunk: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub grouped: bool,
    pub serpentine: bool,
    pub square_wave: bool,
    pub omp: Option<Schedule>,
    /// Thread affinity hint for the parallel loop, e.g. `spread`
    pub affinity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loop {
    pub modifiers: Modifiers,
    /// Dimension numbers in nesting order, each in `1..N-1`
    pub dims: Vec<usize>,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub function: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Loop(Loop),
    Call(Call),
}

pub struct Lexer<'source> {
    source: &'source str,
    chars: Peekable<CharIndices<'source>>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    fn ignore_whitespace_and_comments(&mut self) {
        while let Some((position, c)) = self.chars.peek().copied() {
            if c.is_whitespace() {
                self.chars.next();
            } else if self.source[position..].starts_with("//") {
                while self.chars.next_if(|(_, c)| *c != '\n').is_some() {}
            } else {
                break;
            }
        }
    }

    fn read_while(&mut self, start: usize, kind: TokenKind, accept: impl Fn(char) -> bool) -> Token {
        let mut end = start;

        while let Some((position, c)) = self.chars.next_if(|(_, c)| accept(*c)) {
            end = position + c.len_utf8();
        }

        Token {
            kind,
            span: Span { start, end },
        }
    }

    /// All tokens, or the position of the first character no token starts
    /// with
    pub fn tokenize(mut self) -> std::result::Result<Vec<Token>, usize> {
        let mut tokens = Vec::new();

        loop {
            self.ignore_whitespace_and_comments();

            let Some((start, c)) = self.chars.peek().copied() else {
                return Ok(tokens);
            };

            let token = match c {
                c if c.is_ascii_alphabetic() || c == '_' => {
                    self.read_while(start, TokenKind::Identifier, |c| c.is_ascii_alphanumeric() || c == '_')
                }
                c if c.is_ascii_digit() => self.read_while(start, TokenKind::Integer, |c| c.is_ascii_digit()),
                '.' if self.source[start..].starts_with("..") => {
                    self.chars.next();
                    self.chars.next();
                    Token {
                        kind: TokenKind::DotDot,
                        span: Span { start, end: start + 2 },
                    }
                }
                _ => {
                    let kind = match c {
                        '(' => TokenKind::OpenParen,
                        ')' => TokenKind::CloseParen,
                        '{' => TokenKind::OpenBrace,
                        '}' => TokenKind::CloseBrace,
                        ',' => TokenKind::Comma,
                        ';' => TokenKind::Semicolon,
                        '-' => TokenKind::Minus,
                        _ => return Err(start),
                    };
                    self.chars.next();
                    Token {
                        kind,
                        span: Span { start, end: start + 1 },
                    }
                }
            };

            tokens.push(token);
        }
    }
}

pub struct Parser<'source> {
    source: &'source str,
    tokens: Vec<Token>,
    position: usize,
    /// Number of stencil dimensions including the step dimension
    ndims: usize,
}

impl<'source> Parser<'source> {
    pub fn parse(source: &'source str, ndims: usize) -> Result<Vec<Statement>> {
        let tokens = Lexer::new(source).tokenize().map_err(|position| {
            CompileError::LoopSpec(format!(
                "unexpected character {:?} at {}",
                source[position..].chars().next().unwrap_or(' '),
                line_and_column(source, position)
            ))
        })?;

        let mut parser = Self {
            source,
            tokens,
            position: 0,
            ndims,
        };

        let mut statements = Vec::new();
        while parser.peek().is_some() {
            statements.push(parser.parse_statement()?);
        }

        Ok(statements)
    }

    fn error(&self, message: String) -> CompileError {
        let location = match self.tokens.get(self.position) {
            Some(token) => line_and_column(self.source, token.span.start),
            None => String::from("end of input"),
        };

        CompileError::LoopSpec(format!("{message} at {location}"))
    }

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.position).copied()
    }

    fn text(&self, token: Token) -> &'source str {
        &self.source[token.span.start..token.span.end]
    }

    fn peek_is(&self, kind: TokenKind) -> bool {
        self.peek().is_some_and(|token| token.kind == kind)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        match self.peek() {
            Some(token) if token.kind == kind => {
                self.position += 1;
                Ok(token)
            }
            Some(token) => report_error!(
                self,
                format!("expected {kind:?} but found `{}`", self.text(token))
            ),
            None => report_error!(self, format!("expected {kind:?}")),
        }
    }

    fn expect_word(&mut self, word: &str) -> Result<()> {
        let token = self.expect(TokenKind::Identifier)?;

        if self.text(token) != word {
            self.position -= 1;
            report_error!(self, format!("expected `{word}` but found `{}`", self.text(token)));
        }

        Ok(())
    }

    fn parse_integer(&mut self) -> Result<usize> {
        let token = self.expect(TokenKind::Integer)?;

        match self.text(token).parse() {
            Ok(value) => Ok(value),
            Err(_) => {
                self.position -= 1;
                report_error!(self, format!("`{}` is too large", self.text(token)))
            }
        }
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        if self.peek().is_some_and(|token| self.text(token) == "call") {
            return self.parse_call().map(Statement::Call);
        }

        let modifiers = self.parse_modifiers()?;
        self.expect_word("loop")?;
        self.expect(TokenKind::OpenParen)?;
        let dims = self.parse_dims()?;
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::OpenBrace)?;

        let mut body = Vec::new();
        while !self.peek_is(TokenKind::CloseBrace) {
            if self.peek().is_none() {
                report_error!(self, "unterminated loop body");
            }

            body.push(self.parse_statement()?);
        }
        self.expect(TokenKind::CloseBrace)?;

        Ok(Statement::Loop(Loop {
            modifiers,
            dims,
            body,
        }))
    }

    fn parse_modifiers(&mut self) -> Result<Modifiers> {
        let mut modifiers = Modifiers::default();

        while let Some(token) = self.peek().filter(|token| token.kind == TokenKind::Identifier) {
            match self.text(token) {
                "loop" => break,
                "grouped" => modifiers.grouped = true,
                "serpentine" => modifiers.serpentine = true,
                "square_wave" => modifiers.square_wave = true,
                "omp" => {
                    self.position += 1;
                    self.expect(TokenKind::OpenParen)?;

                    let kind_token = self.expect(TokenKind::Identifier)?;
                    let Ok(kind) = self.text(kind_token).parse::<ScheduleKind>() else {
                        self.position -= 1;
                        report_error!(
                            self,
                            format!("unknown schedule `{}`", self.text(kind_token))
                        );
                    };

                    let chunk = if self.peek_is(TokenKind::Comma) {
                        self.position += 1;
                        Some(self.parse_integer()?)
                    } else {
                        None
                    };

                    self.expect(TokenKind::CloseParen)?;
                    modifiers.omp = Some(Schedule { kind, chunk });
                    continue;
                }
                "affinity" => {
                    self.position += 1;
                    self.expect(TokenKind::OpenParen)?;
                    let hint = self.expect(TokenKind::Identifier)?;
                    modifiers.affinity = Some(self.text(hint).to_owned());
                    self.expect(TokenKind::CloseParen)?;
                    continue;
                }
                other => report_error!(self, format!("unknown loop modifier `{other}`")),
            }

            self.position += 1;
        }

        Ok(modifiers)
    }

    fn parse_dims(&mut self) -> Result<Vec<usize>> {
        let first = self.parse_integer()?;

        // `a..N-b` covers every dimension from `a` to the `b`th last
        if self.peek_is(TokenKind::DotDot) {
            self.position += 1;
            self.expect_word("N")?;
            self.expect(TokenKind::Minus)?;
            let back = self.parse_integer()?;

            let Some(last) = self.ndims.checked_sub(back) else {
                report_error!(self, format!("N-{back} is negative for N={}", self.ndims));
            };

            if first > last {
                report_error!(
                    self,
                    format!("{first}..N-{back} is an empty range for N={}", self.ndims)
                );
            }

            return Ok((first..=last).collect());
        }

        let mut dims = vec![first];
        while self.peek_is(TokenKind::Comma) {
            self.position += 1;
            dims.push(self.parse_integer()?);
        }

        Ok(dims)
    }

    fn parse_call(&mut self) -> Result<Call> {
        self.expect_word("call")?;
        self.expect(TokenKind::OpenParen)?;
        let function = self.expect(TokenKind::Identifier)?;
        self.expect(TokenKind::OpenParen)?;

        let mut args = Vec::new();
        while !self.peek_is(TokenKind::CloseParen) {
            match self.peek() {
                Some(token) if matches!(token.kind, TokenKind::Identifier | TokenKind::Integer) => {
                    args.push(self.text(token).to_owned());
                    self.position += 1;
                }
                _ => report_error!(self, "expected a call argument"),
            }

            if !self.peek_is(TokenKind::CloseParen) {
                self.expect(TokenKind::Comma)?;
            }
        }

        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::Semicolon)?;

        Ok(Call {
            function: self.text(function).to_owned(),
            args,
        })
    }
}

fn line_and_column(source: &str, position: usize) -> String {
    let before = &source[..position];
    let line = before.matches('\n').count() + 1;
    let column = before.len() - before.rfind('\n').map_or(0, |newline| newline + 1) + 1;

    format!("line {line}, column {column}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_loops_with_modifiers() {
        let nest = Parser::parse(
            indoc::indoc! {"
                // regions
                omp(dynamic, 1) affinity(spread) loop(1..N-1) {
                    grouped loop(2, 3) { call(calc_block(context, t)); }
                }
            "},
            4,
        )
        .unwrap();

        let Statement::Loop(outer) = &nest[0] else {
            panic!("expected a loop");
        };
        assert_eq!(outer.dims, vec![1, 2, 3]);
        assert_eq!(
            outer.modifiers.omp,
            Some(Schedule {
                kind: ScheduleKind::Dynamic,
                chunk: Some(1)
            })
        );
        assert_eq!(outer.modifiers.affinity.as_deref(), Some("spread"));

        let Statement::Loop(inner) = &outer.body[0] else {
            panic!("expected a nested loop");
        };
        assert!(inner.modifiers.grouped);
        assert_eq!(
            inner.body[0],
            Statement::Call(Call {
                function: "calc_block".into(),
                args: vec!["context".into(), "t".into()],
            })
        );
    }

    #[test]
    fn errors_carry_the_position() {
        let Err(CompileError::LoopSpec(message)) = Parser::parse("loop(1) {\n  sideways loop(2) {} }", 3) else {
            panic!("expected a loop spec error");
        };

        assert!(message.contains("unknown loop modifier `sideways`"));
        assert!(message.contains("line 2, column 3"));
    }

    #[test]
    fn unknown_schedule_is_rejected() {
        assert!(matches!(
            Parser::parse("omp(sometimes) loop(1) {}", 2),
            Err(CompileError::LoopSpec(_))
        ));
    }

    #[test]
    fn stray_characters_are_rejected() {
        assert!(matches!(
            Parser::parse("loop(1) { call(f()); } $", 2),
            Err(CompileError::LoopSpec(message)) if message.contains("'$'")
        ));
    }
}
