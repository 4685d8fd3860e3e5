//! Pipeline script language
//!
//! Generated code is not host-language source. It is a small script of
//! `name = pipeline` statements over an enumerable set of tabular
//! operations (select, filter, sort, group_by/agg, head, unique,
//! drop_nulls, count), parsed here into a typed AST and interpreted by the
//! executor. The model emits a plan; the engine runs it.
//!
//! ```text
//! by_district = df.group_by("district").agg(max("floor"))
//! final_df = by_district.sort("floor", descending=true)
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("name '{0}' is not defined")]
    UnknownName(String),

    #[error("column '{name}' not found{}", suggestion_suffix(.suggestion))]
    ColumnNotFound {
        name: String,
        suggestion: Option<String>,
    },

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid arguments for '{op}': {message}")]
    BadArguments { op: String, message: String },

    #[error("group_by must be followed by agg")]
    GroupWithoutAgg,

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("evaluation failed: {0}")]
    Eval(String),

    #[error("the script did not assign a tabular result to '{0}'")]
    NoResult(String),
}

fn suggestion_suffix(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!("; closest existing column is '{}'", s),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{}", v),
            Literal::Float(v) => write!(f, "{}", v),
            Literal::Str(v) => write!(f, "\"{}\"", v),
            Literal::Bool(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// One call in a pipeline chain, e.g. `sort("floor", descending=true)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Positional literal, e.g. a column name or a row count.
    Value(Literal),
    /// Named flag, e.g. `descending=true`.
    Named(String, Literal),
    /// Comparison, only valid inside `filter(...)`.
    Compare {
        column: String,
        op: CmpOp,
        value: Literal,
    },
    /// Nested aggregation call, only valid inside `agg(...)`.
    Agg(Call),
}

/// `target = root.call(...).call(...)`
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: usize,
    pub target: String,
    pub root: String,
    pub calls: Vec<Call>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub stmts: Vec<Stmt>,
}

/// Parse a whole script. Blank lines and `#` comments are skipped.
pub fn parse_script(source: &str) -> Result<Script, ScriptError> {
    let mut stmts = Vec::new();
    for (idx, raw) in source.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        stmts.push(parse_stmt(line, line_no)?);
    }
    if stmts.is_empty() {
        return Err(ScriptError::Parse {
            line: 1,
            message: "script contains no statements".to_string(),
        });
    }
    Ok(Script { stmts })
}

fn parse_stmt(line: &str, line_no: usize) -> Result<Stmt, ScriptError> {
    let mut lexer = Lexer::new(line, line_no);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        line: line_no,
    };
    parser.stmt()
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Dot,
    LParen,
    RParen,
    Comma,
    Assign,
    Cmp(CmpOp),
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str, line: usize) -> Self {
        Self {
            chars: input.chars().peekable(),
            line,
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, ScriptError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' => {
                    self.chars.next();
                }
                '.' => {
                    self.chars.next();
                    tokens.push(Token::Dot);
                }
                '(' => {
                    self.chars.next();
                    tokens.push(Token::LParen);
                }
                ')' => {
                    self.chars.next();
                    tokens.push(Token::RParen);
                }
                ',' => {
                    self.chars.next();
                    tokens.push(Token::Comma);
                }
                '=' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::Cmp(CmpOp::Eq));
                    } else {
                        tokens.push(Token::Assign);
                    }
                }
                '!' => {
                    self.chars.next();
                    if self.chars.next() == Some('=') {
                        tokens.push(Token::Cmp(CmpOp::Ne));
                    } else {
                        return Err(self.error("expected '=' after '!'"));
                    }
                }
                '>' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::Cmp(CmpOp::Ge));
                    } else {
                        tokens.push(Token::Cmp(CmpOp::Gt));
                    }
                }
                '<' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'=') {
                        self.chars.next();
                        tokens.push(Token::Cmp(CmpOp::Le));
                    } else {
                        tokens.push(Token::Cmp(CmpOp::Lt));
                    }
                }
                '"' | '\'' => {
                    let quote = c;
                    self.chars.next();
                    let mut value = String::new();
                    loop {
                        match self.chars.next() {
                            Some(ch) if ch == quote => break,
                            Some(ch) => value.push(ch),
                            None => return Err(self.error("unterminated string literal")),
                        }
                    }
                    tokens.push(Token::Str(value));
                }
                c if c.is_ascii_digit() || c == '-' => {
                    tokens.push(self.number()?);
                }
                c if c.is_alphanumeric() || c == '_' => {
                    let mut ident = String::new();
                    while let Some(&ch) = self.chars.peek() {
                        if ch.is_alphanumeric() || ch == '_' {
                            ident.push(ch);
                            self.chars.next();
                        } else {
                            break;
                        }
                    }
                    tokens.push(Token::Ident(ident));
                }
                other => {
                    return Err(self.error(format!("unexpected character '{}'", other)));
                }
            }
        }
        Ok(tokens)
    }

    fn number(&mut self) -> Result<Token, ScriptError> {
        let mut text = String::new();
        if self.chars.peek() == Some(&'-') {
            text.push('-');
            self.chars.next();
        }
        let mut is_float = false;
        while let Some(&ch) = self.chars.peek() {
            if ch.is_ascii_digit() {
                text.push(ch);
                self.chars.next();
            } else if ch == '.' {
                // Lookahead: a dot followed by a digit continues the number,
                // otherwise it is a method-call dot (e.g. `5.head` never
                // occurs, but `df.head` after a paren does).
                let mut clone = self.chars.clone();
                clone.next();
                if clone.peek().map(|d| d.is_ascii_digit()).unwrap_or(false) {
                    is_float = true;
                    text.push(ch);
                    self.chars.next();
                } else {
                    break;
                }
            } else {
                break;
            }
        }
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| self.error(format!("invalid number '{}'", text)))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| self.error(format!("invalid number '{}'", text)))
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    line: usize,
}

impl Parser {
    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Parse {
            line: self.line,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect_ident(&mut self) -> Result<String, ScriptError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(self.error(format!("expected identifier, found {:?}", other))),
        }
    }

    fn stmt(&mut self) -> Result<Stmt, ScriptError> {
        let target = self.expect_ident()?;
        match self.next() {
            Some(Token::Assign) => {}
            other => {
                return Err(self.error(format!(
                    "expected '=' after '{}', found {:?}",
                    target, other
                )))
            }
        }
        let root = self.expect_ident()?;
        let mut calls = Vec::new();
        while self.peek() == Some(&Token::Dot) {
            self.next();
            calls.push(self.call()?);
        }
        if let Some(extra) = self.peek() {
            return Err(self.error(format!("unexpected trailing token {:?}", extra)));
        }
        Ok(Stmt {
            line: self.line,
            target,
            root,
            calls,
        })
    }

    fn call(&mut self) -> Result<Call, ScriptError> {
        let name = self.expect_ident()?;
        match self.next() {
            Some(Token::LParen) => {}
            other => {
                return Err(self.error(format!(
                    "expected '(' after '{}', found {:?}",
                    name, other
                )))
            }
        }
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.next();
            return Ok(Call { name, args });
        }
        loop {
            args.push(self.arg()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                other => {
                    return Err(self.error(format!(
                        "expected ',' or ')' in arguments of '{}', found {:?}",
                        name, other
                    )))
                }
            }
        }
        Ok(Call { name, args })
    }

    fn arg(&mut self) -> Result<Arg, ScriptError> {
        match self.next() {
            Some(Token::Str(value)) => {
                // A quoted value may be a bare literal or the column side of
                // a comparison: `filter("floor count" > 3)`.
                if let Some(Token::Cmp(op)) = self.peek().cloned() {
                    self.next();
                    let value_lit = self.literal()?;
                    return Ok(Arg::Compare {
                        column: value,
                        op,
                        value: value_lit,
                    });
                }
                Ok(Arg::Value(Literal::Str(value)))
            }
            Some(Token::Int(v)) => Ok(Arg::Value(Literal::Int(v))),
            Some(Token::Float(v)) => Ok(Arg::Value(Literal::Float(v))),
            Some(Token::Ident(name)) => {
                match self.peek().cloned() {
                    // Named flag: descending=true
                    Some(Token::Assign) => {
                        self.next();
                        let value = self.literal()?;
                        Ok(Arg::Named(name, value))
                    }
                    // Comparison with a bare column name: floor > 3
                    Some(Token::Cmp(op)) => {
                        self.next();
                        let value = self.literal()?;
                        Ok(Arg::Compare {
                            column: name,
                            op,
                            value,
                        })
                    }
                    // Nested call: max("floor")
                    Some(Token::LParen) => {
                        self.pos -= 1;
                        let call = self.call()?;
                        Ok(Arg::Agg(call))
                    }
                    // Bare identifier literal: true/false, or treated as a
                    // column-name string.
                    _ => match name.as_str() {
                        "true" | "True" => Ok(Arg::Value(Literal::Bool(true))),
                        "false" | "False" => Ok(Arg::Value(Literal::Bool(false))),
                        _ => Ok(Arg::Value(Literal::Str(name))),
                    },
                }
            }
            other => Err(self.error(format!("expected argument, found {:?}", other))),
        }
    }

    fn literal(&mut self) -> Result<Literal, ScriptError> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Literal::Int(v)),
            Some(Token::Float(v)) => Ok(Literal::Float(v)),
            Some(Token::Str(v)) => Ok(Literal::Str(v)),
            Some(Token::Ident(word)) => match word.as_str() {
                "true" | "True" => Ok(Literal::Bool(true)),
                "false" | "False" => Ok(Literal::Bool(false)),
                other => Ok(Literal::Str(other.to_string())),
            },
            other => Err(self.error(format!("expected literal, found {:?}", other))),
        }
    }
}
