/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Restricted script evaluator for scripted steps.
//!
//! Scripts never touch a host language runtime: they run in a small
//! embedded expression language over JSON values. A script is either a
//! single entry function (`def name(): ...` with a `return`) or a
//! sequence of assignments ending in a `result` binding. The namespace is
//! seeded by the caller (flattened variable pools) and offers a fixed
//! builtin set (`len`, `str`, `int`, `float`, `bool`, `abs`, `round`,
//! `min`, `max`, `sum`, string/dict methods) plus the generator catalog;
//! `import` lines are tolerated and ignored.
//!
//! [`normalize_code`] reshapes the accepted single-line form
//! (`def f():import x return {...}`) into a def line plus an indented
//! body, hoisting import headers — the same normalization the platform
//! applies before running user scripts.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Number, Value};

use crate::engine::generators;
use crate::error::StepError;

/// Runs a script against the seeded namespace, producing the result map.
///
/// Outcome rule: exactly one function defined ⇒ it is called with no
/// arguments and its return value is the result; otherwise a `result`
/// binding is used; otherwise the result is empty. Anything non-object is
/// a type error.
pub fn run_script(
    code: &str,
    namespace: &BTreeMap<String, Value>,
) -> Result<Map<String, Value>, StepError> {
    let normalized = normalize_code(code);
    let lines = logical_lines(&normalized);

    let mut env: HashMap<String, Value> = namespace
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let mut functions: Vec<(String, Vec<String>)> = Vec::new();
    let mut top_level: Vec<String> = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            i += 1;
            continue;
        }
        if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
            i += 1;
            continue;
        }
        if trimmed.starts_with("def ") && !line.starts_with(|c: char| c == ' ' || c == '\t') {
            let name = parse_def_name(trimmed)?;
            let mut body = Vec::new();
            i += 1;
            while i < lines.len()
                && (lines[i].starts_with(|c: char| c == ' ' || c == '\t')
                    || lines[i].trim().is_empty())
            {
                if !lines[i].trim().is_empty() {
                    body.push(lines[i].trim().to_string());
                }
                i += 1;
            }
            functions.push((name, body));
            continue;
        }
        top_level.push(trimmed.to_string());
        i += 1;
    }

    if functions.len() > 1 {
        let names: Vec<&str> = functions.iter().map(|(n, _)| n.as_str()).collect();
        return Err(StepError::script(format!(
            "only a single entry function is supported, found several: {}",
            names.join(", ")
        )));
    }

    for statement in &top_level {
        match execute_statement(statement, &mut env)? {
            Flow::Return(_) => {
                return Err(StepError::script("return outside of a function body"))
            }
            Flow::Next => {}
        }
    }

    let result = if let Some((_, body)) = functions.first() {
        let mut returned = Value::Null;
        for statement in body {
            match execute_statement(statement, &mut env)? {
                Flow::Return(value) => {
                    returned = value;
                    break;
                }
                Flow::Next => {}
            }
        }
        returned
    } else {
        env.get("result").cloned().unwrap_or(Value::Null)
    };

    match result {
        Value::Null => Ok(Map::new()),
        Value::Object(map) => Ok(map),
        other => Err(StepError::script(format!(
            "script result type not accepted: expected a map of name to value, got: {other}"
        ))),
    }
}

/// Reshapes a single-line `def name(): body` script into a def line plus
/// an indented body, hoisting `import`/`from` headers out of the body.
/// Multi-line scripts pass through untouched.
pub fn normalize_code(code: &str) -> String {
    let code = code.trim();
    if code.is_empty() || code.contains('\n') {
        return code.to_string();
    }
    if !code.contains("def ") || !code.contains(':') {
        return code.to_string();
    }
    let colon = match code.find(':') {
        Some(p) => p,
        None => return code.to_string(),
    };
    let def_line = code[..=colon].trim().to_string();
    let mut body = code[colon + 1..].trim().to_string();

    // Pull leading import/from statements out in front of the function.
    let mut imports = Vec::new();
    loop {
        let keyword = if body.starts_with("import ") {
            "import "
        } else if body.starts_with("from ") {
            "from "
        } else {
            break;
        };
        let after = &body[keyword.len()..];
        let stop_keywords = ["return ", "if ", "for ", "while ", "with ", "import ", "from "];
        let end = stop_keywords
            .iter()
            .filter_map(|kw| after.find(kw))
            .min()
            .unwrap_or(after.len());
        imports.push(format!("{keyword}{}", after[..end].trim()));
        body = after[end..].trim().to_string();
    }

    let mut parts = imports;
    parts.push(def_line);
    if !body.is_empty() {
        parts.push(format!("    {body}"));
    }
    parts.join("\n")
}

/// Merges physical lines into logical lines while brackets stay open, so
/// dict and list literals may span lines.
fn logical_lines(code: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut depth = 0i32;
    let mut pending = String::new();
    for line in code.lines() {
        if pending.is_empty() {
            pending = line.to_string();
        } else {
            pending.push(' ');
            pending.push_str(line.trim_start());
        }
        depth += bracket_delta(line);
        if depth <= 0 {
            out.push(std::mem::take(&mut pending));
            depth = 0;
        }
    }
    if !pending.is_empty() {
        out.push(pending);
    }
    out
}

fn bracket_delta(line: &str) -> i32 {
    let mut delta = 0;
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                if c == '\\' {
                    chars.next();
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '(' | '[' | '{' => delta += 1,
                ')' | ']' | '}' => delta -= 1,
                '#' => break,
                _ => {}
            },
        }
    }
    delta
}

fn parse_def_name(line: &str) -> Result<String, StepError> {
    let rest = line.trim_start_matches("def ").trim();
    let name: String = rest
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        return Err(StepError::script(format!(
            "invalid function definition: {line}"
        )));
    }
    Ok(name)
}

enum Flow {
    Next,
    Return(Value),
}

fn execute_statement(statement: &str, env: &mut HashMap<String, Value>) -> Result<Flow, StepError> {
    let tokens = tokenize(statement)?;
    if tokens.is_empty() {
        return Ok(Flow::Next);
    }
    if let Token::Ident(keyword) = &tokens[0] {
        if keyword == "return" {
            if tokens.len() == 1 {
                return Ok(Flow::Return(Value::Null));
            }
            let mut parser = Parser::new(&tokens[1..], env);
            let value = parser.parse_expression()?;
            parser.expect_end()?;
            return Ok(Flow::Return(value));
        }
        if keyword == "pass" && tokens.len() == 1 {
            return Ok(Flow::Next);
        }
        // Assignment: NAME = expr (but not NAME == expr).
        if tokens.len() > 2 && tokens[1] == Token::Assign {
            let name = keyword.clone();
            let mut parser = Parser::new(&tokens[2..], env);
            let value = parser.parse_expression()?;
            parser.expect_end()?;
            env.insert(name, value);
            return Ok(Flow::Next);
        }
    }
    // Bare expression: evaluate for effect-free scripts and discard.
    let mut parser = Parser::new(&tokens, env);
    parser.parse_expression()?;
    parser.expect_end()?;
    Ok(Flow::Next)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(Number),
    Str(String),
    Assign,
    Eq,
    NotEq,
    Ge,
    Le,
    Gt,
    Lt,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
}

fn tokenize(input: &str) -> Result<Vec<Token>, StepError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '#' => break,
            '\'' | '"' => {
                let quote = c;
                let mut value = String::new();
                i += 1;
                loop {
                    if i >= chars.len() {
                        return Err(StepError::script(format!(
                            "unterminated string literal in: {input}"
                        )));
                    }
                    let ch = chars[i];
                    if ch == '\\' && i + 1 < chars.len() {
                        let escaped = chars[i + 1];
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                        i += 2;
                        continue;
                    }
                    if ch == quote {
                        i += 1;
                        break;
                    }
                    value.push(ch);
                    i += 1;
                }
                tokens.push(Token::Str(value));
            }
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = if literal.contains('.') {
                    literal
                        .parse::<f64>()
                        .ok()
                        .and_then(Number::from_f64)
                        .ok_or_else(|| {
                            StepError::script(format!("invalid number literal: {literal}"))
                        })?
                } else {
                    literal
                        .parse::<i64>()
                        .map(Number::from)
                        .map_err(|_| StepError::script(format!("invalid number literal: {literal}")))?
                };
                tokens.push(Token::Number(number));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '=' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Eq);
                    i += 2;
                } else {
                    tokens.push(Token::Assign);
                    i += 1;
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    return Err(StepError::script(format!("unexpected '!' in: {input}")));
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '%' => {
                tokens.push(Token::Percent);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '{' => {
                tokens.push(Token::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Token::RBrace);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            other => {
                return Err(StepError::script(format!(
                    "unexpected character '{other}' in: {input}"
                )))
            }
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser / evaluator
// ---------------------------------------------------------------------------

struct Parser<'p> {
    tokens: &'p [Token],
    pos: usize,
    env: &'p HashMap<String, Value>,
}

impl<'p> Parser<'p> {
    fn new(tokens: &'p [Token], env: &'p HashMap<String, Value>) -> Self {
        Parser {
            tokens,
            pos: 0,
            env,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: &Token, context: &str) -> Result<(), StepError> {
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            other => Err(StepError::script(format!(
                "expected {expected:?} {context}, got {other:?}"
            ))),
        }
    }

    fn expect_end(&self) -> Result<(), StepError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(StepError::script(format!(
                "unexpected trailing tokens: {:?}",
                &self.tokens[self.pos..]
            )))
        }
    }

    fn parse_expression(&mut self) -> Result<Value, StepError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Value, StepError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Ident(k)) if k == "or") {
            self.advance();
            let right = self.parse_and()?;
            left = Value::Bool(truthy(&left) || truthy(&right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Value, StepError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::Ident(k)) if k == "and") {
            self.advance();
            let right = self.parse_not()?;
            left = Value::Bool(truthy(&left) && truthy(&right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Value, StepError> {
        if matches!(self.peek(), Some(Token::Ident(k)) if k == "not") {
            self.advance();
            let operand = self.parse_not()?;
            return Ok(Value::Bool(!truthy(&operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Value, StepError> {
        let left = self.parse_additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => "==",
            Some(Token::NotEq) => "!=",
            Some(Token::Ge) => ">=",
            Some(Token::Le) => "<=",
            Some(Token::Gt) => ">",
            Some(Token::Lt) => "<",
            Some(Token::Ident(k)) if k == "in" => "in",
            _ => return Ok(left),
        }
        .to_string();
        self.advance();
        let right = self.parse_additive()?;
        compare_values(&left, &op, &right)
    }

    fn parse_additive(&mut self) -> Result<Value, StepError> {
        let mut left = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = add_values(&left, &right)?;
                }
                Some(Token::Minus) => {
                    self.advance();
                    let right = self.parse_term()?;
                    left = numeric_op(&left, &right, "-")?;
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_term(&mut self) -> Result<Value, StepError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = numeric_op(&left, &right, "*")?;
                }
                Some(Token::Slash) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = numeric_op(&left, &right, "/")?;
                }
                Some(Token::Percent) => {
                    self.advance();
                    let right = self.parse_unary()?;
                    left = numeric_op(&left, &right, "%")?;
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Value, StepError> {
        if matches!(self.peek(), Some(Token::Minus)) {
            self.advance();
            let operand = self.parse_unary()?;
            return numeric_op(&Value::from(0), &operand, "-");
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Value, StepError> {
        let mut value = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::LBracket) => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(&Token::RBracket, "to close the index")?;
                    value = index_value(&value, &index)?;
                }
                Some(Token::Dot) => {
                    self.advance();
                    let method = match self.advance() {
                        Some(Token::Ident(name)) => name.clone(),
                        other => {
                            return Err(StepError::script(format!(
                                "expected a method name after '.', got {other:?}"
                            )))
                        }
                    };
                    self.expect(&Token::LParen, "to open the call")?;
                    let args = self.parse_positional_args()?;
                    value = call_method(&value, &method, &args)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn parse_positional_args(&mut self) -> Result<Vec<Value>, StepError> {
        let mut args = Vec::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => {
                    return Err(StepError::script(format!(
                        "expected ',' or ')' in call arguments, got {other:?}"
                    )))
                }
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Value, StepError> {
        match self.advance().cloned() {
            Some(Token::Number(n)) => Ok(Value::Number(n)),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::LParen) => {
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen, "to close the group")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if matches!(self.peek(), Some(Token::RBracket)) {
                    self.advance();
                    return Ok(Value::Array(items));
                }
                loop {
                    items.push(self.parse_expression()?);
                    match self.advance() {
                        Some(Token::Comma) => {
                            if matches!(self.peek(), Some(Token::RBracket)) {
                                self.advance();
                                return Ok(Value::Array(items));
                            }
                        }
                        Some(Token::RBracket) => return Ok(Value::Array(items)),
                        other => {
                            return Err(StepError::script(format!(
                                "expected ',' or ']' in list literal, got {other:?}"
                            )))
                        }
                    }
                }
            }
            Some(Token::LBrace) => {
                let mut map = Map::new();
                if matches!(self.peek(), Some(Token::RBrace)) {
                    self.advance();
                    return Ok(Value::Object(map));
                }
                loop {
                    let key = match self.parse_expression()? {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    self.expect(&Token::Colon, "between a dict key and value")?;
                    let value = self.parse_expression()?;
                    map.insert(key, value);
                    match self.advance() {
                        Some(Token::Comma) => {
                            if matches!(self.peek(), Some(Token::RBrace)) {
                                self.advance();
                                return Ok(Value::Object(map));
                            }
                        }
                        Some(Token::RBrace) => return Ok(Value::Object(map)),
                        other => {
                            return Err(StepError::script(format!(
                                "expected ',' or '}}' in dict literal, got {other:?}"
                            )))
                        }
                    }
                }
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "True" | "true" => Ok(Value::Bool(true)),
                "False" | "false" => Ok(Value::Bool(false)),
                "None" | "null" => Ok(Value::Null),
                _ => {
                    if matches!(self.peek(), Some(Token::LParen)) {
                        self.advance();
                        return self.parse_call(&name);
                    }
                    self.env.get(&name).cloned().ok_or_else(|| {
                        StepError::script(format!(
                            "reference to an undefined variable or function: {name}"
                        ))
                    })
                }
            },
            other => Err(StepError::script(format!(
                "unexpected token in expression: {other:?}"
            ))),
        }
    }

    /// A call is either a builtin with positional arguments or a catalog
    /// generator with keyword arguments.
    fn parse_call(&mut self, name: &str) -> Result<Value, StepError> {
        if generators::has_generator(name) {
            let kwargs = self.parse_keyword_args()?;
            return generators::call_generator(name, &kwargs);
        }
        let args = self.parse_positional_args()?;
        call_builtin(name, &args)
    }

    fn parse_keyword_args(&mut self) -> Result<BTreeMap<String, Value>, StepError> {
        let mut kwargs = BTreeMap::new();
        if matches!(self.peek(), Some(Token::RParen)) {
            self.advance();
            return Ok(kwargs);
        }
        loop {
            let key = match self.advance() {
                Some(Token::Ident(name)) => name.clone(),
                other => {
                    return Err(StepError::script(format!(
                        "generator calls take keyword arguments, got {other:?}"
                    )))
                }
            };
            self.expect(&Token::Assign, "between a keyword and its value")?;
            let value = self.parse_expression()?;
            kwargs.insert(key, value);
            match self.advance() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(kwargs),
                other => {
                    return Err(StepError::script(format!(
                        "expected ',' or ')' in call arguments, got {other:?}"
                    )))
                }
            }
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn number_value(f: f64, prefer_int: bool) -> Result<Value, StepError> {
    if prefer_int && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| StepError::script(format!("arithmetic produced a non-finite number: {f}")))
}

fn both_integers(a: &Value, b: &Value) -> bool {
    matches!((a, b), (Value::Number(x), Value::Number(y)) if x.is_i64() && y.is_i64())
}

fn add_values(left: &Value, right: &Value) -> Result<Value, StepError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        (Value::Array(a), Value::Array(b)) => {
            let mut out = a.clone();
            out.extend(b.iter().cloned());
            Ok(Value::Array(out))
        }
        _ => numeric_op(left, right, "+"),
    }
}

fn numeric_op(left: &Value, right: &Value, op: &str) -> Result<Value, StepError> {
    let (a, b) = match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(StepError::script(format!(
                "operator '{op}' needs numeric operands, got: {left} {op} {right}"
            )))
        }
    };
    let ints = both_integers(left, right);
    match op {
        "+" => number_value(a + b, ints),
        "-" => number_value(a - b, ints),
        "*" => number_value(a * b, ints),
        "/" => {
            if b == 0.0 {
                return Err(StepError::script("division by zero"));
            }
            number_value(a / b, false)
        }
        "%" => {
            if b == 0.0 {
                return Err(StepError::script("modulo by zero"));
            }
            number_value(a.rem_euclid(b), ints)
        }
        other => Err(StepError::script(format!("unknown operator: {other}"))),
    }
}

fn compare_values(left: &Value, op: &str, right: &Value) -> Result<Value, StepError> {
    let outcome = match op {
        "==" => values_equal(left, right),
        "!=" => !values_equal(left, right),
        "in" => match right {
            Value::String(haystack) => match left {
                Value::String(needle) => haystack.contains(needle.as_str()),
                other => haystack.contains(&other.to_string()),
            },
            Value::Array(items) => items.iter().any(|item| values_equal(item, left)),
            Value::Object(map) => match left {
                Value::String(key) => map.contains_key(key),
                _ => false,
            },
            _ => {
                return Err(StepError::script(format!(
                    "'in' needs a string, list or dict on the right, got: {right}"
                )))
            }
        },
        _ => {
            if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
                match op {
                    ">" => a > b,
                    ">=" => a >= b,
                    "<" => a < b,
                    "<=" => a <= b,
                    _ => false,
                }
            } else if let (Value::String(a), Value::String(b)) = (left, right) {
                match op {
                    ">" => a > b,
                    ">=" => a >= b,
                    "<" => a < b,
                    "<=" => a <= b,
                    _ => false,
                }
            } else {
                return Err(StepError::script(format!(
                    "cannot order {left} and {right}"
                )));
            }
        }
    };
    Ok(Value::Bool(outcome))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return a == b;
    }
    false
}

fn index_value(value: &Value, index: &Value) -> Result<Value, StepError> {
    match (value, index) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n
                .as_i64()
                .ok_or_else(|| StepError::script(format!("invalid list index: {n}")))?;
            let len = items.len() as i64;
            let idx = if i < 0 { len + i } else { i };
            if (0..len).contains(&idx) {
                Ok(items[idx as usize].clone())
            } else {
                Err(StepError::script(format!(
                    "list index out of range: {i} (length {len})"
                )))
            }
        }
        (Value::Object(map), Value::String(key)) => map
            .get(key)
            .cloned()
            .ok_or_else(|| StepError::script(format!("dict has no key: {key}"))),
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = n
                .as_i64()
                .ok_or_else(|| StepError::script(format!("invalid string index: {n}")))?;
            let len = chars.len() as i64;
            let idx = if i < 0 { len + i } else { i };
            if (0..len).contains(&idx) {
                Ok(Value::String(chars[idx as usize].to_string()))
            } else {
                Err(StepError::script(format!(
                    "string index out of range: {i} (length {len})"
                )))
            }
        }
        _ => Err(StepError::script(format!(
            "cannot index {value} with {index}"
        ))),
    }
}

fn call_builtin(name: &str, args: &[Value]) -> Result<Value, StepError> {
    let one = |args: &[Value]| -> Result<Value, StepError> {
        if args.len() == 1 {
            Ok(args[0].clone())
        } else {
            Err(StepError::script(format!(
                "{name}() takes exactly one argument, got {}",
                args.len()
            )))
        }
    };
    match name {
        "len" => {
            let arg = one(args)?;
            let len = match &arg {
                Value::String(s) => s.chars().count(),
                Value::Array(a) => a.len(),
                Value::Object(o) => o.len(),
                other => {
                    return Err(StepError::script(format!("len() of unsupported value: {other}")))
                }
            };
            Ok(Value::from(len as i64))
        }
        "str" => {
            let arg = one(args)?;
            Ok(Value::String(crate::models::variable::value_as_string(&arg)))
        }
        "int" => {
            let arg = one(args)?;
            let n = match &arg {
                Value::Number(n) => n.as_f64().map(|f| f as i64),
                Value::String(s) => s
                    .trim()
                    .parse::<i64>()
                    .ok()
                    .or_else(|| s.trim().parse::<f64>().ok().map(|f| f as i64)),
                Value::Bool(b) => Some(i64::from(*b)),
                _ => None,
            };
            n.map(Value::from)
                .ok_or_else(|| StepError::script(format!("int() of unsupported value: {arg}")))
        }
        "float" => {
            let arg = one(args)?;
            let f = match &arg {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Bool(b) => Some(f64::from(u8::from(*b))),
                _ => None,
            };
            f.and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| StepError::script(format!("float() of unsupported value: {arg}")))
        }
        "bool" => Ok(Value::Bool(truthy(&one(args)?))),
        "abs" => {
            let arg = one(args)?;
            let f = arg
                .as_f64()
                .ok_or_else(|| StepError::script(format!("abs() of unsupported value: {arg}")))?;
            number_value(f.abs(), matches!(&arg, Value::Number(n) if n.is_i64()))
        }
        "round" => {
            let value = args
                .first()
                .and_then(Value::as_f64)
                .ok_or_else(|| StepError::script("round() needs a numeric argument"))?;
            let digits = args.get(1).and_then(Value::as_i64).unwrap_or(0);
            let factor = 10f64.powi(digits as i32);
            number_value((value * factor).round() / factor, digits == 0)
        }
        "min" | "max" => {
            let pool: Vec<Value> = if args.len() == 1 {
                match &args[0] {
                    Value::Array(items) => items.clone(),
                    other => {
                        return Err(StepError::script(format!(
                            "{name}() of a non-list single argument: {other}"
                        )))
                    }
                }
            } else {
                args.to_vec()
            };
            let mut numbers = Vec::new();
            for item in &pool {
                numbers.push(item.as_f64().ok_or_else(|| {
                    StepError::script(format!("{name}() needs numeric values, got: {item}"))
                })?);
            }
            let folded = if name == "min" {
                numbers.iter().cloned().fold(f64::INFINITY, f64::min)
            } else {
                numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
            };
            if numbers.is_empty() {
                return Err(StepError::script(format!("{name}() of an empty sequence")));
            }
            number_value(folded, pool.iter().all(|v| matches!(v, Value::Number(n) if n.is_i64())))
        }
        "sum" => {
            let items = match args {
                [Value::Array(items)] => items,
                _ => return Err(StepError::script("sum() takes a single list argument")),
            };
            let mut total = 0f64;
            for item in items {
                total += item.as_f64().ok_or_else(|| {
                    StepError::script(format!("sum() needs numeric values, got: {item}"))
                })?;
            }
            number_value(
                total,
                items.iter().all(|v| matches!(v, Value::Number(n) if n.is_i64())),
            )
        }
        other => Err(StepError::script(format!(
            "reference to an undefined variable or function: {other}"
        ))),
    }
}

fn call_method(value: &Value, method: &str, args: &[Value]) -> Result<Value, StepError> {
    match (value, method) {
        (Value::String(s), "upper") => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "lower") => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "strip") => Ok(Value::String(s.trim().to_string())),
        (Value::String(s), "startswith") => match args {
            [Value::String(prefix)] => Ok(Value::Bool(s.starts_with(prefix.as_str()))),
            _ => Err(StepError::script("startswith() takes one string argument")),
        },
        (Value::String(s), "endswith") => match args {
            [Value::String(suffix)] => Ok(Value::Bool(s.ends_with(suffix.as_str()))),
            _ => Err(StepError::script("endswith() takes one string argument")),
        },
        (Value::String(s), "replace") => match args {
            [Value::String(from), Value::String(to)] => {
                Ok(Value::String(s.replace(from.as_str(), to.as_str())))
            }
            _ => Err(StepError::script("replace() takes two string arguments")),
        },
        (Value::String(s), "split") => {
            let parts: Vec<Value> = match args {
                [] => s
                    .split_whitespace()
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
                [Value::String(sep)] => s
                    .split(sep.as_str())
                    .map(|p| Value::String(p.to_string()))
                    .collect(),
                _ => return Err(StepError::script("split() takes at most one string argument")),
            };
            Ok(Value::Array(parts))
        }
        (Value::Object(map), "get") => {
            let key = match args.first() {
                Some(Value::String(k)) => k,
                _ => return Err(StepError::script("get() needs a string key")),
            };
            Ok(map
                .get(key)
                .cloned()
                .unwrap_or_else(|| args.get(1).cloned().unwrap_or(Value::Null)))
        }
        (Value::Object(map), "keys") => Ok(Value::Array(
            map.keys().map(|k| Value::String(k.clone())).collect(),
        )),
        (Value::Object(map), "values") => Ok(Value::Array(map.values().cloned().collect())),
        (other, method) => Err(StepError::script(format!(
            "value {other} has no method {method}()"
        ))),
    }
}
