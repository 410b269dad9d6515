//! Just enough of the GraphQL grammar to find an operation's root field.
//!
//! The executor resolves exactly one root field per request, so the parser reads the
//! operation header, skips variable definitions and directives, then parses the single
//! root selection with its arguments. Its sub-selection is skipped; later definitions in
//! the document are only checked for balance.

use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    Query,
    Mutation,
}

impl OperationType {
    /// Name of the root type, used in logs and error messages.
    pub fn type_name(self) -> &'static str {
        match self {
            OperationType::Query => "Query",
            OperationType::Mutation => "Mutation",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootField {
    pub operation: OperationType,
    pub name: String,
    pub alias: Option<String>,
    /// Argument values with variables already substituted.
    pub arguments: Map<String, Value>,
}

impl RootField {
    /// Key the result is reported under in `data`.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Root type named by the document's first definition, when it can be told at a glance.
pub fn operation_hint(query: &str) -> Option<OperationType> {
    let mut p = Parser { text: query, pos: 0 };
    p.skip_ignored();
    if p.peek() == Some(b'{') {
        return Some(OperationType::Query);
    }
    match p.name().ok()? {
        "query" => Some(OperationType::Query),
        "mutation" => Some(OperationType::Mutation),
        _ => None,
    }
}

/// Deepest list/object nesting accepted in argument values.
pub const MAX_VALUE_DEPTH: usize = 64;

/// Why a document was rejected before any resolver ran.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentError {
    /// Not a well-formed GraphQL document.
    #[error("{0}")]
    Syntax(String),
    /// Well-formed, but asks for something this endpoint does not execute.
    #[error("{0}")]
    Unsupported(String),
}

impl DocumentError {
    /// Error code reported in the GraphQL `extensions`.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::Syntax(_) => "GRAPHQL_PARSE_FAILED",
            DocumentError::Unsupported(_) => "GRAPHQL_VALIDATION_FAILED",
        }
    }
}

impl From<String> for DocumentError {
    fn from(message: String) -> Self {
        DocumentError::Syntax(message)
    }
}

fn unsupported(message: impl Into<String>) -> DocumentError {
    DocumentError::Unsupported(message.into())
}

pub fn parse_operation(
    query: &str,
    variables: &Map<String, Value>,
) -> Result<RootField, DocumentError> {
    let mut p = Parser { text: query, pos: 0 };
    p.skip_ignored();

    let operation = if p.peek() == Some(b'{') {
        OperationType::Query
    } else {
        let operation = match p.name()? {
            "query" => OperationType::Query,
            "mutation" => OperationType::Mutation,
            "subscription" => return Err(unsupported("Subscriptions are not supported")),
            other => {
                return Err(DocumentError::Syntax(format!(
                    "Syntax Error: Unexpected Name \"{}\".",
                    other
                )))
            }
        };
        p.skip_ignored();
        if p.peek().is_some_and(is_name_start) {
            p.name()?;
        }
        if p.eat(b'(') {
            p.skip_group(b'(', b')')?;
        }
        p.skip_directives(variables)?;
        operation
    };

    p.expect(b'{')?;
    p.skip_ignored();
    if p.rest().starts_with("...") {
        return Err(unsupported("Fragments are not supported on the root selection"));
    }

    let first = p.name()?;
    let (alias, name) = if p.eat(b':') { (Some(first), p.name()?) } else { (None, first) };

    let mut arguments = Map::new();
    if p.eat(b'(') {
        while !p.eat(b')') {
            let arg = p.name()?;
            p.expect(b':')?;
            let value = p.value(variables, 0)?;
            arguments.insert(arg.to_string(), value);
        }
    }
    p.skip_directives(variables)?;
    if p.eat(b'{') {
        p.skip_group(b'{', b'}')?;
    }

    // Exactly one root field per operation
    p.skip_ignored();
    if p.peek().is_some_and(is_name_start) || p.rest().starts_with("...") {
        return Err(unsupported(format!(
            "Only one root field per operation is supported, found another after \"{}\".",
            name
        )));
    }
    p.expect(b'}')?;
    p.skip_definitions()?;

    Ok(RootField {
        operation,
        name: name.to_string(),
        alias: alias.map(str::to_string),
        arguments,
    })
}

fn is_name_start(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphabetic()
}

fn is_name_continue(c: u8) -> bool {
    c == b'_' || c.is_ascii_alphanumeric()
}

struct Parser<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    /// Whitespace, commas and comments are insignificant.
    fn skip_ignored(&mut self) {
        while let Some(c) = self.peek() {
            match c {
                b' ' | b'\t' | b'\n' | b'\r' | b',' => self.pos += 1,
                b'#' => {
                    while let Some(c) = self.peek() {
                        self.pos += 1;
                        if c == b'\n' {
                            break;
                        }
                    }
                }
                _ if self.rest().starts_with('\u{feff}') => self.pos += '\u{feff}'.len_utf8(),
                _ => break,
            }
        }
    }

    fn eat(&mut self, c: u8) -> bool {
        self.skip_ignored();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: u8) -> Result<(), String> {
        if self.eat(c) {
            return Ok(());
        }
        match self.peek() {
            Some(found) => Err(format!(
                "Syntax Error: Expected \"{}\", found \"{}\".",
                c as char, found as char
            )),
            None => Err(format!("Syntax Error: Expected \"{}\", found <EOF>.", c as char)),
        }
    }

    fn name(&mut self) -> Result<&'a str, String> {
        self.skip_ignored();
        let start = self.pos;
        match self.peek() {
            Some(c) if is_name_start(c) => self.pos += 1,
            Some(c) => return Err(format!("Syntax Error: Unexpected character \"{}\".", c as char)),
            None => return Err("Syntax Error: Unexpected <EOF>.".to_string()),
        }
        while self.peek().is_some_and(is_name_continue) {
            self.pos += 1;
        }
        Ok(&self.text[start..self.pos])
    }

    /// Skips to the matching `close`; the opening delimiter is already consumed.
    fn skip_group(&mut self, open: u8, close: u8) -> Result<(), String> {
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => return Err("Syntax Error: Unexpected <EOF>.".to_string()),
                Some(b'"') => {
                    self.string()?;
                }
                Some(c) if c == open => {
                    depth += 1;
                    self.pos += 1;
                }
                Some(c) if c == close => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn skip_directives(&mut self, variables: &Map<String, Value>) -> Result<(), String> {
        while self.eat(b'@') {
            self.name()?;
            if self.eat(b'(') {
                while !self.eat(b')') {
                    self.name()?;
                    self.expect(b':')?;
                    self.value(variables, 0)?;
                }
            }
        }
        Ok(())
    }

    /// Checks that only further operation or fragment definitions follow.
    fn skip_definitions(&mut self) -> Result<(), String> {
        loop {
            self.skip_ignored();
            match self.peek() {
                None => return Ok(()),
                Some(b'{') => {
                    self.pos += 1;
                    self.skip_group(b'{', b'}')?;
                }
                Some(c) if is_name_start(c) => {
                    let keyword = self.name()?;
                    if !matches!(keyword, "query" | "mutation" | "subscription" | "fragment") {
                        return Err(format!("Syntax Error: Unexpected Name \"{}\".", keyword));
                    }
                    // Header up to the selection set: name, variables, type condition, directives
                    loop {
                        self.skip_ignored();
                        match self.peek() {
                            Some(b'{') => break,
                            Some(b'(') => {
                                self.pos += 1;
                                self.skip_group(b'(', b')')?;
                            }
                            Some(b'"') => {
                                self.string()?;
                            }
                            Some(c) if is_name_continue(c) || matches!(c, b'$' | b':' | b'@' | b'!' | b'[' | b']' | b'=') => {
                                self.pos += 1
                            }
                            Some(c) => {
                                return Err(format!(
                                    "Syntax Error: Unexpected character \"{}\".",
                                    c as char
                                ))
                            }
                            None => return Err("Syntax Error: Unexpected <EOF>.".to_string()),
                        }
                    }
                    self.pos += 1;
                    self.skip_group(b'{', b'}')?;
                }
                Some(c) => {
                    return Err(format!("Syntax Error: Unexpected character \"{}\".", c as char))
                }
            }
        }
    }

    fn value(&mut self, variables: &Map<String, Value>, depth: usize) -> Result<Value, String> {
        self.skip_ignored();
        if depth >= MAX_VALUE_DEPTH && matches!(self.peek(), Some(b'[' | b'{')) {
            return Err(format!(
                "Syntax Error: Values nested deeper than {} levels.",
                MAX_VALUE_DEPTH
            ));
        }
        match self.peek() {
            Some(b'$') => {
                self.pos += 1;
                let name = self.name()?;
                Ok(variables.get(name).cloned().unwrap_or(Value::Null))
            }
            Some(b'"') => Ok(Value::String(self.string()?)),
            Some(b'[') => {
                self.pos += 1;
                let mut items = Vec::new();
                while !self.eat(b']') {
                    items.push(self.value(variables, depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            Some(b'{') => {
                self.pos += 1;
                let mut fields = Map::new();
                while !self.eat(b'}') {
                    let key = self.name()?;
                    self.expect(b':')?;
                    let value = self.value(variables, depth + 1)?;
                    fields.insert(key.to_string(), value);
                }
                Ok(Value::Object(fields))
            }
            Some(c) if c == b'-' || c.is_ascii_digit() => self.number(),
            Some(c) if is_name_start(c) => Ok(match self.name()? {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                "null" => Value::Null,
                enum_value => Value::String(enum_value.to_string()),
            }),
            Some(c) => Err(format!("Syntax Error: Unexpected character \"{}\".", c as char)),
            None => Err("Syntax Error: Unexpected <EOF>.".to_string()),
        }
    }

    fn number(&mut self) -> Result<Value, String> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, b'-' | b'+' | b'.' | b'e' | b'E'))
        {
            self.pos += 1;
        }
        let raw = &self.text[start..self.pos];
        let invalid = || format!("Syntax Error: Invalid number \"{}\".", raw);
        if raw.contains(['.', 'e', 'E']) {
            let float: f64 = raw.parse().map_err(|_| invalid())?;
            Number::from_f64(float).map(Value::Number).ok_or_else(invalid)
        } else {
            let int: i64 = raw.parse().map_err(|_| invalid())?;
            Ok(Value::Number(int.into()))
        }
    }

    fn string(&mut self) -> Result<String, String> {
        if self.rest().starts_with("\"\"\"") {
            self.pos += 3;
            let end = self
                .rest()
                .find("\"\"\"")
                .ok_or_else(|| "Syntax Error: Unterminated string.".to_string())?;
            let block = self.rest()[..end].to_string();
            self.pos += end + 3;
            return Ok(block);
        }

        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err("Syntax Error: Unterminated string.".to_string()),
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let escaped = self
                        .peek()
                        .ok_or_else(|| "Syntax Error: Unterminated string.".to_string())?;
                    self.pos += 1;
                    match escaped {
                        b'"' | b'\\' | b'/' => out.push(escaped),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0c),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let ch = self
                                .text
                                .get(self.pos..self.pos + 4)
                                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                                .and_then(char::from_u32)
                                .ok_or_else(|| "Syntax Error: Invalid Unicode escape.".to_string())?;
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                            self.pos += 4;
                        }
                        other => {
                            return Err(format!(
                                "Syntax Error: Invalid character escape \"\\{}\".",
                                other as char
                            ))
                        }
                    }
                }
                Some(c) => {
                    out.push(c);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(out).map_err(|_| "Syntax Error: Invalid UTF-8 in string.".to_string())
    }
}
