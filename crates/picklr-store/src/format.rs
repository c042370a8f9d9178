//! Textual serializer/parser for the state document (§6.1). This engine has
//! no external evaluator available to it for its own persisted format (the
//! evaluator the rest of the system relies on only understands the
//! resource-configuration language, not this schema), so it is both the
//! sole producer and sole consumer of the grammar below: a round-trip
//! reader/writer, not a general-purpose language evaluator.

use std::collections::BTreeMap;

use picklr_domain::{ResourceState, State, Value};

use crate::error::StoreError;

const SCHEMA_REF: &str = "picklr:state@1";

pub fn serialize(state: &State) -> String {
    let mut out = String::new();
    out.push_str("// Picklr state file\n");
    out.push_str(&format!("amends \"{}\"\n\n", SCHEMA_REF));
    out.push_str(&format!("version = {}\n", state.version));
    out.push_str(&format!("serial = {}\n", state.serial));
    out.push_str(&format!("lineage = {}\n\n", quote(&state.lineage)));
    out.push_str(&write_named_mapping("outputs", &state.outputs, 0));
    out.push('\n');
    out.push_str(&write_resources(&state.resources));
    out.push('\n');
    out
}

pub fn parse(text: &str) -> Result<State, StoreError> {
    let mut lexer = Lexer::new(text);
    let tokens = lexer.tokenize()?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.parse_document()
}

// ── Writer ─────────────────────────────────────────────────────────────────

fn write_named_mapping(name: &str, map: &BTreeMap<String, Value>, indent: usize) -> String {
    let pad = " ".repeat(indent);
    if map.is_empty() {
        return format!("{pad}{name} = new {{}}\n");
    }
    let mut out = format!("{pad}{name} {{\n");
    for (k, v) in map {
        out.push_str(&format!("{}  [{}] = {}\n", pad, quote(k), write_value(v, indent + 2)));
    }
    out.push_str(&format!("{pad}}}\n"));
    out
}

/// The graph's state-only rebuild (§4.2) walks `ResourceState.dependencies`
/// to order a destroy of resources no longer in config, so it has to survive
/// a write/read round-trip same as every other `ResourceState` field.
fn write_dependencies(deps: &[String]) -> String {
    if deps.is_empty() {
        return "    dependencies = new Listing {}\n".to_string();
    }
    let mut out = "    dependencies {\n".to_string();
    for d in deps {
        out.push_str(&format!("      {}\n", quote(d)));
    }
    out.push_str("    }\n");
    out
}

fn write_resources(resources: &[ResourceState]) -> String {
    if resources.is_empty() {
        return "resources = new Listing {}\n".to_string();
    }
    let mut out = "resources {\n".to_string();
    for r in resources {
        out.push_str("  new {\n");
        out.push_str(&format!("    type = {}\n", quote(&r.r#type)));
        out.push_str(&format!("    name = {}\n", quote(&r.name)));
        out.push_str(&format!("    provider = {}\n", quote(&r.provider)));
        out.push_str(&write_named_mapping("inputs", &r.inputs, 4));
        out.push_str(&format!("    inputsHash = {}\n", quote(&r.inputs_hash)));
        out.push_str(&write_named_mapping("outputs", &r.outputs, 4));
        out.push_str(&write_dependencies(&r.dependencies));
        out.push_str("  }\n");
    }
    out.push_str("}\n");
    out
}

fn write_value(v: &Value, indent: usize) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => format_float(*f),
        Value::String(s) => quote(s),
        Value::Map(map) => {
            if map.is_empty() {
                "new {}".to_string()
            } else {
                let pad = " ".repeat(indent);
                let mut out = "new {\n".to_string();
                for (k, v) in map {
                    out.push_str(&format!("{}  [{}] = {}\n", pad, quote(k), write_value(v, indent + 2)));
                }
                out.push_str(&format!("{pad}}}"));
                out
            }
        }
        Value::Seq(items) => {
            if items.is_empty() {
                "new Listing {}".to_string()
            } else {
                let pad = " ".repeat(indent);
                let mut out = "new Listing {\n".to_string();
                for item in items {
                    out.push_str(&format!("{}  {}\n", pad, write_value(item, indent + 2)));
                }
                out.push_str(&format!("{pad}}}"));
                out
            }
        }
    }
}

fn format_float(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

// ── Lexer ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Eq,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Lexer { chars: text.chars().peekable() }
    }

    fn tokenize(&mut self) -> Result<Vec<Token>, StoreError> {
        let mut tokens = Vec::new();
        while let Some(&c) = self.chars.peek() {
            match c {
                ' ' | '\t' | '\r' | '\n' => {
                    self.chars.next();
                }
                '/' => {
                    self.chars.next();
                    if self.chars.peek() == Some(&'/') {
                        for c in self.chars.by_ref() {
                            if c == '\n' {
                                break;
                            }
                        }
                    } else {
                        return Err(StoreError::StateParse("unexpected '/'".into()));
                    }
                }
                '{' => {
                    self.chars.next();
                    tokens.push(Token::LBrace);
                }
                '}' => {
                    self.chars.next();
                    tokens.push(Token::RBrace);
                }
                '[' => {
                    self.chars.next();
                    tokens.push(Token::LBracket);
                }
                ']' => {
                    self.chars.next();
                    tokens.push(Token::RBracket);
                }
                '=' => {
                    self.chars.next();
                    tokens.push(Token::Eq);
                }
                '"' => tokens.push(Token::Str(self.read_string()?)),
                c if c == '-' || c.is_ascii_digit() => tokens.push(self.read_number()?),
                c if c.is_alphabetic() || c == '_' => tokens.push(Token::Ident(self.read_ident())),
                other => return Err(StoreError::StateParse(format!("unexpected character '{other}'"))),
            }
        }
        Ok(tokens)
    }

    fn read_string(&mut self) -> Result<String, StoreError> {
        self.chars.next();
        let mut s = String::new();
        loop {
            match self.chars.next() {
                Some('"') => return Ok(s),
                Some('\\') => match self.chars.next() {
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some('n') => s.push('\n'),
                    Some('r') => s.push('\r'),
                    Some('t') => s.push('\t'),
                    Some(other) => s.push(other),
                    None => return Err(StoreError::StateParse("unterminated escape".into())),
                },
                Some(c) => s.push(c),
                None => return Err(StoreError::StateParse("unterminated string".into())),
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, StoreError> {
        let mut s = String::new();
        if self.chars.peek() == Some(&'-') {
            s.push(self.chars.next().unwrap());
        }
        let mut is_float = false;
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.chars.next();
            } else if c == '.' || c == 'e' || c == 'E' {
                is_float = true;
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        if is_float {
            s.parse::<f64>().map(Token::Float).map_err(|e| StoreError::StateParse(e.to_string()))
        } else {
            s.parse::<i64>().map(Token::Int).map_err(|e| StoreError::StateParse(e.to_string()))
        }
    }

    fn read_ident(&mut self) -> String {
        let mut s = String::new();
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        s
    }
}

// ── Parser ─────────────────────────────────────────────────────────────────

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Result<Token, StoreError> {
        let tok = self.tokens.get(self.pos).cloned().ok_or_else(|| StoreError::StateParse("unexpected end of input".into()))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(), StoreError> {
        match self.next()? {
            Token::Ident(s) if s == expected => Ok(()),
            other => Err(StoreError::StateParse(format!("expected '{expected}', got {other:?}"))),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), StoreError> {
        match self.next()? {
            ref tok if *tok == expected => Ok(()),
            other => Err(StoreError::StateParse(format!("expected {expected:?}, got {other:?}"))),
        }
    }

    fn parse_document(&mut self) -> Result<State, StoreError> {
        self.expect_ident("amends")?;
        let _schema = match self.next()? {
            Token::Str(s) => s,
            other => return Err(StoreError::StateParse(format!("expected schema string, got {other:?}"))),
        };

        let mut version = None;
        let mut serial = None;
        let mut lineage = None;
        let mut outputs = BTreeMap::new();
        let mut resources = Vec::new();

        while let Some(tok) = self.peek().cloned() {
            let Token::Ident(name) = tok else {
                return Err(StoreError::StateParse(format!("expected a field name, got {tok:?}")));
            };
            self.pos += 1;
            match name.as_str() {
                "version" => {
                    self.expect(Token::Eq)?;
                    version = Some(self.expect_int()?);
                }
                "serial" => {
                    self.expect(Token::Eq)?;
                    serial = Some(self.expect_int()?);
                }
                "lineage" => {
                    self.expect(Token::Eq)?;
                    lineage = Some(self.expect_str()?);
                }
                "outputs" => outputs = self.parse_named_mapping()?,
                "resources" => resources = self.parse_resources()?,
                other => return Err(StoreError::StateParse(format!("unknown top-level field '{other}'"))),
            }
        }

        Ok(State {
            version: version.ok_or_else(|| StoreError::StateParse("missing 'version'".into()))? as u32,
            serial: serial.ok_or_else(|| StoreError::StateParse("missing 'serial'".into()))? as u64,
            lineage: lineage.ok_or_else(|| StoreError::StateParse("missing 'lineage'".into()))?,
            outputs,
            resources,
        })
    }

    fn expect_int(&mut self) -> Result<i64, StoreError> {
        match self.next()? {
            Token::Int(i) => Ok(i),
            other => Err(StoreError::StateParse(format!("expected integer, got {other:?}"))),
        }
    }

    fn expect_str(&mut self) -> Result<String, StoreError> {
        match self.next()? {
            Token::Str(s) => Ok(s),
            other => Err(StoreError::StateParse(format!("expected string, got {other:?}"))),
        }
    }

    /// Parses either `= new {}` (empty) or `{ [k] = v ... }` (non-empty),
    /// the two forms §6.1 defines for a named mapping property.
    fn parse_named_mapping(&mut self) -> Result<BTreeMap<String, Value>, StoreError> {
        if self.peek() == Some(&Token::Eq) {
            self.pos += 1;
            self.expect_ident("new")?;
            self.expect(Token::LBrace)?;
            self.expect(Token::RBrace)?;
            return Ok(BTreeMap::new());
        }
        self.expect(Token::LBrace)?;
        let mut map = BTreeMap::new();
        while self.peek() != Some(&Token::RBrace) {
            self.expect(Token::LBracket)?;
            let key = self.expect_str()?;
            self.expect(Token::RBracket)?;
            self.expect(Token::Eq)?;
            let value = self.parse_value()?;
            map.insert(key, value);
        }
        self.expect(Token::RBrace)?;
        Ok(map)
    }

    fn parse_value(&mut self) -> Result<Value, StoreError> {
        match self.next()? {
            Token::Ident(s) if s == "null" => Ok(Value::Null),
            Token::Ident(s) if s == "true" => Ok(Value::Bool(true)),
            Token::Ident(s) if s == "false" => Ok(Value::Bool(false)),
            Token::Int(i) => Ok(Value::Int(i)),
            Token::Float(f) => Ok(Value::Float(f)),
            Token::Str(s) => Ok(Value::String(s)),
            Token::Ident(s) if s == "new" => self.parse_new_value(),
            other => Err(StoreError::StateParse(format!("unexpected value token {other:?}"))),
        }
    }

    fn parse_new_value(&mut self) -> Result<Value, StoreError> {
        if self.peek() == Some(&Token::Ident("Listing".to_string())) {
            self.pos += 1;
            self.expect(Token::LBrace)?;
            let mut items = Vec::new();
            while self.peek() != Some(&Token::RBrace) {
                items.push(self.parse_value()?);
            }
            self.expect(Token::RBrace)?;
            return Ok(Value::Seq(items));
        }
        self.expect(Token::LBrace)?;
        let mut map = BTreeMap::new();
        while self.peek() != Some(&Token::RBrace) {
            self.expect(Token::LBracket)?;
            let key = self.expect_str()?;
            self.expect(Token::RBracket)?;
            self.expect(Token::Eq)?;
            let value = self.parse_value()?;
            map.insert(key, value);
        }
        self.expect(Token::RBrace)?;
        Ok(Value::Map(map))
    }

    fn parse_resources(&mut self) -> Result<Vec<ResourceState>, StoreError> {
        if self.peek() == Some(&Token::Eq) {
            self.pos += 1;
            self.expect_ident("new")?;
            self.expect_ident("Listing")?;
            self.expect(Token::LBrace)?;
            self.expect(Token::RBrace)?;
            return Ok(Vec::new());
        }
        self.expect(Token::LBrace)?;
        let mut resources = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            self.expect_ident("new")?;
            resources.push(self.parse_resource_entry()?);
        }
        self.expect(Token::RBrace)?;
        Ok(resources)
    }

    fn parse_resource_entry(&mut self) -> Result<ResourceState, StoreError> {
        self.expect(Token::LBrace)?;
        let mut r#type = None;
        let mut name = None;
        let mut provider = None;
        let mut inputs = BTreeMap::new();
        let mut inputs_hash = None;
        let mut outputs = BTreeMap::new();
        let mut dependencies = Vec::new();

        while self.peek() != Some(&Token::RBrace) {
            let Token::Ident(field) = self.next()? else {
                return Err(StoreError::StateParse("expected a resource field name".into()));
            };
            match field.as_str() {
                "type" => {
                    self.expect(Token::Eq)?;
                    r#type = Some(self.expect_str()?);
                }
                "name" => {
                    self.expect(Token::Eq)?;
                    name = Some(self.expect_str()?);
                }
                "provider" => {
                    self.expect(Token::Eq)?;
                    provider = Some(self.expect_str()?);
                }
                "inputsHash" => {
                    self.expect(Token::Eq)?;
                    inputs_hash = Some(self.expect_str()?);
                }
                "inputs" => inputs = self.parse_named_mapping()?,
                "outputs" => outputs = self.parse_named_mapping()?,
                "dependencies" => dependencies = self.parse_dependencies()?,
                other => return Err(StoreError::StateParse(format!("unknown resource field '{other}'"))),
            }
        }
        self.expect(Token::RBrace)?;

        Ok(ResourceState {
            r#type: r#type.ok_or_else(|| StoreError::StateParse("resource missing 'type'".into()))?,
            name: name.ok_or_else(|| StoreError::StateParse("resource missing 'name'".into()))?,
            provider: provider.ok_or_else(|| StoreError::StateParse("resource missing 'provider'".into()))?,
            inputs,
            inputs_hash: inputs_hash.ok_or_else(|| StoreError::StateParse("resource missing 'inputsHash'".into()))?,
            outputs,
            dependencies,
        })
    }

    fn parse_dependencies(&mut self) -> Result<Vec<String>, StoreError> {
        if self.peek() == Some(&Token::Eq) {
            self.pos += 1;
            self.expect_ident("new")?;
            self.expect_ident("Listing")?;
            self.expect(Token::LBrace)?;
            self.expect(Token::RBrace)?;
            return Ok(Vec::new());
        }
        self.expect(Token::LBrace)?;
        let mut deps = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            deps.push(self.expect_str()?);
        }
        self.expect(Token::RBrace)?;
        Ok(deps)
    }
}
