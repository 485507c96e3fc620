//! Recursive-descent parser for MI result and exec-async records.
//!
//! MI payloads are `key=value` lists where a value is a quoted C string, a
//! tuple `{...}` or a list `[...]`. The decoded shape is deliberately loose:
//! handlers look fields up by name and fall back to defaults when a field
//! is absent, because the textual format is not contractually stable.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;

use crate::escape;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of MI record")]
    UnexpectedEnd,
    #[error("unexpected byte {byte:#04x} at offset {offset}")]
    UnexpectedByte { byte: u8, offset: usize },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParseObject {
    props: HashMap<String, ParseValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseValue {
    Str(String),
    Object(ParseObject),
    Array(Vec<ParseValue>),
}

impl ParseValue {
    pub fn as_str(&self) -> &str {
        match self {
            ParseValue::Str(s) => s,
            _ => "",
        }
    }

    pub fn as_object(&self) -> Option<&ParseObject> {
        match self {
            ParseValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> &[ParseValue] {
        match self {
            ParseValue::Array(v) => v,
            _ => &[],
        }
    }

    pub fn int_value(&self, default: i64) -> i64 {
        self.as_str().parse().unwrap_or(default)
    }

    /// Decode an `addr="0x..."` style field.
    pub fn hex_value(&self) -> u64 {
        let s = self.as_str();
        let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        u64::from_str_radix(digits, 16).unwrap_or(0)
    }

    /// Decode a source path, applying separator normalization.
    pub fn path_value(&self) -> PathBuf {
        escape::bytes_to_path(self.as_str().as_bytes())
    }
}

impl ParseObject {
    pub fn get(&self, name: &str) -> Option<&ParseValue> {
        self.props.get(name)
    }

    /// String field, empty when absent or not a string.
    pub fn value(&self, name: &str) -> &str {
        self.get(name).map(ParseValue::as_str).unwrap_or("")
    }

    pub fn int(&self, name: &str, default: i64) -> i64 {
        self.get(name).map(|v| v.int_value(default)).unwrap_or(default)
    }

    pub fn hex(&self, name: &str) -> u64 {
        self.get(name).map(ParseValue::hex_value).unwrap_or(0)
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.get(name).map(ParseValue::path_value).unwrap_or_default()
    }

    pub fn object(&self, name: &str) -> Option<&ParseObject> {
        self.get(name).and_then(ParseValue::as_object)
    }

    pub fn array(&self, name: &str) -> &[ParseValue] {
        self.get(name).map(ParseValue::as_array).unwrap_or(&[])
    }
}

/// The structured results the session understands, classified by the leading
/// key of a `^done`/`^running` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultClass {
    BreakpointTable,
    Frame,
    Locals,
    Breakpoint,
    FrameStack,
    LocalVariables,
    Evaluation,
    Memory,
    RegisterNames,
    RegisterValues,
}

pub fn classify_result(obj: &ParseObject) -> Option<ResultClass> {
    if obj.get("BreakpointTable").is_some() {
        Some(ResultClass::BreakpointTable)
    } else if obj.get("bkpt").is_some() {
        Some(ResultClass::Breakpoint)
    } else if obj.get("stack").is_some() {
        Some(ResultClass::FrameStack)
    } else if obj.get("variables").is_some() {
        Some(ResultClass::LocalVariables)
    } else if obj.get("frame").is_some() {
        Some(ResultClass::Frame)
    } else if obj.get("locals").is_some() {
        Some(ResultClass::Locals)
    } else if obj.get("value").is_some() {
        Some(ResultClass::Evaluation)
    } else if obj.get("memory").is_some() {
        Some(ResultClass::Memory)
    } else if obj.get("register-names").is_some() {
        Some(ResultClass::RegisterNames)
    } else if obj.get("register-values").is_some() {
        Some(ResultClass::RegisterValues)
    } else {
        None
    }
}

/// Strip the numeric output-sequence token prefix from a raw line.
pub fn strip_token(line: &[u8]) -> &[u8] {
    let digits = line.iter().take_while(|b| b.is_ascii_digit()).count();
    &line[digits..]
}

/// Parse the `key=value(,key=value)*` payload of a result record.
pub fn parse_result_payload(payload: &[u8]) -> Result<ParseObject, ParseError> {
    let mut cursor = Cursor::new(payload);
    let obj = cursor.parse_pairs(None)?;
    Ok(obj)
}

/// Parse an exec-async record (the line after its `*` sigil) into its
/// result class (`running`, `stopped`, ...) and payload.
pub fn parse_async_record(line: &[u8]) -> Result<(String, ParseObject), ParseError> {
    let comma = line.iter().position(|&b| b == b',');
    match comma {
        Some(pos) => {
            let class = String::from_utf8_lossy(&line[..pos]).into_owned();
            let obj = parse_result_payload(&line[pos + 1..])?;
            Ok((class, obj))
        }
        None => Ok((String::from_utf8_lossy(line).into_owned(), ParseObject::default())),
    }
}

struct Cursor<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Result<u8, ParseError> {
        let b = self.peek().ok_or(ParseError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(b)
    }

    fn expect(&mut self, byte: u8) -> Result<(), ParseError> {
        match self.peek() {
            Some(b) if b == byte => {
                self.pos += 1;
                Ok(())
            }
            Some(b) => Err(ParseError::UnexpectedByte { byte: b, offset: self.pos }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    /// `key=value` pairs until `terminator` (or end of input when `None`).
    fn parse_pairs(&mut self, terminator: Option<u8>) -> Result<ParseObject, ParseError> {
        let mut obj = ParseObject::default();
        loop {
            match self.peek() {
                None => {
                    if terminator.is_some() {
                        return Err(ParseError::UnexpectedEnd);
                    }
                    return Ok(obj);
                }
                Some(b) if Some(b) == terminator => {
                    self.pos += 1;
                    return Ok(obj);
                }
                _ => {}
            }
            let key = self.parse_key()?;
            self.expect(b'=')?;
            let value = self.parse_value()?;
            obj.props.insert(key, value);
            if self.peek() == Some(b',') {
                self.pos += 1;
            }
        }
    }

    fn parse_key(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == b'=' || b == b',' {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ParseError::UnexpectedByte {
                byte: self.peek().unwrap_or(0),
                offset: self.pos,
            });
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn parse_value(&mut self) -> Result<ParseValue, ParseError> {
        match self.peek() {
            Some(b'"') => self.parse_string(),
            Some(b'{') => {
                self.pos += 1;
                Ok(ParseValue::Object(self.parse_pairs(Some(b'}'))?))
            }
            Some(b'[') => self.parse_list(),
            Some(b) => Err(ParseError::UnexpectedByte { byte: b, offset: self.pos }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn parse_string(&mut self) -> Result<ParseValue, ParseError> {
        self.expect(b'"')?;
        let start = self.pos;
        loop {
            match self.bump()? {
                b'"' => break,
                b'\\' => {
                    self.bump()?;
                }
                _ => {}
            }
        }
        let raw = &self.input[start..self.pos - 1];
        let bytes = escape::decode_escapes(raw);
        Ok(ParseValue::Str(escape::bytes_to_text(&bytes)))
    }

    /// Lists hold either plain values or `key=value` results; result keys
    /// inside a list (e.g. `stack=[frame={...},frame={...}]`) are dropped.
    fn parse_list(&mut self) -> Result<ParseValue, ParseError> {
        self.expect(b'[')?;
        let mut values = Vec::new();
        loop {
            match self.peek() {
                Some(b']') => {
                    self.pos += 1;
                    break;
                }
                Some(b'"') | Some(b'{') | Some(b'[') => {
                    values.push(self.parse_value()?);
                }
                Some(_) => {
                    let _key = self.parse_key()?;
                    self.expect(b'=')?;
                    values.push(self.parse_value()?);
                }
                None => return Err(ParseError::UnexpectedEnd),
            }
            if self.peek() == Some(b',') {
                self.pos += 1;
            }
        }
        Ok(ParseValue::Array(values))
    }
}
