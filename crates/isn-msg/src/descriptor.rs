//! Message descriptor mini-language.
//!
//! A descriptor is text with embedded directives, parsed once into tokens:
//!
//! ```text
//!   %T0{Vendor Product}      title, message 0 only
//!   %!                       terminator, last message only
//!   {:red}={%hu}             binary field: name, then format
//!   {#sno}={12345678}        constant field
//!   %%                       literal '%'
//! ```
//!
//! Field formats are `%` `[<|>]` `[h|l|L]` `u|d|i|x|X|f`. `<` is little
//! endian (the default), `>` big endian. Widths are 1 byte for `h`, 2 with no
//! modifier, 4 for `l`, 8 for `L`; floats are 4 bytes unless `L` is given.

use std::fmt::Write as _;

use crate::error::DescriptorError;

type Result<T> = std::result::Result<T, DescriptorError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Unsigned,
    Signed,
    Hex { upper: bool },
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFormat {
    pub endian: Endian,
    pub width: usize,
    pub conversion: Conversion,
}

/// One-character prefix on a field name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// `:`
    Parameter,
    /// `#`
    Constant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Literal(String),
    Title {
        version: u32,
        text: String,
    },
    Terminator,
    Field {
        name: String,
        marker: Option<Marker>,
        format: FieldFormat,
    },
    Constant {
        name: String,
        marker: Option<Marker>,
        value: String,
    },
}

/// A typed field value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

/// Parsed descriptor. The source text is what goes on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Descriptor {
    source: String,
    tokens: Vec<Token>,
    args_size: usize,
}

impl Descriptor {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = Parser::new(source).run()?;
        let args_size = tokens
            .iter()
            .map(|token| match token {
                Token::Field { format, .. } => format.width,
                _ => 0,
            })
            .sum();
        Ok(Self {
            source: source.to_string(),
            tokens,
            args_size,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Bytes taken by the binary fields.
    pub fn args_size(&self) -> usize {
        self.args_size
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldFormat)> {
        self.tokens.iter().filter_map(|token| match token {
            Token::Field { name, format, .. } => Some((name.as_str(), format)),
            _ => None,
        })
    }

    pub fn has_fields(&self) -> bool {
        self.fields().next().is_some()
    }

    pub fn title(&self) -> Option<(u32, &str)> {
        self.tokens.iter().find_map(|token| match token {
            Token::Title { version, text } => Some((*version, text.as_str())),
            _ => None,
        })
    }

    pub fn is_terminator(&self) -> bool {
        self.tokens.contains(&Token::Terminator)
    }

    /// Split argument bytes into field values.
    pub fn decode(&self, args: &[u8]) -> Result<Vec<Value>> {
        self.check_size(args)?;
        let mut offset = 0;
        Ok(self
            .fields()
            .map(|(_, format)| {
                let value = read(format, &args[offset..offset + format.width]);
                offset += format.width;
                value
            })
            .collect())
    }

    /// Pack field values into argument bytes.
    pub fn encode(&self, values: &[Value]) -> Result<Vec<u8>> {
        let fields: Vec<_> = self.fields().collect();
        if fields.len() != values.len() {
            return Err(DescriptorError::ValueCount {
                expected: fields.len(),
                found: values.len(),
            });
        }
        let mut out = Vec::with_capacity(self.args_size);
        for ((name, format), value) in fields.into_iter().zip(values) {
            let raw = to_raw(name, format, *value)?;
            let bytes = (0..format.width).map(|i| (raw >> (8 * i)) as u8);
            match format.endian {
                Endian::Little => out.extend(bytes),
                Endian::Big => out.extend(bytes.rev()),
            }
        }
        Ok(out)
    }

    /// Human-readable text with field values filled in.
    pub fn render(&self, args: &[u8]) -> Result<String> {
        self.check_size(args)?;
        let mut out = String::new();
        let mut offset = 0;
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Title { text, .. } => out.push_str(text),
                Token::Terminator => {}
                Token::Constant { name, value, .. } => {
                    let _ = write!(out, "{name}={value}");
                }
                Token::Field { name, format, .. } => {
                    let value = read(format, &args[offset..offset + format.width]);
                    offset += format.width;
                    let _ = write!(out, "{name}=");
                    render_value(&mut out, format, value);
                }
            }
        }
        Ok(out)
    }

    fn check_size(&self, args: &[u8]) -> Result<()> {
        if args.len() != self.args_size {
            return Err(DescriptorError::SizeMismatch {
                expected: self.args_size,
                found: args.len(),
            });
        }
        Ok(())
    }
}

fn read(format: &FieldFormat, bytes: &[u8]) -> Value {
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    let raw = match format.endian {
        Endian::Little => bytes.iter().rev().fold(0, fold),
        Endian::Big => bytes.iter().fold(0, fold),
    };
    match format.conversion {
        Conversion::Unsigned | Conversion::Hex { .. } => Value::Unsigned(raw),
        Conversion::Signed => {
            let shift = 64 - 8 * format.width as u32;
            Value::Signed(((raw << shift) as i64) >> shift)
        }
        Conversion::Float if format.width == 8 => Value::Float(f64::from_bits(raw)),
        Conversion::Float => Value::Float(f64::from(f32::from_bits(raw as u32))),
    }
}

fn mask(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width)) - 1
    }
}

fn to_raw(name: &str, format: &FieldFormat, value: Value) -> Result<u64> {
    let out_of_range = || DescriptorError::ValueRange {
        field: name.to_string(),
    };
    match (format.conversion, value) {
        (Conversion::Unsigned | Conversion::Hex { .. }, Value::Unsigned(v)) => {
            if v > mask(format.width) {
                return Err(out_of_range());
            }
            Ok(v)
        }
        (Conversion::Signed, Value::Signed(v)) => {
            let bits = 8 * format.width as u32;
            let min = i64::MIN >> (64 - bits);
            let max = i64::MAX >> (64 - bits);
            if v < min || v > max {
                return Err(out_of_range());
            }
            Ok(v as u64 & mask(format.width))
        }
        (Conversion::Float, Value::Float(v)) if format.width == 8 => Ok(v.to_bits()),
        (Conversion::Float, Value::Float(v)) => Ok(u64::from((v as f32).to_bits())),
        _ => Err(DescriptorError::ValueType {
            field: name.to_string(),
        }),
    }
}

fn render_value(out: &mut String, format: &FieldFormat, value: Value) {
    let _ = match (format.conversion, value) {
        (Conversion::Hex { upper: false }, Value::Unsigned(v)) => write!(out, "0x{v:x}"),
        (Conversion::Hex { upper: true }, Value::Unsigned(v)) => write!(out, "0x{v:X}"),
        (_, Value::Unsigned(v)) => write!(out, "{v}"),
        (_, Value::Signed(v)) => write!(out, "{v}"),
        (_, Value::Float(v)) => write!(out, "{v}"),
    };
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    tokens: Vec<Token>,
    literal: String,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            tokens: Vec::new(),
            literal: String::new(),
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn flush(&mut self) {
        if !self.literal.is_empty() {
            self.tokens
                .push(Token::Literal(std::mem::take(&mut self.literal)));
        }
    }

    fn push(&mut self, token: Token) {
        self.flush();
        self.tokens.push(token);
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while let Some(next) = self.rest().find(['%', '{']) {
            let text = &self.rest()[..next];
            self.literal.push_str(text);
            self.pos += next;
            if self.rest().starts_with('%') {
                self.directive()?;
            } else {
                self.braces()?;
            }
        }
        let tail = self.rest();
        self.literal.push_str(tail);
        self.flush();
        Ok(self.tokens)
    }

    /// Text between `{` at the cursor and its `}`; moves past the brace.
    fn group(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let rest = self.rest();
        let close = rest
            .find('}')
            .ok_or(DescriptorError::Unterminated { position: start })?;
        self.pos += close + 1;
        Ok(&rest[1..close])
    }

    fn directive(&mut self) -> Result<()> {
        let start = self.pos;
        let rest = self.rest();
        if rest.starts_with("%%") {
            self.literal.push('%');
            self.pos += 2;
        } else if rest.starts_with("%!") {
            self.push(Token::Terminator);
            self.pos += 2;
        } else if let Some(after) = rest.strip_prefix("%T") {
            let digits = after.bytes().take_while(u8::is_ascii_digit).count();
            let version = after[..digits]
                .parse()
                .map_err(|_| DescriptorError::InvalidDirective { position: start })?;
            self.pos += 2 + digits;
            if !self.rest().starts_with('{') {
                return Err(DescriptorError::InvalidDirective { position: start });
            }
            let text = self.group()?.to_string();
            self.push(Token::Title { version, text });
        } else {
            return Err(DescriptorError::InvalidDirective { position: start });
        }
        Ok(())
    }

    fn braces(&mut self) -> Result<()> {
        let name = self.group()?;
        if !self.rest().starts_with("={") {
            self.literal.push('{');
            self.literal.push_str(name);
            self.literal.push('}');
            return Ok(());
        }
        self.pos += 1;
        let value_at = self.pos + 1;
        let value = self.group()?;

        let (marker, name) = match name.chars().next() {
            Some(':') => (Some(Marker::Parameter), &name[1..]),
            Some('#') => (Some(Marker::Constant), &name[1..]),
            _ => (None, name),
        };
        let name = name.to_string();
        if value.starts_with('%') {
            let format = parse_format(value, value_at)?;
            self.push(Token::Field {
                name,
                marker,
                format,
            });
        } else {
            self.push(Token::Constant {
                name,
                marker,
                value: value.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_format(text: &str, position: usize) -> Result<FieldFormat> {
    let invalid = || DescriptorError::InvalidFormat {
        position,
        format: text.to_string(),
    };
    let mut chars = text[1..].chars().peekable();

    let endian = match chars.peek() {
        Some('<') => {
            chars.next();
            Endian::Little
        }
        Some('>') => {
            chars.next();
            Endian::Big
        }
        _ => Endian::Little,
    };
    let modifier = match chars.peek() {
        Some('h') => Some(1),
        Some('l') => Some(4),
        Some('L') => Some(8),
        _ => None,
    };
    if modifier.is_some() {
        chars.next();
    }
    let conversion = match chars.next() {
        Some('u') => Conversion::Unsigned,
        Some('d' | 'i') => Conversion::Signed,
        Some('x') => Conversion::Hex { upper: false },
        Some('X') => Conversion::Hex { upper: true },
        Some('f') => Conversion::Float,
        _ => return Err(invalid()),
    };
    if chars.next().is_some() {
        return Err(invalid());
    }
    let width = match (conversion, modifier) {
        (Conversion::Float, None | Some(4)) => 4,
        (Conversion::Float, Some(8)) => 8,
        (Conversion::Float, Some(_)) => return Err(invalid()),
        (_, width) => width.unwrap_or(2),
    };
    Ok(FieldFormat {
        endian,
        width,
        conversion,
    })
}
