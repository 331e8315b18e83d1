//! Parser for the textual tuple literals devices publish.
//!
//! Accepts `('id', 1600000000, 1.5, -2, 3e2, 4.)`, the bracketed list form and a
//! trailing comma. Nested sequences are allowed. Nothing else (no keyed
//! structures, no expressions).

use std::fmt;

/// One parsed value
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    None,
    Seq(Vec<Literal>),
}

impl Literal {
    /// Short type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Str(_) => "string",
            Literal::Int(_) => "integer",
            Literal::Float(_) => "float",
            Literal::Bool(_) => "boolean",
            Literal::None => "None",
            Literal::Seq(_) => "sequence",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "{:?}", s),
            Literal::Int(i) => write!(f, "{}", i),
            Literal::Float(x) => write!(f, "{:?}", x),
            Literal::Bool(true) => f.write_str("True"),
            Literal::Bool(false) => f.write_str("False"),
            Literal::None => f.write_str("None"),
            Literal::Seq(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str(")")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralError {
    /// Delimiters, separators or overall structure are wrong
    Syntax { position: usize, message: String },
    /// A scalar token is not a recognised literal
    InvalidToken { position: usize, token: String },
}

impl fmt::Display for LiteralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralError::Syntax { position, message } => {
                write!(f, "{} at offset {}", message, position)
            }
            LiteralError::InvalidToken { position, token } => {
                write!(f, "invalid literal `{}` at offset {}", token, position)
            }
        }
    }
}

impl std::error::Error for LiteralError {}

/// Deepest sequence nesting accepted
pub const MAX_DEPTH: usize = 16;

/// Parse a complete literal. Surrounding whitespace is ignored; anything else
/// after the value is an error.
pub fn parse(input: &str) -> Result<Literal, LiteralError> {
    let mut parser = Parser {
        src: input.as_bytes(),
        text: input,
        pos: 0,
        depth: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    if parser.pos != parser.src.len() {
        return Err(parser.syntax("unexpected trailing characters"));
    }
    Ok(value)
}

struct Parser<'a> {
    src: &'a [u8],
    text: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn syntax(&self, message: &str) -> LiteralError {
        LiteralError::Syntax {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn value(&mut self) -> Result<Literal, LiteralError> {
        self.skip_ws();
        match self.peek() {
            None => Err(self.syntax("unexpected end of input")),
            Some(b'(') => self.sequence(b')'),
            Some(b'[') => self.sequence(b']'),
            Some(q @ (b'\'' | b'"')) => self.string(q),
            Some(_) => self.scalar(),
        }
    }

    fn sequence(&mut self, close: u8) -> Result<Literal, LiteralError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.syntax("sequence nested too deeply"));
        }
        self.depth += 1;
        let result = self.sequence_items(close);
        self.depth -= 1;
        result
    }

    fn sequence_items(&mut self, close: u8) -> Result<Literal, LiteralError> {
        let open = self.pos;
        self.pos += 1;
        let mut items = Vec::new();
        let mut separated = false;

        loop {
            self.skip_ws();
            match self.peek() {
                None => {
                    return Err(LiteralError::Syntax {
                        position: open,
                        message: "unclosed sequence".to_string(),
                    })
                }
                Some(b) if b == close => {
                    self.pos += 1;
                    break;
                }
                Some(b',') => return Err(self.syntax("unexpected `,`")),
                Some(_) => {
                    if !items.is_empty() && !separated {
                        return Err(self.syntax("expected `,`"));
                    }
                    items.push(self.value()?);
                    self.skip_ws();
                    separated = self.peek() == Some(b',');
                    if separated {
                        self.pos += 1;
                    }
                }
            }
        }

        // `(x)` without a comma is a grouped value, not a one-element tuple
        if close == b')' && items.len() == 1 && !separated {
            return Ok(items.remove(0));
        }
        Ok(Literal::Seq(items))
    }

    fn string(&mut self, quote: u8) -> Result<Literal, LiteralError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        let mut chars = self.text[self.pos..].char_indices();

        while let Some((offset, c)) = chars.next() {
            match c {
                c if c as u32 == quote as u32 => {
                    self.pos += offset + 1;
                    return Ok(Literal::Str(out));
                }
                '\\' => match chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, 'r')) => out.push('\r'),
                    Some((_, '0')) => out.push('\0'),
                    Some((_, e @ ('\\' | '\'' | '"'))) => out.push(e),
                    Some((_, other)) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => break,
                },
                c => out.push(c),
            }
        }

        Err(LiteralError::Syntax {
            position: start,
            message: "unterminated string".to_string(),
        })
    }

    fn scalar(&mut self) -> Result<Literal, LiteralError> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if !b.is_ascii_whitespace() && !b",)]".contains(&b)) {
            self.pos += 1;
        }
        let token = &self.text[start..self.pos];
        scalar_token(token).ok_or_else(|| LiteralError::InvalidToken {
            position: start,
            token: token.to_string(),
        })
    }
}

fn scalar_token(token: &str) -> Option<Literal> {
    match token {
        "True" => return Some(Literal::Bool(true)),
        "False" => return Some(Literal::Bool(false)),
        "None" => return Some(Literal::None),
        _ => {}
    }

    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    if digits.is_empty() || !digits.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }

    if digits.bytes().all(|b| b.is_ascii_digit()) {
        return token.parse::<i64>().ok().map(Literal::Int);
    }

    // Restrict to decimal notation; `parse::<f64>` alone would also take `inf`/`nan`
    let numeric = digits
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    if !numeric {
        return None;
    }
    token
        .parse::<f64>()
        .ok()
        .filter(|x| x.is_finite())
        .map(Literal::Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_device_tuple() {
        let value = parse("('A4:CF:12', 1600000000, 512.5, -3, 1e3, .25)").unwrap();
        assert_eq!(
            value,
            Literal::Seq(vec![
                Literal::Str("A4:CF:12".to_string()),
                Literal::Int(1_600_000_000),
                Literal::Float(512.5),
                Literal::Int(-3),
                Literal::Float(1000.0),
                Literal::Float(0.25),
            ])
        );
    }

    #[test]
    fn accepts_list_form_and_trailing_comma() {
        assert_eq!(
            parse(" [\"a\", 'b',] ").unwrap(),
            Literal::Seq(vec![
                Literal::Str("a".to_string()),
                Literal::Str("b".to_string())
            ])
        );
        assert_eq!(
            parse("(1,)").unwrap(),
            Literal::Seq(vec![Literal::Int(1)])
        );
        assert_eq!(parse("()").unwrap(), Literal::Seq(vec![]));
    }

    #[test]
    fn parenthesised_scalar_is_not_a_tuple() {
        assert_eq!(parse("(7)").unwrap(), Literal::Int(7));
    }

    #[test]
    fn string_escapes() {
        assert_eq!(
            parse(r"'it\'s \\ ok'").unwrap(),
            Literal::Str("it's \\ ok".to_string())
        );
        assert_eq!(parse("'ç°C'").unwrap(), Literal::Str("ç°C".to_string()));
    }

    #[test]
    fn keywords_and_nesting() {
        assert_eq!(
            parse("(True, None, (1, 2))").unwrap(),
            Literal::Seq(vec![
                Literal::Bool(true),
                Literal::None,
                Literal::Seq(vec![Literal::Int(1), Literal::Int(2)]),
            ])
        );
    }

    #[test]
    fn rejects_bad_tokens() {
        assert!(matches!(
            parse("(1, abc)"),
            Err(LiteralError::InvalidToken { token, .. }) if token == "abc"
        ));
        assert!(matches!(parse("(1.2.3,)"), Err(LiteralError::InvalidToken { .. })));
        assert!(matches!(parse("(inf, 1)"), Err(LiteralError::InvalidToken { .. })));
        assert!(matches!(parse("99999999999999999999"), Err(LiteralError::InvalidToken { .. })));
    }

    #[test]
    fn rejects_bad_structure() {
        assert!(matches!(parse("(1, 2"), Err(LiteralError::Syntax { .. })));
        assert!(matches!(parse("(1 2)"), Err(LiteralError::Syntax { .. })));
        assert!(matches!(parse("(, 1)"), Err(LiteralError::Syntax { .. })));
        assert!(matches!(parse("(1,,2)"), Err(LiteralError::Syntax { .. })));
        assert!(matches!(parse("(1) x"), Err(LiteralError::Syntax { .. })));
        assert!(matches!(parse("'open"), Err(LiteralError::Syntax { .. })));
        assert!(matches!(parse(""), Err(LiteralError::Syntax { .. })));
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let nested = format!("{}1{}", "(".repeat(MAX_DEPTH), ")".repeat(MAX_DEPTH));
        assert_eq!(parse(&nested), Ok(Literal::Int(1)));

        let too_deep = format!("{}1{}", "[".repeat(MAX_DEPTH + 1), "]".repeat(MAX_DEPTH + 1));
        assert!(matches!(
            parse(&too_deep),
            Err(LiteralError::Syntax { position, .. }) if position == MAX_DEPTH
        ));

        let hostile = "(".repeat(100_000);
        assert!(matches!(parse(&hostile), Err(LiteralError::Syntax { .. })));
    }

    #[test]
    fn display_round_trips_shape() {
        let value = parse("('x', 1, 2.5)").unwrap();
        assert_eq!(value.to_string(), "(\"x\", 1, 2.5)");
    }
}
