use std::collections::BTreeMap;
use std::iter::Peekable;
use std::ops::Range;
use std::str::Chars;

use logos::Logos;

use crate::LineppError;
use crate::LineppResult;
use crate::Value;

/// Raw tokens of the literal syntax accepted by `#for` and by string values
/// that are decoded into sequences.
#[derive(Logos, Debug, PartialEq, Clone, Copy)]
#[logos(skip r"[ \t\r\n\f]+")]
enum LiteralToken {
	#[token("[")]
	BracketOpen,
	#[token("]")]
	BracketClose,
	#[token("(")]
	ParenOpen,
	#[token(")")]
	ParenClose,
	#[token("{")]
	BraceOpen,
	#[token("}")]
	BraceClose,
	#[token(",")]
	Comma,
	#[token(":")]
	Colon,
	#[token("True")]
	True,
	#[token("False")]
	False,
	#[token("None")]
	None,
	#[regex(r#""([^"\\]|\\.)*""#)]
	DoubleQuotedString,
	#[regex(r"'([^'\\]|\\.)*'")]
	SingleQuotedString,
	#[regex(r"[+-]?[0-9]+")]
	Int,
	#[regex(r"[+-]?([0-9]+\.[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?")]
	#[regex(r"[+-]?[0-9]+[eE][+-]?[0-9]+")]
	Float,
	#[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
	Ident,
}

/// Decode a literal such as `[1, 'two', {"three": 3}]` into a [`Value`].
///
/// The whole input must be a single literal, surrounding whitespace aside.
pub fn parse_literal(source: &str) -> LineppResult<Value> {
	let mut parser = LiteralParser::new(source);
	let value = parser.parse_value()?;

	if parser.cursor < parser.tokens.len() {
		return Err(parser.error("unexpected trailing input"));
	}

	Ok(value)
}

struct LiteralParser<'a> {
	source: &'a str,
	tokens: Vec<(Result<LiteralToken, ()>, Range<usize>)>,
	cursor: usize,
}

impl<'a> LiteralParser<'a> {
	fn new(source: &'a str) -> Self {
		Self {
			source,
			tokens: LiteralToken::lexer(source).spanned().collect(),
			cursor: 0,
		}
	}

	fn error(&self, reason: impl Into<String>) -> LineppError {
		LineppError::MalformedLiteral {
			literal: self.source.to_string(),
			reason: reason.into(),
		}
	}

	fn peek(&self) -> Option<LiteralToken> {
		self.tokens
			.get(self.cursor)
			.and_then(|(token, _)| token.as_ref().ok().copied())
	}

	fn slice(&self) -> &'a str {
		let (_, span) = &self.tokens[self.cursor];
		&self.source[span.clone()]
	}

	/// Take the next token, failing on end of input and on bytes the lexer
	/// could not recognize.
	fn next(&mut self) -> LineppResult<(LiteralToken, &'a str)> {
		let Some((result, _)) = self.tokens.get(self.cursor) else {
			return Err(self.error("unexpected end of input"));
		};
		let Ok(token) = *result else {
			return Err(self.error(format!("unexpected character `{}`", self.slice())));
		};

		let slice = self.slice();
		self.cursor += 1;
		Ok((token, slice))
	}

	fn expect(&mut self, expected: LiteralToken, what: &str) -> LineppResult<()> {
		let (token, slice) = self.next()?;
		if token == expected {
			Ok(())
		} else {
			Err(self.error(format!("expected {what}, found `{slice}`")))
		}
	}

	fn parse_value(&mut self) -> LineppResult<Value> {
		let (token, slice) = self.next()?;

		match token {
			LiteralToken::BracketOpen => {
				let (items, _) = self.parse_items(LiteralToken::BracketClose)?;
				Ok(Value::List(items))
			}
			LiteralToken::ParenOpen => {
				let (mut items, trailing_comma) = self.parse_items(LiteralToken::ParenClose)?;
				// `(x)` is a parenthesised value, `(x,)` is a one item tuple.
				if items.len() == 1 && !trailing_comma {
					Ok(items.remove(0))
				} else {
					Ok(Value::List(items))
				}
			}
			LiteralToken::BraceOpen => self.parse_map(),
			LiteralToken::DoubleQuotedString | LiteralToken::SingleQuotedString => {
				let mut value = self.decode_string(slice)?;
				// Adjacent strings concatenate.
				while let Some(LiteralToken::DoubleQuotedString | LiteralToken::SingleQuotedString) =
					self.peek()
				{
					let (_, next_slice) = self.next()?;
					value.push_str(&self.decode_string(next_slice)?);
				}
				Ok(Value::Str(value))
			}
			LiteralToken::Int => {
				slice
					.parse::<i64>()
					.map(Value::Int)
					.map_err(|e| self.error(format!("invalid integer `{slice}`: {e}")))
			}
			LiteralToken::Float => {
				slice
					.parse::<f64>()
					.map(Value::Float)
					.map_err(|e| self.error(format!("invalid float `{slice}`: {e}")))
			}
			LiteralToken::True => Ok(Value::Bool(true)),
			LiteralToken::False => Ok(Value::Bool(false)),
			LiteralToken::None => Ok(Value::None),
			LiteralToken::Ident => Err(self.error(format!("`{slice}` is not a literal"))),
			LiteralToken::BracketClose
			| LiteralToken::ParenClose
			| LiteralToken::BraceClose
			| LiteralToken::Comma
			| LiteralToken::Colon => Err(self.error(format!("unexpected `{slice}`"))),
		}
	}

	/// Parse comma separated values up to `close`. Returns the items and
	/// whether the last item was followed by a comma.
	fn parse_items(&mut self, close: LiteralToken) -> LineppResult<(Vec<Value>, bool)> {
		let mut items = Vec::new();
		let mut trailing_comma = false;

		loop {
			if self.peek() == Some(close) {
				self.cursor += 1;
				return Ok((items, trailing_comma));
			}

			items.push(self.parse_value()?);

			let (token, slice) = self.next()?;
			if token == close {
				return Ok((items, false));
			}
			if token != LiteralToken::Comma {
				return Err(self.error(format!("expected `,` found `{slice}`")));
			}
			trailing_comma = true;
		}
	}

	fn parse_map(&mut self) -> LineppResult<Value> {
		let mut entries = BTreeMap::new();

		loop {
			if self.peek() == Some(LiteralToken::BraceClose) {
				self.cursor += 1;
				return Ok(Value::Map(entries));
			}

			let key = match self.parse_value()? {
				Value::Str(key) => key,
				other => return Err(self.error(format!("mapping keys must be strings, found `{other}`"))),
			};
			self.expect(LiteralToken::Colon, "`:`")?;
			let value = self.parse_value()?;
			entries.insert(key, value);

			let (token, slice) = self.next()?;
			match token {
				LiteralToken::BraceClose => return Ok(Value::Map(entries)),
				LiteralToken::Comma => {}
				_ => return Err(self.error(format!("expected `,` found `{slice}`"))),
			}
		}
	}

	/// Remove the delimiters and decode escapes. Both quote styles share one
	/// escape grammar.
	fn decode_string(&self, slice: &str) -> LineppResult<String> {
		let body = &slice[1..slice.len() - 1];
		if !body.contains('\\') {
			return Ok(body.to_string());
		}

		unescape(body).map_err(|reason| self.error(format!("invalid escape: {reason}")))
	}
}

/// Decode backslash escapes:
///
/// | Escape                 | Result                                   |
/// |------------------------|------------------------------------------|
/// | `\\` `\'` `\"`         | The escaped character                    |
/// | `\n` `\r` `\t`         | Newline, carriage return, tab            |
/// | `\a` `\b` `\f` `\v`     | Bell, backspace, form feed, vertical tab |
/// | `\ooo`                 | Up to three octal digits                 |
/// | `\xNN`                 | Two hex digits                           |
/// | `\uNNNN` `\UNNNNNNNN`  | Four or eight hex digits                 |
/// | backslash + newline    | Nothing                                  |
///
/// Any other escape is kept as written, backslash included.
fn unescape(body: &str) -> Result<String, String> {
	let mut out = String::with_capacity(body.len());
	let mut chars = body.chars().peekable();

	while let Some(ch) = chars.next() {
		if ch != '\\' {
			out.push(ch);
			continue;
		}

		let Some(escape) = chars.next() else {
			return Err("the string ends with a lone backslash".to_string());
		};

		match escape {
			'\n' => {}
			'\\' | '\'' | '"' => out.push(escape),
			'n' => out.push('\n'),
			'r' => out.push('\r'),
			't' => out.push('\t'),
			'a' => out.push('\u{07}'),
			'b' => out.push('\u{08}'),
			'f' => out.push('\u{0c}'),
			'v' => out.push('\u{0b}'),
			'0'..='7' => {
				let mut code = escape.to_digit(8).unwrap_or_default();
				for _ in 0..2 {
					let Some(digit) = chars.peek().and_then(|next| next.to_digit(8)) else {
						break;
					};
					code = code * 8 + digit;
					chars.next();
				}
				out.push(char::from_u32(code).ok_or_else(|| format!("`\\{code:o}` is not a character"))?);
			}
			'x' => out.push(hex_escape(&mut chars, escape, 2)?),
			'u' => out.push(hex_escape(&mut chars, escape, 4)?),
			'U' => out.push(hex_escape(&mut chars, escape, 8)?),
			'N' => return Err("named `\\N{...}` escapes are not supported".to_string()),
			other => {
				out.push('\\');
				out.push(other);
			}
		}
	}

	Ok(out)
}

fn hex_escape(chars: &mut Peekable<Chars<'_>>, escape: char, digits: usize) -> Result<char, String> {
	let mut code = 0u32;
	for _ in 0..digits {
		let Some(digit) = chars.peek().and_then(|next| next.to_digit(16)) else {
			return Err(format!("`\\{escape}` needs {digits} hex digits"));
		};
		code = code * 16 + digit;
		chars.next();
	}

	char::from_u32(code).ok_or_else(|| format!("`\\{escape}{code:x}` is not a character"))
}
