//! Percent-style mapping interpolation.
//!
//! Ordinary lines, `##` values and `#define`/`#local` values are formatted
//! against a [`Scope`]:
//!
//! | Sequence        | Meaning                                          |
//! |-----------------|--------------------------------------------------|
//! | `%%`            | A literal `%`                                    |
//! | `%(name)s`      | The display form of `name`                       |
//! | `%(name)r`      | The quoted form of `name`                        |
//! | `%(name)d`      | `name` as an integer (`i` and `u` are synonyms)  |
//! | `%(name).2f`    | `name` as a fixed point number                   |
//! | `%(name).3e`    | `name` in scientific notation (`E` upper-cases)  |
//! | `%(name)g`      | The shorter of `f` and `e` (`G` upper-cases)     |
//! | `%(name)x`      | `name` in hexadecimal (`X` and `o` also work)    |
//! | `%(name)c`      | The character for a code point or 1-char string  |
//!
//! Flags (`-0+ #`), a width and a precision may appear between the closing
//! parenthesis and the conversion character.

use std::iter::Peekable;
use std::str::Chars;

use crate::LineppError;
use crate::LineppResult;
use crate::Scope;
use crate::Value;
use crate::value::format_float;

/// Format `text` against `scope`. Text without a `%` is returned as is.
pub fn interpolate(text: &str, scope: &Scope) -> LineppResult<String> {
	if !text.contains('%') {
		return Ok(text.to_string());
	}

	let mut out = String::with_capacity(text.len());
	let mut chars = text.chars().peekable();

	while let Some(ch) = chars.next() {
		if ch != '%' {
			out.push(ch);
			continue;
		}

		match chars.next() {
			Some('%') => out.push('%'),
			Some('(') => {
				let key = read_key(&mut chars).ok_or_else(|| invalid(text, "incomplete format key"))?;
				let spec = FormatSpec::parse(&mut chars).map_err(|reason| invalid(text, reason))?;
				let value = scope
					.get(&key)
					.ok_or_else(|| LineppError::UndefinedVariable(key.clone()))?;
				out.push_str(&spec.apply(value).map_err(|reason| invalid(text, reason))?);
			}
			Some(other) => {
				return Err(invalid(
					text,
					format!("`%{other}` needs a mapping key such as `%(name)s`"),
				));
			}
			None => return Err(invalid(text, "incomplete format")),
		}
	}

	Ok(out)
}

fn invalid(text: &str, reason: impl Into<String>) -> LineppError {
	LineppError::InvalidFormat {
		text: text.to_string(),
		reason: reason.into(),
	}
}

/// Read a key up to its balancing `)`.
fn read_key(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
	let mut key = String::new();
	let mut depth = 1usize;

	for ch in chars.by_ref() {
		match ch {
			'(' => depth += 1,
			')' => {
				depth -= 1;
				if depth == 0 {
					return Some(key);
				}
			}
			_ => {}
		}
		key.push(ch);
	}

	None
}

#[derive(Debug, Default)]
#[allow(clippy::struct_excessive_bools)]
struct FormatSpec {
	left: bool,
	zero: bool,
	plus: bool,
	space: bool,
	alternate: bool,
	width: Option<usize>,
	precision: Option<usize>,
	conversion: char,
}

impl FormatSpec {
	fn parse(chars: &mut Peekable<Chars<'_>>) -> Result<Self, String> {
		let mut spec = FormatSpec::default();

		while let Some(&ch) = chars.peek() {
			match ch {
				'-' => spec.left = true,
				'0' => spec.zero = true,
				'+' => spec.plus = true,
				' ' => spec.space = true,
				'#' => spec.alternate = true,
				_ => break,
			}
			chars.next();
		}

		spec.width = read_number(chars);
		if chars.peek() == Some(&'.') {
			chars.next();
			spec.precision = Some(read_number(chars).unwrap_or(0));
		}

		match chars.next() {
			Some(
				conversion @ ('s' | 'r' | 'c' | 'd' | 'i' | 'u' | 'f' | 'F' | 'e' | 'E' | 'g' | 'G' | 'x'
				| 'X' | 'o'),
			) => {
				spec.conversion = conversion;
				Ok(spec)
			}
			Some(other) => Err(format!("unsupported format character `{other}`")),
			None => Err("incomplete format".to_string()),
		}
	}

	fn apply(&self, value: &Value) -> Result<String, String> {
		match self.conversion {
			's' | 'r' => {
				let text = if self.conversion == 's' {
					value.to_string()
				} else {
					value.repr()
				};
				let text = match self.precision {
					Some(precision) => text.chars().take(precision).collect(),
					None => text,
				};
				Ok(self.pad("", text, false))
			}
			'd' | 'i' | 'u' => {
				let number = integer_of(value, self.conversion)?;
				let digits = number.unsigned_abs().to_string();
				Ok(self.pad(self.sign(number < 0), digits, true))
			}
			'f' | 'F' => {
				let number = float_of(value, self.conversion)?;
				let precision = self.precision.unwrap_or(6);
				let digits = if number.is_finite() {
					format!("{:.*}", precision, number.abs())
				} else {
					format_float(number.abs())
				};
				Ok(self.pad(self.sign(number.is_sign_negative()), digits, true))
			}
			'e' | 'E' | 'g' | 'G' => {
				let number = float_of(value, self.conversion)?;
				let digits = if !number.is_finite() {
					format_float(number.abs())
				} else if matches!(self.conversion, 'e' | 'E') {
					scientific(number.abs(), self.precision.unwrap_or(6), self.alternate)
				} else {
					general(number.abs(), self.precision.unwrap_or(6), self.alternate)
				};
				let digits = if self.conversion.is_ascii_uppercase() {
					digits.to_uppercase()
				} else {
					digits
				};
				Ok(self.pad(self.sign(number.is_sign_negative()), digits, true))
			}
			'c' => {
				let ch = match value {
					Value::Int(code) => {
						u32::try_from(*code)
							.ok()
							.and_then(char::from_u32)
							.ok_or_else(|| format!("%c format: `{code}` is not a valid code point"))?
					}
					Value::Str(text) if text.chars().count() == 1 => text.chars().next().unwrap_or_default(),
					other => {
						return Err(format!(
							"%c format: a code point or a single character is required, not `{other}`"
						));
					}
				};
				Ok(self.pad("", ch.to_string(), false))
			}
			_ => {
				let number = integer_of(value, self.conversion)?;
				let magnitude = number.unsigned_abs();
				let (digits, prefix) = match self.conversion {
					'x' => (format!("{magnitude:x}"), "0x"),
					'X' => (format!("{magnitude:X}"), "0X"),
					_ => (format!("{magnitude:o}"), "0o"),
				};
				let mut sign = self.sign(number < 0).to_string();
				if self.alternate {
					sign.push_str(prefix);
				}
				Ok(self.pad(&sign, digits, true))
			}
		}
	}

	fn sign(&self, negative: bool) -> &'static str {
		if negative {
			"-"
		} else if self.plus {
			"+"
		} else if self.space {
			" "
		} else {
			""
		}
	}

	/// Apply width and justification. Zero padding goes between the sign and
	/// the digits and only applies to numbers.
	fn pad(&self, sign: &str, body: String, numeric: bool) -> String {
		let len = sign.chars().count() + body.chars().count();
		let Some(fill) = self.width.and_then(|width| width.checked_sub(len)) else {
			return format!("{sign}{body}");
		};

		if self.left {
			format!("{sign}{body}{}", " ".repeat(fill))
		} else if self.zero && numeric {
			format!("{sign}{}{body}", "0".repeat(fill))
		} else {
			format!("{}{sign}{body}", " ".repeat(fill))
		}
	}
}

/// `number` as `d.ddde+XX`, the exponent signed and at least two digits wide.
fn scientific(number: f64, precision: usize, alternate: bool) -> String {
	let text = format!("{number:.precision$e}");
	let (mantissa, exponent) = text.split_once('e').unwrap_or((&text, "0"));
	let exponent: i32 = exponent.parse().unwrap_or_default();
	let point = if alternate && precision == 0 { "." } else { "" };
	let sign = if exponent < 0 { '-' } else { '+' };
	format!("{mantissa}{point}e{sign}{:02}", exponent.unsigned_abs())
}

/// Fixed notation while the exponent lies in `-4..precision`, scientific
/// otherwise. Trailing zeros are dropped unless `alternate` is set.
fn general(number: f64, precision: usize, alternate: bool) -> String {
	let precision = precision.max(1);
	let significant = precision - 1;
	let exponent: i32 = format!("{number:.significant$e}")
		.split_once('e')
		.and_then(|(_, exponent)| exponent.parse().ok())
		.unwrap_or_default();
	let limit = i32::try_from(precision).unwrap_or(i32::MAX);

	let text = if (-4..limit).contains(&exponent) {
		let decimals = usize::try_from(limit - 1 - exponent).unwrap_or_default();
		format!("{number:.decimals$}")
	} else {
		scientific(number, significant, false)
	};
	if alternate {
		return text;
	}

	match text.split_once('e') {
		Some((mantissa, exponent)) => format!("{}e{exponent}", trim_zeros(mantissa)),
		None => trim_zeros(&text).to_string(),
	}
}

fn trim_zeros(digits: &str) -> &str {
	if digits.contains('.') {
		digits.trim_end_matches('0').trim_end_matches('.')
	} else {
		digits
	}
}

fn read_number(chars: &mut Peekable<Chars<'_>>) -> Option<usize> {
	let mut digits = String::new();
	while let Some(&ch) = chars.peek() {
		if !ch.is_ascii_digit() {
			break;
		}
		digits.push(ch);
		chars.next();
	}
	digits.parse().ok()
}

fn integer_of(value: &Value, conversion: char) -> Result<i64, String> {
	match value {
		Value::Int(number) => Ok(*number),
		Value::Bool(flag) => Ok(i64::from(*flag)),
		Value::Float(number) if number.is_finite() => Ok(number.trunc() as i64),
		other => Err(format!("%{conversion} format: a number is required, not `{other}`")),
	}
}

fn float_of(value: &Value, conversion: char) -> Result<f64, String> {
	match value {
		Value::Int(number) => Ok(*number as f64),
		Value::Bool(flag) => Ok(f64::from(u8::from(*flag))),
		Value::Float(number) => Ok(*number),
		other => Err(format!("%{conversion} format: a number is required, not `{other}`")),
	}
}
