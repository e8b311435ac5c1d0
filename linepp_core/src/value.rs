use std::collections::BTreeMap;
use std::fmt::Display;
use std::fmt::Write;

use float_cmp::approx_eq;
use serde::Deserialize;
use serde::Serialize;

/// A value bound to a name in a [`Scope`](crate::Scope).
///
/// Directive arguments are always stored as strings. The richer variants come
/// from decoded literals (see [`parse_literal`](crate::parse_literal)), from
/// iteration bindings and from initial bindings supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
	Bool(bool),
	Int(i64),
	Float(f64),
	Str(String),
	List(Vec<Value>),
	Map(BTreeMap<String, Value>),
	None,
}

impl Eq for Value {}
impl PartialEq for Value {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(Value::None, Value::None) => true,
			(Value::Bool(value), Value::Bool(other_value)) => value == other_value,
			(Value::Int(value), Value::Int(other_value)) => value == other_value,
			(Value::Float(value), Value::Float(other_value)) => {
				approx_eq!(f64, *value, *other_value, ulps = 2)
			}
			(Value::Str(value), Value::Str(other_value)) => value == other_value,
			(Value::List(value), Value::List(other_value)) => value == other_value,
			(Value::Map(value), Value::Map(other_value)) => value == other_value,
			_ => false,
		}
	}
}

impl Value {
	/// Empty strings and containers, zero, `False` and `None` are falsy.
	pub fn is_truthy(&self) -> bool {
		match self {
			Value::None => false,
			Value::Bool(value) => *value,
			Value::Int(value) => *value != 0,
			Value::Float(value) => *value != 0.0,
			Value::Str(value) => !value.is_empty(),
			Value::List(items) => !items.is_empty(),
			Value::Map(entries) => !entries.is_empty(),
		}
	}

	pub fn as_str(&self) -> Option<&str> {
		match self {
			Value::Str(value) => Some(value),
			_ => None,
		}
	}

	/// The quoted form used inside containers and by the `%r` conversion.
	pub fn repr(&self) -> String {
		let mut out = String::new();
		self.write_repr(&mut out);
		out
	}

	fn write_repr(&self, out: &mut String) {
		match self {
			Value::Str(value) => write_quoted(value, out),
			Value::List(items) => {
				out.push('[');
				for (index, item) in items.iter().enumerate() {
					if index > 0 {
						out.push_str(", ");
					}
					item.write_repr(out);
				}
				out.push(']');
			}
			Value::Map(entries) => {
				out.push('{');
				for (index, (key, value)) in entries.iter().enumerate() {
					if index > 0 {
						out.push_str(", ");
					}
					write_quoted(key, out);
					out.push_str(": ");
					value.write_repr(out);
				}
				out.push('}');
			}
			scalar => {
				let _ = write!(out, "{scalar}");
			}
		}
	}
}

/// Single quotes unless the text contains a single quote and no double quote.
fn write_quoted(value: &str, out: &mut String) {
	let quote = if value.contains('\'') && !value.contains('"') {
		'"'
	} else {
		'\''
	};

	out.push(quote);
	for ch in value.chars() {
		match ch {
			'\\' => out.push_str("\\\\"),
			'\n' => out.push_str("\\n"),
			'\r' => out.push_str("\\r"),
			'\t' => out.push_str("\\t"),
			ch if ch == quote => {
				out.push('\\');
				out.push(ch);
			}
			ch => out.push(ch),
		}
	}
	out.push(quote);
}

pub(crate) fn format_float(value: f64) -> String {
	if value.is_nan() {
		"nan".to_string()
	} else if value.is_infinite() {
		if value > 0.0 { "inf" } else { "-inf" }.to_string()
	} else if value.fract() == 0.0 && value.abs() < 1e16 {
		format!("{value:.1}")
	} else {
		format!("{value}")
	}
}

impl Display for Value {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Value::None => write!(f, "None"),
			Value::Bool(true) => write!(f, "True"),
			Value::Bool(false) => write!(f, "False"),
			Value::Int(value) => write!(f, "{value}"),
			Value::Float(value) => write!(f, "{}", format_float(*value)),
			Value::Str(value) => write!(f, "{value}"),
			container => write!(f, "{}", container.repr()),
		}
	}
}

impl From<&str> for Value {
	fn from(value: &str) -> Self {
		Value::Str(value.to_string())
	}
}

impl From<String> for Value {
	fn from(value: String) -> Self {
		Value::Str(value)
	}
}

impl From<i64> for Value {
	fn from(value: i64) -> Self {
		Value::Int(value)
	}
}

impl From<usize> for Value {
	fn from(value: usize) -> Self {
		Value::Int(value as i64)
	}
}

impl From<bool> for Value {
	fn from(value: bool) -> Self {
		Value::Bool(value)
	}
}

impl From<f64> for Value {
	fn from(value: f64) -> Self {
		Value::Float(value)
	}
}

impl From<Vec<Value>> for Value {
	fn from(items: Vec<Value>) -> Self {
		Value::List(items)
	}
}

impl From<BTreeMap<String, Value>> for Value {
	fn from(entries: BTreeMap<String, Value>) -> Self {
		Value::Map(entries)
	}
}
