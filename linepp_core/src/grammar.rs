use regex::Captures;
use regex::Regex;

/// The patterns a line is tested against, in order. The first pattern that
/// matches wins. The `Malformed` rules only anchor at the start of the line:
/// they measure how much of a broken directive is valid so the error can
/// point at the rest.
const RULES: [(RuleKind, &str); 13] = [
	(
		RuleKind::Directive,
		r#"^(?P<indent>\s*)#(?P<directive>include|inside)(?:\s+(?P<name>".*"))?\s*$"#,
	),
	(
		RuleKind::Directive,
		r#"^(?P<indent>\s*)#(?P<directive>define|local)\s+(?:(?P<level>\d+)\s+)?(?P<name>\w+)(?:\s+(?P<value>".*"))?\s*$"#,
	),
	(
		RuleKind::Directive,
		r"^(?P<indent>\s*)#(?P<directive>(?:el)?ifn?(?:def)?)(?:\s+(?P<name>\w+))?\s*$",
	),
	(
		RuleKind::Directive,
		r"^(?P<indent>\s*)#(?P<directive>#)(?P<value>.*)$",
	),
	(
		RuleKind::Directive,
		r#"^(?P<indent>\s*)#(?P<directive>for)\s+(?:(?P<name>\w+)\s+)?(?P<value>(?:".*"|\w+))\s*$"#,
	),
	(
		RuleKind::Directive,
		r"^(?P<indent>\s*)#(?P<directive>end|else)\s*$",
	),
	(
		RuleKind::Directive,
		r"^(?P<indent>\s*)#(?P<directive>\s)(?P<value>.*)$",
	),
	(RuleKind::Malformed, r#"^\s*#(?:include|inside)(\s+".*"?)?\s*"#),
	(
		RuleKind::Malformed,
		r#"^\s*#(?:define|local)(\s+(?:\d+\s+)?(?:\w+\s+(?:".*")?)?)?\s*"#,
	),
	(RuleKind::Malformed, r"^\s*#(?:(?:el)?ifn?(?:def)?)(?:\s+\w+)?\s*"),
	(RuleKind::Malformed, r#"^\s*#(?:for)(?:\s+(?:\w+\s+)?(?:".*"|\w+))?\s*"#),
	(RuleKind::Malformed, r"^\s*#(?:end|else)\s*"),
	(RuleKind::Malformed, r"^\s*#"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
	Directive,
	Malformed,
}

/// The compiled directive grammar. Build it once and reuse it for every
/// line of a run.
#[derive(Debug, Clone)]
pub struct Grammar {
	rules: Vec<(RuleKind, Regex)>,
}

impl Grammar {
	pub fn new() -> Result<Self, regex::Error> {
		let rules = RULES
			.iter()
			.map(|(kind, pattern)| Ok((*kind, Regex::new(pattern)?)))
			.collect::<Result<Vec<_>, regex::Error>>()?;

		Ok(Self { rules })
	}

	/// Classify a line that has already had its line terminator removed.
	pub fn classify(&self, line: &str) -> Classified {
		for (kind, regex) in &self.rules {
			let Some(captures) = regex.captures(line) else {
				continue;
			};

			return match kind {
				RuleKind::Directive => {
					match DirectiveLine::from_captures(&captures) {
						Some(directive) => Classified::Directive(directive),
						None => Classified::Malformed { column: 0 },
					}
				}
				RuleKind::Malformed => {
					let valid = captures.get(0).map_or("", |m| m.as_str());
					Classified::Malformed {
						column: valid.chars().count(),
					}
				}
			};
		}

		Classified::Text
	}
}

/// The result of matching a line against the [`Grammar`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
	/// Not a directive.
	Text,
	Directive(DirectiveLine),
	/// Looks like a directive but is not a valid one. `column` is the length
	/// of the valid prefix.
	Malformed { column: usize },
}

/// A recognized directive together with the whitespace that preceded its
/// marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectiveLine {
	pub indent: String,
	pub directive: Directive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
	/// `#include "path"`, or bare `#include` to splice the detached source.
	Include { path: Option<String> },
	/// `#inside "path"`, or bare `#inside`.
	Inside { path: Option<String> },
	/// `#define [level] name ["value"]`
	Define(Assignment),
	/// `#local [level] name ["value"]`
	Local(Assignment),
	/// `#if`, `#ifn`, `#ifdef`, `#ifndef` and their `#elif` forms.
	Condition(Condition),
	/// `##value`
	Rescan { value: String },
	/// `#for [name] value`
	For {
		name: Option<String>,
		iterable: Iterable,
	},
	End,
	Else,
	/// `#` followed by whitespace.
	Comment,
}

impl Directive {
	pub fn keyword(&self) -> &'static str {
		match self {
			Directive::Include { .. } => "include",
			Directive::Inside { .. } => "inside",
			Directive::Define(_) => "define",
			Directive::Local(_) => "local",
			Directive::Condition(condition) => condition.keyword(),
			Directive::Rescan { .. } => "#",
			Directive::For { .. } => "for",
			Directive::End => "end",
			Directive::Else => "else",
			Directive::Comment => " ",
		}
	}

	/// Directives that open a block which a later `#end` closes.
	pub fn opens_block(&self) -> bool {
		matches!(self, Directive::For { .. })
			|| matches!(self, Directive::Condition(condition) if !condition.alternative)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
	pub level: Option<usize>,
	pub name: String,
	/// `None` removes the binding.
	pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Test {
	/// `if`/`ifn`: the value is truthy.
	Truthy,
	/// `ifdef`/`ifndef`: the name is bound.
	Defined,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
	pub test: Test,
	/// The `n` forms.
	pub negated: bool,
	/// The `el` forms.
	pub alternative: bool,
	/// `None` refers to the empty placeholder binding.
	pub name: Option<String>,
}

impl Condition {
	fn parse(keyword: &str, name: Option<String>) -> Option<Self> {
		let (alternative, rest) = match keyword.strip_prefix("el") {
			Some(rest) => (true, rest),
			None => (false, keyword),
		};
		let rest = rest.strip_prefix("if")?;
		let (negated, rest) = match rest.strip_prefix('n') {
			Some(rest) => (true, rest),
			None => (false, rest),
		};
		let test = match rest {
			"" => Test::Truthy,
			"def" => Test::Defined,
			_ => return None,
		};

		Some(Self {
			test,
			negated,
			alternative,
			name,
		})
	}

	pub fn keyword(&self) -> &'static str {
		match (self.alternative, self.negated, self.test) {
			(false, false, Test::Truthy) => "if",
			(false, true, Test::Truthy) => "ifn",
			(false, false, Test::Defined) => "ifdef",
			(false, true, Test::Defined) => "ifndef",
			(true, false, Test::Truthy) => "elif",
			(true, true, Test::Truthy) => "elifn",
			(true, false, Test::Defined) => "elifdef",
			(true, true, Test::Defined) => "elifndef",
		}
	}
}

/// What a `#for` iterates over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Iterable {
	/// A quoted literal, quotes removed.
	Literal(String),
	/// The name of a binding.
	Variable(String),
}

impl DirectiveLine {
	fn from_captures(captures: &Captures<'_>) -> Option<Self> {
		let group = |name: &str| captures.name(name).map(|m| m.as_str());
		let indent = group("indent").unwrap_or_default().to_string();
		let name = group("name").map(ToString::to_string);

		let directive = match group("directive")? {
			"include" => Directive::Include { path: name.map(unquote) },
			"inside" => Directive::Inside { path: name.map(unquote) },
			keyword @ ("define" | "local") => {
				let level = match group("level") {
					Some(level) => Some(level.parse().ok()?),
					None => None,
				};
				let assignment = Assignment {
					level,
					name: name?,
					value: group("value").map(|value| unquote(value.to_string())),
				};
				if keyword == "define" {
					Directive::Define(assignment)
				} else {
					Directive::Local(assignment)
				}
			}
			"#" => {
				Directive::Rescan {
					value: group("value").unwrap_or_default().to_string(),
				}
			}
			"for" => {
				let value = group("value")?;
				let iterable = if value.starts_with('"') {
					Iterable::Literal(unquote(value.to_string()))
				} else {
					Iterable::Variable(value.to_string())
				};
				Directive::For { name, iterable }
			}
			"end" => Directive::End,
			"else" => Directive::Else,
			keyword if keyword.trim().is_empty() => Directive::Comment,
			keyword => Directive::Condition(Condition::parse(keyword, name)?),
		};

		Some(Self { indent, directive })
	}
}

/// Strip the surrounding double quotes captured by the grammar.
fn unquote(value: String) -> String {
	value
		.strip_prefix('"')
		.and_then(|value| value.strip_suffix('"'))
		.map_or_else(|| value.clone(), ToString::to_string)
}
