use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum LineppError {
	#[error(transparent)]
	#[diagnostic(code(linepp::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to open `{}`: {source}", path.display())]
	#[diagnostic(
		code(linepp::open),
		help("include paths are relative to the including file, or to the root directory when they start with `/`")
	)]
	Open {
		path: PathBuf,
		source: std::io::Error,
	},

	#[error("invalid directive at {}:{line}:{column}: `{text}`", file.display())]
	#[diagnostic(
		code(linepp::syntax),
		help(
			"valid directives are #include, #inside, #define, #local, #if, #ifn, #ifdef, #ifndef, \
			 #elif, #else, #end, #for and ##; use `# ` for a comment"
		)
	)]
	Syntax {
		file: PathBuf,
		line: usize,
		column: usize,
		text: String,
	},

	#[error("malformed literal `{literal}`: {reason}")]
	#[diagnostic(
		code(linepp::malformed_literal),
		help("literals use quoted strings, numbers, True/False/None, [lists], (tuples) and {{\"key\": value}} mappings")
	)]
	MalformedLiteral { literal: String, reason: String },

	#[error("undefined variable: `{0}`")]
	#[diagnostic(
		code(linepp::undefined_variable),
		help("define it with `#define {0} \"value\"` or pass it as an initial binding")
	)]
	UndefinedVariable(String),

	#[error("value is not iterable: `{0}`")]
	#[diagnostic(
		code(linepp::not_iterable),
		help("#for expects a list, and a mapping for each item when no loop variable is named")
	)]
	NotIterable(String),

	#[error("invalid format in `{text}`: {reason}")]
	#[diagnostic(code(linepp::invalid_format), help("write `%%` for a literal percent sign"))]
	InvalidFormat { text: String, reason: String },

	#[error("unexpected `#{directive}`: {reason}")]
	#[diagnostic(code(linepp::illegal_nesting))]
	IllegalDirectiveNesting { directive: String, reason: String },

	#[error("scope level {level} is out of range for a stack of depth {depth}")]
	#[diagnostic(code(linepp::invalid_level))]
	InvalidLevel { level: usize, depth: usize },

	#[error("I/O operation on closed source `{0}`")]
	#[diagnostic(code(linepp::closed_source))]
	ClosedSource(String),

	#[error("invalid directive grammar: {0}")]
	#[diagnostic(code(linepp::grammar))]
	Grammar(#[from] regex::Error),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(linepp::config_parse),
		help("check that linepp.toml is valid TOML with an optional `root` key and a [values] table")
	)]
	ConfigParse(String),

	#[error("{}:{line}: {source}", file.display())]
	#[diagnostic(code(linepp::located))]
	Located {
		file: PathBuf,
		line: usize,
		#[source]
		source: Box<LineppError>,
	},
}

impl LineppError {
	/// Attach a file and line to an error that does not already carry one.
	pub fn located(self, file: impl Into<PathBuf>, line: usize) -> Self {
		match self {
			Self::Syntax { .. } | Self::Located { .. } => self,
			error => {
				Self::Located {
					file: file.into(),
					line,
					source: Box::new(error),
				}
			}
		}
	}

	/// The innermost error, skipping any location wrapper.
	pub fn kind(&self) -> &LineppError {
		match self {
			Self::Located { source, .. } => source.kind(),
			error => error,
		}
	}
}

pub type LineppResult<T> = Result<T, LineppError>;
pub type AnyError = Box<dyn std::error::Error>;
pub type AnyEmptyResult = Result<(), AnyError>;
pub type AnyResult<T> = Result<T, AnyError>;
