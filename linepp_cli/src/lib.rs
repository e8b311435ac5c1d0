use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(
	author,
	version,
	about = "Preprocess text files with line directives.",
	long_about = "linepp is a line-oriented text preprocessor. Lines starting with `#` are \
	              directives: #include, #inside, #define, #local, #if, #ifdef, #elif, #else, \
	              #for, #end and ##. Every other line is copied to the output with \
	              `%(name)s` references replaced by bound values.\n\nFiles are processed in \
	              order. Values defined at the global level of one file are visible to the \
	              files that follow it."
)]
pub struct LineppCli {
	/// Files to preprocess.
	#[arg(required = true)]
	pub files: Vec<PathBuf>,

	/// Write the output to this file instead of stdout.
	#[arg(long, short)]
	pub output: Option<PathBuf>,

	/// Directory that include paths starting with `/` resolve against.
	/// Overrides `root` from the config file.
	#[arg(long, short)]
	pub root: Option<PathBuf>,

	/// Config file to load. Defaults to `linepp.toml` or `.linepp.toml` in
	/// the current directory when one exists.
	#[arg(long, short)]
	pub config: Option<PathBuf>,

	/// Bind NAME to VALUE before processing. Can be repeated and overrides
	/// values from the config file.
	#[arg(long = "define", short = 'D', value_name = "NAME=VALUE", value_parser = parse_definition)]
	pub defines: Vec<(String, String)>,

	/// Enable verbose output.
	#[arg(long, short, default_value_t = false)]
	pub verbose: bool,
}

/// Split a `NAME=VALUE` argument.
pub fn parse_definition(raw: &str) -> Result<(String, String), String> {
	let Some((name, value)) = raw.split_once('=') else {
		return Err(format!("expected NAME=VALUE, found `{raw}`"));
	};

	if name.is_empty() {
		return Err(format!("missing name in `{raw}`"));
	}

	Ok((name.to_string(), value.to_string()))
}
