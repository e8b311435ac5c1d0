use std::fs::File;
use std::io::BufWriter;
use std::io::Write;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use linepp_cli::LineppCli;
use linepp_core::AnyEmptyResult;
use linepp_core::LineppConfig;
use linepp_core::LineppError;
use linepp_core::LineppResult;
use linepp_core::PreprocessOptions;
use linepp_core::Preprocessor;
use linepp_core::WriteSink;
use tracing_subscriber::EnvFilter;

fn main() {
	let args = LineppCli::parse();
	let use_color = std::env::var_os("NO_COLOR").is_none();

	// Install miette's fancy handler for rich error diagnostics.
	miette::set_hook(Box::new(move |_| {
		Box::new(
			miette::MietteHandlerOpts::new()
				.color(use_color)
				.unicode(use_color)
				.build(),
		)
	}))
	.ok();

	init_tracing(args.verbose, use_color);

	if let Err(e) = run(&args) {
		match e.downcast::<LineppError>() {
			Ok(linepp_err) => {
				let report: miette::Report = (*linepp_err).into();
				eprintln!("{report:?}");
			}
			Err(e) => {
				eprintln!("error: {e}");
			}
		}
		process::exit(2);
	}
}

/// `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool, use_color: bool) {
	let default_directive = if verbose { "linepp_core=debug,linepp=debug" } else { "warn" };
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_ansi(use_color)
		.without_time()
		.init();
}

fn load_config(args: &LineppCli) -> LineppResult<LineppConfig> {
	if let Some(path) = &args.config {
		return LineppConfig::load_file(path);
	}

	let cwd = std::env::current_dir()?;
	Ok(LineppConfig::load(&cwd)?.unwrap_or_default())
}

fn run(args: &LineppCli) -> AnyEmptyResult {
	let config = load_config(args)?;
	let root = args
		.root
		.clone()
		.or(config.root)
		.unwrap_or_else(|| PathBuf::from("/"));
	let preprocessor = Preprocessor::new(PreprocessOptions::with_root(root))?;

	let mut bindings = config.values;
	for (name, value) in &args.defines {
		bindings.set(name.as_str(), value.as_str());
	}

	let writer: Box<dyn Write> = match &args.output {
		Some(path) => {
			let file = File::create(path).map_err(|source| {
				LineppError::Open {
					path: path.clone(),
					source,
				}
			})?;
			Box::new(file)
		}
		None => Box::new(std::io::stdout().lock()),
	};
	let mut sink = WriteSink(BufWriter::new(writer));

	// Each file starts from the global scope the previous one left behind.
	for file in &args.files {
		tracing::debug!(file = %file.display(), "preprocessing");
		bindings = preprocessor.run(file, &bindings, &mut sink)?;
	}

	sink.into_inner().flush()?;
	Ok(())
}
