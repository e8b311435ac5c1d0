use std::path::Path;
use std::path::PathBuf;

use chrono::Local;
use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::LineppError;
use crate::LineppResult;
use crate::Scope;
use crate::Value;
use crate::scope;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["linepp.toml", ".linepp.toml"];

/// Configuration loaded from a `linepp.toml` file.
///
/// ```toml
/// # Directory that `#include "/path"` is resolved against. Relative paths
/// # are resolved against the directory containing this file.
/// root = "templates"
///
/// [values]
/// project = "linepp"
/// debug = false
/// targets = ["x86_64", "aarch64"]
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct LineppConfig {
	/// Root directory for root-relative includes.
	#[serde(default)]
	pub root: Option<PathBuf>,
	/// Initial bindings merged over the built-in defaults.
	#[serde(default)]
	pub values: Scope,
}

impl LineppConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(dir: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| dir.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file in `dir`.
	/// Returns `None` if there is none.
	pub fn load(dir: &Path) -> LineppResult<Option<LineppConfig>> {
		let Some(config_path) = Self::resolve_path(dir) else {
			return Ok(None);
		};

		Self::load_file(&config_path).map(Some)
	}

	/// Load the config at `path`. A relative `root` is made relative to the
	/// directory of `path`.
	pub fn load_file(path: &Path) -> LineppResult<LineppConfig> {
		let content = std::fs::read_to_string(path)?;
		let mut config: LineppConfig =
			toml::from_str(&content).map_err(|e| LineppError::ConfigParse(e.to_string()))?;

		if let (Some(root), Some(dir)) = (&config.root, path.parent()) {
			if root.is_relative() {
				config.root = Some(dir.join(root));
			}
		}

		tracing::debug!(path = %path.display(), values = config.values.len(), "loaded config");
		Ok(config)
	}
}

/// Per-run settings. Nothing here is shared between runs.
#[derive(Debug, Clone)]
pub struct PreprocessOptions {
	/// Directory that root-relative (`/`-prefixed) include paths resolve
	/// against.
	pub root: PathBuf,
	/// Moment used for `__DATE__` and `__TIME__`.
	pub now: NaiveDateTime,
}

impl Default for PreprocessOptions {
	fn default() -> Self {
		Self {
			root: PathBuf::from("/"),
			now: Local::now().naive_local(),
		}
	}
}

impl PreprocessOptions {
	pub fn with_root(root: impl Into<PathBuf>) -> Self {
		Self {
			root: root.into(),
			..Self::default()
		}
	}

	#[must_use]
	pub fn at(mut self, now: NaiveDateTime) -> Self {
		self.now = now;
		self
	}

	/// The built-in bindings every run starts from.
	pub fn default_bindings(&self) -> Scope {
		let mut defaults = Scope::new();
		defaults.set(scope::PLACEHOLDER, "");
		defaults.set(scope::NEWLINE, "\n");
		defaults.set(scope::INDENT, "");
		defaults.set(scope::DATE, self.now.format("%b %d %Y").to_string());
		defaults.set(scope::TIME, self.now.format("%H:%M:%S").to_string());
		defaults.set(scope::LEVEL, Value::Int(0));
		defaults
	}
}
