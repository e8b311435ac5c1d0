use std::collections::BTreeMap;
use std::path::Path;

use derive_more::Deref;
use derive_more::DerefMut;
use serde::Deserialize;
use serde::Serialize;

use crate::LineppError;
use crate::LineppResult;
use crate::Value;
use crate::interpolate;

/// Accumulated indentation prefixed onto every emitted line.
pub const INDENT: &str = "__INDENT__";
/// Absolute path of the file being read.
pub const FILE: &str = "__FILE__";
/// 1-based number of the line being processed.
pub const LINE: &str = "__LINE__";
/// Nesting depth of the current file.
pub const LEVEL: &str = "__LEVEL__";
/// Date the run started, e.g. `Oct 19 2026`.
pub const DATE: &str = "__DATE__";
/// Time the run started, e.g. `14:03:59`.
pub const TIME: &str = "__TIME__";
/// `%(\n)s` expands to a newline so `##` can produce several lines.
pub const NEWLINE: &str = "\\n";
/// Key looked up by conditionals written without a name.
pub const PLACEHOLDER: &str = "";

/// A variable environment. Each nesting level of a run owns one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, DerefMut, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(
	#[deref]
	#[deref_mut]
	BTreeMap<String, Value>,
);

impl Scope {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
		self.0.insert(name.into(), value.into());
	}

	/// Copy every binding of `other` into this scope, replacing existing ones.
	pub fn merge(&mut self, other: &Scope) {
		for (name, value) in other.iter() {
			self.0.insert(name.clone(), value.clone());
		}
	}

	pub fn indent(&self) -> &str {
		self.get(INDENT).and_then(Value::as_str).unwrap_or_default()
	}

	pub fn line(&self) -> usize {
		match self.get(LINE) {
			Some(Value::Int(line)) => usize::try_from(*line).unwrap_or_default(),
			_ => 0,
		}
	}

	pub fn file(&self) -> &Path {
		Path::new(self.get(FILE).and_then(Value::as_str).unwrap_or_default())
	}

	pub(crate) fn extend_indent(&mut self, indent: &str) {
		if indent.is_empty() {
			return;
		}
		let indent = format!("{}{indent}", self.indent());
		self.set(INDENT, indent);
	}
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Scope {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		Self(
			iter.into_iter()
				.map(|(name, value)| (name.into(), value.into()))
				.collect(),
		)
	}
}

/// The stack of scopes for one run. The bottom frame holds the global
/// defaults and can never be popped; every frame above it was copied from the
/// frame below when it was pushed.
#[derive(Debug, Clone)]
pub struct ScopeStack {
	global: Scope,
	frames: Vec<Scope>,
}

impl ScopeStack {
	pub fn new(global: Scope) -> Self {
		Self {
			global,
			frames: vec![],
		}
	}

	/// Number of frames, the global frame included.
	pub fn depth(&self) -> usize {
		self.frames.len() + 1
	}

	pub fn top(&self) -> &Scope {
		self.frames.last().unwrap_or(&self.global)
	}

	pub fn top_mut(&mut self) -> &mut Scope {
		self.frames.last_mut().unwrap_or(&mut self.global)
	}

	pub fn global(&self) -> &Scope {
		&self.global
	}

	pub fn into_global(self) -> Scope {
		self.global
	}

	/// Push an independent copy of the top frame and return it.
	pub fn push_child(&mut self) -> &mut Scope {
		let child = self.top().clone();
		self.push(child)
	}

	pub fn push(&mut self, scope: Scope) -> &mut Scope {
		self.frames.push(scope);
		self.top_mut()
	}

	/// Pop the top frame. The global frame stays in place.
	pub fn pop(&mut self) -> Option<Scope> {
		self.frames.pop()
	}

	fn frame_mut(&mut self, index: usize) -> &mut Scope {
		match index.checked_sub(1) {
			Some(index) => &mut self.frames[index],
			None => &mut self.global,
		}
	}

	/// Index from the bottom of the frame a `#define`/`#local` targets: the
	/// top frame without a level, otherwise `depth - level - 2`.
	pub fn target_index(&self, level: Option<usize>) -> LineppResult<usize> {
		let depth = self.depth();
		match level {
			None => Ok(depth - 1),
			Some(level) => {
				level
					.checked_add(2)
					.and_then(|reach| depth.checked_sub(reach))
					.ok_or(LineppError::InvalidLevel { level, depth })
			}
		}
	}

	/// Bind (or, without a value, remove) `name` in exactly one frame.
	pub fn define(&mut self, level: Option<usize>, name: &str, value: Option<&str>) -> LineppResult<()> {
		let index = self.target_index(level)?;
		assign(self.frame_mut(index), name, value)
	}

	/// Bind (or remove) `name` in every frame from the top down to and
	/// including the targeted one.
	pub fn local(&mut self, level: Option<usize>, name: &str, value: Option<&str>) -> LineppResult<()> {
		let target = self.target_index(level)?;
		for index in (target..self.depth()).rev() {
			assign(self.frame_mut(index), name, value)?;
		}

		Ok(())
	}
}

/// The value is formatted against the frame it is written into.
fn assign(scope: &mut Scope, name: &str, value: Option<&str>) -> LineppResult<()> {
	match value {
		Some(raw) => {
			let value = interpolate(raw, scope)?;
			scope.set(name, value);
		}
		None => {
			if scope.remove(name).is_none() {
				return Err(LineppError::UndefinedVariable(name.to_string()));
			}
		}
	}

	Ok(())
}
