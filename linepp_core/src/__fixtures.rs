use std::io::Cursor;
use std::path::Path;

use chrono::NaiveDate;
use chrono::NaiveDateTime;
use tempfile::TempDir;

use crate::LineppResult;
use crate::PreprocessOptions;
use crate::Preprocessor;
use crate::Scope;

/// Name given to in-memory documents.
pub(crate) const DOCUMENT: &str = "/virtual/document.txt";

/// `2012-03-04 05:06:07`
pub(crate) fn fixed_now() -> NaiveDateTime {
	NaiveDate::from_ymd_opt(2012, 3, 4)
		.and_then(|date| date.and_hms_opt(5, 6, 7))
		.unwrap_or_else(|| panic!("invalid fixture date"))
}

pub(crate) fn preprocessor(root: &Path) -> Preprocessor {
	Preprocessor::new(PreprocessOptions::with_root(root).at(fixed_now()))
		.unwrap_or_else(|e| panic!("grammar: {e}"))
}

/// Process an in-memory document and collect the emitted lines.
pub(crate) fn render(source: &str) -> LineppResult<Vec<String>> {
	render_with(source, &Scope::new())
}

pub(crate) fn render_with(source: &str, bindings: &Scope) -> LineppResult<Vec<String>> {
	let mut lines = vec![];
	preprocessor(Path::new("/")).run_reader(
		DOCUMENT,
		Cursor::new(source.as_bytes().to_vec()),
		bindings,
		&mut lines,
	)?;
	Ok(lines)
}

/// Write `files` (relative path, content) into a fresh temporary directory.
pub(crate) fn file_tree(files: &[(&str, &str)]) -> TempDir {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));

	for (name, content) in files {
		let path = tmp.path().join(name);
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create dir: {e}"));
		}
		std::fs::write(&path, content).unwrap_or_else(|e| panic!("write {name}: {e}"));
	}

	tmp
}

/// Process `name` inside `tree`, using the tree as the root directory.
pub(crate) fn render_file(tree: &TempDir, name: &str) -> LineppResult<Vec<String>> {
	let mut lines = vec![];
	preprocessor(tree.path()).run(tree.path().join(name), &Scope::new(), &mut lines)?;
	Ok(lines)
}
