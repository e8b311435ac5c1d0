use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::Condition;
use crate::Directive;
use crate::DirectiveLine;
use crate::Grammar;
use crate::Iterable;
use crate::LineSink;
use crate::LineStream;
use crate::LineppError;
use crate::LineppResult;
use crate::PreprocessOptions;
use crate::Scope;
use crate::ScopeStack;
use crate::SourceArena;
use crate::SourceId;
use crate::Test;
use crate::Value;
use crate::grammar::Classified;
use crate::interpolate;
use crate::parse_literal;
use crate::scope;

/// Preprocess the file at `path` and return the final global scope.
///
/// `bindings` are merged over the built-in defaults, every emitted line is
/// handed to `sink`, and `/`-prefixed include paths resolve against `root`.
pub fn preprocess(
	path: impl AsRef<Path>,
	bindings: &Scope,
	sink: &mut dyn LineSink,
	root: impl Into<PathBuf>,
) -> LineppResult<Scope> {
	Preprocessor::new(PreprocessOptions::with_root(root))?.run(path, bindings, sink)
}

/// A reusable preprocessor: the compiled directive grammar plus the options
/// each run starts from.
#[derive(Debug, Clone)]
pub struct Preprocessor {
	grammar: Grammar,
	options: PreprocessOptions,
}

impl Preprocessor {
	pub fn new(options: PreprocessOptions) -> LineppResult<Self> {
		Ok(Self {
			grammar: Grammar::new()?,
			options,
		})
	}

	pub fn options(&self) -> &PreprocessOptions {
		&self.options
	}

	/// Preprocess the file at `path`.
	pub fn run(
		&self,
		path: impl AsRef<Path>,
		bindings: &Scope,
		sink: &mut dyn LineSink,
	) -> LineppResult<Scope> {
		let path = std::path::absolute(path.as_ref())?;
		let mut sources = SourceArena::new();
		let root = sources.open(&path)?;
		self.run_source(&mut sources, root, bindings, sink)
	}

	/// Preprocess an already open stream. `name` is used for error messages
	/// and as the base of relative include paths.
	pub fn run_reader(
		&self,
		name: impl AsRef<Path>,
		reader: impl LineStream + 'static,
		bindings: &Scope,
		sink: &mut dyn LineSink,
	) -> LineppResult<Scope> {
		let name = std::path::absolute(name.as_ref())?;
		let mut sources = SourceArena::new();
		let root = sources.open_reader(name, reader);
		self.run_source(&mut sources, root, bindings, sink)
	}

	/// Preprocess `root`, a source already opened in `sources`. Every source
	/// left in the arena is closed when the run ends, whether it succeeded or
	/// not.
	pub fn run_source(
		&self,
		sources: &mut SourceArena,
		root: SourceId,
		bindings: &Scope,
		sink: &mut dyn LineSink,
	) -> LineppResult<Scope> {
		let mut global = self.options.default_bindings();
		global.merge(bindings);

		let mut run = Run {
			grammar: &self.grammar,
			root: &self.options.root,
			sink,
			stack: ScopeStack::new(global),
			blocks: vec![],
			sources,
			current: Some(root),
			outer: vec![],
			inner: vec![],
			ignoring: 0,
		};

		let frame = run.stack.push_child();
		frame.set(scope::FILE, run.sources.name(root).display().to_string());
		frame.set(scope::LINE, Value::Int(0));
		frame.set(scope::LEVEL, Value::Int(1));
		run.blocks.push(Block::Document);

		let result = run.execute();
		run.sources.close_all();
		result?;

		Ok(run.stack.into_global())
	}
}

/// The context a scope frame was pushed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
	/// The file a run starts with.
	Document,
	Include,
	Inside,
	/// A detached source brought back by a bare `#include`/`#inside`.
	Splice,
	/// `resolved` is set once a branch of the block has been taken.
	Conditional { resolved: bool },
	Iteration,
	/// A `#for` over an empty list.
	EmptyLoop,
}

/// Where the suspended source goes when a new one becomes active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
	/// Resumed when the new source ends.
	Outer,
	/// Detached until a bare `#include`/`#inside` splices it back.
	Inner,
}

/// The state of one run.
struct Run<'a> {
	grammar: &'a Grammar,
	root: &'a Path,
	sink: &'a mut dyn LineSink,
	stack: ScopeStack,
	/// One entry per frame above the global one.
	blocks: Vec<Block>,
	sources: &'a mut SourceArena,
	/// The source lines are read from. `None` once everything is consumed.
	current: Option<SourceId>,
	outer: Vec<SourceId>,
	inner: Vec<SourceId>,
	/// Zero while emitting, otherwise the number of `#end`s needed to leave
	/// the skipped branch.
	ignoring: usize,
}

impl Run<'_> {
	fn execute(&mut self) -> LineppResult<()> {
		while let Some(current) = self.current {
			let Some(line) = self.sources.read_line(current)? else {
				if self.ignoring > 0 {
					let error = LineppError::IllegalDirectiveNesting {
						directive: "end".to_string(),
						reason: "the file ended inside a skipped block".to_string(),
					};
					return Err(error.located(
						self.sources.name(current),
						self.sources.line_number(current),
					));
				}

				self.pop_context();
				continue;
			};

			let line_number = self.sources.line_number(current);
			self.stack
				.top_mut()
				.set(scope::LINE, Value::from(line_number));

			if let Err(error) = self.step(current, line_number, &line) {
				return Err(error.located(self.sources.name(current), line_number));
			}
		}

		Ok(())
	}

	fn step(&mut self, current: SourceId, line_number: usize, line: &str) -> LineppResult<()> {
		match self.grammar.classify(line) {
			Classified::Text if self.ignoring > 0 => Ok(()),
			Classified::Text => self.emit(line),
			Classified::Malformed { column } => {
				Err(LineppError::Syntax {
					file: self.sources.name(current).to_path_buf(),
					line: line_number,
					column,
					text: line.to_string(),
				})
			}
			Classified::Directive(directive) => self.directive(directive),
		}
	}

	fn directive(&mut self, DirectiveLine { indent, directive }: DirectiveLine) -> LineppResult<()> {
		tracing::trace!(directive = directive.keyword(), ignoring = self.ignoring, "directive");

		match directive {
			Directive::End => self.end(),
			Directive::Else => {
				if self.ignoring > 1 {
					return Ok(());
				}
				self.resolve_branch("else", |_| Ok(true))
			}
			Directive::Condition(condition) if condition.alternative => {
				if self.ignoring > 1 {
					return Ok(());
				}
				self.resolve_branch(condition.keyword(), |run| run.evaluate(&condition))
			}
			directive if self.ignoring > 0 => {
				if directive.opens_block() {
					self.ignoring += 1;
				}
				Ok(())
			}
			Directive::Comment => Ok(()),
			Directive::Rescan { value } => self.rescan(&indent, &value),
			Directive::Include { path } => self.include(&indent, path, Side::Outer),
			Directive::Inside { path } => self.include(&indent, path, Side::Inner),
			Directive::Define(assignment) => {
				self.stack
					.define(assignment.level, &assignment.name, assignment.value.as_deref())
			}
			Directive::Local(assignment) => {
				self.stack
					.local(assignment.level, &assignment.name, assignment.value.as_deref())
			}
			Directive::For { name, iterable } => self.iterate(&indent, name.as_deref(), iterable),
			Directive::Condition(condition) => self.condition(&indent, &condition),
		}
	}

	fn active(&self) -> LineppResult<SourceId> {
		self.current
			.ok_or_else(|| LineppError::ClosedSource("<no active source>".to_string()))
	}

	/// Interpolate `line` against the innermost scope and emit it.
	fn emit(&mut self, line: &str) -> LineppResult<()> {
		let scope = self.stack.top();
		let text = interpolate(line, scope)?;
		let line = format!("{}{text}", scope.indent());
		self.sink.emit(&line)
	}

	/// Make `next` the active source (or a fresh copy of the active one when
	/// `next` is `None`) and push `frame` for it.
	fn push_context(
		&mut self,
		mut frame: Scope,
		indent: &str,
		next: Option<SourceId>,
		side: Side,
		block: Block,
	) -> LineppResult<()> {
		let current = self.active()?;
		frame.extend_indent(indent);

		let next = match next {
			Some(next) => {
				frame.set(scope::FILE, self.sources.name(next).display().to_string());
				frame.set(scope::LINE, Value::from(self.sources.line_number(next)));
				frame.set(scope::LEVEL, Value::from(self.stack.depth()));
				next
			}
			None => self.sources.copy(current)?,
		};

		match side {
			Side::Outer => self.outer.push(current),
			Side::Inner => self.inner.push(current),
		}

		tracing::debug!(?block, depth = self.stack.depth() + 1, "push");
		self.current = Some(next);
		self.stack.push(frame);
		self.blocks.push(block);
		Ok(())
	}

	/// Leave the innermost context: drop its frame, close its source and
	/// resume the most recently suspended one.
	fn pop_context(&mut self) {
		self.stack.pop();
		let block = self.blocks.pop();

		if let Some(current) = self.current {
			self.sources.close(current);
		}
		self.current = self.outer.pop();
		tracing::debug!(?block, depth = self.stack.depth(), "pop");
	}

	fn end(&mut self) -> LineppResult<()> {
		if self.ignoring > 0 {
			self.ignoring -= 1;
			if self.ignoring > 0 {
				return Ok(());
			}
		}

		if matches!(self.blocks.last(), None | Some(Block::Document)) {
			return Err(LineppError::IllegalDirectiveNesting {
				directive: "end".to_string(),
				reason: "there is no open block to close".to_string(),
			});
		}

		self.pop_context();
		Ok(())
	}

	/// Handle `#else` and `#elif…`. Only the first branch whose test holds is
	/// taken; `test` is not consulted once the block is resolved.
	fn resolve_branch(
		&mut self,
		keyword: &str,
		test: impl FnOnce(&Self) -> LineppResult<bool>,
	) -> LineppResult<()> {
		let Some(Block::Conditional { resolved }) = self.blocks.last().copied() else {
			return Err(LineppError::IllegalDirectiveNesting {
				directive: keyword.to_string(),
				reason: "it is not inside an #if block".to_string(),
			});
		};

		let taken = !resolved && test(self)?;
		self.ignoring = usize::from(!taken);
		if taken {
			if let Some(block) = self.blocks.last_mut() {
				*block = Block::Conditional { resolved: true };
			}
		}

		Ok(())
	}

	fn evaluate(&self, condition: &Condition) -> LineppResult<bool> {
		let name = condition.name.as_deref().unwrap_or(scope::PLACEHOLDER);
		let scope = self.stack.top();
		let holds = match condition.test {
			Test::Defined => scope.contains_key(name),
			Test::Truthy => {
				scope
					.get(name)
					.ok_or_else(|| LineppError::UndefinedVariable(name.to_string()))?
					.is_truthy()
			}
		};

		Ok(holds != condition.negated)
	}

	fn condition(&mut self, indent: &str, condition: &Condition) -> LineppResult<()> {
		let taken = self.evaluate(condition)?;
		let frame = self.stack.top().clone();
		self.push_context(frame, indent, None, Side::Outer, Block::Conditional {
			resolved: taken,
		})?;
		self.ignoring = usize::from(!taken);
		Ok(())
	}

	/// `##value`: interpolate, split into lines and read them next.
	fn rescan(&mut self, indent: &str, value: &str) -> LineppResult<()> {
		let current = self.active()?;
		let text = interpolate(value, self.stack.top())?;
		let lines: Vec<String> = text.split('\n').map(|line| format!("{indent}{line}")).collect();
		self.sources.push_lines(current, lines)
	}

	fn include(&mut self, indent: &str, path: Option<String>, side: Side) -> LineppResult<()> {
		let (next, block) = match path {
			Some(path) => {
				let resolved = self.resolve(&path)?;
				tracing::debug!(path = %resolved.display(), ?side, "opening");
				let next = self.sources.open(&resolved)?;
				let block = match side {
					Side::Outer => Block::Include,
					Side::Inner => Block::Inside,
				};
				(next, block)
			}
			None => {
				let Some(next) = self.inner.pop() else {
					let directive = match side {
						Side::Outer => "include",
						Side::Inner => "inside",
					};
					return Err(LineppError::IllegalDirectiveNesting {
						directive: directive.to_string(),
						reason: "there is no source detached by #inside to splice here".to_string(),
					});
				};
				tracing::debug!(name = %self.sources.name(next).display(), "splicing");
				(next, Block::Splice)
			}
		};

		let frame = self.stack.top().clone();
		self.push_context(frame, indent, Some(next), side, block)
	}

	/// Paths starting with `/` resolve against the root directory, others
	/// against the directory of the active source.
	fn resolve(&self, path: &str) -> LineppResult<PathBuf> {
		if path.is_empty() {
			return Err(LineppError::Open {
				path: PathBuf::new(),
				source: io::Error::new(io::ErrorKind::InvalidInput, "empty include path"),
			});
		}

		let (base, relative) = match path.strip_prefix('/') {
			Some(relative) => (self.root.to_path_buf(), relative),
			None => {
				let current = self.active()?;
				let base = self
					.sources
					.name(current)
					.parent()
					.map(Path::to_path_buf)
					.unwrap_or_default();
				(base, path)
			}
		};

		Ok(std::path::absolute(base.join(relative))?)
	}

	fn iterate(&mut self, indent: &str, name: Option<&str>, iterable: Iterable) -> LineppResult<()> {
		let value = match iterable {
			Iterable::Literal(text) => parse_literal(&text)?,
			Iterable::Variable(variable) => {
				match self.stack.top().get(&variable) {
					Some(Value::Str(text)) => parse_literal(text)?,
					Some(value) => value.clone(),
					None => return Err(LineppError::UndefinedVariable(variable)),
				}
			}
		};
		let items = match value {
			Value::List(items) => items,
			other => return Err(LineppError::NotIterable(other.repr())),
		};

		let base = self.stack.top().clone();
		if items.is_empty() {
			self.push_context(base, indent, None, Side::Outer, Block::EmptyLoop)?;
			self.ignoring = 1;
			return Ok(());
		}

		tracing::debug!(items = items.len(), "expanding loop");
		let original = self.active()?;
		// Frames are stacked last item first so the first item runs first.
		for item in items.into_iter().rev() {
			let copy = self.sources.copy(original)?;
			self.push_context(base.clone(), indent, Some(copy), Side::Outer, Block::Iteration)?;

			let frame = self.stack.top_mut();
			match (name, item) {
				(Some(name), item) => frame.set(name, item),
				(None, Value::Map(entries)) => {
					for (key, value) in entries {
						frame.set(key, value);
					}
				}
				(None, item) => return Err(LineppError::NotIterable(item.repr())),
			}
		}

		Ok(())
	}
}
