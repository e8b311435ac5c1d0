//! `linepp_core` is the engine behind [linepp](https://github.com/ifiokjr/linepp), a line-oriented text preprocessor. It reads a document line by line, acts on directive lines (conditionals, scoped variables, file inclusion, iteration and re-scanning) and emits every other line with variables interpolated.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Document
//!   → Line source (pushback, deferred seeks, replay for #for)
//!   → Grammar (ordered directive patterns, first match wins)
//!   → Engine (ignore depth, outer/inner source stacks, scope stack)
//!   → Interpolation (`%(name)s` against the innermost scope)
//!   → Line sink
//! ```
//!
//! ## Directives
//!
//! | Directive                      | Effect                                               |
//! |--------------------------------|------------------------------------------------------|
//! | `#include "path"`              | Process another file in a nested scope              |
//! | `#inside "path"`               | Process another file that splices this one back     |
//! | `#include` / `#inside`         | Splice the source detached by `#inside` here        |
//! | `#define [level] name ["v"]`   | Bind or remove `name` in one scope                   |
//! | `#local [level] name ["v"]`    | Bind or remove `name` in every scope down to `level` |
//! | `#if` `#ifn` `#ifdef` `#ifndef`| Open a conditional block                             |
//! | `#elif…` / `#else`             | Alternative branches, the first one that holds wins  |
//! | `#for [name] value`            | Repeat the block once per item of a list             |
//! | `#end`                         | Close the innermost block or included file           |
//! | `##value`                      | Interpolate `value` and read the result as input     |
//! | `# comment`                    | Ignored                                              |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use linepp_core::Scope;
//! use linepp_core::preprocess;
//!
//! let mut lines: Vec<String> = vec![];
//! let globals = preprocess("page.txt", &Scope::new(), &mut lines, "/").unwrap();
//!
//! for line in &lines {
//! 	println!("{line}");
//! }
//! println!("{} globals", globals.len());
//! ```

pub use config::*;
pub use engine::*;
pub use error::*;
pub use grammar::*;
pub use interpolate::*;
pub use literal::*;
pub use scope::Scope;
pub use scope::ScopeStack;
pub use sink::*;
pub use source::*;
pub use value::*;

pub mod config;
mod engine;
#[allow(unused_assignments)]
mod error;
mod grammar;
mod interpolate;
mod literal;
pub mod scope;
mod sink;
pub mod source;
mod value;

#[cfg(test)]
mod __fixtures;
#[cfg(test)]
mod __tests;
