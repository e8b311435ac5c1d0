use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;

use rstest::rstest;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::grammar::Classified;

fn list(items: impl IntoIterator<Item = Value>) -> Value {
	Value::List(items.into_iter().collect())
}

fn map(entries: impl IntoIterator<Item = (&'static str, Value)>) -> Value {
	Value::Map(
		entries
			.into_iter()
			.map(|(key, value)| (key.to_string(), value))
			.collect::<BTreeMap<_, _>>(),
	)
}

fn stream(text: &str) -> Cursor<Vec<u8>> {
	Cursor::new(text.as_bytes().to_vec())
}

#[rstest]
#[case::list("[1, 2, 3]", list([Value::Int(1), Value::Int(2), Value::Int(3)]))]
#[case::quotes(r#"['a', "b"]"#, list([Value::from("a"), Value::from("b")]))]
#[case::trailing_comma("[1, 2,]", list([Value::Int(1), Value::Int(2)]))]
#[case::tuple("(1,)", list([Value::Int(1)]))]
#[case::parenthesized("(1)", Value::Int(1))]
#[case::empty_tuple("()", Value::List(vec![]))]
#[case::constants("[True, False, None]", list([Value::Bool(true), Value::Bool(false), Value::None]))]
#[case::numbers("[-1, 2.5]", list([Value::Int(-1), Value::Float(2.5)]))]
#[case::escape(r"'a\nb'", Value::from("a\nb"))]
#[case::concatenation(r#"'a' "b""#, Value::from("ab"))]
#[case::escaped_double_in_single(r#"['a\"b']"#, list([Value::from("a\"b")]))]
#[case::escaped_single_in_double(r#""it\'s""#, Value::from("it's"))]
#[case::hex_escape(r"['\x41']", list([Value::from("A")]))]
#[case::octal_escape(r"'\101\0'", Value::from("A\0"))]
#[case::unicode_escape(r"'\u00e9\U0001F600'", Value::from("\u{e9}\u{1f600}"))]
#[case::unknown_escape_kept(r"'\q'", Value::from("\\q"))]
#[case::mapping(
	"{'name': 'x', 'n': 2}",
	map([("name", Value::from("x")), ("n", Value::Int(2))])
)]
#[case::nested(
	"[{'items': [1]}, []]",
	list([map([("items", list([Value::Int(1)]))]), Value::List(vec![])])
)]
fn parses_literals(#[case] source: &str, #[case] expected: Value) -> LineppResult<()> {
	assert_eq!(parse_literal(source)?, expected);

	Ok(())
}

#[rstest]
#[case::bare_word("abc")]
#[case::empty("")]
#[case::unclosed("[1, 2")]
#[case::missing_comma("[1 2]")]
#[case::trailing_input("[1]]")]
#[case::numeric_key("{1: 2}")]
#[case::short_hex_escape(r"'\x4'")]
#[case::named_escape(r"'\N{DASH}'")]
fn rejects_malformed_literals(#[case] source: &str) {
	let result = parse_literal(source);
	assert!(
		matches!(result, Err(LineppError::MalformedLiteral { .. })),
		"{source:?} gave {result:?}"
	);
}

fn format_scope() -> Scope {
	[
		("name", Value::from("World")),
		("n", Value::Int(42)),
		("byte", Value::Int(255)),
		("pi", Value::Float(3.141_59)),
		("tiny", Value::Float(0.000_01)),
		("big", Value::Float(1_234_567.0)),
		("debt", Value::Float(-1234.5)),
		("quoted", Value::from("it")),
		("mixed", list([Value::Int(1), Value::from("a")])),
		("flag", Value::Bool(true)),
		(scope::NEWLINE, Value::from("\n")),
	]
	.into_iter()
	.collect()
}

#[rstest]
#[case::plain("no markers here", "no markers here")]
#[case::string("Hello, %(name)s!", "Hello, World!")]
#[case::percent("100%%", "100%")]
#[case::zero_padded("%(n)05d", "00042")]
#[case::left_aligned("%(n)-4d|", "42  |")]
#[case::signed("%(n)+d", "+42")]
#[case::precision("%(pi).2f", "3.14")]
#[case::hex("%(byte)x", "ff")]
#[case::alternate_hex("%(byte)#x", "0xff")]
#[case::octal("%(byte)o", "377")]
#[case::repr("%(quoted)r", "'it'")]
#[case::container("%(mixed)s", "[1, 'a']")]
#[case::boolean("%(flag)s", "True")]
#[case::width("[%(name)8s]", "[   World]")]
#[case::newline(r"a%(\n)sb", "a\nb")]
#[case::scientific("%(pi).3e", "3.142e+00")]
#[case::scientific_default_precision("%(n)e", "4.200000e+01")]
#[case::scientific_upper("%(debt)E", "-1.234500E+03")]
#[case::general_fixed("%(pi)g", "3.14159")]
#[case::general_small("%(tiny)g", "1e-05")]
#[case::general_large("%(big)g", "1.23457e+06")]
#[case::general_integral("%(byte)G", "255")]
#[case::general_alternate("%(byte)#g", "255.000")]
#[case::character_from_code_point("%(n)c", "*")]
#[case::character_padded("[%(quoted).1s%(n)3c]", "[i  *]")]
fn interpolates(#[case] text: &str, #[case] expected: &str) -> LineppResult<()> {
	assert_eq!(interpolate(text, &format_scope())?, expected);

	Ok(())
}

#[rstest]
#[case::trailing_percent("50%")]
#[case::unkeyed("%s")]
#[case::unsupported_conversion("%(name)q")]
#[case::unterminated_key("%(name")]
#[case::string_as_number("%(name)d")]
#[case::string_as_scientific("%(name)e")]
#[case::long_string_as_character("%(quoted)c")]
#[case::float_as_character("%(pi)c")]
fn rejects_invalid_formats(#[case] text: &str) {
	let result = interpolate(text, &format_scope());
	assert!(
		matches!(result, Err(LineppError::InvalidFormat { .. })),
		"{text:?} gave {result:?}"
	);
}

#[test]
fn interpolation_requires_bound_names() {
	let result = interpolate("%(missing)s", &format_scope());
	assert!(matches!(result, Err(LineppError::UndefinedVariable(name)) if name == "missing"));
}

fn directive(indent: &str, directive: Directive) -> Classified {
	Classified::Directive(DirectiveLine {
		indent: indent.to_string(),
		directive,
	})
}

fn condition(test: Test, negated: bool, alternative: bool, name: Option<&str>) -> Directive {
	Directive::Condition(Condition {
		test,
		negated,
		alternative,
		name: name.map(ToString::to_string),
	})
}

#[rstest]
#[case::text("plain text", Classified::Text)]
#[case::inline_hash("a # b", Classified::Text)]
#[case::include(
	r#"#include "a.txt""#,
	directive("", Directive::Include { path: Some("a.txt".into()) })
)]
#[case::bare_include("  #include", directive("  ", Directive::Include { path: None }))]
#[case::inside(
	r#"#inside "layout.txt"  "#,
	directive("", Directive::Inside { path: Some("layout.txt".into()) })
)]
#[case::define_with_level(
	r#"#define 2 name "v""#,
	directive("", Directive::Define(Assignment { level: Some(2), name: "name".into(), value: Some("v".into()) }))
)]
#[case::undefine(
	"#define name",
	directive("", Directive::Define(Assignment { level: None, name: "name".into(), value: None }))
)]
#[case::local(
	"\t#local x \"1\"",
	directive("\t", Directive::Local(Assignment { level: None, name: "x".into(), value: Some("1".into()) }))
)]
#[case::if_truthy("#if flag", directive("", condition(Test::Truthy, false, false, Some("flag"))))]
#[case::if_without_name("#if", directive("", condition(Test::Truthy, false, false, None)))]
#[case::ifn("#ifn flag", directive("", condition(Test::Truthy, true, false, Some("flag"))))]
#[case::ifdef("#ifdef", directive("", condition(Test::Defined, false, false, None)))]
#[case::elifndef("#elifndef X", directive("", condition(Test::Defined, true, true, Some("X"))))]
#[case::rescan(
	r"  ##a%(\n)sb",
	directive("  ", Directive::Rescan { value: r"a%(\n)sb".into() })
)]
#[case::for_literal(
	r#"#for x "[1]""#,
	directive("", Directive::For { name: Some("x".into()), iterable: Iterable::Literal("[1]".into()) })
)]
#[case::for_variable(
	"#for items",
	directive("", Directive::For { name: None, iterable: Iterable::Variable("items".into()) })
)]
#[case::end("#end  ", directive("", Directive::End))]
#[case::else_branch("#else", directive("", Directive::Else))]
#[case::comment("# a comment", directive("", Directive::Comment))]
#[case::misspelled("#iff x", Classified::Malformed { column: 3 })]
#[case::end_with_argument("#end now", Classified::Malformed { column: 5 })]
#[case::unknown("#pragma once", Classified::Malformed { column: 1 })]
#[case::define_without_name("#define", Classified::Malformed { column: 7 })]
fn classifies_lines(#[case] line: &str, #[case] expected: Classified) -> LineppResult<()> {
	let grammar = Grammar::new()?;
	assert_eq!(grammar.classify(line), expected);

	Ok(())
}

#[test]
fn child_scopes_are_independent() {
	let mut stack = ScopeStack::new(Scope::from_iter([("x", "global")]));
	stack.push_child().set("x", "child");

	assert_eq!(stack.top().get("x"), Some(&Value::from("child")));
	assert_eq!(stack.global().get("x"), Some(&Value::from("global")));

	stack.pop();
	assert_eq!(stack.top().get("x"), Some(&Value::from("global")));
	assert_eq!(stack.pop(), None);
	assert_eq!(stack.depth(), 1);
}

#[test]
fn define_targets_exactly_one_frame() -> LineppResult<()> {
	let mut stack = ScopeStack::new(Scope::new());
	stack.push_child().set("x", "outer");
	stack.push_child().set("x", "inner");

	assert_eq!(stack.target_index(None)?, 2);
	assert_eq!(stack.target_index(Some(0))?, 1);
	assert_eq!(stack.target_index(Some(1))?, 0);

	// Formatted against the frame being written.
	stack.define(Some(0), "y", Some("%(x)s"))?;
	assert_eq!(stack.top().get("y"), None);
	stack.pop();
	assert_eq!(stack.top().get("y"), Some(&Value::from("outer")));

	Ok(())
}

#[test]
fn local_cascades_down_to_the_target() -> LineppResult<()> {
	let mut stack = ScopeStack::new(Scope::new());
	stack.push_child();
	stack.push_child();

	stack.local(Some(0), "x", Some("set"))?;
	assert_eq!(stack.top().get("x"), Some(&Value::from("set")));
	assert_eq!(stack.global().get("x"), None);
	stack.pop();
	assert_eq!(stack.top().get("x"), Some(&Value::from("set")));

	stack.local(None, "x", None)?;
	assert_eq!(stack.top().get("x"), None);

	Ok(())
}

#[rstest]
#[case::past_the_global_frame(1)]
#[case::largest_level(usize::MAX)]
fn out_of_range_levels_are_rejected(#[case] level: usize) {
	let mut stack = ScopeStack::new(Scope::new());
	stack.push_child();

	let result = stack.define(Some(level), "x", Some("v"));
	assert!(
		matches!(result, Err(LineppError::InvalidLevel { level: rejected, depth: 2 }) if rejected == level),
		"{result:?}"
	);

	let result = stack.local(Some(level), "x", Some("v"));
	assert!(matches!(result, Err(LineppError::InvalidLevel { .. })), "{result:?}");
}

#[test]
fn huge_directive_levels_are_rejected() {
	let error = render("#define 18446744073709551615 x \"v\"\n%(x)s\n").err();
	assert!(
		matches!(
			error.as_ref().map(LineppError::kind),
			Some(LineppError::InvalidLevel { level: usize::MAX, .. })
		),
		"{error:?}"
	);
}

#[test]
fn removing_an_unbound_name_fails() {
	let mut stack = ScopeStack::new(Scope::new());
	let result = stack.define(None, "ghost", None);
	assert!(matches!(result, Err(LineppError::UndefinedVariable(name)) if name == "ghost"));
}

#[test]
fn sources_strip_terminators_and_count_lines() -> LineppResult<()> {
	let mut sources = SourceArena::new();
	let id = sources.open_reader("/doc.txt", stream("one\r\ntwo\nthree"));

	assert_eq!(sources.read_line(id)?.as_deref(), Some("one"));
	assert_eq!(sources.read_line(id)?.as_deref(), Some("two"));
	assert_eq!(sources.line_number(id), 2);
	assert_eq!(sources.read_line(id)?.as_deref(), Some("three"));
	assert_eq!(sources.read_line(id)?, None);
	assert_eq!(sources.line_number(id), 3);

	Ok(())
}

#[test]
fn pushed_back_lines_come_first_in_order() -> LineppResult<()> {
	let mut sources = SourceArena::new();
	let id = sources.open_reader("/doc.txt", stream("after\n"));

	sources.push_lines(id, vec!["first".to_string(), "second".to_string()])?;
	sources.push_line(id, "zeroth")?;

	let mut lines: Vec<String> = vec![];
	while let Some(line) = sources.read_line(id)? {
		lines.push(line);
	}
	assert_eq!(lines, vec!["zeroth", "first", "second", "after"]);
	// Pushed back lines are not physical lines.
	assert_eq!(sources.line_number(id), 1);

	Ok(())
}

#[test]
fn copies_replay_from_the_copy_point() -> LineppResult<()> {
	let mut sources = SourceArena::new();
	let original = sources.open_reader("/doc.txt", stream("a\nb\nc\n"));

	assert_eq!(sources.read_line(original)?.as_deref(), Some("a"));
	let copy = sources.copy(original)?;
	assert_eq!(sources.tell(copy)?, Mark { offset: 2, line: 1 });

	assert_eq!(sources.read_line(original)?.as_deref(), Some("b"));
	assert_eq!(sources.read_line(original)?.as_deref(), Some("c"));
	assert_eq!(sources.read_line(original)?, None);

	assert_eq!(sources.line_number(copy), 1);
	assert_eq!(sources.read_line(copy)?.as_deref(), Some("b"));
	assert_eq!(sources.line_number(copy), 2);
	assert_eq!(sources.read_line(copy)?.as_deref(), Some("c"));

	Ok(())
}

#[test]
fn copies_share_pushback() -> LineppResult<()> {
	let mut sources = SourceArena::new();
	let original = sources.open_reader("/doc.txt", stream("a\n"));
	let copy = sources.copy(original)?;

	sources.push_line(copy, "pushed")?;
	assert_eq!(sources.read_line(original)?.as_deref(), Some("pushed"));

	Ok(())
}

#[test]
fn closing_a_copy_keeps_the_wrapped_source_open() -> LineppResult<()> {
	let mut sources = SourceArena::new();
	let original = sources.open_reader("/doc.txt", stream("a\nb\n"));
	let copy = sources.copy(original)?;

	sources.close(copy);
	sources.close(copy);
	assert!(sources.is_closed(copy));
	assert!(!sources.is_closed(original));
	assert_eq!(sources.open_streams(), 1);
	assert_eq!(sources.read_line(original)?.as_deref(), Some("a"));

	let result = sources.read_line(copy);
	assert!(matches!(result, Err(LineppError::ClosedSource(_))));

	sources.close(original);
	assert_eq!(sources.open_streams(), 0);
	assert!(matches!(sources.tell(original), Err(LineppError::ClosedSource(_))));

	Ok(())
}

#[test]
fn seek_clears_deferred_positions() -> LineppResult<()> {
	let mut sources = SourceArena::new();
	let original = sources.open_reader("/doc.txt", stream("a\nb\n"));
	let copy = sources.copy(original)?;
	sources.read_line(original)?;

	sources.seek(copy, Mark { offset: 2, line: 1 })?;
	assert_eq!(sources.read_line(copy)?.as_deref(), Some("b"));

	Ok(())
}

#[test]
fn missing_files_fail_to_open() {
	let mut sources = SourceArena::new();
	let result = sources.open("/definitely/not/here.txt");
	assert!(matches!(result, Err(LineppError::Open { .. })));
}

#[test]
fn passes_plain_lines_through() -> LineppResult<()> {
	let lines = render("alpha\n  beta\n\ngamma")?;
	assert_eq!(lines, vec!["alpha", "  beta", "", "gamma"]);

	Ok(())
}

#[test]
fn interpolates_defined_values() -> LineppResult<()> {
	let lines = render("#define name \"World\"\nHello, %(name)s!\n")?;
	assert_eq!(lines, vec!["Hello, World!"]);

	Ok(())
}

#[test]
fn comments_produce_no_output() -> LineppResult<()> {
	let lines = render("# nothing to see\nvisible\n")?;
	assert_eq!(lines, vec!["visible"]);

	Ok(())
}

#[test]
fn truthiness_conditionals() -> LineppResult<()> {
	let source = "#define flag \"yes\"\n#if flag\nshown\n#end\n#ifn flag\nhidden\n#end\nafter\n";
	assert_eq!(render(source)?, vec!["shown", "after"]);

	Ok(())
}

#[test]
fn definedness_conditionals() -> LineppResult<()> {
	let source = "#ifdef missing\nA\n#else\nB\n#end\n#ifndef missing\nC\n#end\n";
	assert_eq!(render(source)?, vec!["B", "C"]);

	Ok(())
}

#[test]
fn first_holding_branch_wins() -> LineppResult<()> {
	let bindings = Scope::from_iter([("a", ""), ("b", "yes"), ("c", "yes")]);
	let source = "#if a\nA\n#elif b\nB\n#elif c\nC\n#else\nD\n#end\n";
	assert_eq!(render_with(source, &bindings)?, vec!["B"]);

	Ok(())
}

#[test]
fn resolved_blocks_skip_later_tests() -> LineppResult<()> {
	let source = "#ifdef __FILE__\nyes\n#elif never_defined\nno\n#end\n";
	assert_eq!(render(source)?, vec!["yes"]);

	Ok(())
}

#[test]
fn skipped_blocks_are_not_evaluated() -> LineppResult<()> {
	let source = "#ifdef missing\n#for x \"[1, 2]\"\n#if undefined\ninner %(nope)s\n#end\n#end\nskipped\n#end\nafter\n";
	assert_eq!(render(source)?, vec!["after"]);

	Ok(())
}

#[test]
fn for_repeats_the_body() -> LineppResult<()> {
	let source = "#for item \"[1, 2, 3]\"\nitem=%(item)s\n#end\ndone\n";
	assert_eq!(render(source)?, vec!["item=1", "item=2", "item=3", "done"]);

	Ok(())
}

#[test]
fn empty_loops_skip_the_body() -> LineppResult<()> {
	let source = "#for item \"[]\"\nbody %(item)s\n#end\nafter\n";
	assert_eq!(render(source)?, vec!["after"]);

	Ok(())
}

#[test]
fn unnamed_loops_merge_mappings() -> LineppResult<()> {
	let source = "#for \"[{'name': 'a', 'n': 1}, {'name': 'b', 'n': 2}]\"\n%(name)s=%(n)d\n#end\n";
	assert_eq!(render(source)?, vec!["a=1", "b=2"]);

	Ok(())
}

#[test]
fn loops_over_bound_values() -> LineppResult<()> {
	let bindings = Scope::from_iter([
		("decoded", Value::from("['x', 'y']")),
		("direct", list([Value::Int(7)])),
	]);
	let source = "#for v decoded\n%(v)s\n#end\n#for v direct\n%(v)s\n#end\n";
	assert_eq!(render_with(source, &bindings)?, vec!["x", "y", "7"]);

	Ok(())
}

#[test]
fn nested_loops() -> LineppResult<()> {
	let source = "#for a \"[1, 2]\"\n#for b \"['x', 'y']\"\n%(a)s%(b)s\n#end\n#end\n";
	assert_eq!(render(source)?, vec!["1x", "1y", "2x", "2y"]);

	Ok(())
}

#[test]
fn loop_bodies_can_branch() -> LineppResult<()> {
	let source = "#for n \"[0, 1]\"\n#if n\none\n#else\nzero\n#end\n#end\n";
	assert_eq!(render(source)?, vec!["zero", "one"]);

	Ok(())
}

#[rstest]
#[case::scalar("#for x \"5\"\n#end\n")]
#[case::string("#for x \"'abc'\"\n#end\n")]
#[case::unnamed_scalars("#for \"[1]\"\n#end\n")]
fn rejects_non_iterables(#[case] source: &str) {
	let error = render(source).err();
	assert!(
		matches!(error.as_ref().map(LineppError::kind), Some(LineppError::NotIterable(_))),
		"{error:?}"
	);
}

#[test]
fn malformed_loop_literals_are_reported() {
	let error = render("#for x \"[1, 2\"\n#end\n").err();
	assert!(matches!(
		error.as_ref().map(LineppError::kind),
		Some(LineppError::MalformedLiteral { .. })
	));
}

#[test]
fn rescan_splits_lines() -> LineppResult<()> {
	let lines = render("  ##first%(\\n)ssecond\n")?;
	assert_eq!(lines, vec!["  first", "  second"]);

	Ok(())
}

#[test]
fn rescanned_lines_can_be_directives() -> LineppResult<()> {
	let bindings = Scope::from_iter([("command", "#define greeting \"hello\"")]);
	let lines = render_with("##%(command)s\n%(greeting)s, world\n", &bindings)?;
	assert_eq!(lines, vec!["hello, world"]);

	Ok(())
}

#[test]
fn local_updates_enclosing_frames() -> LineppResult<()> {
	let source = "#define x \"root\"\n#ifdef x\n#local 0 x \"cascaded\"\ninner=%(x)s\n#end\nouter=%(x)s\n";
	assert_eq!(render(source)?, vec!["inner=cascaded", "outer=cascaded"]);

	let source = "#define x \"root\"\n#ifdef x\n#define x \"shadowed\"\ninner=%(x)s\n#end\nouter=%(x)s\n";
	assert_eq!(render(source)?, vec!["inner=shadowed", "outer=root"]);

	Ok(())
}

#[test]
fn builtins_track_position() -> LineppResult<()> {
	let source = "%(__LINE__)s\n#ifdef __FILE__\n%(__LINE__)s\n#end\n%(__LINE__)s %(__LEVEL__)s\n%(__FILE__)s\n";
	assert_eq!(render(source)?, vec!["1", "3", "5 1", DOCUMENT]);

	Ok(())
}

#[test]
fn date_and_time_come_from_the_options() -> LineppResult<()> {
	assert_eq!(render("%(__DATE__)s %(__TIME__)s")?, vec!["Mar 04 2012 05:06:07"]);

	Ok(())
}

#[test]
fn returns_the_global_scope() -> LineppResult<()> {
	let bindings = Scope::from_iter([("given", "1")]);
	let global = preprocessor(Path::new("/")).run_reader(
		DOCUMENT,
		stream("#define 0 exported \"yes\"\n#define private \"no\"\n"),
		&bindings,
		&mut (),
	)?;

	assert_eq!(global.get("exported"), Some(&Value::from("yes")));
	assert_eq!(global.get("given"), Some(&Value::from("1")));
	assert_eq!(global.get("private"), None);
	assert_eq!(global.get(scope::NEWLINE), Some(&Value::from("\n")));

	Ok(())
}

#[test]
fn writes_lines_with_terminators() -> LineppResult<()> {
	let mut sink = WriteSink(Vec::<u8>::new());
	preprocessor(Path::new("/")).run_reader(DOCUMENT, stream("a\nb"), &Scope::new(), &mut sink)?;
	assert_eq!(String::from_utf8_lossy(&sink.into_inner()), "a\nb\n");

	Ok(())
}

#[test]
fn includes_resume_the_parent() -> LineppResult<()> {
	let tree = file_tree(&[
		("parent.txt", "start\n  #include \"child.txt\"\nend %(__LEVEL__)s\n"),
		("child.txt", "one\ntwo %(__LEVEL__)s\n"),
	]);

	let lines = render_file(&tree, "parent.txt")?;
	assert_eq!(lines, vec!["start", "  one", "  two 2", "end 1"]);

	Ok(())
}

#[test]
fn included_files_get_their_own_scope() -> LineppResult<()> {
	let tree = file_tree(&[
		(
			"parent.txt",
			"#define name \"parent\"\n#include \"child.txt\"\n%(name)s %(shared)s\n",
		),
		(
			"child.txt",
			"#define name \"child\"\n#define 0 shared \"from child\"\n%(name)s\n",
		),
	]);

	let lines = render_file(&tree, "parent.txt")?;
	assert_eq!(lines, vec!["child", "parent from child"]);

	Ok(())
}

#[test]
fn root_relative_includes() -> LineppResult<()> {
	let tree = file_tree(&[
		("pages/index.txt", "#include \"/lib/common.txt\"\n#include \"part.txt\"\n"),
		("pages/part.txt", "part\n"),
		("lib/common.txt", "common\n"),
	]);

	assert_eq!(render_file(&tree, "pages/index.txt")?, vec!["common", "part"]);

	Ok(())
}

#[test]
fn inside_splices_the_caller() -> LineppResult<()> {
	let tree = file_tree(&[
		("layout.txt", "<div>\n  #include\n</div>\n"),
		(
			"page.txt",
			"#define title \"T\"\n#inside \"layout.txt\"\nbody %(title)s\nmore\n",
		),
	]);

	let lines = render_file(&tree, "page.txt")?;
	assert_eq!(lines, vec!["<div>", "  body T", "  more", "</div>"]);

	Ok(())
}

#[test]
fn unmatched_splice_is_an_error() {
	let error = render("#include\n").err();
	assert!(matches!(
		error.as_ref().map(LineppError::kind),
		Some(LineppError::IllegalDirectiveNesting { .. })
	));
}

#[test]
fn missing_includes_are_reported() {
	let tree = file_tree(&[("page.txt", "#include \"missing.txt\"\n")]);
	let error = render_file(&tree, "page.txt").err();
	assert!(matches!(
		error.as_ref().map(LineppError::kind),
		Some(LineppError::Open { .. })
	));
}

#[rstest]
#[case::syntax_error_in_include("#include \"child.txt\"\n", "#iff x\n")]
#[case::error_inside_looped_include(
	"#for n \"[1, 2]\"\n#include \"child.txt\"\n#end\n",
	"#include \"grandchild.txt\"\n%(missing)s\n"
)]
fn failed_runs_close_every_stream(#[case] page: &str, #[case] child: &str) {
	let tree = file_tree(&[("child.txt", child), ("grandchild.txt", "deep\n")]);
	let mut sources = SourceArena::new();
	let root = sources.open_reader(tree.path().join("page.txt"), stream(page));
	let mut lines: Vec<String> = vec![];

	let result = preprocessor(tree.path()).run_source(&mut sources, root, &Scope::new(), &mut lines);

	assert!(result.is_err());
	assert!(sources.is_closed(root));
	assert_eq!(sources.open_streams(), 0);
}

#[test]
fn finished_runs_close_every_stream() -> LineppResult<()> {
	let tree = file_tree(&[("child.txt", "child\n")]);
	let mut sources = SourceArena::new();
	let root = sources.open_reader(tree.path().join("page.txt"), stream("#include \"child.txt\"\n"));
	let mut lines: Vec<String> = vec![];

	preprocessor(tree.path()).run_source(&mut sources, root, &Scope::new(), &mut lines)?;

	assert_eq!(lines, vec!["child"]);
	assert!(sources.is_closed(root));
	assert_eq!(sources.open_streams(), 0);

	Ok(())
}

#[test]
fn syntax_errors_stop_processing() {
	let mut lines: Vec<String> = vec![];
	let result = preprocessor(Path::new("/")).run_reader(
		DOCUMENT,
		stream("before\n#iff x\nafter\n"),
		&Scope::new(),
		&mut lines,
	);

	match result {
		Err(LineppError::Syntax {
			line, column, text, ..
		}) => assert_eq!((line, column, text.as_str()), (2, 3, "#iff x")),
		other => panic!("expected a syntax error, got {other:?}"),
	}
	assert_eq!(lines, vec!["before"]);
}

#[test]
fn malformed_directives_fail_inside_skipped_blocks() {
	let result = render("#ifdef missing\n#end now\n#end\n");
	assert!(matches!(result, Err(LineppError::Syntax { column: 5, .. })));
}

#[test]
fn syntax_error_message() {
	let error = render("\n#iff x\n").err().map(|e| e.to_string()).unwrap_or_default();
	insta::assert_snapshot!(error, @"invalid directive at /virtual/document.txt:2:3: `#iff x`");
}

#[test]
fn errors_carry_their_location() {
	let result = render("fine\n#for x \"[1, 2]\"\nok\n%(missing)s\n#end\n");
	match result {
		Err(LineppError::Located { file, line, source }) => {
			assert_eq!(file, Path::new(DOCUMENT));
			assert_eq!(line, 4);
			assert!(matches!(*source, LineppError::UndefinedVariable(ref name) if name == "missing"));
		}
		other => panic!("expected a located error, got {other:?}"),
	}
}

#[rstest]
#[case::end_at_top_level("#end\n")]
#[case::else_at_top_level("#else\n")]
#[case::elif_at_top_level("#elif x\n")]
#[case::file_ends_while_skipping("#ifdef missing\nbody\n")]
fn rejects_illegal_nesting(#[case] source: &str) {
	let error = render(source).err();
	assert!(
		matches!(
			error.as_ref().map(LineppError::kind),
			Some(LineppError::IllegalDirectiveNesting { .. })
		),
		"{error:?}"
	);
}

#[test]
fn unterminated_emitting_blocks_close_at_the_end() -> LineppResult<()> {
	assert_eq!(render("#ifdef __FILE__\ninside\n")?, vec!["inside"]);

	Ok(())
}

#[test]
fn conditions_require_bound_names() {
	let error = render("#if nope\n#end\n").err();
	assert!(matches!(
		error.as_ref().map(LineppError::kind),
		Some(LineppError::UndefinedVariable(name)) if name == "nope"
	));
}

#[test]
#[traced_test]
fn logs_opened_includes() -> LineppResult<()> {
	let tree = file_tree(&[("a.txt", "#include \"b.txt\"\n"), ("b.txt", "b\n")]);
	render_file(&tree, "a.txt")?;

	assert!(logs_contain("opening"));
	assert!(logs_contain("b.txt"));

	Ok(())
}

#[test]
fn loads_config_values() -> LineppResult<()> {
	let tree = file_tree(&[(
		"linepp.toml",
		"root = \"lib\"\n\n[values]\nname = \"x\"\ncount = 3\ntargets = [\"a\", \"b\"]\n",
	)]);

	let config = LineppConfig::load(tree.path())?.unwrap_or_else(|| panic!("config not found"));
	assert_eq!(config.root, Some(tree.path().join("lib")));
	assert_eq!(config.values.get("name"), Some(&Value::from("x")));
	assert_eq!(config.values.get("count"), Some(&Value::Int(3)));
	assert_eq!(
		config.values.get("targets"),
		Some(&list([Value::from("a"), Value::from("b")]))
	);

	Ok(())
}

#[test]
fn hidden_config_is_discovered() -> LineppResult<()> {
	let tree = file_tree(&[(".linepp.toml", "[values]\nmode = \"hidden\"\n")]);
	let config = LineppConfig::load(tree.path())?.unwrap_or_else(|| panic!("config not found"));
	assert_eq!(config.root, None);
	assert_eq!(config.values.get("mode"), Some(&Value::from("hidden")));

	Ok(())
}

#[test]
fn missing_config_is_none() -> LineppResult<()> {
	let tree = file_tree(&[]);
	assert!(LineppConfig::load(tree.path())?.is_none());

	Ok(())
}

#[test]
fn invalid_config_is_reported() {
	let tree = file_tree(&[("linepp.toml", "values = [\n")]);
	let result = LineppConfig::load(tree.path());
	assert!(matches!(result, Err(LineppError::ConfigParse(_))));
}
