use std::io::Write;

use crate::LineppResult;

/// Receives every emitted line in order, without a line terminator.
pub trait LineSink {
	fn emit(&mut self, line: &str) -> LineppResult<()>;
}

/// Discards output. Directives still take effect.
impl LineSink for () {
	fn emit(&mut self, _line: &str) -> LineppResult<()> {
		Ok(())
	}
}

impl LineSink for Vec<String> {
	fn emit(&mut self, line: &str) -> LineppResult<()> {
		self.push(line.to_string());
		Ok(())
	}
}

/// Writes each line followed by `\n`.
#[derive(Debug)]
pub struct WriteSink<W: Write>(pub W);

impl<W: Write> WriteSink<W> {
	pub fn into_inner(self) -> W {
		self.0
	}
}

impl<W: Write> LineSink for WriteSink<W> {
	fn emit(&mut self, line: &str) -> LineppResult<()> {
		writeln!(self.0, "{line}")?;
		Ok(())
	}
}
