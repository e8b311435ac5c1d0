//! Line sources: cursors over text streams with pushback and deferred seeks.
//!
//! Sources live in a [`SourceArena`] and are addressed by [`SourceId`]. A
//! source either owns a stream or wraps another source. Wrappers share the
//! pushback buffer of the source they wrap, so lines pushed back through any
//! layer are visible to every layer of the chain, and they forward reads to
//! the wrapped source once that buffer is empty.
//!
//! [`SourceArena::copy`] creates a wrapper whose first read seeks the shared
//! stream back to where the copied source stood at copy time. Copies let
//! `#for` replay the same physical lines once per item without opening the
//! file again.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use std::path::PathBuf;

use crate::LineppError;
use crate::LineppResult;

/// A readable, seekable text stream.
pub trait LineStream: BufRead + Seek {}
impl<T: BufRead + Seek> LineStream for T {}

/// Handle to a source in a [`SourceArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(usize);

/// A position in a stream: the byte offset and the number of physical lines
/// read before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Mark {
	pub offset: u64,
	pub line: usize,
}

enum Backing {
	/// Owned stream. `None` once closed.
	Stream(Option<Box<dyn LineStream>>),
	Wraps(SourceId),
}

struct SourceRecord {
	name: PathBuf,
	backing: Backing,
	/// Index into `SourceArena::buffers`.
	pushback: usize,
	/// Seek performed before the next read from the stream.
	pending: Option<Mark>,
	/// Physical lines read so far. Only meaningful for stream owners.
	line: usize,
	closed: bool,
}

/// Owner of every source opened during a run.
#[derive(Default)]
pub struct SourceArena {
	records: Vec<SourceRecord>,
	/// Pushback buffers, most recently pushed line last.
	buffers: Vec<Vec<String>>,
}

impl SourceArena {
	pub fn new() -> Self {
		Self::default()
	}

	/// Open the file at `path` as a new source.
	pub fn open(&mut self, path: impl AsRef<Path>) -> LineppResult<SourceId> {
		let path = path.as_ref();
		let file = File::open(path).map_err(|source| {
			LineppError::Open {
				path: path.to_path_buf(),
				source,
			}
		})?;

		Ok(self.open_reader(path, BufReader::new(file)))
	}

	/// Register an already open stream under `name`.
	pub fn open_reader(&mut self, name: impl Into<PathBuf>, stream: impl LineStream + 'static) -> SourceId {
		let name = name.into();
		tracing::trace!(name = %name.display(), "opening source");

		self.buffers.push(vec![]);
		self.insert(SourceRecord {
			name,
			backing: Backing::Stream(Some(Box::new(stream))),
			pushback: self.buffers.len() - 1,
			pending: None,
			line: 0,
			closed: false,
		})
	}

	/// Create a source that replays `id` from its current position. The copy
	/// shares the stream and pushback buffer of `id`.
	pub fn copy(&mut self, id: SourceId) -> LineppResult<SourceId> {
		let mark = self.tell(id)?;
		let record = &self.records[id.0];
		let copy = SourceRecord {
			name: record.name.clone(),
			backing: Backing::Wraps(id),
			pushback: record.pushback,
			pending: Some(mark),
			line: 0,
			closed: false,
		};

		Ok(self.insert(copy))
	}

	fn insert(&mut self, record: SourceRecord) -> SourceId {
		self.records.push(record);
		SourceId(self.records.len() - 1)
	}

	fn ensure_open(&self, id: SourceId) -> LineppResult<&SourceRecord> {
		let record = &self.records[id.0];
		if record.closed {
			return Err(LineppError::ClosedSource(record.name.display().to_string()));
		}

		Ok(record)
	}

	pub fn name(&self, id: SourceId) -> &Path {
		&self.records[id.0].name
	}

	pub fn is_closed(&self, id: SourceId) -> bool {
		self.records[id.0].closed
	}

	/// The next line without its line terminator, or `None` at the end of
	/// the stream. Pushed back lines come first.
	pub fn read_line(&mut self, id: SourceId) -> LineppResult<Option<String>> {
		let pushback = self.ensure_open(id)?.pushback;
		if let Some(line) = self.buffers[pushback].pop() {
			return Ok(Some(line));
		}

		if let Some(mark) = self.records[id.0].pending.take() {
			self.seek(id, mark)?;
		}

		match &mut self.records[id.0].backing {
			Backing::Wraps(inner) => {
				let inner = *inner;
				self.read_line(inner)
			}
			Backing::Stream(stream) => {
				let Some(stream) = stream.as_mut() else {
					return Err(LineppError::ClosedSource(
						self.records[id.0].name.display().to_string(),
					));
				};

				let mut line = String::new();
				if stream.read_line(&mut line)? == 0 {
					return Ok(None);
				}

				let trimmed = line.trim_end_matches(['\n', '\r']).len();
				line.truncate(trimmed);
				self.records[id.0].line += 1;
				Ok(Some(line))
			}
		}
	}

	/// Push one line back. It is returned by the next read.
	pub fn push_line(&mut self, id: SourceId, line: impl Into<String>) -> LineppResult<()> {
		let pushback = self.ensure_open(id)?.pushback;
		self.buffers[pushback].push(line.into());
		Ok(())
	}

	/// Push lines back so that they are read in the given order.
	pub fn push_lines<I>(&mut self, id: SourceId, lines: I) -> LineppResult<()>
	where
		I: IntoIterator<Item = String>,
		I::IntoIter: DoubleEndedIterator,
	{
		let pushback = self.ensure_open(id)?.pushback;
		self.buffers[pushback].extend(lines.into_iter().rev());
		Ok(())
	}

	/// The position the next physical read of `id` starts from.
	pub fn tell(&mut self, id: SourceId) -> LineppResult<Mark> {
		let record = self.ensure_open(id)?;
		if let Some(mark) = record.pending {
			return Ok(mark);
		}

		let line = record.line;
		match &mut self.records[id.0].backing {
			Backing::Wraps(inner) => {
				let inner = *inner;
				self.tell(inner)
			}
			Backing::Stream(Some(stream)) => {
				Ok(Mark {
					offset: stream.stream_position()?,
					line,
				})
			}
			Backing::Stream(None) => {
				Err(LineppError::ClosedSource(
					self.records[id.0].name.display().to_string(),
				))
			}
		}
	}

	/// Move the underlying stream of `id` to `mark`. Any deferred seek along
	/// the chain is dropped.
	pub fn seek(&mut self, id: SourceId, mark: Mark) -> LineppResult<()> {
		self.ensure_open(id)?;
		let record = &mut self.records[id.0];
		record.pending = None;

		match &mut record.backing {
			Backing::Wraps(inner) => {
				let inner = *inner;
				self.seek(inner, mark)
			}
			Backing::Stream(Some(stream)) => {
				stream.seek(SeekFrom::Start(mark.offset))?;
				record.line = mark.line;
				Ok(())
			}
			Backing::Stream(None) => Err(LineppError::ClosedSource(record.name.display().to_string())),
		}
	}

	/// The number of the physical line most recently read through `id`.
	pub fn line_number(&self, id: SourceId) -> usize {
		let record = &self.records[id.0];
		if let Some(mark) = record.pending {
			return mark.line;
		}

		match record.backing {
			Backing::Wraps(inner) => self.line_number(inner),
			Backing::Stream(_) => record.line,
		}
	}

	/// Close `id`. An owned stream is released; a wrapped source is left
	/// untouched. Closing twice is a no-op.
	pub fn close(&mut self, id: SourceId) {
		let record = &mut self.records[id.0];
		if record.closed {
			return;
		}

		record.closed = true;
		if let Backing::Stream(stream) = &mut record.backing {
			tracing::trace!(name = %record.name.display(), "closing source");
			drop(stream.take());
		}
	}

	/// Close every source that is still open.
	pub fn close_all(&mut self) {
		for index in 0..self.records.len() {
			self.close(SourceId(index));
		}
	}

	/// Number of sources that own a stream that has not been closed yet.
	pub fn open_streams(&self) -> usize {
		self.records
			.iter()
			.filter(|record| matches!(record.backing, Backing::Stream(Some(_))))
			.count()
	}
}
