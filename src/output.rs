//! Console and file output sinks.
//!
//! Output is an explicit composition of sinks rather than a substitution of
//! the process streams: a console sink, an optional rotating file sink, and
//! a tee that duplicates lines into both. Severity is encoded in a line
//! prefix (`***` hard error, `###` warning, `##` notice) so operators can
//! grep log files by severity without parsing anything.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use time::OffsetDateTime;

/// Debug output level, settable through the reserved `-D/--debugLevel`
/// option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum DebugLevel {
   #[default]
   Disabled = 0,
   Enabled = 1,
   Verbose = 2,
   /// Like [`DebugLevel::Verbose`], with a timestamp prefixed to every line.
   Timestamped = 3,
}

impl TryFrom<i64> for DebugLevel {
   type Error = i64;

   fn try_from(value: i64) -> Result<Self, i64> {
      match value {
         0 => Ok(DebugLevel::Disabled),
         1 => Ok(DebugLevel::Enabled),
         2 => Ok(DebugLevel::Verbose),
         3 => Ok(DebugLevel::Timestamped),
         other => Err(other),
      }
   }
}

/// A destination for output lines.
pub trait OutputSink: Send + Sync {
   fn write_line(&self, line: &str) -> io::Result<()>;
}

/// Writes lines to stdout.
#[derive(Default)]
pub struct ConsoleSink;

impl OutputSink for ConsoleSink {
   fn write_line(&self, line: &str) -> io::Result<()> {
      let mut stdout = io::stdout().lock();
      writeln!(stdout, "{line}")
   }
}

/// Duplicates every line into all inner sinks.
pub struct TeeSink {
   sinks: Vec<Box<dyn OutputSink>>,
}

impl TeeSink {
   pub fn new(sinks: Vec<Box<dyn OutputSink>>) -> Self {
      Self { sinks }
   }
}

impl OutputSink for TeeSink {
   fn write_line(&self, line: &str) -> io::Result<()> {
      for sink in &self.sinks {
         sink.write_line(line)?;
      }
      Ok(())
   }
}

struct RotatingState {
   file: Option<File>,
   written: u64,
   // 1-based rotation index, wraps after max_keep
   next_index: u32,
}

/// Appends lines to a file, rotating it when it exceeds a size cap.
///
/// On rotation the current file is closed, renamed with a zero-padded index
/// suffix (wrapping after `max_keep` retained rotations, the oldest rotation
/// being deleted), and a fresh file is opened at the original path.
pub struct RotatingFileSink {
   path: PathBuf,
   max_bytes: u64,
   max_keep: u32,
   state: Mutex<RotatingState>,
}

impl RotatingFileSink {
   /// Default number of retained rotations.
   pub const DEFAULT_MAX_KEEP: u32 = 9;

   pub fn new(path: &Path, max_megabytes: u64, max_keep: u32) -> io::Result<Self> {
      let file = OpenOptions::new().create(true).append(true).open(path)?;
      let written = file.metadata()?.len();
      Ok(Self {
         path: path.to_path_buf(),
         max_bytes: max_megabytes.saturating_mul(1024 * 1024),
         max_keep: max_keep.max(1),
         state: Mutex::new(RotatingState {
            file: Some(file),
            written,
            next_index: 1,
         }),
      })
   }

   fn rotated_path(&self, index: u32) -> PathBuf {
      let mut name = self.path.as_os_str().to_os_string();
      name.push(format!(".{index:02}"));
      PathBuf::from(name)
   }

   fn rotate(&self, state: &mut RotatingState) -> io::Result<()> {
      state.file = None; // close before renaming
      let target = self.rotated_path(state.next_index);
      if target.exists() {
         std::fs::remove_file(&target)?;
      }
      std::fs::rename(&self.path, &target)?;
      state.next_index = state.next_index % self.max_keep + 1;
      state.file = Some(
         OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?,
      );
      state.written = 0;
      Ok(())
   }
}

impl OutputSink for RotatingFileSink {
   fn write_line(&self, line: &str) -> io::Result<()> {
      let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
      if state.written > self.max_bytes {
         self.rotate(&mut state)?;
      }
      let Some(file) = state.file.as_mut() else {
         return Err(io::Error::other("log file closed"));
      };
      writeln!(file, "{line}")?;
      state.written += line.len() as u64 + 1;
      Ok(())
   }
}

/// Severity-prefixed output over a sink, gated by a [`DebugLevel`].
pub struct Output {
   sink: Box<dyn OutputSink>,
   level: DebugLevel,
}

impl Output {
   pub fn new(sink: Box<dyn OutputSink>, level: DebugLevel) -> Self {
      Self { sink, level }
   }

   /// Console-only output at the given level.
   pub fn console(level: DebugLevel) -> Self {
      Self::new(Box::new(ConsoleSink), level)
   }

   /// Console output duplicated into a rotating log file.
   pub fn with_log_file(
      level: DebugLevel,
      path: &Path,
      max_megabytes: u64,
      max_keep: u32,
   ) -> io::Result<Self> {
      let file = RotatingFileSink::new(path, max_megabytes, max_keep)?;
      let tee = TeeSink::new(vec![Box::new(ConsoleSink), Box::new(file)]);
      Ok(Self::new(Box::new(tee), level))
   }

   pub fn level(&self) -> DebugLevel {
      self.level
   }

   fn emit(&self, line: &str) {
      let line = if self.level == DebugLevel::Timestamped {
         format!("{} {line}", timestamp())
      } else {
         line.to_string()
      };
      // Output must never take the application down
      if let Err(e) = self.sink.write_line(&line) {
         tracing::debug!("output sink write failed: {e}");
      }
   }

   /// Plain informational line.
   pub fn info(&self, message: &str) {
      self.emit(message);
   }

   /// Hard error, `***`-prefixed.
   pub fn error(&self, message: &str) {
      self.emit(&format!("*** {message}"));
   }

   /// Warning, `###`-prefixed.
   pub fn warn(&self, message: &str) {
      self.emit(&format!("### {message}"));
   }

   /// Minor warning, `##`-prefixed.
   pub fn notice(&self, message: &str) {
      self.emit(&format!("## {message}"));
   }

   /// Only written when debug output is enabled.
   pub fn debug(&self, message: &str) {
      if self.level >= DebugLevel::Enabled {
         self.emit(message);
      }
   }

   /// Only written at verbose (or timestamped) level.
   pub fn verbose(&self, message: &str) {
      if self.level >= DebugLevel::Verbose {
         self.emit(message);
      }
   }
}

fn timestamp() -> String {
   let now = OffsetDateTime::now_utc();
   format!(
      "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
      now.year(),
      u8::from(now.month()),
      now.day(),
      now.hour(),
      now.minute(),
      now.second(),
      now.microsecond()
   )
}
