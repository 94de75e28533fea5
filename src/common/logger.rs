use std::{
  fs::{self, File, OpenOptions},
  io::{self, BufRead, BufReader, Write},
  path::{Path, PathBuf},
  sync::{Arc, Mutex, OnceLock},
};

use tracing_subscriber::{EnvFilter, fmt::{self, time::LocalTime}, prelude::*};

use crate::configs::Config;

static FILE_SINK: OnceLock<CappedFileWriter> = OnceLock::new();

/// `println!` that is mirrored into the log file when one is configured.
#[macro_export]
macro_rules! log_println {
    () => {{
        std::println!();
        $crate::common::logger::mirror_to_file("\n");
    }};
    ($($arg:tt)*) => {{
        let msg = format!($($arg)*);
        std::println!("{}", msg);
        $crate::common::logger::mirror_to_file(&format!("{}\n", msg));
    }};
}

pub fn mirror_to_file(msg: &str) {
  if let Some(mut writer) = FILE_SINK.get().cloned() {
    let _ = writer.write_all(strip_ansi(msg).as_bytes());
  }
}

fn strip_ansi(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut in_escape = false;
  for c in s.chars() {
    match (in_escape, c) {
      (_, '\x1b') => in_escape = true,
      (true, c) if c.is_ascii_alphabetic() => in_escape = false,
      (true, _) => {}
      (false, c) => out.push(c),
    }
  }
  out
}

/// Builds the `EnvFilter` directive string from `[logging]`.
fn filter_directives(config: &Config) -> String {
  let logging = config.logging.as_ref();
  let level = logging.and_then(|l| l.level.as_deref()).unwrap_or("info");
  match logging.and_then(|l| l.filters.as_deref()) {
    Some(filters) if !filters.is_empty() => format!("{},{}", level, filters),
    _ => format!("{},hyper=warn,reqwest=warn", level),
  }
}

pub fn init(config: &Config) {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_directives(config)));

  let stdout_layer = fmt::layer()
    .with_timer(LocalTime::rfc_3339())
    .with_target(true)
    .with_thread_ids(true)
    .with_line_number(true)
    .with_file(false);

  let file_layer = config
    .logging
    .as_ref()
    .and_then(|l| l.file.as_ref())
    .map(|file_config| {
      if let Some(parent) = Path::new(&file_config.path).parent() {
        if let Err(e) = fs::create_dir_all(parent) {
          eprintln!("Failed to create log directory: {}", e);
        }
      }
      let writer = CappedFileWriter::new(PathBuf::from(&file_config.path), file_config.max_lines);
      let _ = FILE_SINK.set(writer.clone());
      fmt::layer()
        .with_writer(writer)
        .with_timer(LocalTime::rfc_3339())
        .with_target(true)
        .with_line_number(true)
        .with_ansi(false)
    });

  let _ = tracing_subscriber::registry()
    .with(env_filter)
    .with(stdout_layer)
    .with(file_layer)
    .try_init();
}

/// Append-only log file that trims itself back to `max_lines` once enough
/// new lines have been written.
#[derive(Clone)]
pub(crate) struct CappedFileWriter {
  path: PathBuf,
  max_lines: usize,
  pending_lines: Arc<Mutex<usize>>,
}

impl CappedFileWriter {
  fn new(path: PathBuf, max_lines: usize) -> Self {
    Self {
      path,
      max_lines: max_lines.max(1),
      pending_lines: Arc::new(Mutex::new(0)),
    }
  }

  fn trim_threshold(&self) -> usize {
    (self.max_lines / 10).max(50)
  }

  fn trim(&self) -> io::Result<()> {
    if !self.path.exists() {
      return Ok(());
    }
    let lines: Vec<String> = BufReader::new(File::open(&self.path)?)
      .lines()
      .collect::<Result<_, _>>()?;
    if lines.len() <= self.max_lines {
      return Ok(());
    }
    let mut file = File::create(&self.path)?;
    for line in &lines[lines.len() - self.max_lines..] {
      writeln!(file, "{}", line)?;
    }
    Ok(())
  }
}

impl io::Write for CappedFileWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?
      .write_all(buf)?;

    let mut pending = self.pending_lines.lock().unwrap_or_else(|e| e.into_inner());
    *pending += buf.iter().filter(|&&b| b == b'\n').count();
    if *pending >= self.trim_threshold() {
      if let Err(e) = self.trim() {
        eprintln!("Failed to trim log file: {}", e);
      }
      *pending = 0;
    }
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    Ok(())
  }
}

impl<'a> fmt::MakeWriter<'a> for CappedFileWriter {
  type Writer = Self;

  fn make_writer(&'a self) -> Self::Writer {
    self.clone()
  }
}
