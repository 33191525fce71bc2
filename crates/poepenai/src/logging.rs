//! JSON-lines logging to stdout and the in-memory log ring

use std::io::{self, Write};

use chrono::{SecondsFormat, Utc};
use log::{LevelFilter, Record};

use crate::log_ring::LogRing;

/// Parse a `--loglevel` value; only the four levels the server documents are accepted
pub fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.to_ascii_lowercase().as_str() {
        "debug" => Some(LevelFilter::Debug),
        "info" => Some(LevelFilter::Info),
        "warn" => Some(LevelFilter::Warn),
        "error" => Some(LevelFilter::Error),
        _ => None,
    }
}

/// Render one record as a single JSON object
pub fn format_record(record: &Record<'_>) -> String {
    serde_json::json!({
        "time": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "level": record.level().as_str(),
        "target": record.target(),
        "msg": record.args().to_string(),
    })
    .to_string()
}

/// Logger that writes JSON lines to stdout and copies each one into `ring`
pub fn builder(level: LevelFilter, ring: LogRing) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| writeln!(buf, "{}", format_record(record)))
        .filter_level(level)
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("tera", LevelFilter::Warn)
        .target(env_logger::Target::Pipe(Box::new(TeeWriter::new(
            io::stdout(),
            ring,
        ))));
    builder
}

/// Install the global logger
pub fn init(level: LevelFilter, ring: LogRing) -> Result<(), log::SetLoggerError> {
    builder(level, ring).try_init()
}

/// Forwards bytes to `inner` and appends every complete line to the ring
pub struct TeeWriter<W> {
    inner: W,
    ring: LogRing,
    pending: Vec<u8>,
}

impl<W: Write> TeeWriter<W> {
    pub fn new(inner: W, ring: LogRing) -> Self {
        Self {
            inner,
            ring,
            pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TeeWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.pending.extend_from_slice(&buf[..written]);

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..pos]);
            let line = line.trim_end_matches('\r');
            if !line.is_empty() {
                self.ring.append(line);
            }
        }

        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
