use crate::config::Config;
use anyhow::{Context, Result};
use chrono::Local;
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

const TIME_FORMAT: &str = "%d-%b-%Y %H:%M:%S";
const LOGFILE_MAX_BYTES: u64 = 50_000;
const LOGFILE_BACKUPS: usize = 2;

/// `[19-Oct-2026 14:03:07] INFO - message`
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "[{}] {} - ",
            Local::now().format(TIME_FORMAT),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Install the console subscriber, plus a rotating file sink when
/// `config.logfile` is set.
pub fn init(config: &Config) -> Result<()> {
    let console = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .event_format(LineFormat);

    let file = match &config.logfile {
        Some(path) => {
            let writer = RotatingFile::open(path, LOGFILE_MAX_BYTES, LOGFILE_BACKUPS)
                .with_context(|| format!("failed to open log file: {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Mutex::new(writer))
                    .with_ansi(false)
                    .event_format(LineFormat),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(config.verbosity.level_filter())
        .with(console)
        .with(file)
        .try_init()
        .context("failed to install log subscriber")?;
    Ok(())
}

/// Render a run duration as `Hh:Mm:Ss`. The seconds field never drops
/// below 1.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = (total % 60).max(1);
    format!("{hours}h:{minutes}m:{seconds}s")
}

/// Append-only log file that rolls over to `<path>.1 .. <path>.N` once a
/// write would push it past `max_bytes`.
pub struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    backups: usize,
    file: Option<File>,
    size: u64,
}

impl RotatingFile {
    pub fn open(path: &Path, max_bytes: u64, backups: usize) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            backups,
            file: Some(file),
            size,
        })
    }

    fn backup_path(&self, n: usize) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rollover(&mut self) -> io::Result<()> {
        // The live file is closed first; an open file cannot be renamed on
        // every platform.
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        if self.backups > 0 {
            let oldest = self.backup_path(self.backups);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for n in (1..self.backups).rev() {
                let src = self.backup_path(n);
                if src.exists() {
                    fs::rename(&src, self.backup_path(n + 1))?;
                }
            }
            fs::rename(&self.path, self.backup_path(1))?;
        }
        self.file = Some(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?,
        );
        self.size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let full =
            self.max_bytes > 0 && self.size > 0 && self.size + buf.len() as u64 > self.max_bytes;
        if full || self.file.is_none() {
            self.rollover()?;
        }
        let Some(file) = self.file.as_mut() else {
            return Err(io::Error::other("log file is closed"));
        };
        let written = file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}
