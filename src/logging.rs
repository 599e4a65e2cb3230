use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub const DEFAULT_FILTER: &str = "energymetrics=debug,warn";

/// Copies every log line to stderr and to the log file.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initialise the global logger: `LEVEL:target:message` on the console and
/// appended to `log_file`. `RUST_LOG` overrides the default filter.
pub fn init(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Unable to open log file {}", log_file.display()))?;

    Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER))
        .format(|buf, record| {
            writeln!(buf, "{}:{}:{}", record.level(), record.target(), record.args())
        })
        .target(Target::Pipe(Box::new(Tee { file })))
        .try_init()
        .context("Logger already initialised")?;

    Ok(())
}
