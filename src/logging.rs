//! Console logging teed into a per-run, timestamped log file.
//!
//! The log file is write-only telemetry; nothing reads it back. Failure to
//! open it degrades to console-only logging instead of refusing to start.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use env_logger::{Builder, Env, Target};

use crate::config::LogSettings;

struct Tee {
    file: Option<File>,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // Console first; the file copy is best-effort.
        io::stdout().write_all(buf)?;
        if let Some(file) = &mut self.file {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        if let Some(file) = &mut self.file {
            let _ = file.flush();
        }
        Ok(())
    }
}

/// Install the global logger. `RUST_LOG` still wins over the configured level.
/// Returns the log file path when one could be opened.
pub fn init(settings: &LogSettings) -> Option<PathBuf> {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = settings.dir.join(format!("vortex_autodl_{}.log", stamp));

    let file = fs::create_dir_all(&settings.dir)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&path))
        .map_err(|e| {
            eprintln!(
                "warning: log file {:?} unavailable ({}), logging to console only",
                path, e
            );
            e
        })
        .ok();
    let opened = file.is_some();

    Builder::from_env(Env::default().default_filter_or(settings.level.as_str()))
        .target(Target::Pipe(Box::new(Tee { file })))
        .init();

    opened.then_some(path)
}
