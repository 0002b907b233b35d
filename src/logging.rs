use std::fs::{self, File};
use std::path::Path;
use std::sync::Mutex;

use color_eyre::eyre::{Result, eyre};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use resmon::config::Config;

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    Ok(File::options().create(true).append(true).open(path)?)
}

/// Install the global subscriber. `RUST_LOG` wins over `general.log_level`.
pub fn init(config: &Config, json: bool) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.general.log_level)
            .map_err(|e| eyre!("invalid log level {:?}: {e}", config.general.log_level))?,
    };

    let (writer, ansi) = match config.log_file() {
        Some(path) => (BoxMakeWriter::new(Mutex::new(open_log_file(&path)?)), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_thread_names(true);

    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| eyre!("failed to set tracing subscriber: {e}"))
}
