use std::fmt::{self, Write as _};

use fatelf::BuildReport;
use serde::Serialize;

/// Output format selection for all subcommands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Single JSON object on stdout.
    Json,
    /// Human-readable summary on stdout.
    #[default]
    Human,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Human => write!(f, "human"),
        }
    }
}

/// Values with a human-readable summary.
pub trait Summary: Serialize {
    fn summary(&self) -> String;
}

impl Summary for BuildReport {
    fn summary(&self) -> String {
        let mut out = format!(
            "{}: {} record{}\n",
            self.output.display(),
            self.records.len(),
            if self.records.len() == 1 { "" } else { "s" }
        );
        for (index, record) in self.records.iter().enumerate() {
            let _ = writeln!(
                out,
                "  [{index}] {} {} @ {:#x} ({} bytes)",
                record.target,
                record.source.display(),
                record.offset,
                record.size
            );
        }
        out
    }
}

/// Write a successful result to stdout.
///
/// - **Json**: a single JSON object, no extraneous text.
/// - **Human**: the value's summary.
pub fn emit<T: Summary>(format: OutputFormat, value: &T) -> Result<(), std::io::Error> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string(value).map_err(std::io::Error::other)?;
            println!("{json}");
        }
        OutputFormat::Human => print!("{}", value.summary()),
    }
    Ok(())
}

/// Report a failed command.
///
/// Human mode prints `error: <message>` on stderr. JSON mode prints an
/// [`error_json`] object on stdout, where a script reading the report
/// expects it. `status` is the exit status the process is about to use: 2
/// when the inputs or the system failed us, 1 when the container and the
/// host simply do not fit together.
pub fn emit_error(format: OutputFormat, status: u8, message: &str) {
    match format {
        OutputFormat::Json => println!("{}", error_json(status, message)),
        OutputFormat::Human => eprintln!("error: {message}"),
    }
}

/// `{"error": message, "exit_code": status}`
pub fn error_json(status: u8, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": message,
        "exit_code": status,
    })
}
