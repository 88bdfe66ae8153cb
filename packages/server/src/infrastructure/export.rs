//! Message history export.

use std::io::Write;

use clap::ValueEnum;

use crate::domain::Message;

/// Output format of `sasayaki-server export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// One `author: content` line per message.
    Log,
    Json,
    JsonPretty,
    /// The whole history as one YAML sequence.
    Yaml,
    /// One YAML document per message, separated by `---`.
    YamlSep,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to write export: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode export: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to encode export: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Write `msgs` to `w` in `format`.
pub fn export(format: ExportFormat, msgs: &[Message], mut w: impl Write) -> Result<(), ExportError> {
    match format {
        ExportFormat::Log => {
            for msg in msgs {
                if msg.is_public() {
                    writeln!(w, "{}: {}", msg.author, msg.content)?;
                } else {
                    writeln!(w, "Whisper {} -> {}: {}", msg.author, msg.to, msg.content)?;
                }
            }
        }
        ExportFormat::Json => {
            serde_json::to_writer(&mut w, msgs)?;
            writeln!(w)?;
        }
        ExportFormat::JsonPretty => {
            serde_json::to_writer_pretty(&mut w, msgs)?;
            writeln!(w)?;
        }
        ExportFormat::Yaml => serde_yaml::to_writer(&mut w, msgs)?,
        ExportFormat::YamlSep => {
            for (i, msg) in msgs.iter().enumerate() {
                if i > 0 {
                    writeln!(w, "---")?;
                }
                serde_yaml::to_writer(&mut w, msg)?;
            }
        }
    }

    w.flush()?;
    Ok(())
}
