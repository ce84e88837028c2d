use crate::{error::SinkError, sink::Sink};
use async_trait::async_trait;
use model::{core::utils::escape_line_text, records::record::Record};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
};
use tracing::{debug, info};

pub const DEFAULT_DELIMITER: &str = "\t";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileMode {
    #[default]
    Append,
    Overwrite,
}

/// Writes one delimited line per record to a file.
///
/// Field text is written unchanged except for CR, LF and the delimiter,
/// which are escaped as `\r`, `\n` and a backslash-prefixed delimiter
/// (`\t` for tab) so every record stays on one line.
pub struct FileSink {
    name: String,
    path: PathBuf,
    delimiter: String,
    writer: Option<BufWriter<File>>,
    lines: u64,
}

impl FileSink {
    pub async fn open(
        name: impl Into<String>,
        path: impl AsRef<Path>,
        mode: FileMode,
        delimiter: impl Into<String>,
    ) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let mut options = OpenOptions::new();
        options.create(true);
        match mode {
            FileMode::Append => options.append(true),
            FileMode::Overwrite => options.write(true).truncate(true),
        };
        let file = options.open(&path).await?;
        debug!(path = %path.display(), ?mode, "Opened output file");

        Ok(Self {
            name: name.into(),
            path,
            delimiter: delimiter.into(),
            writer: Some(BufWriter::new(file)),
            lines: 0,
        })
    }

    fn render(&self, record: &Record) -> String {
        let mut line = record
            .iter()
            .map(|value| escape_line_text(&value.to_string(), &self.delimiter))
            .collect::<Vec<_>>()
            .join(&self.delimiter);
        line.push('\n');
        line
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, _seq: u64, record: &Record) -> Result<(), SinkError> {
        let line = self.render(record);
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| SinkError::Closed(self.name.clone()))?;
        writer.write_all(line.as_bytes()).await?;
        self.lines += 1;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), SinkError> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
            info!(
                sink = %self.name,
                path = %self.path.display(),
                lines = self.lines,
                "Output file closed"
            );
        }
        Ok(())
    }
}
