//! Rendering of the JSON message stream a build produces.

use std::io::{Read, Write};

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize, Debug, Default, Clone)]
pub struct JsonMessage {
    pub stream: Option<String>,
    pub status: Option<String>,
    pub progress: Option<String>,
    pub id: Option<String>,
    pub error: Option<String>,
    #[serde(rename = "errorDetail")]
    pub error_detail: Option<JsonError>,
    pub aux: Option<Value>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct JsonError {
    pub message: Option<String>,
}

impl JsonMessage {
    fn failure(&self) -> Option<String> {
        match &self.error_detail {
            Some(detail) => Some(detail.message.clone().unwrap_or_default()),
            None => self.error.clone(),
        }
    }

    /// The image id announced in `aux`, either `{"ID": ..}` or a plain string.
    fn image_id(&self) -> Option<String> {
        match self.aux.as_ref()? {
            Value::Object(map) => map.get("ID").and_then(Value::as_str).map(str::to_string),
            Value::String(id) => Some(id.clone()),
            _ => None,
        }
    }
}

/// Copies the stream to `out` until it ends or reports an error.
/// Returns the id of the built image when the stream announced one.
pub fn display_stream<R: Read, W: Write + ?Sized>(reader: R, out: &mut W) -> Result<Option<String>> {
    let mut image_id = None;
    for message in serde_json::Deserializer::from_reader(reader).into_iter::<JsonMessage>() {
        let message = message.map_err(|err| anyhow!("invalid build output: {}", err))?;
        if let Some(error) = message.failure() {
            return Err(anyhow!(error));
        }
        if let Some(id) = message.image_id() {
            image_id = Some(id);
        }
        render(&message, out)?;
    }
    out.flush()?;
    Ok(image_id)
}

fn render<W: Write + ?Sized>(message: &JsonMessage, out: &mut W) -> Result<()> {
    if let Some(stream) = &message.stream {
        out.write_all(stream.as_bytes())?;
        return Ok(());
    }
    let Some(status) = &message.status else {
        return Ok(());
    };
    if let Some(id) = &message.id {
        write!(out, "{}: ", id)?;
    }
    match message.progress.as_ref().filter(|progress| !progress.is_empty()) {
        Some(progress) => writeln!(out, "{} {}", status, progress)?,
        None => writeln!(out, "{}", status)?,
    }
    Ok(())
}

/// Quiet builds keep the output and only show it when the build fails, or when
/// the build never announced an image id.
pub fn display_quiet<R: Read, W: Write + ?Sized, E: Write + ?Sized>(reader: R, out: &mut W, err: &mut E) -> Result<Option<String>> {
    let mut buffer = Vec::new();
    match display_stream(reader, &mut buffer) {
        Ok(image_id) => {
            match &image_id {
                Some(id) => writeln!(out, "{}", id)?,
                None => out.write_all(&buffer)?,
            }
            out.flush()?;
            Ok(image_id)
        }
        Err(error) => {
            err.write_all(&buffer)?;
            Err(error)
        }
    }
}
