//! Deterministic image transform pipeline.
//!
//! [`run`] decodes the source bytes, applies every `watermark` in list order,
//! then fits and encodes exactly once using the configuration of the last
//! `compress` entry (or the defaults). Operations of unknown type are
//! skipped. The function is pure: the same bytes and operation list always
//! produce the same output bytes.

pub mod compress;
pub mod error;
pub mod watermark;

use std::io::Cursor;

use image::{DynamicImage, ImageError, ImageReader};
use imagepp_core::operation::{Operation, OutputFormat};
use imagepp_core::types::DbId;

pub use compress::CompressConfig;
pub use error::PipelineError;

/// Encoded result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformOutput {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
}

impl TransformOutput {
    /// Object key this output is stored under.
    pub fn object_key(&self, image_id: DbId) -> String {
        output_key(image_id, self.format)
    }

    /// MIME type of the encoded bytes.
    pub fn content_type(&self) -> &'static str {
        match self.format {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Webp => "image/webp",
        }
    }
}

/// `processed/{image_id}.{ext}` in the source bucket.
pub fn output_key(image_id: DbId, format: OutputFormat) -> String {
    format!("processed/{image_id}.{}", format.extension())
}

/// Decode source bytes, sniffing the container format from the content.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode(ImageError::IoError(e)))?
        .decode()
        .map_err(PipelineError::Decode)
}

/// Apply `operations` to the encoded image in `bytes`.
pub fn run(bytes: &[u8], operations: &[Operation]) -> Result<TransformOutput, PipelineError> {
    let mut img = decode(bytes)?;
    tracing::debug!(
        width = img.width(),
        height = img.height(),
        operations = operations.len(),
        "Decoded source image",
    );

    for op in operations {
        match op {
            Operation::Watermark(params) => {
                img = watermark::apply(&img, params);
            }
            // Folded into the final encode.
            Operation::Compress(_) => {}
            Operation::Unknown { kind, .. } => {
                tracing::debug!(kind = %kind, "Skipping unknown operation");
            }
        }
    }

    let config = CompressConfig::from_operations(operations);
    let img = config.fit(img);
    let bytes = config.encode(&img)?;

    Ok(TransformOutput {
        bytes,
        format: config.format,
        width: img.width(),
        height: img.height(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
