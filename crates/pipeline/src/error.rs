/// Errors produced by the transform pipeline.
///
/// Both variants are fatal to the current attempt. The worker reports them
/// to the broker, which decides whether to retry.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode image as {format}: {source}")]
    Encode {
        format: &'static str,
        #[source]
        source: image::ImageError,
    },
}
