use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown animation: {name}")]
    UnknownAnimation { name: String },

    #[error("unknown skin: {name}")]
    UnknownSkin { name: String },

    #[error("invalid value: {message}")]
    InvalidValue { message: String },

    #[error("invalid frame data for {timeline} timeline: {message}")]
    InvalidFrameData {
        timeline: &'static str,
        message: String,
    },

    #[cfg(feature = "json")]
    #[error("failed to parse mix configuration: {message}")]
    ConfigParse { message: String },
}
