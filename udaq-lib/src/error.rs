#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Frame boundaries could not be recovered from a byte-stuffed capture.
    /// Fatal to the whole buffer; there is no partial recovery once the
    /// marker sequence is lost.
    #[error("framing error: {0}")]
    Framing(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
