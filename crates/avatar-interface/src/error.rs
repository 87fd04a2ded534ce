#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The provider refused the connect request. The message is the
    /// provider's own diagnostic and is shown to the user verbatim.
    #[error("provider rejected the request: {0}")]
    Rejected(String),
    #[error("provider transport error: {0}")]
    Transport(String),
}
