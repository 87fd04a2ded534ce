use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable credential. Not retried automatically; the user retries.
    #[error("credential error: {0}")]
    Credential(String),

    /// The provider refused the connect request; the message is shown to
    /// the user verbatim.
    #[error("provider rejected the session: {0}")]
    ProviderRejected(String),

    #[error(transparent)]
    Provider(#[from] rehearsal_avatar_interface::Error),

    /// The stream never became ready. Fatal to this attempt but retryable.
    #[error("stream was not ready within {waited:?}")]
    StreamTimeout { waited: Duration },

    /// A start arrived while another session is active or starting.
    #[error("a session is already active")]
    SessionActive,

    /// This start attempt was superseded (for example by an end or a newer
    /// attempt) while one of its steps was in flight.
    #[error("session start superseded")]
    Superseded,
}
