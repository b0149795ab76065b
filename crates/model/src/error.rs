/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The content is moderated.
    Moderated,
    /// The model provider is rate limited.
    RateLimitExceeded,
    /// The credentials were rejected.
    Unauthorized,
    /// A temporary failure, such as a dropped connection or a 5xx status.
    Transient,
    /// Any other errors.
    Other,
}

impl ErrorKind {
    /// Returns `true` if sending the same request again may succeed.
    #[inline]
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::RateLimitExceeded | ErrorKind::Transient)
    }
}
