use thiserror::Error;

/// The credential handed over by the authentication layer does not carry a
/// usable tenant or actor identity. No context exists when this is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    #[error("credential is missing the `{claim}` claim")]
    MissingClaim { claim: String },

    #[error("credential claim `{claim}` is malformed: {reason}")]
    MalformedClaim { claim: String, reason: String },

    #[error("credential claim `{claim}` is the nil identifier")]
    NilIdentifier { claim: String },
}

/// Misuse of the request-scoped propagation channel.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    #[error("no request scope is active on this task")]
    NoRequestScope,

    #[error("tenant context is already established for this request")]
    AlreadyEstablished,

    #[error("a request scope is already active on this task")]
    NestedScope,
}

/// Failure at the request boundary, before the handler runs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}
