use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("unable to load provider library")]
    Load(#[source] libloading::Error),

    #[error("provider library has no symbol `{name}`")]
    MissingSymbol {
        name: &'static str,
        #[source]
        source: libloading::Error,
    },

    #[error("failed to create device provider handle for product ID {0}")]
    CreateFailed(super::ProductId),

    /// A vendor call returned a failure code. The code is kept verbatim.
    #[error("{call} failed with error code {code}")]
    Status { call: &'static str, code: i32 },
}

