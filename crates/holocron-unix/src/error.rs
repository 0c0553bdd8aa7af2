#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not load GSSAPI library {path}")]
    Open {
        path: String,
        #[source]
        source: libloading::Error,
    },
    #[error("no GSSAPI library found, tried {}", tried.join(", "))]
    NotFound { tried: Vec<String> },
    #[error("GSSAPI library {path} does not export {symbol}")]
    MissingSymbol {
        path: String,
        symbol: &'static str,
        #[source]
        source: libloading::Error,
    },
}
