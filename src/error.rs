pub type BoxedIncludeProviderError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// The entry file could not be resolved or read. This is the only fatal error.
    #[error("cannot read root file {file:?}: {cause}")]
    RootUnreadable {
        file: String,
        cause: BoxedIncludeProviderError,
    },

    /// Any error reported by the `IncludeProvider` for a nested include.
    /// The directive is kept verbatim in the output.
    #[error("include not found: {file:?} (included from {from:?} ({line:?})): {cause}")]
    IncludeProviderError {
        /// Path as written in the directive
        file: String,

        /// File containing the directive
        from: String,

        /// Line in the `from` file on which the include happened
        line: usize,

        cause: BoxedIncludeProviderError,
    },

    /// An `#include` without a quoted path, or with an unterminated one
    #[error("malformed include directive: {file:?} ({line:?})")]
    MalformedInclude { file: String, line: usize },
}

impl BundleError {
    /// Fatal errors abort the whole run; everything else is a per-directive diagnostic.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BundleError::RootUnreadable { .. })
    }
}
