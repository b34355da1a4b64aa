use crate::ResolvedIncludePath;

/// Text of one file, keyed by its resolved identity
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SourceUnit {
    /// Canonical path; used to deduplicate includes
    pub path: ResolvedIncludePath,

    /// Source text, as returned by the include provider
    pub source: String,
}

impl SourceUnit {
    pub fn new(path: ResolvedIncludePath, source: String) -> Self {
        SourceUnit { path, source }
    }

    /// Leaf of the path, for messages.
    pub fn file_name(&self) -> &str {
        self.path
            .0
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&self.path.0)
    }
}
