use std::path::{Path, PathBuf};

use crate::BoxedIncludeProviderError;

/// Canonical identity of an included file. Two directives resolving to the same
/// value refer to the same file and are expanded only once per session.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResolvedIncludePath(pub String);

impl std::fmt::Display for ResolvedIncludePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct ResolvedInclude<IncludeContext> {
    pub resolved_path: ResolvedIncludePath,
    pub context: IncludeContext,
}

/// User-supplied include reader
pub trait IncludeProvider {
    /// Context handed to nested includes, e.g. the directory of the including file.
    type IncludeContext;

    fn resolve_path(
        &self,
        path: &str,
        context: &Self::IncludeContext,
    ) -> Result<ResolvedInclude<Self::IncludeContext>, BoxedIncludeProviderError>;

    fn get_include(
        &mut self,
        path: &ResolvedIncludePath,
    ) -> Result<String, BoxedIncludeProviderError>;
}

/// Reads includes from disk. Paths are resolved relative to the directory of
/// the including file and canonicalized, so `a/../b.glsl` and `b.glsl` are the same file.
#[derive(Default)]
pub struct FileIncludeProvider;

impl IncludeProvider for FileIncludeProvider {
    type IncludeContext = PathBuf;

    fn resolve_path(
        &self,
        path: &str,
        context: &PathBuf,
    ) -> Result<ResolvedInclude<PathBuf>, BoxedIncludeProviderError> {
        let canonical = context.join(path).canonicalize()?;
        if !canonical.is_file() {
            return Err(format!("{} is not a file", canonical.display()).into());
        }

        let parent = canonical
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(ResolvedInclude {
            resolved_path: ResolvedIncludePath(canonical.to_string_lossy().into_owned()),
            context: parent,
        })
    }

    fn get_include(
        &mut self,
        resolved: &ResolvedIncludePath,
    ) -> Result<String, BoxedIncludeProviderError> {
        Ok(std::fs::read_to_string(&resolved.0)?)
    }
}
