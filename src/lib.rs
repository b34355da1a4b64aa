//! **shader-bundler** flattens GLSL `#include` trees into a single source string,
//! keeping only what the including code can actually reach.
//!
//! Every included file is scanned for top-level defines, constants, structs and
//! functions. At each `#include` site, the code around it decides which of those
//! are used; functions are followed through their call graph, and the defines,
//! constants and structs mentioned by the contributing files come along. Only
//! that closure replaces the directive, with callees ahead of their callers.
//!
//! This crate does not implement a C-like preprocessor or a GLSL parser.
//! Declarations are recognized lexically, and anything it cannot make sense of
//! is left out of the selection rather than reported. Other directives are
//! copied into the output for the shader compiler to handle.
//!
//! Includes are read through an [`IncludeProvider`], which enables custom
//! virtual file systems and lets build systems track dependencies.
//! [`FileIncludeProvider`] reads from disk.
//!
//! # Example
//!
//! ```no_run
//! use shader_bundler::{cosmetic, BundleOptions, FileIncludeProvider};
//!
//! let bundle = shader_bundler::process_file(
//!     "shaders/lighting.frag",
//!     &mut FileIncludeProvider,
//!     std::path::PathBuf::new(),
//! )?;
//! for diagnostic in &bundle.diagnostics {
//!     eprintln!("warning: {}", diagnostic);
//! }
//! let text = cosmetic::apply(&bundle.source, &BundleOptions::default());
//! # Ok::<(), shader_bundler::BundleError>(())
//! ```

mod error;
mod include_provider;
mod scanner;
mod source_unit;

pub mod bundler;
pub mod cosmetic;
pub mod definitions;
pub mod embed;
pub mod resolver;
pub mod session;
pub mod usage;

pub use cosmetic::BundleOptions;
pub use definitions::{Definition, Definitions, SymbolKind};
pub use error::*;
pub use include_provider::*;
pub use scanner::{IncludeDirective, Scanner, Segment};
pub use session::Session;
pub use source_unit::*;
pub use usage::UsedSet;

use std::path::{Path, PathBuf};

/// Output of bundling one root file
#[derive(Debug)]
pub struct Bundle {
    /// Root file text with every resolvable include replaced by its selection
    pub source: String,

    /// Non-fatal problems, in the order they were found
    pub diagnostics: Vec<BundleError>,
}

/// Process a single file, and then any code recursively referenced.
///
/// `include_provider` is used to read all of the files, including the one at `file_path`.
/// Only a failure to read `file_path` itself is an error; problems with nested
/// includes end up in [`Bundle::diagnostics`].
pub fn process_file<IncludeContext>(
    file_path: &str,
    include_provider: &mut dyn IncludeProvider<IncludeContext = IncludeContext>,
    include_context: IncludeContext,
) -> Result<Bundle, BundleError> {
    let root_unreadable = |cause| BundleError::RootUnreadable {
        file: file_path.to_string(),
        cause,
    };

    let resolved = include_provider
        .resolve_path(file_path, &include_context)
        .map_err(root_unreadable)?;
    let source = include_provider
        .get_include(&resolved.resolved_path)
        .map_err(root_unreadable)?;

    let root = SourceUnit::new(resolved.resolved_path, source);
    let mut session = Session::new();
    let source = session.expand_root(&root, include_provider, &resolved.context);

    Ok(Bundle {
        source,
        diagnostics: session.into_diagnostics(),
    })
}

/// Bundles a shader from disk and runs the cosmetic passes selected in `options`.
pub fn bundle_shader(path: &Path, options: &BundleOptions) -> Result<Bundle, BundleError> {
    let mut bundle = process_file(
        &path.to_string_lossy(),
        &mut FileIncludeProvider,
        PathBuf::new(),
    )?;
    bundle.source = cosmetic::apply(&bundle.source, options);
    Ok(bundle)
}
