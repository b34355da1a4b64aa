use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::definitions::{
    blank_comments, directive_name, extract_definitions, extract_with_spans, identifiers,
    leftover_lines, struct_names, Definitions,
};
use crate::resolver::{resolve_dependencies, DonorMap, FileDependencyMap};
use crate::scanner::{strip_directives, IncludeDirective, Scanner, Segment};
use crate::usage::{find_used_symbols, UsedSet};
use crate::{bundler, BoxedIncludeProviderError, BundleError, IncludeProvider};
use crate::{ResolvedIncludePath, SourceUnit};

/// State shared by the whole recursive expansion of one root file.
///
/// Create a fresh session per root file. Nothing in here is meant to outlive
/// the bundle it produced.
#[derive(Default)]
pub struct Session {
    symbols: Definitions,
    donors: DonorMap,
    dependencies: FileDependencyMap,
    visited: HashSet<ResolvedIncludePath>,
    visit_order: Vec<ResolvedIncludePath>,
    residues: HashMap<ResolvedIncludePath, Residue>,
    outer_structs: Vec<String>,
    diagnostics: Vec<BundleError>,
}

/// Top-level text of an included file that is not a definition, such as
/// `precision` statements, extensions and unrecognized declarations.
#[derive(Default)]
struct Residue {
    /// Lines that belong at the top of a shader
    prologue: String,
    epilogue: String,
}

impl Residue {
    fn new(lines: Vec<&str>) -> Self {
        let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
        for line in lines {
            // A conditional left empty by its definitions moving elsewhere.
            if directive_name(line) == Some("endif")
                && kept.last().map_or(false, |&open| {
                    matches!(directive_name(open), Some("if") | Some("ifdef") | Some("ifndef"))
                })
            {
                kept.pop();
            } else {
                kept.push(line);
            }
        }

        let mut residue = Residue::default();
        for line in kept {
            let goes_first = line.starts_with("precision ")
                || matches!(
                    directive_name(line),
                    Some("version") | Some("extension") | Some("pragma")
                );
            let target = if goes_first {
                &mut residue.prologue
            } else {
                &mut residue.epilogue
            };
            target.push_str(line);
            target.push('\n');
        }
        residue
    }

    fn is_empty(&self) -> bool {
        self.prologue.is_empty() && self.epilogue.is_empty()
    }
}

/// What ends up in place of one segment of the file being expanded
enum Piece<'s> {
    Text { text: &'s str, code: &'s str },
    Verbatim(&'s str),
    /// Definitions donated by `visit_order[range]`
    Selection(Range<usize>),
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbols(&self) -> &Definitions {
        &self.symbols
    }

    pub fn donors(&self) -> &DonorMap {
        &self.donors
    }

    pub fn dependencies(&self) -> &FileDependencyMap {
        &self.dependencies
    }

    pub fn is_visited(&self, path: &ResolvedIncludePath) -> bool {
        self.visited.contains(path)
    }

    pub fn diagnostics(&self) -> &[BundleError] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<BundleError> {
        self.diagnostics
    }

    /// Expands every include reachable from `root`, returning the bundled text.
    pub fn expand_root<IncludeContext>(
        &mut self,
        root: &SourceUnit,
        include_provider: &mut dyn IncludeProvider<IncludeContext = IncludeContext>,
        include_context: &IncludeContext,
    ) -> String {
        self.visited.insert(root.path.clone());
        self.expand(root, include_provider, include_context, "").0
    }

    /// Adds the definitions found in `flattened` to the session tables on behalf of `path`.
    pub fn register(&mut self, path: &ResolvedIncludePath, flattened: &str) {
        let extracted = extract_definitions(flattened, &self.known_structs());

        let donated = self.donors.entry(path.clone()).or_default();
        for definition in extracted.all() {
            if self.symbols.insert(definition.clone()) {
                donated
                    .get_mut(definition.kind)
                    .insert(definition.name.clone());
            } else {
                tracing::trace!(
                    "{:?} {} from {} is already registered",
                    definition.kind,
                    definition.name,
                    path
                );
            }
        }

        tracing::debug!(
            "registered {} of {} definitions from {}",
            donated.iter().map(|(_, names)| names.len()).sum::<usize>(),
            extracted.len(),
            path
        );

        // A declaration is not a reference to itself.
        let code = blank_comments(flattened);
        let mut occurrences: HashMap<&str, usize> = HashMap::new();
        for word in identifiers(&code) {
            *occurrences.entry(word).or_insert(0) += 1;
        }
        for name in extracted.all().flat_map(|definition| definition.names()) {
            if let Some(count) = occurrences.get_mut(name) {
                *count = count.saturating_sub(1);
            }
        }
        self.dependencies.insert(
            path.clone(),
            occurrences
                .into_iter()
                .filter(|&(_, count)| count > 0)
                .map(|(word, _)| word.to_string())
                .collect(),
        );
    }

    fn expand<IncludeContext>(
        &mut self,
        unit: &SourceUnit,
        include_provider: &mut dyn IncludeProvider<IncludeContext = IncludeContext>,
        include_context: &IncludeContext,
        outer_context: &str,
    ) -> (String, String) {
        let segments = Scanner::new(&unit.source).into_segments();
        let residual = strip_directives(&segments);
        let calling_code = format!("{}\n{}", residual, outer_context);
        let scope = self.outer_structs.len();

        // Nested files are expanded and registered before anything is selected,
        // so every site of this file sees the same symbol tables.
        let mut pieces = Vec::with_capacity(segments.len());
        for segment in &segments {
            pieces.push(match segment {
                Segment::Text { text, code } => {
                    self.outer_structs
                        .extend(struct_names(code).map(str::to_string));
                    Piece::Text { text, code }
                }
                Segment::Malformed { raw, line } => {
                    let error = BundleError::MalformedInclude {
                        file: unit.path.0.clone(),
                        line: *line,
                    };
                    tracing::warn!("{}", error);
                    self.diagnostics.push(error);
                    Piece::Verbatim(raw)
                }
                Segment::Include(directive) => self.include_child(
                    directive,
                    unit,
                    include_provider,
                    include_context,
                    &calling_code,
                ),
            });
        }

        self.outer_structs.truncate(scope);

        let mut carried = String::new();
        for piece in &pieces {
            if let Piece::Selection(range) = piece {
                for residue in self.residues_of(range.clone()) {
                    carried.push_str(&residue.prologue);
                    carried.push_str(&residue.epilogue);
                }
            }
        }

        let has_selection = pieces.iter().any(|p| matches!(p, Piece::Selection(_)));
        let used = if has_selection {
            let context = format!("{}\n{}", calling_code, carried);
            let direct = find_used_symbols(&context, &self.symbols);
            resolve_dependencies(&direct, &self.symbols, &self.donors, &self.dependencies)
        } else {
            UsedSet::default()
        };

        let mut out = String::with_capacity(unit.source.len());
        let mut own_code = String::with_capacity(residual.len());
        for piece in pieces {
            match piece {
                Piece::Text { text, code } => {
                    out.push_str(text);
                    own_code.push_str(code);
                }
                Piece::Verbatim(text) => {
                    out.push_str(text);
                    own_code.push_str(text);
                }
                Piece::Selection(range) => {
                    let local = self.donated_by(&self.visit_order[range.clone()], &used);
                    tracing::debug!(
                        "{}: emitting {} symbols from {} file(s)",
                        unit.file_name(),
                        local.total(),
                        range.len()
                    );
                    let residues: Vec<&Residue> = self.residues_of(range).collect();
                    for residue in &residues {
                        out.push_str(&residue.prologue);
                    }
                    out.push_str(&bundler::emit(&local, &self.symbols));
                    for residue in &residues {
                        out.push_str(&residue.epilogue);
                    }
                }
            }
        }
        (out, own_code)
    }

    fn include_child<'s, IncludeContext>(
        &mut self,
        directive: &'s IncludeDirective,
        from: &SourceUnit,
        include_provider: &mut dyn IncludeProvider<IncludeContext = IncludeContext>,
        include_context: &IncludeContext,
        outer_context: &str,
    ) -> Piece<'s> {
        let resolved = match include_provider.resolve_path(&directive.path, include_context) {
            Ok(resolved) => resolved,
            Err(cause) => return self.unresolved(directive, from, cause),
        };
        let path = resolved.resolved_path;

        if self.visited.contains(&path) {
            tracing::trace!("{} already expanded; nothing to emit at {}", path, from.path);
            return Piece::Selection(0..0);
        }

        let source = match include_provider.get_include(&path) {
            Ok(source) => source,
            Err(cause) => return self.unresolved(directive, from, cause),
        };

        self.visited.insert(path.clone());
        let first = self.visit_order.len();
        self.visit_order.push(path.clone());

        let child = SourceUnit::new(path, source);
        let (flattened, own_code) =
            self.expand(&child, include_provider, &resolved.context, outer_context);
        self.register(&child.path, &flattened);

        let (_, spans) = extract_with_spans(&own_code, &self.known_structs());
        let residue = Residue::new(leftover_lines(&own_code, &spans));
        if !residue.is_empty() {
            tracing::trace!("carrying top-level text of {}", child.path);
            self.residues.insert(child.path, residue);
        }

        Piece::Selection(first..self.visit_order.len())
    }

    fn unresolved<'s>(
        &mut self,
        directive: &'s IncludeDirective,
        from: &SourceUnit,
        cause: BoxedIncludeProviderError,
    ) -> Piece<'s> {
        let error = BundleError::IncludeProviderError {
            file: directive.path.clone(),
            from: from.path.0.clone(),
            line: directive.line,
            cause,
        };
        tracing::warn!("{}", error);
        self.diagnostics.push(error);
        Piece::Verbatim(&directive.raw)
    }

    fn known_structs(&self) -> HashSet<String> {
        self.symbols
            .structs
            .iter()
            .map(|definition| definition.name.clone())
            .chain(self.outer_structs.iter().cloned())
            .collect()
    }

    fn residues_of(&self, range: Range<usize>) -> impl Iterator<Item = &Residue> {
        self.visit_order[range]
            .iter()
            .filter_map(move |file| self.residues.get(file))
    }

    /// The part of `used` that was donated by `files`.
    fn donated_by(&self, files: &[ResolvedIncludePath], used: &UsedSet) -> UsedSet {
        let mut local = UsedSet::default();
        for donated in files.iter().filter_map(|file| self.donors.get(file)) {
            for (kind, names) in donated.iter() {
                for name in names.iter().filter(|name| used.contains(kind, name)) {
                    local.insert(kind, name);
                }
            }
        }
        local
    }
}
