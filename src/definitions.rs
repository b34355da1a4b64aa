//! Lexical extraction of top-level definitions from shader source.
//!
//! This is not a parser. Declarations are found with a handful of patterns, and
//! bodies are delimited by counting braces. Anything that does not look like a
//! complete definition is left out of the tables rather than reported; callers
//! that need it can get the recognized ranges from [`extract_with_spans`] and
//! keep the rest with [`leftover_lines`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;

use lazy_static::lazy_static;
use regex::{Captures, Regex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SymbolKind {
    Define,
    Constant,
    Struct,
    Function,
}

impl SymbolKind {
    pub const ALL: [SymbolKind; 4] = [
        SymbolKind::Define,
        SymbolKind::Constant,
        SymbolKind::Struct,
        SymbolKind::Function,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionInfo {
    pub return_type: String,

    /// Identifiers followed by `(` in the body, excluding the function itself
    pub calls: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Definition {
    pub kind: SymbolKind,
    pub name: String,

    /// Other names that refer to this definition: the members of an interface
    /// block without an instance name, or further variables of one declaration.
    pub aliases: Vec<String>,

    /// Verbatim source span, including the closing brace or semicolon
    pub raw_text: String,

    /// Only present for `SymbolKind::Function`
    pub function: Option<FunctionInfo>,
}

impl Definition {
    pub fn calls(&self) -> impl Iterator<Item = &str> {
        self.function
            .iter()
            .flat_map(|f| f.calls.iter().map(String::as_str))
    }

    /// The name followed by every alias.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// One value for each kind of symbol.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PerKind<T> {
    pub defines: T,
    pub constants: T,
    pub structs: T,
    pub functions: T,
}

impl<T> PerKind<T> {
    pub fn get(&self, kind: SymbolKind) -> &T {
        match kind {
            SymbolKind::Define => &self.defines,
            SymbolKind::Constant => &self.constants,
            SymbolKind::Struct => &self.structs,
            SymbolKind::Function => &self.functions,
        }
    }

    pub fn get_mut(&mut self, kind: SymbolKind) -> &mut T {
        match kind {
            SymbolKind::Define => &mut self.defines,
            SymbolKind::Constant => &mut self.constants,
            SymbolKind::Struct => &mut self.structs,
            SymbolKind::Function => &mut self.functions,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (SymbolKind, &T)> {
        SymbolKind::ALL.iter().map(move |&kind| (kind, self.get(kind)))
    }
}

/// Name to definition, remembering insertion order. Aliases resolve to the
/// definition they belong to.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    entries: Vec<Definition>,
    index: HashMap<String, usize>,
}

impl SymbolTable {
    /// Returns `false` and keeps the existing entry if the name is already taken.
    /// Aliases that are already taken are not indexed.
    pub fn insert(&mut self, definition: Definition) -> bool {
        if self.index.contains_key(&definition.name) {
            return false;
        }
        let i = self.entries.len();
        for name in definition.names() {
            self.index.entry(name.to_string()).or_insert(i);
        }
        self.entries.push(definition);
        true
    }

    pub fn get(&self, name: &str) -> Option<&Definition> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Definition> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut Definition> {
        match self.index.get(name) {
            Some(&i) => Some(&mut self.entries[i]),
            None => None,
        }
    }
}

/// The four symbol tables produced by extraction.
pub type Definitions = PerKind<SymbolTable>;

impl Definitions {
    pub fn insert(&mut self, definition: Definition) -> bool {
        self.get_mut(definition.kind).insert(definition)
    }

    pub fn lookup(&self, kind: SymbolKind, name: &str) -> Option<&Definition> {
        self.get(kind).get(name)
    }

    pub fn len(&self) -> usize {
        self.iter().map(|(_, table)| table.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> impl Iterator<Item = &Definition> {
        self.iter().flat_map(|(_, table)| table.iter())
    }
}

/// Storage, interpolation, memory and precision qualifiers, optionally after a
/// `layout(...)`.
const QUALIFIERS: &str = r"(?:layout\s*\([^()]*\)\s*)?(?:(?:const|uniform|in|out|inout|buffer|shared|attribute|varying|flat|smooth|noperspective|centroid|sample|patch|invariant|precise|readonly|writeonly|coherent|volatile|restrict|highp|mediump|lowp)\s+)*";

lazy_static! {
    static ref COMMENT_RE: Regex = Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"\b[A-Za-z_]\w*").unwrap();
    static ref CALL_RE: Regex = Regex::new(r"\b([A-Za-z_]\w*)\s*\(").unwrap();
    static ref DEFINE_RE: Regex =
        Regex::new(r"(?m)^[ \t]*#[ \t]*define[ \t]+([A-Za-z_]\w*)").unwrap();
    static ref STRUCT_RE: Regex = Regex::new(r"\bstruct\s+([A-Za-z_]\w*)\s*\{").unwrap();
    static ref FUNCTION_RE: Regex = Regex::new(
        r"\b(?:(?:highp|mediump|lowp|precise)\s+)*([A-Za-z_]\w*)\s+([A-Za-z_]\w*)\s*\([^(){};]*\)\s*\{"
    )
    .unwrap();
    static ref BLOCK_RE: Regex =
        Regex::new(&format!(r"\A[ \t]*({})([A-Za-z_]\w*)\s*\{{", QUALIFIERS)).unwrap();
    static ref DECLARATION_RE: Regex = Regex::new(&format!(
        r"\A[ \t]*({})([A-Za-z_]\w*)\s+([A-Za-z_]\w*)\s*(?:\[[^\]]*\]\s*)?([=;,])",
        QUALIFIERS
    ))
    .unwrap();
    static ref STORAGE_RE: Regex =
        Regex::new(r"\b(?:const|uniform|in|out|inout|buffer|shared|attribute|varying)\b").unwrap();
    static ref TAIL_RE: Regex =
        Regex::new(r"\A\s*(?:([A-Za-z_]\w*)\s*(?:\[[^\]]*\]\s*)?)?;").unwrap();
    static ref MEMBER_RE: Regex = Regex::new(r"\b([A-Za-z_]\w*)\s*(?:\[[^\]]*\]\s*)?;").unwrap();
    static ref VECTOR_TYPE_RE: Regex =
        Regex::new(r"^(?:[biud]?vec[234]|d?mat[234](?:x[234])?)$").unwrap();
}

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while", "switch", "return"];

/// Replaces comments with spaces, keeping newlines and byte offsets.
pub fn blank_comments(text: &str) -> String {
    COMMENT_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let mut blank = String::with_capacity(caps[0].len());
            for c in caps[0].chars() {
                if c == '\n' {
                    blank.push('\n');
                } else {
                    blank.extend(std::iter::repeat(' ').take(c.len_utf8()));
                }
            }
            blank
        })
        .into_owned()
}

/// Every identifier token in `text`, in order of appearance.
pub(crate) fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    IDENT_RE.find_iter(text).map(|m| m.as_str())
}

/// Every identifier immediately followed by `(`, whitespace allowed.
pub(crate) fn call_sites(text: &str) -> impl Iterator<Item = &str> {
    CALL_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Names of the structs declared in `text`.
pub(crate) fn struct_names(text: &str) -> impl Iterator<Item = &str> {
    STRUCT_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
}

pub fn is_builtin_type(name: &str) -> bool {
    matches!(name, "void" | "bool" | "int" | "uint" | "float" | "double")
        || VECTOR_TYPE_RE.is_match(name)
}

/// Offset just past the `}` matching the `{` at `open`, or `None` if the text
/// runs out first.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in text.as_bytes()[open..].iter().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(open + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn line_start(text: &str, pos: usize) -> usize {
    text[..pos].rfind('\n').map_or(0, |i| i + 1)
}

/// End of the line containing `pos`, following `\` continuations.
fn logical_line_end(text: &str, pos: usize) -> usize {
    let mut end = pos;
    loop {
        match text[end..].find('\n') {
            Some(nl) => {
                let line_end = end + nl;
                if text[..line_end].trim_end_matches('\r').ends_with('\\') {
                    end = line_end + 1;
                } else {
                    return line_end;
                }
            }
            None => return text.len(),
        }
    }
}

/// Offsets where a top-level statement may begin.
fn statement_starts(text: &str) -> impl Iterator<Item = usize> + '_ {
    std::iter::once(0).chain(
        text.char_indices()
            .filter(|&(_, c)| c == ';' || c == '}' || c == '\n')
            .map(|(i, _)| i + 1),
    )
}

/// Whether `pos` sits inside an open parenthesis of its statement, as in a
/// parameter list.
fn inside_parens(text: &str, pos: usize) -> bool {
    let statement = text[..pos]
        .rfind(|c: char| c == ';' || c == '{' || c == '}')
        .map_or(0, |i| i + 1);
    let mut depth = 0i32;
    for b in text[statement..pos].bytes() {
        match b {
            b'(' => depth += 1,
            b')' => depth -= 1,
            _ => {}
        }
    }
    depth > 0
}

fn inside(spans: &[Range<usize>], pos: usize) -> bool {
    spans.iter().any(|span| span.contains(&pos))
}

/// Names declared after the first one, as `b` and `c` in `float a = 1.0, b, c[2];`.
fn further_declarators(rest: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut depth = 0i32;
    let mut expect_name = false;
    for (i, c) in rest.char_indices() {
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => expect_name = true,
            _ if expect_name && (c.is_alphabetic() || c == '_') => {
                let len = rest[i..]
                    .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                    .unwrap_or(rest.len() - i);
                names.push(rest[i..i + len].to_string());
                expect_name = false;
            }
            _ => {}
        }
    }
    names
}

/// Name of the preprocessor directive on `line`, if it is one.
pub(crate) fn directive_name(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix('#')?.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_alphabetic())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Text between two variants of one definition: nothing but conditional directives.
fn is_conditional_glue(text: &str) -> bool {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .peekable();
    lines.peek().is_some()
        && lines.all(|line| {
            matches!(
                directive_name(line),
                Some("if") | Some("ifdef") | Some("ifndef") | Some("elif") | Some("else") | Some("endif")
            )
        })
}

/// The opening `#if` line before `span` and the `#endif` line after it, when
/// `raw` has branches of a conditional it does not open.
fn enclosing_conditional(
    text: &str,
    span: &Range<usize>,
    raw: &str,
) -> Option<(Range<usize>, Range<usize>)> {
    let mut depth = 0i32;
    let mut lowest = 0i32;
    for name in raw.lines().filter_map(directive_name) {
        match name {
            "if" | "ifdef" | "ifndef" => depth += 1,
            "else" | "elif" => lowest = lowest.min(depth - 1),
            "endif" => {
                depth -= 1;
                lowest = lowest.min(depth);
            }
            _ => {}
        }
    }
    // Only a single missing `#if ... #endif` pair is restored.
    if lowest != -1 || depth != 0 {
        return None;
    }

    let before = text[..span.start].trim_end();
    let open = before.rfind('\n').map_or(0, |i| i + 1);
    match directive_name(&before[open..]) {
        Some("if") | Some("ifdef") | Some("ifndef") => {}
        _ => return None,
    }

    let after = &text[span.end..];
    let skipped = after.len() - after.trim_start().len();
    let rest = &after[skipped..];
    let line_len = rest.find('\n').unwrap_or(rest.len());
    if directive_name(&rest[..line_len]) != Some("endif") {
        return None;
    }

    Some((open..span.start, span.end..span.end + skipped + line_len))
}

/// Non-blank lines of `text` outside of `spans`, trimmed.
pub fn leftover_lines<'t>(text: &'t str, spans: &[Range<usize>]) -> Vec<&'t str> {
    let mut spans = spans.to_vec();
    spans.sort_by_key(|span| span.start);
    spans.push(text.len()..text.len());

    let mut lines = Vec::new();
    let mut pos = 0;
    for span in &spans {
        if span.start > pos {
            lines.extend(
                text[pos..span.start]
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty()),
            );
        }
        pos = pos.max(span.end);
    }
    lines
}

enum Candidate<'t> {
    Struct {
        name: &'t str,
    },
    Block {
        name: &'t str,
    },
    Function {
        name: &'t str,
        return_type: &'t str,
    },
}

/// Tables under construction, with the source range of each definition.
struct Extraction<'t> {
    text: &'t str,
    definitions: Definitions,
    spans: HashMap<(SymbolKind, String), Range<usize>>,
    covered: Vec<Range<usize>>,
}

impl<'t> Extraction<'t> {
    fn new(text: &'t str) -> Self {
        Extraction {
            text,
            definitions: Definitions::default(),
            spans: HashMap::new(),
            covered: Vec::new(),
        }
    }

    fn add(
        &mut self,
        kind: SymbolKind,
        name: &str,
        span: Range<usize>,
        aliases: Vec<String>,
        function: Option<FunctionInfo>,
    ) {
        let text = self.text;
        let raw = &text[span.clone()];
        self.covered.push(span.clone());

        let key = (kind, name.to_string());
        let previous = match self.spans.get(&key) {
            Some(previous) => previous.clone(),
            None => {
                let inserted = self.definitions.insert(Definition {
                    kind,
                    name: name.to_string(),
                    aliases,
                    raw_text: raw.to_string(),
                    function,
                });
                if inserted {
                    self.spans.insert(key, span);
                }
                return;
            }
        };

        // Branches of `#ifdef`/`#else` are kept together with their directives.
        // Overloads share a name; keep them together too.
        let between = text.get(previous.end..span.start).unwrap_or("");
        let variant = is_conditional_glue(between);
        if !variant && kind != SymbolKind::Function {
            return;
        }

        let existing = match self.definitions.get_mut(kind).get_mut(name) {
            Some(existing) => existing,
            None => return,
        };
        if variant {
            existing.raw_text.push_str(between);
            self.covered.push(previous.end..span.start);
        } else {
            existing.raw_text.push('\n');
        }
        existing.raw_text.push_str(raw);
        if let (Some(info), Some(new)) = (existing.function.as_mut(), function) {
            info.calls.extend(new.calls);
        }
        self.spans.insert(key, previous.start..span.end);
    }

    fn finish(mut self) -> (Definitions, Vec<Range<usize>>) {
        let spans: Vec<_> = self.spans.drain().collect();
        for ((kind, name), span) in spans {
            let definition = match self.definitions.get_mut(kind).get_mut(&name) {
                Some(definition) => definition,
                None => continue,
            };
            if let Some((open, close)) = enclosing_conditional(self.text, &span, &definition.raw_text) {
                definition.raw_text = format!(
                    "{}{}{}",
                    &self.text[open.clone()],
                    definition.raw_text,
                    &self.text[close.clone()]
                );
                self.covered.push(open);
                self.covered.push(close);
            }
        }
        (self.definitions, self.covered)
    }
}

/// Extracts defines, constants, structs and functions from `text`.
///
/// Function return types are accepted if they are built-in types, structs
/// declared earlier in `text`, or names in `known_structs`.
pub fn extract_definitions(text: &str, known_structs: &HashSet<String>) -> Definitions {
    extract_with_spans(text, known_structs).0
}

/// Like [`extract_definitions`], also returning the source ranges that were
/// recognized as definitions.
///
/// Interface blocks and global variables are registered as constants. Globals
/// without a storage qualifier need a known type.
pub fn extract_with_spans(
    text: &str,
    known_structs: &HashSet<String>,
) -> (Definitions, Vec<Range<usize>>) {
    let code = blank_comments(text);
    let code = code.as_str();
    let mut extraction = Extraction::new(text);

    let mut candidates: Vec<(usize, usize, Candidate<'_>)> = STRUCT_RE
        .captures_iter(code)
        .filter_map(|c| {
            let (m, name) = (c.get(0)?, c.get(1)?);
            Some((m.start(), m.end() - 1, Candidate::Struct { name: name.as_str() }))
        })
        .chain(FUNCTION_RE.captures_iter(code).filter_map(|c| {
            let (m, return_type, name) = (c.get(0)?, c.get(1)?, c.get(2)?);
            Some((
                m.start(),
                m.end() - 1,
                Candidate::Function {
                    name: name.as_str(),
                    return_type: return_type.as_str(),
                },
            ))
        }))
        .chain(statement_starts(code).filter_map(|at| {
            let c = BLOCK_RE.captures(&code[at..])?;
            let (m, qualifiers, name) = (c.get(0)?, c.get(1)?, c.get(2)?);
            if !STORAGE_RE.is_match(qualifiers.as_str()) {
                return None;
            }
            Some((
                at + qualifiers.start(),
                at + m.end() - 1,
                Candidate::Block { name: name.as_str() },
            ))
        }))
        .collect();
    candidates.sort_by_key(|&(start, _, _)| start);

    let mut structs_so_far: HashSet<&str> = HashSet::new();
    let mut bodies: Vec<Range<usize>> = Vec::new();
    let mut consumed_until = 0;

    for (start, open, candidate) in candidates {
        if start < consumed_until {
            continue;
        }

        if let Candidate::Function { name, return_type } = &candidate {
            if CONTROL_KEYWORDS.contains(name) {
                continue;
            }
            let known = is_builtin_type(return_type)
                || structs_so_far.contains(return_type)
                || known_structs.contains(*return_type);
            if !known {
                continue;
            }
        }

        let mut end = match matching_brace(code, open) {
            Some(end) => end,
            None => continue,
        };

        match candidate {
            Candidate::Struct { name } => {
                let mut aliases = Vec::new();
                if let Some(tail) = TAIL_RE.captures(&code[end..]) {
                    if let Some(instance) = tail.get(1) {
                        aliases.push(instance.as_str().to_string());
                    }
                    end += tail.get(0).map_or(0, |m| m.end());
                }
                structs_so_far.insert(name);
                extraction.add(SymbolKind::Struct, name, start..end, aliases, None);
            }
            Candidate::Block { name } => {
                let tail = match TAIL_RE.captures(&code[end..]) {
                    Some(tail) => tail,
                    None => continue,
                };
                let members = &code[open + 1..end - 1];
                end += tail.get(0).map_or(0, |m| m.end());

                // Members of a block without an instance name are globals.
                let (name, aliases) = match tail.get(1) {
                    Some(instance) => (instance.as_str(), Vec::new()),
                    None => (
                        name,
                        MEMBER_RE
                            .captures_iter(members)
                            .filter_map(|c| c.get(1))
                            .map(|m| m.as_str().to_string())
                            .collect(),
                    ),
                };
                extraction.add(SymbolKind::Constant, name, start..end, aliases, None);
            }
            Candidate::Function { name, return_type } => {
                let calls: BTreeSet<String> = call_sites(&code[open..end])
                    .filter(|&callee| callee != name && !CONTROL_KEYWORDS.contains(&callee))
                    .map(str::to_string)
                    .collect();
                extraction.add(
                    SymbolKind::Function,
                    name,
                    start..end,
                    Vec::new(),
                    Some(FunctionInfo {
                        return_type: return_type.to_string(),
                        calls,
                    }),
                );
            }
        }

        bodies.push(start..end);
        consumed_until = end;
    }

    for c in DEFINE_RE.captures_iter(code) {
        let (m, name) = match (c.get(0), c.get(1)) {
            (Some(m), Some(name)) => (m, name),
            _ => continue,
        };
        if inside(&bodies, name.start()) {
            continue;
        }
        let start = line_start(code, m.start());
        let end = logical_line_end(code, m.end());
        let end = start + code[start..end].trim_end().len();
        extraction.add(SymbolKind::Define, name.as_str(), start..end, Vec::new(), None);
        bodies.push(start..end);
    }

    let mut next_free = 0;
    for at in statement_starts(code) {
        if at < next_free {
            continue;
        }
        let c = match DECLARATION_RE.captures(&code[at..]) {
            Some(c) => c,
            None => continue,
        };
        let (qualifiers, ty, name, terminator) = match (c.get(1), c.get(2), c.get(3), c.get(4)) {
            (Some(q), Some(t), Some(n), Some(e)) => (q, t, n, e),
            _ => continue,
        };

        let start = at + qualifiers.start();
        if inside(&bodies, start) || inside_parens(code, start) {
            continue;
        }
        let storage = STORAGE_RE.is_match(qualifiers.as_str());
        let known_type = is_builtin_type(ty.as_str())
            || structs_so_far.contains(ty.as_str())
            || known_structs.contains(ty.as_str());
        if !storage && !known_type {
            continue;
        }

        let rest = at + terminator.start();
        let end = match code[rest..].find(';') {
            Some(semi) => rest + semi + 1,
            None => continue,
        };
        let aliases = further_declarators(&code[rest..end]);
        extraction.add(SymbolKind::Constant, name.as_str(), start..end, aliases, None);
        next_free = end;
    }

    extraction.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Definitions {
        extract_definitions(text, &HashSet::new())
    }

    fn names(table: &SymbolTable) -> Vec<&str> {
        table.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn defines_take_the_whole_line() {
        let defs = extract("#define PI 3.14159\n  #  define TAU (2.0 * PI)\nfloat x;");
        assert_eq!(names(&defs.defines), vec!["PI", "TAU"]);
        assert_eq!(defs.defines.get("PI").unwrap().raw_text, "#define PI 3.14159");
        assert_eq!(
            defs.defines.get("TAU").unwrap().raw_text,
            "  #  define TAU (2.0 * PI)"
        );
    }

    #[test]
    fn define_with_continuation() {
        let defs = extract("#define SQ(x) \\\n    ((x) * (x))\nint y;");
        assert_eq!(
            defs.defines.get("SQ").unwrap().raw_text,
            "#define SQ(x) \\\n    ((x) * (x))"
        );
    }

    #[test]
    fn constants_run_to_semicolon() {
        let defs = extract(
            "const float EPS = 1e-4;\nconst vec3 UP = vec3(0.0,\n    1.0, 0.0);\nlayout(location = 0) uniform mat4 uMvp;",
        );
        assert_eq!(names(&defs.constants), vec!["EPS", "UP", "uMvp"]);
        assert_eq!(
            defs.constants.get("UP").unwrap().raw_text,
            "const vec3 UP = vec3(0.0,\n    1.0, 0.0);"
        );
        assert_eq!(
            defs.constants.get("uMvp").unwrap().raw_text,
            "layout(location = 0) uniform mat4 uMvp;"
        );
    }

    #[test]
    fn structs_include_trailing_semicolon() {
        let defs = extract("struct Light {\n    vec3 dir;\n    struct { int x; } inner;\n} ;\nint z;");
        let light = defs.structs.get("Light").unwrap();
        assert_eq!(
            light.raw_text,
            "struct Light {\n    vec3 dir;\n    struct { int x; } inner;\n} ;"
        );
    }

    #[test]
    fn unbalanced_struct_is_dropped() {
        let defs = extract("struct Broken {\n    vec3 dir;\n");
        assert!(defs.structs.is_empty());
    }

    #[test]
    fn functions_record_calls() {
        let defs = extract(
            "float helper(float x) { return x * 2.0; }\n\
             vec3 shade(vec3 n) {\n    if (n.x > 0.0) { return vec3(helper(n.y)); }\n    return shade(n.zyx);\n}",
        );
        assert_eq!(names(&defs.functions), vec!["helper", "shade"]);

        let shade = defs.functions.get("shade").unwrap();
        let info = shade.function.as_ref().unwrap();
        assert_eq!(info.return_type, "vec3");
        assert!(info.calls.contains("helper"));
        assert!(info.calls.contains("vec3"));
        assert!(!info.calls.contains("shade"));
        assert!(!info.calls.contains("if"));
        assert!(shade.raw_text.starts_with("vec3 shade(vec3 n) {"));
        assert!(shade.raw_text.ends_with("return shade(n.zyx);\n}"));
    }

    #[test]
    fn unknown_return_type_is_not_a_function() {
        let defs = extract("Foo make() { return Foo(1); }\nelse if (x) { y(); }");
        assert!(defs.functions.is_empty());
    }

    #[test]
    fn struct_return_type_must_be_declared_first() {
        let defs = extract("Ray late() { return Ray(0); }\nstruct Ray { float t; };\nRay early() { return Ray(1.0); }");
        assert_eq!(names(&defs.functions), vec!["early"]);

        let mut known = HashSet::new();
        known.insert("Ray".to_string());
        let defs = extract_definitions("Ray fromOtherFile() { return Ray(2.0); }", &known);
        assert_eq!(names(&defs.functions), vec!["fromOtherFile"]);
    }

    #[test]
    fn unbalanced_function_is_dropped_but_rest_survives() {
        let defs = extract("float ok() { return 1.0; }\nfloat broken() { if (true) { return 0.0; }\n");
        assert_eq!(names(&defs.functions), vec!["ok"]);
    }

    #[test]
    fn locals_inside_bodies_are_ignored() {
        let defs = extract("float f(const float x) {\n    const float K = 2.0;\n    return x * K;\n}");
        assert!(defs.constants.is_empty());
        assert_eq!(names(&defs.functions), vec!["f"]);
    }

    #[test]
    fn overloads_are_merged() {
        let defs = extract("float sq(float x) { return x * x; }\nvec2 sq(vec2 v) { return vec2(sq(v.x), mul(v.y)); }");
        let sq = defs.functions.get("sq").unwrap();
        assert_eq!(defs.functions.len(), 1);
        assert!(sq.raw_text.contains("float sq(float x)"));
        assert!(sq.raw_text.contains("vec2 sq(vec2 v)"));
        assert!(sq.calls().any(|c| c == "mul"));
        assert_eq!(sq.function.as_ref().unwrap().return_type, "float");
    }

    #[test]
    fn first_writer_wins() {
        let mut table = SymbolTable::default();
        let def = |raw: &str| Definition {
            kind: SymbolKind::Define,
            name: "A".to_string(),
            aliases: Vec::new(),
            raw_text: raw.to_string(),
            function: None,
        };
        assert!(table.insert(def("#define A 1")));
        assert!(!table.insert(def("#define A 2")));
        assert_eq!(table.get("A").unwrap().raw_text, "#define A 1");
    }

    #[test]
    fn interface_blocks_and_globals_are_constants() {
        let defs = extract(
            "layout(std140) uniform Camera {\n    mat4 uView;\n    mat4 uProj;\n};\n\
             buffer Particles { vec4 data[]; } particles;\n\
             layout(location = 0) in vec3 aPos;\n\
             flat out int vId;\n\
             vec3 gTint = vec3(1.0), gShade;\n\
             precision highp float;\n",
        );
        assert_eq!(
            names(&defs.constants),
            vec!["Camera", "particles", "aPos", "vId", "gTint"]
        );

        let camera = defs.constants.get("uProj").unwrap();
        assert_eq!(camera.name, "Camera");
        assert_eq!(
            camera.raw_text,
            "layout(std140) uniform Camera {\n    mat4 uView;\n    mat4 uProj;\n};"
        );
        assert_eq!(
            defs.constants.get("particles").unwrap().raw_text,
            "buffer Particles { vec4 data[]; } particles;"
        );
        assert_eq!(defs.constants.get("gShade").unwrap().name, "gTint");
    }

    #[test]
    fn prototype_parameters_are_not_constants() {
        let defs = extract(
            "float f(const float x);\nfloat g(float a,\n         const float y, float z);\nconst float K = 1.0;\n",
        );
        assert_eq!(names(&defs.constants), vec!["K"]);
    }

    #[test]
    fn conditional_variants_keep_their_directives() {
        let text = "#ifdef HIGH_QUALITY\nfloat samples() { return 64.0; }\n#else\nfloat samples() { return 8.0; }\n#endif\n\
                    #ifdef HIGH_QUALITY\n#define STEPS 64\n#else\n#define STEPS 16\n#endif\n";
        let (defs, spans) = extract_with_spans(text, &HashSet::new());

        assert_eq!(defs.functions.len(), 1);
        assert_eq!(
            defs.functions.get("samples").unwrap().raw_text,
            "#ifdef HIGH_QUALITY\nfloat samples() { return 64.0; }\n#else\nfloat samples() { return 8.0; }\n#endif"
        );
        assert_eq!(
            defs.defines.get("STEPS").unwrap().raw_text,
            "#ifdef HIGH_QUALITY\n#define STEPS 64\n#else\n#define STEPS 16\n#endif"
        );
        assert!(leftover_lines(text, &spans).is_empty());
    }

    #[test]
    fn comments_are_skipped_but_kept_in_raw_text() {
        let defs = extract(
            "// float fake() { return 0.0; }\nfloat real() { /* inner */ return 1.0; } // trailing\n#define A 1 // one\n",
        );
        assert_eq!(names(&defs.functions), vec!["real"]);
        assert_eq!(
            defs.functions.get("real").unwrap().raw_text,
            "float real() { /* inner */ return 1.0; }"
        );
        assert_eq!(defs.defines.get("A").unwrap().raw_text, "#define A 1");
        assert_eq!(blank_comments("a/*\u{e9}*/b"), "a      b");
    }

    #[test]
    fn leftover_keeps_unrecognized_text() {
        let text = "#extension GL_EXT_foo : enable\nprecision mediump float;\nmediump float f() { return 1.0; }\nFoo g() { return Foo(0); }\n";
        let (defs, spans) = extract_with_spans(text, &HashSet::new());
        assert_eq!(names(&defs.functions), vec!["f"]);
        assert_eq!(
            defs.functions.get("f").unwrap().raw_text,
            "mediump float f() { return 1.0; }"
        );
        assert_eq!(
            leftover_lines(text, &spans),
            vec![
                "#extension GL_EXT_foo : enable",
                "precision mediump float;",
                "Foo g() { return Foo(0); }",
            ]
        );
    }

    #[test]
    fn builtin_types() {
        for ty in &["void", "float", "vec4", "ivec2", "uvec3", "bvec4", "dvec2", "mat3", "mat2x4", "dmat4"] {
            assert!(is_builtin_type(ty), "{}", ty);
        }
        for ty in &["vec5", "matrix", "sampler2D", "else"] {
            assert!(!is_builtin_type(ty), "{}", ty);
        }
    }
}
