use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::definitions::{Definitions, PerKind, SymbolKind, SymbolTable};
use crate::usage::UsedSet;
use crate::ResolvedIncludePath;

/// For each file, the names it contributed to the session's symbol tables.
pub type DonorMap = BTreeMap<ResolvedIncludePath, PerKind<BTreeSet<String>>>;

/// For each file, the identifiers its flattened text refers to, declarations excluded.
pub type FileDependencyMap = BTreeMap<ResolvedIncludePath, BTreeSet<String>>;

const PROPAGATED_KINDS: [SymbolKind; 3] =
    [SymbolKind::Define, SymbolKind::Constant, SymbolKind::Struct];

/// Every function reachable from `roots` over recorded calls. Callees that
/// aren't registered functions are ignored.
pub fn function_closure(roots: &BTreeSet<String>, functions: &SymbolTable) -> BTreeSet<String> {
    let mut reached: BTreeSet<String> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for name in roots {
        if let Some(definition) = functions.get(name) {
            if reached.insert(definition.name.clone()) {
                queue.push_back(&definition.name);
            }
        }
    }

    while let Some(name) = queue.pop_front() {
        let definition = match functions.get(name) {
            Some(definition) => definition,
            None => continue,
        };

        for callee in definition.calls() {
            if let Some(callee_definition) = functions.get(callee) {
                if reached.insert(callee_definition.name.clone()) {
                    queue.push_back(&callee_definition.name);
                }
            }
        }
    }

    reached
}

/// Files that contributed at least one name in `used`.
pub fn donors_of<'m>(used: &UsedSet, donors: &'m DonorMap) -> Vec<&'m ResolvedIncludePath> {
    donors
        .iter()
        .filter(|(_, donated)| {
            donated
                .iter()
                .any(|(kind, names)| names.iter().any(|name| used.contains(kind, name)))
        })
        .map(|(path, _)| path)
        .collect()
}

/// Expands directly used symbols into everything that has to be emitted with them.
///
/// Functions are closed over the call graph. Defines, constants and structs
/// mentioned by any file that donated a used symbol are then added, one hop only.
pub fn resolve_dependencies(
    direct: &UsedSet,
    symbols: &Definitions,
    donors: &DonorMap,
    dependencies: &FileDependencyMap,
) -> UsedSet {
    let mut used = direct.clone();
    used.functions = function_closure(&direct.functions, &symbols.functions);

    let donor_files = donors_of(&used, donors);
    tracing::trace!(
        "{} donor files for {} used symbols",
        donor_files.len(),
        used.total()
    );

    let mut seen: HashSet<&str> = HashSet::new();
    for file in donor_files {
        let mentioned = match dependencies.get(file) {
            Some(mentioned) => mentioned,
            None => continue,
        };

        for name in mentioned {
            if !seen.insert(name.as_str()) {
                continue;
            }
            for &kind in PROPAGATED_KINDS.iter() {
                if let Some(definition) = symbols.get(kind).get(name) {
                    used.insert(kind, &definition.name);
                }
            }
        }
    }

    used
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definitions::extract_definitions;

    fn names(set: &BTreeSet<String>) -> Vec<&str> {
        set.iter().map(String::as_str).collect()
    }

    fn roots(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn closure_excludes_dead_functions() {
        let defs = extract_definitions(
            "float b() { return 1.0; }\nfloat c() { return 2.0; }\nfloat a() { return b(); }",
            &HashSet::new(),
        );
        let reached = function_closure(&roots(&["a"]), &defs.functions);
        assert_eq!(names(&reached), vec!["a", "b"]);
    }

    #[test]
    fn closure_terminates_on_cycles() {
        let defs = extract_definitions(
            "float x(float v) { return v > 0.0 ? y(v - 1.0) : 0.0; }\n\
             float y(float v) { return x(v * 0.5); }",
            &HashSet::new(),
        );
        let reached = function_closure(&roots(&["x"]), &defs.functions);
        assert_eq!(names(&reached), vec!["x", "y"]);
    }

    #[test]
    fn unknown_roots_are_ignored() {
        let defs = Definitions::default();
        assert!(function_closure(&roots(&["nope"]), &defs.functions).is_empty());
    }

    #[test]
    fn propagation_is_single_hop() {
        let file_a = ResolvedIncludePath("a.glsl".to_string());
        let file_b = ResolvedIncludePath("b.glsl".to_string());

        let mut symbols = extract_definitions(
            "#define UNUSED 1\nconst float K = 2.0 * float(UNUSED);",
            &HashSet::new(),
        );
        for def in extract_definitions("float scaled(float v) { return v * K; }", &HashSet::new()).all() {
            symbols.insert(def.clone());
        }

        let mut donors = DonorMap::new();
        let mut donated_a = PerKind::<BTreeSet<String>>::default();
        donated_a.functions.insert("scaled".to_string());
        donors.insert(file_a.clone(), donated_a);
        let mut donated_b = PerKind::<BTreeSet<String>>::default();
        donated_b.defines.insert("UNUSED".to_string());
        donated_b.constants.insert("K".to_string());
        donors.insert(file_b.clone(), donated_b);

        let mut dependencies = FileDependencyMap::new();
        dependencies.insert(file_a, roots(&["scaled", "float", "v", "K"]));
        dependencies.insert(file_b, roots(&["UNUSED", "K", "float"]));

        let mut direct = UsedSet::default();
        direct.insert(SymbolKind::Function, "scaled");

        let used = resolve_dependencies(&direct, &symbols, &donors, &dependencies);
        assert_eq!(names(&used.functions), vec!["scaled"]);
        assert_eq!(names(&used.constants), vec!["K"]);
        // K makes b.glsl a donor only after propagation, which doesn't recurse.
        assert!(used.defines.is_empty());
    }
}
