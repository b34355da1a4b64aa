use std::collections::{BTreeSet, HashSet};

use crate::definitions::{call_sites, identifiers, Definitions, PerKind, SymbolKind};

/// Names that must be emitted at an inclusion point.
pub type UsedSet = PerKind<BTreeSet<String>>;

impl UsedSet {
    pub fn contains(&self, kind: SymbolKind, name: &str) -> bool {
        self.get(kind).contains(name)
    }

    pub fn insert(&mut self, kind: SymbolKind, name: &str) -> bool {
        self.get_mut(kind).insert(name.to_string())
    }

    pub fn total(&self) -> usize {
        self.iter().map(|(_, names)| names.len()).sum()
    }
}

/// Finds the symbols of `definitions` that `calling_code` refers to directly.
///
/// Functions count only when called, i.e. followed by `(`. Everything else
/// counts on any whole-word occurrence of its name or one of its aliases.
pub fn find_used_symbols(calling_code: &str, definitions: &Definitions) -> UsedSet {
    let words: HashSet<&str> = identifiers(calling_code).collect();
    let calls: HashSet<&str> = call_sites(calling_code).collect();

    let mut used = UsedSet::default();

    for name in calls {
        if definitions.functions.contains(name) {
            used.insert(SymbolKind::Function, name);
        }
    }

    for kind in [SymbolKind::Define, SymbolKind::Constant, SymbolKind::Struct] {
        for definition in definitions.get(kind).iter() {
            if definition.names().any(|name| words.contains(name)) {
                used.insert(kind, &definition.name);
            }
        }
    }

    used
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs(text: &str) -> Definitions {
        crate::definitions::extract_definitions(text, &HashSet::new())
    }

    #[test]
    fn whole_word_matching() {
        let definitions = defs("const float FOO = 1.0;\n#define BAR 2\n");
        let used = find_used_symbols("float x = FOOBAR + BARN;", &definitions);
        assert_eq!(used.total(), 0);

        let used = find_used_symbols("float x = FOO * float(BAR);", &definitions);
        assert!(used.contains(SymbolKind::Constant, "FOO"));
        assert!(used.contains(SymbolKind::Define, "BAR"));
    }

    #[test]
    fn functions_must_be_called() {
        let definitions = defs("float a() { return 1.0; }\nfloat b() { return 2.0; }");
        let used = find_used_symbols("float x = a (); float b;", &definitions);
        assert!(used.contains(SymbolKind::Function, "a"));
        assert!(!used.contains(SymbolKind::Function, "b"));
    }

    #[test]
    fn block_members_select_the_block() {
        let definitions = defs("uniform Lights { vec3 uSun; vec3 uSky; };\nuniform Fog { float density; } fog;");
        let used = find_used_symbols("vec3 c = uSky * fog.density;", &definitions);
        assert!(used.contains(SymbolKind::Constant, "Lights"));
        assert!(used.contains(SymbolKind::Constant, "fog"));
        assert_eq!(used.total(), 2);
    }

    #[test]
    fn structs_used_by_name() {
        let definitions = defs("struct Material { vec3 albedo; };");
        let used = find_used_symbols("void main() { Material m; }", &definitions);
        assert!(used.contains(SymbolKind::Struct, "Material"));
    }
}
