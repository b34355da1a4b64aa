use std::collections::BTreeSet;

use crate::definitions::{identifiers, Definition, Definitions, SymbolKind};
use crate::usage::UsedSet;

/// Orders the used functions so that callees come before their callers.
///
/// Functions are taken in registration order. Whenever a pass over the pending
/// ones makes no progress, the rest are part of (or wait on) a cycle and are
/// emitted as they stand.
pub fn order_functions<'d>(used: &BTreeSet<String>, definitions: &'d Definitions) -> Vec<&'d Definition> {
    let mut pending: Vec<&Definition> = definitions
        .functions
        .iter()
        .filter(|definition| used.contains(&definition.name))
        .collect();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let mut progressed = false;
        let mut i = 0;
        while i < pending.len() {
            let waiting = pending[i].calls().any(|callee| {
                callee != pending[i].name && pending.iter().any(|p| p.name == callee)
            });
            if waiting {
                i += 1;
            } else {
                ordered.push(pending.remove(i));
                progressed = true;
            }
        }

        if !progressed {
            tracing::debug!(
                "call cycle among {:?}; emitting in registration order",
                pending.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
            );
            ordered.append(&mut pending);
        }
    }

    ordered
}

/// Definitions of `used` in emission order: defines, constants, structs, then functions.
///
/// Constants whose declaration mentions a selected struct, such as
/// `uniform Light uLight;`, follow the structs instead.
pub fn select<'d>(used: &UsedSet, definitions: &'d Definitions) -> Vec<&'d Definition> {
    let mut selected = Vec::with_capacity(used.total());
    let in_table = |kind: SymbolKind| {
        let names = used.get(kind);
        definitions
            .get(kind)
            .iter()
            .filter(move |definition| names.contains(&definition.name))
    };

    let structs = used.get(SymbolKind::Struct);
    let (typed, plain): (Vec<&Definition>, Vec<&Definition>) =
        in_table(SymbolKind::Constant).partition(|constant| {
            identifiers(&constant.raw_text).any(|word| structs.contains(word))
        });

    selected.extend(in_table(SymbolKind::Define));
    selected.extend(plain);
    selected.extend(in_table(SymbolKind::Struct));
    selected.extend(typed);
    selected.extend(order_functions(&used.functions, definitions));
    selected
}

/// Source text for the definitions of `used`, one definition per line.
pub fn emit(used: &UsedSet, definitions: &Definitions) -> String {
    let mut out = String::new();
    for definition in select(used, definitions) {
        out.push_str(&definition.raw_text);
        out.push('\n');
    }
    out
}
