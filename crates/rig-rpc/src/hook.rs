//! Startup hook ordering.
//!
//! Hooks may declare names they provide and names they depend on. [`order`]
//! moves every provider in front of the hooks depending on it and otherwise
//! keeps the original order. Cycles are not an error: they are placed on a
//! best-effort basis.

use std::collections::HashMap;

/// Something that can be ordered by the names it provides and depends on.
pub trait Dependency {
    fn provides(&self) -> &[&str] {
        &[]
    }

    fn depends_on(&self) -> &[&str] {
        &[]
    }
}

/// Reorder `items` so that providers come before their dependents.
pub fn order<T: Dependency>(items: Vec<T>) -> Vec<T> {
    let sequence = sequence(&items);
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    sequence
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}

fn sequence<T: Dependency>(items: &[T]) -> Vec<usize> {
    let mut providers: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, item) in items.iter().enumerate() {
        for name in item.provides() {
            providers.entry(*name).or_default().push(i);
        }
    }

    let mut placed = vec![false; items.len()];
    let mut sequence = Vec::with_capacity(items.len());
    for i in 0..items.len() {
        place(i, items, &providers, &mut placed, &mut sequence);
    }
    sequence
}

fn place<T: Dependency>(
    i: usize,
    items: &[T],
    providers: &HashMap<&str, Vec<usize>>,
    placed: &mut [bool],
    sequence: &mut Vec<usize>,
) {
    if placed[i] {
        return;
    }
    // Marked before recursing so a cycle terminates.
    placed[i] = true;

    let mut needed: Vec<usize> = items[i]
        .depends_on()
        .iter()
        .filter_map(|name| providers.get(name))
        .flatten()
        .copied()
        .collect();
    needed.sort_unstable();
    for j in needed {
        place(j, items, providers, placed, sequence);
    }
    sequence.push(i);
}
