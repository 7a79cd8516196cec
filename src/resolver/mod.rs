//! Dependency Resolver (§4.7): topological order by coloured DFS, with
//! stable first-seen-in-input tie-breaking and a distinct error for cycles
//! versus missing dependencies.

use crate::error::{CoreError, CoreResult};
use crate::model::Mod;
use std::collections::HashMap;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    Visiting,
    Done,
}

/// Every referenced dependency must be present in `mods`.
pub fn validate(mods: &[Mod]) -> CoreResult<()> {
    let keys: std::collections::HashSet<String> = mods.iter().map(|m| m.key()).collect();
    for m in mods {
        for dep in &m.dependencies {
            if !keys.contains(&dep.key()) {
                return Err(CoreError::MissingDependency(dep.key()));
            }
        }
    }
    Ok(())
}

/// Produce an order where every dependency precedes its dependents.
pub fn resolve(mods: &[Mod]) -> CoreResult<Vec<Mod>> {
    let by_key: HashMap<String, &Mod> = mods.iter().map(|m| (m.key(), m)).collect();
    let mut colors: HashMap<String, Color> = mods.iter().map(|m| (m.key(), Color::Unvisited)).collect();
    let mut order: Vec<String> = Vec::with_capacity(mods.len());

    for m in mods {
        visit(&m.key(), &by_key, &mut colors, &mut order)?;
    }

    Ok(order
        .into_iter()
        .map(|key| (*by_key.get(&key).expect("resolved key exists")).clone())
        .collect())
}

fn visit(
    key: &str,
    by_key: &HashMap<String, &Mod>,
    colors: &mut HashMap<String, Color>,
    order: &mut Vec<String>,
) -> CoreResult<()> {
    match colors.get(key) {
        Some(Color::Done) => return Ok(()),
        Some(Color::Visiting) => return Err(CoreError::DependencyLoop(key.to_string())),
        _ => {}
    }

    colors.insert(key.to_string(), Color::Visiting);

    let m = by_key
        .get(key)
        .ok_or_else(|| CoreError::MissingDependency(key.to_string()))?;

    for dep in &m.dependencies {
        let dep_key = dep.key();
        if !by_key.contains_key(&dep_key) {
            return Err(CoreError::MissingDependency(dep_key));
        }
        visit(&dep_key, by_key, colors, order)?;
    }

    colors.insert(key.to_string(), Color::Done);
    order.push(key.to_string());
    Ok(())
}

/// Every mod reachable from `start` (not including `start` itself).
pub fn transitive(start: &Mod, lookup: &[Mod]) -> CoreResult<Vec<Mod>> {
    let by_key: HashMap<String, &Mod> = lookup.iter().map(|m| (m.key(), m)).collect();
    let mut colors: HashMap<String, Color> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    visit(&start.key(), &by_key, &mut colors, &mut order)?;
    order.retain(|k| k != &start.key());

    Ok(order
        .into_iter()
        .map(|key| (*by_key.get(&key).expect("resolved key exists")).clone())
        .collect())
}
