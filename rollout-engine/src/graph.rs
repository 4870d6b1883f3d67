//! Unit graph resolver.
//!
//! Turns a [`UnitSet`] and a selection into an [`ExecutionPlan`]: the
//! transitive closure of the selected units in dependency order, ties broken by
//! declaration order. Pure: nothing is read from the registry or the chain.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rollout_core::UnitName;

use crate::error::GraphError;
use crate::unit::{Unit, UnitSet};

/// Units in the order they must run. Every dependency precedes its dependents.
#[derive(Debug, Clone)]
pub struct ExecutionPlan<'a> {
    units: Vec<&'a Unit>,
}

impl<'a> ExecutionPlan<'a> {
    pub fn units(&self) -> &[&'a Unit] {
        &self.units
    }

    pub fn names(&self) -> Vec<&'a UnitName> {
        self.units.iter().map(|u| u.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// First planned dependency of `unit` that is in `among`.
    ///
    /// Each dependency resolves the way [`resolve`] does: the planned unit of
    /// that name, else every planned unit carrying that tag.
    pub fn dependency_in<'s>(
        &self,
        unit: &Unit,
        among: &'s BTreeSet<UnitName>,
    ) -> Option<&'s UnitName> {
        unit.dependencies().iter().find_map(|dependency| {
            let named = self.units.iter().any(|u| u.name().0 == *dependency);
            self.units
                .iter()
                .filter(|u| {
                    if named {
                        u.name().0 == *dependency
                    } else {
                        u.has_tag(dependency)
                    }
                })
                .find_map(|u| among.get(u.name()))
        })
    }
}

/// Positions of the units a selector names: the unit of that name, else every
/// unit carrying that tag.
fn select(units: &UnitSet, selector: &str) -> Result<Vec<usize>, GraphError> {
    if let Some(position) = units.position(selector) {
        return Ok(vec![position]);
    }
    let tagged: Vec<usize> = units
        .as_slice()
        .iter()
        .enumerate()
        .filter(|(_, u)| u.has_tag(selector))
        .map(|(i, _)| i)
        .collect();
    if tagged.is_empty() {
        return Err(GraphError::UnknownUnit {
            name: selector.to_owned(),
        });
    }
    Ok(tagged)
}

/// Resolve `requested` (unit names or tags; empty selects every unit).
pub fn resolve<'a>(
    units: &'a UnitSet,
    requested: &[String],
) -> Result<ExecutionPlan<'a>, GraphError> {
    let all = units.as_slice();

    let mut roots = BTreeSet::new();
    if requested.is_empty() {
        roots.extend(0..all.len());
    }
    for selector in requested {
        roots.extend(select(units, selector)?);
    }

    // Transitive closure, recording each unit's dependencies.
    let mut deps: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
    let mut queue: VecDeque<usize> = roots.into_iter().collect();
    while let Some(current) = queue.pop_front() {
        if deps.contains_key(&current) {
            continue;
        }
        let mut needed = BTreeSet::new();
        for dependency in all[current].dependencies() {
            needed.extend(select(units, dependency)?);
        }
        queue.extend(needed.iter().copied());
        deps.insert(current, needed);
    }

    // Kahn's algorithm; the ready set is ordered by declaration position.
    let mut indegree: BTreeMap<usize, usize> = deps.iter().map(|(&u, d)| (u, d.len())).collect();
    let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (&unit, needed) in &deps {
        for &dependency in needed {
            dependents.entry(dependency).or_default().push(unit);
        }
    }
    let mut ready: BTreeSet<usize> = indegree
        .iter()
        .filter(|(_, &n)| n == 0)
        .map(|(&u, _)| u)
        .collect();
    let mut order = Vec::with_capacity(deps.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &dependent in dependents.get(&next).into_iter().flatten() {
            if let Some(n) = indegree.get_mut(&dependent) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(dependent);
                }
            }
        }
    }

    if order.len() < deps.len() {
        return Err(GraphError::CyclicDependency {
            units: cycle_members(&deps, &order)
                .into_iter()
                .map(|i| all[i].name().clone())
                .collect(),
        });
    }

    let plan = ExecutionPlan {
        units: order.into_iter().map(|i| &all[i]).collect(),
    };
    tracing::debug!(units = plan.len(), "resolved execution plan");
    Ok(plan)
}

/// Units left over after a topological pass, minus those that only sit
/// downstream of a cycle.
fn cycle_members(deps: &BTreeMap<usize, BTreeSet<usize>>, ordered: &[usize]) -> Vec<usize> {
    let done: BTreeSet<usize> = ordered.iter().copied().collect();
    let mut remaining: BTreeSet<usize> = deps
        .keys()
        .copied()
        .filter(|u| !done.contains(u))
        .collect();
    loop {
        // A unit nothing remaining depends on cannot be on a cycle.
        let leaf = remaining
            .iter()
            .copied()
            .find(|&u| !remaining.iter().any(|other| deps[other].contains(&u)));
        match leaf {
            Some(u) => {
                remaining.remove(&u);
            }
            None => break,
        }
    }
    remaining.into_iter().collect()
}
