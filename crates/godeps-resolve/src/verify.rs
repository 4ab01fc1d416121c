// godeps: Third-party Go dependency management for the Please build system.
// Copyright (C) 2024 International Digital Economy Academy
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// For inquiries, you can contact us via e-mail at jichuruanjian@idea.edu.cn.

//! Checks that the rules generated from the model can't depend on each other
//! circularly.

use godeps_util::graph::find_cycle;
use petgraph::graphmap::DiGraphMap;

use crate::model::{Modules, PartId};

/// The dependency graph between parts: an edge from A to B means some package
/// in A imports a package in B.
pub fn part_graph(modules: &Modules) -> DiGraphMap<PartId, ()> {
    let mut graph = DiGraphMap::new();
    for part in modules.part_ids() {
        graph.add_node(part);
        for &pkg in &modules.part(part).packages {
            for &import in &modules.package(pkg).imports {
                // Imports outside any part belong to the root module or the
                // standard library.
                let Ok(dep) = modules.find_part(import) else {
                    continue;
                };
                if dep != part {
                    graph.add_edge(part, dep, ());
                }
            }
        }
    }
    graph
}

pub fn find_part_cycle(modules: &Modules) -> Option<Vec<PartId>> {
    find_cycle(&part_graph(modules))
}

/// Renders a part cycle as `a.com/m (part 1) -> b.com/n (part 1) -> ...`.
pub fn describe_cycle(modules: &Modules, cycle: &[PartId]) -> String {
    cycle
        .iter()
        .map(|&p| {
            let part = modules.part(p);
            format!("{} (part {})", modules.module(part.module).name, part.index)
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Warns about any circular dependency between parts. Existing wildcard
/// installs are honoured even when they close a cycle, so this can happen
/// with hand-written rules.
pub fn check_part_cycles(modules: &Modules) -> bool {
    match find_part_cycle(modules) {
        Some(cycle) => {
            tracing::warn!(
                "module parts depend on each other circularly: {}",
                describe_cycle(modules, &cycle)
            );
            false
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModuleKey, PackageModule};

    fn place(modules: &mut Modules, module: &str, part_index: usize, id: &str, imports: &[&str]) {
        let mid = modules.get_or_create_module(&ModuleKey::new(module));
        while modules.module(mid).parts.len() < part_index {
            modules.add_part(mid);
        }
        let part = modules.module(mid).parts[part_index - 1];
        let pkg = modules.get_or_create_package(id);
        let deps: Vec<_> = imports
            .iter()
            .map(|i| modules.get_or_create_package(i))
            .collect();
        let p = modules.package_mut(pkg);
        p.module = Some(PackageModule::new(module, "v1.0.0"));
        p.imports.extend(deps);
        modules.part_mut(part).packages.insert(pkg);
        modules.set_assigned_part(pkg, part);
    }

    #[test]
    fn detects_cycles_between_parts() {
        let mut modules = Modules::new();
        place(&mut modules, "a.com", 1, "a.com/x", &["b.com/y"]);
        place(&mut modules, "b.com", 1, "b.com/y", &["a.com/z"]);
        place(&mut modules, "a.com", 1, "a.com/z", &["fmt"]);

        let cycle = find_part_cycle(&modules).unwrap();
        assert_eq!(cycle.len(), 3);
        let described = describe_cycle(&modules, &cycle);
        assert!(described.contains("a.com (part 1)"), "{described}");
        assert!(described.contains("b.com (part 1)"), "{described}");
        assert!(!check_part_cycles(&modules));
    }

    #[test]
    fn split_parts_are_acyclic() {
        let mut modules = Modules::new();
        place(&mut modules, "a.com", 1, "a.com/x", &["b.com/y"]);
        place(&mut modules, "b.com", 1, "b.com/y", &["a.com/z"]);
        place(&mut modules, "a.com", 2, "a.com/z", &[]);

        let graph = part_graph(&modules);
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        assert!(check_part_cycles(&modules));
    }
}
