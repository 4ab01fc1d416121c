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

use std::collections::HashMap;

use petgraph::graphmap::{DiGraphMap, NodeTrait};
use petgraph::visit::{Control, DfsEvent, depth_first_search};

/// Returns a cycle through `start`, beginning and ending with it, if there
/// is one.
pub fn get_example_cycle<N: NodeTrait, E>(m: &DiGraphMap<N, E>, start: N) -> Option<Vec<N>> {
    // the parent of each node in the spanning tree
    let mut spanning_tree = HashMap::new();
    let res = depth_first_search(m, [start], |ev| match ev {
        DfsEvent::TreeEdge(parent, n) => {
            spanning_tree.insert(n, parent);
            Control::Continue
        }
        DfsEvent::BackEdge(u, v) if v == start => Control::Break(u),
        _ => Control::Continue,
    });
    let last = res.break_value()?;
    let mut cycle = vec![start];
    let mut curr = last;
    while curr != start {
        cycle.push(curr);
        curr = *spanning_tree.get(&curr)?;
    }
    cycle.push(start);
    let n = cycle.len();
    cycle[1..n - 1].reverse();
    Some(cycle)
}

/// Finds some cycle in the graph.
pub fn find_cycle<N: NodeTrait, E>(m: &DiGraphMap<N, E>) -> Option<Vec<N>> {
    petgraph::algo::tarjan_scc(m)
        .into_iter()
        .find(|scc| scc.len() > 1 || m.contains_edge(scc[0], scc[0]))
        .and_then(|scc| get_example_cycle(m, scc[0]))
}
