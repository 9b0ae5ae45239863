//! Call-graph instrumentation.
//!
//! During lowering the compiler records, per function, the names it
//! calls and the statically-known callee function indices. This module
//! turns those edges into recursion flags (Tarjan's strongly connected
//! components, so mutual recursion counts) and memoization flags.
//!
//! A function is flagged for memoization only when it is recursive,
//! takes at most the configured number of parameters, and is provably
//! pure (no store into an outer scope). When purity cannot be proven
//! the function is never flagged.
//!
//! Recursion detection runs only when `enable_recursion_detection` is
//! set; its output feeds memoization only when `enable_memoization` is
//! also set.

use std::collections::BTreeSet;

pub use svml_common::instrument::{FunctionProfile, Instrumentation};

use crate::compile::CompilerOptions;

/// Per-function facts collected during lowering.
#[derive(Debug, Default)]
pub(crate) struct ProfileDraft {
    pub name: String,
    pub parameters: Vec<String>,
    pub called_names: BTreeSet<String>,
    /// True if the function stores into an outer scope (STPG).
    pub stores_outer: bool,
}

/// Strongly connected components of a call graph, via iterative
/// Tarjan. Nodes are function indices; the result is in reverse
/// topological order.
pub fn strongly_connected_components(edges: &[BTreeSet<usize>]) -> Vec<Vec<usize>> {
    let n = edges.len();
    let adj: Vec<Vec<usize>> = edges.iter().map(|s| s.iter().copied().collect()).collect();

    const UNVISITED: usize = usize::MAX;
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs: Vec<Vec<usize>> = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        let mut call: Vec<(usize, usize)> = vec![(root, 0)];
        index[root] = next_index;
        low[root] = next_index;
        next_index += 1;
        stack.push(root);
        on_stack[root] = true;

        while let Some(frame) = call.last_mut() {
            let v = frame.0;
            if frame.1 < adj[v].len() {
                let w = adj[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    index[w] = next_index;
                    low[w] = next_index;
                    next_index += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
            } else {
                call.pop();
                if let Some(parent) = call.last() {
                    let p = parent.0;
                    low[p] = low[p].min(low[v]);
                }
                if low[v] == index[v] {
                    let mut component = Vec::new();
                    loop {
                        let w = stack.pop().expect("tarjan stack is never empty here");
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    sccs.push(component);
                }
            }
        }
    }
    sccs
}

/// Turn drafts plus the resolved call graph into final profiles.
pub(crate) fn build_instrumentation(
    drafts: Vec<ProfileDraft>,
    edges: &[BTreeSet<usize>],
    options: &CompilerOptions,
) -> Instrumentation {
    let n = drafts.len();
    let mut recursive = vec![false; n];

    if options.enable_recursion_detection {
        for scc in strongly_connected_components(edges) {
            if scc.len() > 1 {
                for &f in &scc {
                    recursive[f] = true;
                }
            } else if edges[scc[0]].contains(&scc[0]) {
                recursive[scc[0]] = true;
            }
        }
    }

    let memo_enabled = options.enable_recursion_detection && options.enable_memoization;
    let profiles = drafts
        .into_iter()
        .enumerate()
        .map(|(i, draft)| {
            let needs_memoization = memo_enabled
                && recursive[i]
                && draft.parameters.len() <= options.memo_param_threshold
                && !draft.stores_outer;
            FunctionProfile {
                name: draft.name,
                function_index: i,
                parameters: draft.parameters,
                called_names: draft.called_names,
                is_recursive: recursive[i],
                needs_memoization,
            }
        })
        .collect();

    Instrumentation { profiles }
}
