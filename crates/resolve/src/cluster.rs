use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ClusterFlag, DuplicateCluster, MatchDecision, MatchResult, RunWarning};

/// Group records into duplicate clusters: connected components over the
/// `match` edges. Pairwise decisions are not guaranteed transitive, so a
/// component that contains an internal `no_match` edge is split by removing
/// its lowest-aggregate match edges until every internal no_match pair is
/// separated. Splitting (rather than accepting the whole component with a
/// flag) avoids false merges; affected clusters are flagged for review and
/// the run report carries one warning per split component.
pub fn build_clusters(
    record_ids: &[String],
    results: &[MatchResult],
) -> (Vec<DuplicateCluster>, Vec<RunWarning>) {
    let index: BTreeMap<&str, usize> = record_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    // Edges sorted ascending by (score, ids) so the lowest edge is removed
    // first and removal order is deterministic.
    let mut match_edges: Vec<(usize, usize, f64)> = Vec::new();
    let mut no_match_edges: Vec<(usize, usize)> = Vec::new();
    for r in results {
        let (Some(&a), Some(&b)) = (index.get(r.record_a.as_str()), index.get(r.record_b.as_str()))
        else {
            continue;
        };
        let (a, b) = if a < b { (a, b) } else { (b, a) };
        match r.decision {
            MatchDecision::Match => match_edges.push((a, b, r.aggregate_score)),
            MatchDecision::NoMatch => no_match_edges.push((a, b)),
            MatchDecision::PossibleMatch => {}
        }
    }
    match_edges.sort_by(|x, y| {
        x.2.partial_cmp(&y.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| record_ids[x.0].cmp(&record_ids[y.0]))
            .then_with(|| record_ids[x.1].cmp(&record_ids[y.1]))
    });

    let mut active = vec![true; match_edges.len()];
    let mut tainted: BTreeSet<usize> = BTreeSet::new(); // records from split components
    let mut warnings = Vec::new();

    loop {
        let components = components_of(record_ids.len(), &match_edges, &active);

        // Components holding an internal no_match edge, by component root.
        let mut offending: BTreeSet<usize> = BTreeSet::new();
        for &(a, b) in &no_match_edges {
            if components[a] == components[b] {
                offending.insert(components[a]);
            }
        }
        if offending.is_empty() {
            break;
        }

        for &root in &offending {
            let members: Vec<usize> =
                (0..record_ids.len()).filter(|&i| components[i] == root).collect();
            if tainted.is_disjoint(&members.iter().copied().collect()) {
                warnings.push(RunWarning::SplitCluster {
                    record_ids: members.iter().map(|&i| record_ids[i].clone()).collect(),
                });
            }
            tainted.extend(members.iter().copied());

            // Lowest-aggregate active edge inside this component.
            if let Some(pos) = (0..match_edges.len()).find(|&e| {
                active[e] && components[match_edges[e].0] == root
            }) {
                active[pos] = false;
            }
        }
    }

    let components = components_of(record_ids.len(), &match_edges, &active);
    let mut grouped: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..record_ids.len() {
        grouped.entry(components[i]).or_default().push(i);
    }

    let mut clusters: Vec<DuplicateCluster> = grouped
        .into_values()
        .map(|members| {
            let flags = if members.iter().any(|m| tainted.contains(m)) {
                vec![ClusterFlag::NonTransitiveSplit]
            } else {
                Vec::new()
            };
            let mut ids: Vec<String> =
                members.into_iter().map(|i| record_ids[i].clone()).collect();
            ids.sort();
            DuplicateCluster { record_ids: ids, flags }
        })
        .collect();
    clusters.sort_by(|x, y| x.record_ids[0].cmp(&y.record_ids[0]));

    (clusters, warnings)
}

/// Component label (smallest member index) per record, over active edges.
fn components_of(n: usize, edges: &[(usize, usize, f64)], active: &[bool]) -> Vec<usize> {
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut Vec<usize>, mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (e, &(a, b, _)) in edges.iter().enumerate() {
        if !active[e] {
            continue;
        }
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            parent[hi] = lo;
        }
    }

    (0..n).map(|i| find(&mut parent, i)).collect()
}
