use std::collections::{BTreeSet, HashSet};

use crate::command::CommandRunner;
use crate::error::SlurmError;
use crate::parser::{NodeListing, parse_node_listing};
use crate::utils::sorted_unique;

/// Marker for "no GPU", always offered as the first GRES choice
pub const NO_GPU: &str = "gpu:0";

/// Arguments to `scontrol` for the node inventory
pub const NODE_QUERY_ARGS: [&str; 3] = ["--json", "show", "node"];

/// Aggregate of every node in the cluster at fetch time
///
/// Built in one go from a node listing and never modified afterwards. Sequences keep one entry
/// per node, in listing order, duplicates included; the `available_*` methods reduce them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub cpu_counts: Vec<u32>,
    /// Usable memory per node in MB: real memory minus specialized memory
    pub mem_sizes: Vec<u64>,
    /// GRES descriptor of each node that has one
    pub generic_resources: Vec<String>,
    pub partitions: Vec<String>,
    /// Distinct combinations of active features
    pub feature_sets: HashSet<BTreeSet<String>>,
}

impl From<NodeListing> for NodeInfo {
    fn from(listing: NodeListing) -> Self {
        let mut info = NodeInfo::default();
        for node in listing.nodes {
            info.cpu_counts.push(node.cpus);
            info.mem_sizes
                .push(node.real_memory.saturating_sub(node.specialized_memory));
            if let Some(gres) = node.gres
                && !gres.is_empty()
            {
                info.generic_resources.push(gres);
            }
            info.partitions.extend(node.partitions);
            if !node.active_features.is_empty() {
                info.feature_sets
                    .insert(node.active_features.into_iter().collect());
            }
        }
        info
    }
}

impl NodeInfo {
    /// The cluster answered with at least one node
    pub fn is_online(&self) -> bool {
        !self.cpu_counts.is_empty() && !self.mem_sizes.is_empty()
    }

    pub fn available_cpu_counts(&self) -> Vec<u32> {
        sorted_unique(self.cpu_counts.iter().copied())
    }

    pub fn available_mem_sizes(&self) -> Vec<u64> {
        sorted_unique(self.mem_sizes.iter().copied())
    }

    /// Distinct GRES descriptors, sorted, with `gpu:0` always first and only once
    pub fn available_generic_resources(&self) -> Vec<String> {
        let mut gres = vec![NO_GPU.to_string()];
        gres.extend(sorted_unique(
            self.generic_resources
                .iter()
                .filter(|g| g.as_str() != NO_GPU)
                .cloned(),
        ));
        gres
    }

    pub fn available_partitions(&self) -> Vec<String> {
        sorted_unique(self.partitions.iter().cloned())
    }

    /// Every individual feature found on any node
    pub fn available_features(&self) -> Vec<String> {
        sorted_unique(self.feature_sets.iter().flatten().cloned())
    }
}

/// Queries the node inventory and aggregates it
///
/// A command that cannot be run or fails gives an empty `NodeInfo`, the "cluster unreachable"
/// state. Output that is not a node listing is an error
pub fn fetch_node_info(runner: &dyn CommandRunner, scontrol: &str) -> Result<NodeInfo, SlurmError> {
    let output = match runner.run(scontrol, &NODE_QUERY_ARGS) {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "node inventory unavailable, reporting no nodes");
            return Ok(NodeInfo::default());
        }
    };

    let listing = parse_node_listing(&output)
        .map_err(|e| SlurmError::malformed(&format!("{scontrol} --json show node"), e))?;
    let info = NodeInfo::from(listing);
    tracing::debug!(nodes = info.cpu_counts.len(), "loaded node inventory");
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn info(nodes: serde_json::Value) -> NodeInfo {
        NodeInfo::from(parse_node_listing(&json!({ "nodes": nodes }).to_string()).unwrap())
    }

    #[test]
    fn memory_subtracts_specialized() {
        let info = info(json!([
            {"cpus": 4, "real_memory": 16000, "specialized_memory": 2000, "gres": null},
            {"cpus": 4, "real_memory": 32000, "gres": null}
        ]));
        assert_eq!(info.available_cpu_counts(), vec![4]);
        assert_eq!(info.available_mem_sizes(), vec![14000, 32000]);
        // fetch keeps one entry per node
        assert_eq!(info.cpu_counts, vec![4, 4]);
    }

    #[test]
    fn nodes_without_gres_or_features_contribute_nothing() {
        let info = info(json!([
            {"cpus": 8, "real_memory": 1000, "gres": null, "active_features": []},
            {"cpus": 8, "real_memory": 1000, "gres": ""},
            {"cpus": 8, "real_memory": 1000, "gres": "gpu:a100:4", "active_features": ["gpu", "a100"]}
        ]));
        assert_eq!(info.generic_resources, vec!["gpu:a100:4".to_string()]);
        assert_eq!(info.feature_sets.len(), 1);
    }

    #[test]
    fn identical_feature_sets_collapse() {
        let info = info(json!([
            {"cpus": 1, "real_memory": 1, "gres": null, "active_features": ["icelake", "ib"]},
            {"cpus": 1, "real_memory": 1, "gres": null, "active_features": ["ib", "icelake"]},
            {"cpus": 1, "real_memory": 1, "gres": null, "active_features": ["genoa"]}
        ]));
        assert_eq!(info.feature_sets.len(), 2);
        assert_eq!(
            info.available_features(),
            vec!["genoa".to_string(), "ib".to_string(), "icelake".to_string()]
        );
    }

    #[test]
    fn partitions_deduplicated_and_sorted() {
        let info = info(json!([
            {"cpus": 1, "real_memory": 1, "gres": null, "partitions": ["gpu", "cpu"]},
            {"cpus": 1, "real_memory": 1, "gres": null, "partitions": ["cpu"]},
            {"cpus": 1, "real_memory": 1, "gres": null}
        ]));
        assert_eq!(info.partitions.len(), 3);
        assert_eq!(info.available_partitions(), vec!["cpu".to_string(), "gpu".to_string()]);
    }

    #[test]
    fn no_gpu_marker_always_first_once() {
        assert_eq!(NodeInfo::default().available_generic_resources(), vec![NO_GPU]);

        let info = info(json!([
            {"cpus": 1, "real_memory": 1, "gres": "gpu:v100:2"},
            {"cpus": 1, "real_memory": 1, "gres": "gpu:0"},
            {"cpus": 1, "real_memory": 1, "gres": "gpu:a100:4"},
            {"cpus": 1, "real_memory": 1, "gres": "gpu:0"},
            {"cpus": 1, "real_memory": 1, "gres": "gpu:a100:4"}
        ]));
        assert_eq!(
            info.available_generic_resources(),
            vec!["gpu:0", "gpu:a100:4", "gpu:v100:2"]
        );
    }

    #[test]
    fn online_needs_nodes() {
        assert!(!NodeInfo::default().is_online());
        let info = info(json!([{"cpus": 1, "real_memory": 1, "gres": null}]));
        assert!(info.is_online());
    }

    #[test]
    fn views_sorted_without_duplicates() {
        let info = info(json!([
            {"cpus": 64, "real_memory": 900, "gres": null},
            {"cpus": 8, "real_memory": 100, "gres": null},
            {"cpus": 64, "real_memory": 500, "gres": null},
            {"cpus": 32, "real_memory": 100, "gres": null}
        ]));
        assert_eq!(info.available_cpu_counts(), vec![8, 32, 64]);
        assert_eq!(info.available_mem_sizes(), vec![100, 500, 900]);
    }

    fn strictly_increasing<T: Ord>(values: &[T]) -> bool {
        values.windows(2).all(|w| w[0] < w[1])
    }

    fn distinct<T: Ord>(values: impl IntoIterator<Item = T>) -> Vec<T> {
        values.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
    }

    proptest! {
        #[test]
        fn views_are_sorted_distinct_inputs(
            cpu_counts in prop::collection::vec(1u32..256, 0..40),
            mem_sizes in prop::collection::vec(0u64..4096, 0..40),
            generic_resources in prop::collection::vec(
                prop::sample::select(vec!["gpu:0", "gpu:a100:4", "gpu:v100:2", "gpu:h100:8"]),
                0..20,
            ),
            partitions in prop::collection::vec("[a-d]{1,3}", 0..20),
            feature_sets in prop::collection::hash_set(
                prop::collection::btree_set("[a-e]{1,2}", 0..4),
                0..8,
            ),
        ) {
            let info = NodeInfo {
                cpu_counts: cpu_counts.clone(),
                mem_sizes: mem_sizes.clone(),
                generic_resources: generic_resources.iter().map(|g| g.to_string()).collect(),
                partitions: partitions.clone(),
                feature_sets: feature_sets.clone(),
            };

            let cpus = info.available_cpu_counts();
            prop_assert!(strictly_increasing(&cpus));
            prop_assert_eq!(cpus, distinct(cpu_counts));

            let mems = info.available_mem_sizes();
            prop_assert!(strictly_increasing(&mems));
            prop_assert_eq!(mems, distinct(mem_sizes));

            let parts = info.available_partitions();
            prop_assert!(strictly_increasing(&parts));
            prop_assert_eq!(parts, distinct(partitions));

            let features = info.available_features();
            prop_assert!(strictly_increasing(&features));
            prop_assert_eq!(features, distinct(feature_sets.into_iter().flatten()));

            let gres = info.available_generic_resources();
            prop_assert_eq!(gres[0].as_str(), NO_GPU);
            prop_assert_eq!(gres.iter().filter(|g| g.as_str() == NO_GPU).count(), 1);
            prop_assert!(strictly_increasing(&gres[1..]));
            let listed: Vec<&str> = gres[1..].iter().map(String::as_str).collect();
            prop_assert_eq!(listed, distinct(generic_resources.into_iter().filter(|g| *g != NO_GPU)));
        }
    }
}
