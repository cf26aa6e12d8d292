//! Ancestor chain reconstruction.

use std::borrow::Cow;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::device::DeviceNode;
use crate::error::LookupError;
use crate::subsystem::DeviceSubsystem;

use super::summary::{AggregatedSummary, SummaryPadding};
use super::ResolverConfig;

/// A device followed by its ancestors, self first and root last.
///
/// Every node carries its own system attributes merged over its properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AncestorChain {
    nodes: Vec<DeviceNode>,
}

impl AncestorChain {
    /// Number of nodes, self included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the walk never started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The starting device.
    #[must_use]
    pub fn device(&self) -> Option<&DeviceNode> {
        self.nodes.first()
    }

    /// The oldest ancestor.
    #[must_use]
    pub fn root(&self) -> Option<&DeviceNode> {
        self.nodes.last()
    }

    /// Self first, root last.
    pub fn iter(&self) -> std::slice::Iter<'_, DeviceNode> {
        self.nodes.iter()
    }

    /// Root first, self last.
    pub fn iter_root_first(&self) -> std::iter::Rev<std::slice::Iter<'_, DeviceNode>> {
        self.nodes.iter().rev()
    }

    /// Nodes self first.
    #[must_use]
    pub fn as_slice(&self) -> &[DeviceNode] {
        &self.nodes
    }

    /// Consume into the nodes, self first.
    #[must_use]
    pub fn into_vec(self) -> Vec<DeviceNode> {
        self.nodes
    }

    /// Fold into an [`AggregatedSummary`].
    #[must_use]
    pub fn summarize(&self, padding: SummaryPadding) -> AggregatedSummary {
        AggregatedSummary::fold(self, padding)
    }
}

impl<'a> IntoIterator for &'a AncestorChain {
    type Item = &'a DeviceNode;
    type IntoIter = std::slice::Iter<'a, DeviceNode>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

/// Walk from `node` to the root, enriching every step with its attributes.
///
/// The input is never modified. Traversal stops at an absent node or one
/// without a syspath; an absent or syspath-less input yields an empty chain.
///
/// # Errors
/// Any collaborator failure aborts the walk and is returned as is; nothing
/// collected so far is returned. `Cycle` and `ChainTooDeep` guard against a
/// malformed parent table.
pub fn resolve_chain(
    subsystem: &dyn DeviceSubsystem,
    node: Option<&DeviceNode>,
    config: &ResolverConfig,
) -> Result<AncestorChain, LookupError> {
    let mut nodes = Vec::new();
    let mut seen = HashSet::new();
    let mut next = node.map(Cow::Borrowed);

    while let Some(current) = next.take() {
        let Some(syspath) = current.syspath().map(str::to_string) else {
            break;
        };

        if nodes.len() >= config.max_depth {
            let start = nodes
                .first()
                .and_then(DeviceNode::syspath)
                .unwrap_or(syspath.as_str())
                .to_string();
            return Err(LookupError::ChainTooDeep {
                syspath: start,
                max_depth: config.max_depth,
            });
        }
        if !seen.insert(syspath.clone()) {
            return Err(LookupError::Cycle { syspath });
        }

        let attributes = subsystem.sysattrs(&syspath)?;
        trace!(syspath = %syspath, attributes = attributes.len(), depth = nodes.len(), "resolved chain node");

        let mut enriched = current.into_owned();
        enriched.merge_attributes(attributes);
        nodes.push(enriched);

        // Parent lookup keys on the syspath captured before the merge.
        next = subsystem.parent(&syspath)?.map(Cow::Owned);
    }

    Ok(AncestorChain { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::AttributeMap;
    use crate::subsystem::InMemorySubsystem;

    fn attrs(pairs: &[(&str, &str)]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), Some((*v).to_string())))
            .collect()
    }

    fn linear(depth: usize) -> (InMemorySubsystem, String) {
        let sys = InMemorySubsystem::new();
        let mut path = String::from("/devices");
        sys.insert_device(DeviceNode::new(path.clone()), None, attrs(&[("level", "0")]))
            .unwrap();
        for i in 1..depth {
            let child = format!("{path}/n{i}");
            sys.insert_device(
                DeviceNode::new(child.clone()),
                Some(&path),
                attrs(&[("level", &i.to_string())]),
            )
            .unwrap();
            path = child;
        }
        (sys, path)
    }

    #[test]
    fn absent_node_gives_empty_chain() {
        let sys = InMemorySubsystem::new();
        let chain = resolve_chain(&sys, None, &ResolverConfig::default()).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn node_without_syspath_gives_empty_chain() {
        let sys = InMemorySubsystem::new();
        let node = DeviceNode::empty().with_field("SUBSYSTEM", "usb");
        let chain = resolve_chain(&sys, Some(&node), &ResolverConfig::default()).unwrap();
        assert!(chain.is_empty());

        let node = DeviceNode::empty().with_null_field("syspath");
        let chain = resolve_chain(&sys, Some(&node), &ResolverConfig::default()).unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn linear_chain_has_every_ancestor_self_first() {
        let (sys, leaf) = linear(5);
        let chain = resolve_chain(&sys, Some(&DeviceNode::new(leaf.clone())), &ResolverConfig::default()).unwrap();

        assert_eq!(chain.len(), 5);
        assert_eq!(chain.device().and_then(DeviceNode::syspath), Some(leaf.as_str()));
        assert_eq!(chain.root().and_then(DeviceNode::syspath), Some("/devices"));
        let levels: Vec<_> = chain.iter().filter_map(|n| n.get("level")).collect();
        assert_eq!(levels, vec!["4", "3", "2", "1", "0"]);
    }

    #[test]
    fn attributes_overwrite_native_fields() {
        let sys = InMemorySubsystem::new();
        sys.insert_device(DeviceNode::new("/devices/a"), None, attrs(&[("foo", "from-attr")]))
            .unwrap();

        let input = DeviceNode::new("/devices/a")
            .with_field("foo", "from-node")
            .with_field("keep", "yes");
        let chain = resolve_chain(&sys, Some(&input), &ResolverConfig::default()).unwrap();

        let node = chain.device().unwrap();
        assert_eq!(node.get("foo"), Some("from-attr"));
        assert_eq!(node.get("keep"), Some("yes"));
        // The caller's node is left as it was.
        assert_eq!(input.get("foo"), Some("from-node"));
    }

    #[test]
    fn unknown_syspath_propagates_lookup_error() {
        let sys = InMemorySubsystem::new();
        let err = resolve_chain(&sys, Some(&DeviceNode::new("/devices/ghost")), &ResolverConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            LookupError::DeviceNotFound {
                syspath: "/devices/ghost".to_string()
            }
        );
    }

    #[test]
    fn max_depth_is_enforced() {
        let (sys, leaf) = linear(4);
        let config = ResolverConfig {
            max_depth: 3,
            ..ResolverConfig::default()
        };
        let err = resolve_chain(&sys, Some(&DeviceNode::new(leaf.clone())), &config).unwrap_err();
        assert_eq!(
            err,
            LookupError::ChainTooDeep {
                syspath: leaf,
                max_depth: 3
            }
        );
    }

    #[test]
    fn parent_cycle_is_reported() {
        let sys = InMemorySubsystem::new();
        sys.insert_device(DeviceNode::new("/devices/a"), None, AttributeMap::new())
            .unwrap();
        sys.insert_device(DeviceNode::new("/devices/a/b"), Some("/devices/a"), AttributeMap::new())
            .unwrap();
        // Re-parent the root under its own child.
        sys.insert_device(DeviceNode::new("/devices/a"), Some("/devices/a/b"), AttributeMap::new())
            .unwrap();

        let err = resolve_chain(&sys, Some(&DeviceNode::new("/devices/a/b")), &ResolverConfig::default())
            .unwrap_err();
        assert_eq!(
            err,
            LookupError::Cycle {
                syspath: "/devices/a/b".to_string()
            }
        );
    }

    #[test]
    fn attribute_syspath_does_not_redirect_parent_lookup() {
        let sys = InMemorySubsystem::new();
        sys.insert_device(DeviceNode::new("/devices/root"), None, AttributeMap::new())
            .unwrap();
        sys.insert_device(DeviceNode::new("/devices/elsewhere"), None, AttributeMap::new())
            .unwrap();
        sys.insert_device(
            DeviceNode::new("/devices/root/child"),
            Some("/devices/root"),
            attrs(&[("label", "child")]),
        )
        .unwrap();

        let chain = resolve_chain(
            &sys,
            Some(&DeviceNode::new("/devices/root/child")),
            &ResolverConfig::default(),
        )
        .unwrap();
        let paths: Vec<_> = chain.iter().filter_map(DeviceNode::syspath).collect();
        assert_eq!(paths, vec!["/devices/root/child", "/devices/root"]);
    }
}
