//! Hierarchy resolution: ancestor chains and aggregated summaries.
//!
//! Resolution is synchronous and stateless; every call owns the chain and
//! summary it builds, so concurrent calls for different nodes are safe.

/// Ancestor chain traversal.
pub mod chain;
/// Root-to-self aggregation.
pub mod summary;

pub use chain::{resolve_chain, AncestorChain};
pub use summary::{AggregatedSummary, SummaryPadding};

use crate::device::DeviceNode;
use crate::error::LookupError;
use crate::subsystem::DeviceSubsystem;

/// Resolver limits and output shape.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Longest chain accepted before failing with `ChainTooDeep`.
    pub max_depth: usize,
    /// Representation of fields missing on some ancestors.
    pub padding: SummaryPadding,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 256,
            padding: SummaryPadding::Shorten,
        }
    }
}

/// Resolve the chain of `node` and fold it root-first.
///
/// # Errors
/// Propagates every `LookupError` from [`resolve_chain`].
pub fn summarize(
    subsystem: &dyn DeviceSubsystem,
    node: Option<&DeviceNode>,
    config: &ResolverConfig,
) -> Result<AggregatedSummary, LookupError> {
    let chain = resolve_chain(subsystem, node, config)?;
    Ok(AggregatedSummary::fold(&chain, config.padding))
}
