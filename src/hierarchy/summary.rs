//! Aggregation of an ancestor chain into one denormalized record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::chain::AncestorChain;

/// How fields missing on some ancestors are represented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryPadding {
    /// A field lists only the values of the nodes that carry it.
    #[default]
    Shorten,
    /// Every field lists one entry per node; gaps are `None`.
    Null,
}

/// Field name → values contributed by each node, root first, self last.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregatedSummary {
    fields: BTreeMap<String, Vec<Option<String>>>,
}

impl AggregatedSummary {
    /// Fold `chain` from the root toward the starting device.
    #[must_use]
    pub fn fold(chain: &AncestorChain, padding: SummaryPadding) -> Self {
        let mut fields: BTreeMap<String, Vec<Option<String>>> = BTreeMap::new();

        for (position, node) in chain.iter_root_first().enumerate() {
            for (name, value) in node.fields() {
                let values = fields.entry(name.to_string()).or_default();
                if padding == SummaryPadding::Null {
                    values.resize(position, None);
                }
                values.push(value.map(str::to_string));
            }
        }

        if padding == SummaryPadding::Null {
            for values in fields.values_mut() {
                values.resize(chain.len(), None);
            }
        }

        Self { fields }
    }

    /// Values of one field, root first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[Option<String>]> {
        self.fields.get(name).map(Vec::as_slice)
    }

    /// Non-null values of one field, root first.
    #[must_use]
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.fields
            .get(name)
            .map(|v| v.iter().filter_map(|s| s.as_deref()).collect())
            .unwrap_or_default()
    }

    /// Fields with their value lists, in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[Option<String>])> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of distinct fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True for an empty chain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consume into the field map.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Vec<Option<String>>> {
        self.fields
    }
}
