//! Device records reported by the native device subsystem.
//!
//! A [`DeviceNode`] is a flat bag of named fields. The native layer reports
//! udev properties (`SUBSYSTEM`, `DEVNAME`, ...) together with the device's
//! `syspath`; attribute lookups return an [`AttributeMap`] that can be merged
//! into the same namespace.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name carrying the device's syspath.
pub const SYSPATH: &str = "syspath";

/// Flat attribute name → value mapping for exactly one syspath.
///
/// A `None` value means the attribute exists but could not be read.
pub type AttributeMap = BTreeMap<String, Option<String>>;

/// One entry in the device subsystem.
///
/// Field values are opaque strings passed through unchanged. A node without a
/// readable `syspath` is terminal: it has no parent and cannot be enriched.
///
/// # Examples
///
/// ```
/// use udevkit::DeviceNode;
///
/// let node = DeviceNode::new("/sys/devices/pci0000:00")
///     .with_field("SUBSYSTEM", "pci")
///     .with_field("vendor", "0x8086");
///
/// assert_eq!(node.syspath(), Some("/sys/devices/pci0000:00"));
/// assert_eq!(node.subsystem(), Some("pci"));
/// assert_eq!(node.get("vendor"), Some("0x8086"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceNode {
    fields: BTreeMap<String, Option<String>>,
}

impl DeviceNode {
    /// Create a node carrying only a syspath.
    #[must_use]
    pub fn new(syspath: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(SYSPATH.to_string(), Some(syspath.into()));
        Self { fields }
    }

    /// Create a node with no fields at all (terminal).
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a node from arbitrary name/value pairs.
    pub fn from_fields<I, K, V>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Option<String>>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), Some(value.into()));
        self
    }

    /// Builder-style setter for a field that exists without a value.
    #[must_use]
    pub fn with_null_field(mut self, name: impl Into<String>) -> Self {
        self.fields.insert(name.into(), None);
        self
    }

    /// The device's syspath, if present and non-null.
    #[must_use]
    pub fn syspath(&self) -> Option<&str> {
        self.get(SYSPATH)
    }

    /// Whether the node can be enriched and walked upwards.
    #[must_use]
    pub fn has_syspath(&self) -> bool {
        self.syspath().is_some()
    }

    /// Subsystem name (`SUBSYSTEM`), e.g. `usb`.
    #[must_use]
    pub fn subsystem(&self) -> Option<&str> {
        self.get("SUBSYSTEM").or_else(|| self.get("subsystem"))
    }

    /// Device node under `/dev`, if the device has one.
    #[must_use]
    pub fn devnode(&self) -> Option<&str> {
        self.get("DEVNAME").or_else(|| self.get("devnode"))
    }

    /// Device type within the subsystem.
    #[must_use]
    pub fn devtype(&self) -> Option<&str> {
        self.get("DEVTYPE").or_else(|| self.get("devtype"))
    }

    /// Bound driver name.
    #[must_use]
    pub fn driver(&self) -> Option<&str> {
        self.get("DRIVER").or_else(|| self.get("driver"))
    }

    /// The string value of a field, if present and non-null.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(|v| v.as_deref())
    }

    /// The raw field entry: `Some(None)` for a field present with a null value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Option<String>> {
        self.fields.get(name)
    }

    /// Whether the field is present, null or not.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Set a field, returning the previous entry.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        value: Option<String>,
    ) -> Option<Option<String>> {
        self.fields.insert(name.into(), value)
    }

    /// Merge an attribute map into this node. Attributes win on collision.
    pub fn merge_attributes(&mut self, attributes: AttributeMap) {
        self.fields.extend(attributes);
    }

    /// Owned variant of [`merge_attributes`](Self::merge_attributes) that
    /// leaves `self` untouched.
    #[must_use]
    pub fn merged_with(&self, attributes: &AttributeMap) -> Self {
        let mut out = self.clone();
        out.fields
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        out
    }

    /// Iterate fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the node has no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Consume the node into its field map.
    #[must_use]
    pub fn into_fields(self) -> BTreeMap<String, Option<String>> {
        self.fields
    }
}

impl fmt::Display for DeviceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.syspath(), self.subsystem()) {
            (Some(path), Some(subsystem)) => write!(f, "{path} ({subsystem})"),
            (Some(path), None) => f.write_str(path),
            (None, _) => f.write_str("<detached device>"),
        }
    }
}

impl From<AttributeMap> for DeviceNode {
    fn from(fields: AttributeMap) -> Self {
        Self { fields }
    }
}
