use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use kiln_core::ForwardRelPathBuf;

/// Attribute values as the parser produced them, keyed by attribute name in
/// declaration order.
pub type AttrMap = IndexMap<SmolStr, serde_json::Value>;

/// The minimally-interpreted parse result for a single rule.
///
/// Attribute values are uncoerced; in particular the rule's short name is the
/// `name` attribute, which the parser is not required to have validated. Name
/// validation happens when the cell state derives target identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTargetNode {
    /// Package path of the build file that declared this rule, cell-relative.
    pub package: ForwardRelPathBuf,
    /// Rule type name, e.g. `java_library`.
    pub rule_type: SmolStr,
    pub visibility: Vec<String>,
    pub within_view: Vec<String>,
    pub attrs: AttrMap,
}

impl RawTargetNode {
    pub fn new(package: ForwardRelPathBuf, rule_type: impl Into<SmolStr>) -> Self {
        Self {
            package,
            rule_type: rule_type.into(),
            visibility: Vec::new(),
            within_view: Vec::new(),
            attrs: AttrMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<SmolStr>, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// The rule's short name, if the parser recorded a string `name` attribute.
    pub fn name(&self) -> Option<&str> {
        self.attrs.get("name").and_then(|value| value.as_str())
    }
}
