//! Cross-ontology label bridge.
//!
//! An entity created under one ontology's vocabulary (e.g. `Investor`) must
//! often also satisfy another ontology's vocabulary (e.g. `Organization`)
//! for cross-domain queries to work. The bridge is a static, explicit
//! mapping table, so the label set written to any node is deterministic and
//! auditable. Nothing here is inferred.

use std::collections::BTreeMap;

/// Maps a primary entity type to the additional labels it carries in other
/// ontologies' vocabularies.
#[derive(Debug, Clone, Default)]
pub struct LabelBridge {
    mappings: BTreeMap<String, Vec<String>>,
}

impl LabelBridge {
    /// An empty bridge: every entity carries only its primary label.
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock cross-domain table: financial and procurement actor types
    /// bridge into the CRM vocabulary so "show all organizations" finds them.
    pub fn standard() -> Self {
        Self::new()
            .with_mapping("Investor", ["Organization"])
            .with_mapping("FundManager", ["Organization"])
            .with_mapping("Lender", ["Organization"])
            .with_mapping("Borrower", ["Organization"])
            .with_mapping("LawFirm", ["Organization"])
            .with_mapping("Supplier", ["Organization"])
            .with_mapping("Vendor", ["Organization"])
            .with_mapping("Advisor", ["Person"])
    }

    /// Add or replace the mapping for one primary type.
    pub fn with_mapping<I, S>(mut self, primary: &str, additional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mappings.insert(
            primary.to_string(),
            additional.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Additional labels for a primary type. Empty when unmapped.
    pub fn additional_labels(&self, primary: &str) -> &[String] {
        self.mappings
            .get(primary)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The full label set to write for a node: `{primary} ∪ additional`,
    /// duplicates removed, original casing preserved, primary first.
    pub fn write_labels(&self, primary: &str) -> Vec<String> {
        let mut labels = vec![primary.to_string()];
        for label in self.additional_labels(primary) {
            if !labels.iter().any(|existing| existing == label) {
                labels.push(label.clone());
            }
        }
        labels
    }
}
