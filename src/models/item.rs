//! Vault item shapes as emitted by `op list items` and `op get item`.

use serde::Deserialize;
use std::fmt;

/// One entry of the catalog listing. Only the uuid and tags are relied on.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemSummary {
    pub uuid: String,
    #[serde(default)]
    pub overview: Overview,
}

impl ItemSummary {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.overview.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Overview {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A fully fetched vault item.
#[derive(Debug, Clone, Deserialize)]
pub struct VaultItem {
    pub uuid: String,
    #[serde(default)]
    pub overview: Overview,
    #[serde(default)]
    pub details: Option<ItemDetails>,
}

impl VaultItem {
    /// Field lists of the sections that carry a `fields` entry, in section order.
    ///
    /// `None` when the item has no details or no sections at all.
    pub fn field_sections(&self) -> Option<Vec<&[Field]>> {
        let sections = self.details.as_ref()?.sections.as_ref()?;
        Some(
            sections
                .iter()
                .filter_map(|s| s.fields.as_deref())
                .collect(),
        )
    }

    /// Name of the attached document, for document items.
    pub fn file_name(&self) -> Option<&str> {
        self.details
            .as_ref()?
            .document_attributes
            .as_ref()?
            .file_name
            .as_deref()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemDetails {
    #[serde(default)]
    pub sections: Option<Vec<Section>>,
    #[serde(default, rename = "documentAttributes")]
    pub document_attributes: Option<DocumentAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub fields: Option<Vec<Field>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentAttributes {
    #[serde(default, rename = "fileName")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    String,
    Concealed,
    #[default]
    #[serde(other)]
    Other,
}

/// A single section field: type tag `t`, kind `k`, value `v`.
#[derive(Clone, Default, Deserialize)]
pub struct Field {
    #[serde(default, rename = "t")]
    pub type_tag: String,
    #[serde(default, rename = "k")]
    pub kind: FieldKind,
    #[serde(default, rename = "v")]
    pub value: Option<serde_json::Value>,
}

impl Field {
    pub fn is(&self, type_tag: &str, kind: FieldKind) -> bool {
        self.type_tag == type_tag && self.kind == kind
    }

    /// The value as text. Numbers and booleans are rendered; other shapes yield `None`.
    pub fn text(&self) -> Option<String> {
        match self.value.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Field");
        out.field("type_tag", &self.type_tag).field("kind", &self.kind);
        if self.kind == FieldKind::Concealed {
            out.field("value", &"<concealed>");
        } else {
            out.field("value", &self.value);
        }
        out.finish()
    }
}
