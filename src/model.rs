use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One parsed supplement: the shape handed to the storage/serving layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Supplement {
    pub number: u32,
    pub heading: String,
    pub eccns: Vec<EccnEntry>,
    pub metadata: SupplementMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementMetadata {
    pub eccn_count: usize,
    pub category_counts: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupplementRef {
    pub number: u32,
    pub heading: String,
}

/// Flattened catalog record for one addressable node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EccnEntry {
    pub eccn: String,
    pub heading: String,
    pub title: String,
    pub category: String,
    pub group: String,
    pub breadcrumbs: Vec<String>,
    pub supplement: SupplementRef,
    pub structure: StructureNode,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_eccn: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub child_eccns: Vec<String>,
}

/// Serialized outline node. Absent optionals are omitted to keep payloads
/// compact; `bound_to_parent` children stay visible here even though they
/// never become independent entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureNode {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub heading: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<StructureNode>,
    #[serde(skip_serializing_if = "is_false", default)]
    pub is_eccn: bool,
    #[serde(skip_serializing_if = "is_false", default)]
    pub bound_to_parent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Html {
        tag: String,
        html: String,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        id: Option<String>,
    },
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Federal Register notice metadata. Fetched elsewhere; this is only the
/// value object a local manifest deserializes into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederalRegisterDocument {
    pub document_number: String,
    pub title: String,
    pub publication_date: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub citation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub xml_path: String,
    pub part: u32,
    pub edition_date: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPaths {
    pub cache_root: String,
    pub manifest_dir: String,
    pub export_path: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestCounts {
    pub supplements_located: usize,
    pub eccn_count: usize,
    pub entries_upserted: usize,
    pub snapshots_total: i64,
    pub eccns_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub db_schema_version: String,
    pub status: String,
    pub started_at: String,
    pub updated_at: String,
    pub command: String,
    pub source: SourceDocument,
    pub paths: IngestPaths,
    pub counts: IngestCounts,
    pub federal_register: Vec<FederalRegisterDocument>,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_optionals_are_omitted_from_serialized_nodes() {
        let node = StructureNode {
            identifier: Some("3B001".to_string()),
            is_eccn: true,
            ..StructureNode::default()
        };

        let json = serde_json::to_string(&node).expect("node should serialize");
        assert_eq!(json, r#"{"identifier":"3B001","isEccn":true}"#);
    }

    #[test]
    fn content_blocks_serialize_with_a_type_tag() {
        let text = ContentBlock::Text {
            text: "Plain prose.".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&text).expect("text block should serialize"),
            r#"{"type":"text","text":"Plain prose."}"#
        );

        let html = ContentBlock::Html {
            tag: "note".to_string(),
            html: "<note>Note text</note>".to_string(),
            text: None,
            id: None,
        };
        assert_eq!(
            serde_json::to_string(&html).expect("html block should serialize"),
            r#"{"type":"html","tag":"note","html":"<note>Note text</note>"}"#
        );
    }

    #[test]
    fn federal_register_documents_deserialize_from_manifest_rows() {
        let raw = r#"
        {
          "document_number": "2024-12345",
          "title": "Implementation of Additional Export Controls",
          "publication_date": "2024-04-04",
          "html_url": "https://www.federalregister.gov/d/2024-12345"
        }
        "#;

        let document: FederalRegisterDocument =
            serde_json::from_str(raw).expect("notice row should deserialize");
        assert_eq!(document.document_number, "2024-12345");
        assert!(document.citation.is_none());
    }
}
