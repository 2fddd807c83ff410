//! Field discovery for unmarked Word templates
//!
//! Finds text that looks like a labeled blank (`產品名稱: ______`, `Owner: [ ]`),
//! short paragraphs that mention a known field keyword, and table header cells
//! whose value cell is still empty. Each candidate gets a suggested marker
//! name and, when the SSOT is available, a suggested SSOT path.

use chrono::Local;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::mapping::{MappingConfig, Marker, TemplateMapping};
use crate::ooxml::DocxDocument;
use crate::ssot;

lazy_static! {
    static ref LABELED_BLANK: Regex =
        Regex::new(r"([^\n:：]+)[：:]\s*(_+|\[.*?\]|【.*?】|＿+|\s{3,}|$)")
            .expect("labeled blank pattern is valid");
    static ref NON_ASCII_ALNUM: Regex = Regex::new(r"[^a-zA-Z0-9]").expect("pattern is valid");
}

/// Words that usually label a field
const FIELD_KEYWORDS: &[&str] = &[
    "名稱", "版本", "型號", "規格", "描述", "說明", "CPU", "記憶體", "硬碟", "儲存", "作業系統",
    "日期", "時間", "預算", "金額", "數量", "負責人", "聯絡", "電話", "地址", "Email", "Name",
    "Version", "Model", "Description", "Memory", "Storage", "Date", "Budget", "Amount", "Owner",
    "Contact", "Phone", "Address",
];

/// Known labels and their marker names
const MARKER_NAMES: &[(&str, &str)] = &[
    ("產品名稱", "ProductName"),
    ("產品型號", "ProductModel"),
    ("版本", "Version"),
    ("版本號", "VersionNumber"),
    ("描述", "Description"),
    ("說明", "Description"),
    ("CPU", "CPU"),
    ("處理器", "CPU"),
    ("記憶體", "Memory"),
    ("RAM", "Memory"),
    ("硬碟", "Storage"),
    ("儲存空間", "Storage"),
    ("作業系統", "OS"),
    ("開始日期", "StartDate"),
    ("結束日期", "EndDate"),
    ("預算", "Budget"),
    ("金額", "Amount"),
    ("負責人", "Owner"),
    ("聯絡人", "Contact"),
    ("電話", "Phone"),
    ("地址", "Address"),
    ("郵件", "Email"),
    ("Email", "Email"),
];

/// Keyword groups used to relate a label to an SSOT key
const SIMILARITY_GROUPS: &[&[&str]] = &[
    &["名稱", "name"],
    &["版本", "version"],
    &["cpu", "處理器", "processor"],
    &["記憶體", "memory", "ram"],
    &["硬碟", "儲存", "storage", "disk"],
    &["作業系統", "os", "operating"],
];

const MAX_LABEL_CHARS: usize = 30;
const MAX_KEYWORD_PARAGRAPH_CHARS: usize = 50;
const MAX_CONTEXT_CHARS: usize = 100;
const SIMILARITY_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
}

/// What rule found the field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Paragraph,
    Keyword,
    Table,
}

impl std::fmt::Display for FieldSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldSource::Paragraph => write!(f, "paragraph"),
            FieldSource::Keyword => write!(f, "keyword"),
            FieldSource::Table => write!(f, "table"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldCandidate {
    pub source: FieldSource,
    /// `paragraph 3` or `table 1, row 2, column 1`
    pub location: String,
    pub field_name: String,
    pub context: String,
    pub suggested_marker: String,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_ssot_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssot_value: Option<Value>,
}

impl FieldCandidate {
    fn new(
        source: FieldSource,
        location: String,
        field_name: &str,
        context: &str,
        confidence: Confidence,
    ) -> Self {
        Self {
            source,
            location,
            field_name: field_name.to_string(),
            context: context.chars().take(MAX_CONTEXT_CHARS).collect(),
            suggested_marker: marker_name(field_name),
            confidence,
            suggested_ssot_path: None,
            ssot_value: None,
        }
    }
}

/// Heuristically find fields that probably need a marker
pub fn discover_fields(doc: &DocxDocument) -> Vec<FieldCandidate> {
    let mut fields: Vec<FieldCandidate> = Vec::new();

    let paragraphs = doc.body_paragraph_texts();
    let non_empty = paragraphs
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty());
    for (index, text) in non_empty.enumerate() {
        let location = format!("paragraph {}", index + 1);
        let before = fields.len();

        for caps in LABELED_BLANK.captures_iter(text) {
            let label = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
            let placeholder = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            if !label.is_empty() && label.chars().count() < MAX_LABEL_CHARS {
                let confidence = if placeholder.is_empty() {
                    Confidence::Medium
                } else {
                    Confidence::High
                };
                fields.push(FieldCandidate::new(
                    FieldSource::Paragraph,
                    location.clone(),
                    label,
                    text,
                    confidence,
                ));
            }
        }

        // A paragraph already matched as a labeled blank is not repeated as a keyword hit.
        let labeled = fields.len() > before;
        let short = text.chars().count() < MAX_KEYWORD_PARAGRAPH_CHARS;
        if !labeled && short && has_keyword(text) && !fields.iter().any(|f| f.field_name == text) {
            fields.push(FieldCandidate::new(
                FieldSource::Keyword,
                location,
                text,
                text,
                Confidence::Medium,
            ));
        }
    }

    for (table_index, table) in doc.tables().iter().enumerate() {
        for (row_index, row) in table.iter().enumerate() {
            for (col_index, cell) in row.iter().enumerate() {
                if row_index != 0 && col_index != 0 {
                    continue;
                }
                let label = cell.trim();
                if label.is_empty() || !has_keyword(label) {
                    continue;
                }
                let value = if col_index == 0 {
                    row.get(1)
                } else {
                    table.get(row_index + 1).and_then(|next| next.get(col_index))
                };
                let blank = value.map(|v| v.trim().chars().count() < 3).unwrap_or(true);
                if blank {
                    fields.push(FieldCandidate::new(
                        FieldSource::Table,
                        format!(
                            "table {}, row {}, column {}",
                            table_index + 1,
                            row_index + 1,
                            col_index + 1
                        ),
                        label,
                        label,
                        Confidence::High,
                    ));
                }
            }
        }
    }

    tracing::info!("Discovered {} candidate field(s)", fields.len());
    fields
}

fn has_keyword(text: &str) -> bool {
    FIELD_KEYWORDS.iter().any(|kw| text.contains(kw))
}

/// Marker name for a label: dictionary, then ASCII letters/digits, then `Field_...`
pub fn marker_name(label: &str) -> String {
    let lookup = |name: &str| {
        MARKER_NAMES
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, marker)| marker.to_string())
    };
    if let Some(marker) = lookup(label) {
        return marker;
    }
    let cleaned = label.replace("名稱", "").replace("編號", "ID");
    if let Some(marker) = lookup(cleaned.trim()) {
        return marker;
    }

    let ascii = NON_ASCII_ALNUM.replace_all(label, "");
    if !ascii.is_empty() {
        return ascii.chars().take(30).collect();
    }
    let fallback: String = label.chars().filter(|c| c.is_alphanumeric()).take(20).collect();
    format!("Field_{}", fallback)
}

/// Rough relatedness of a label and an SSOT key (both compared lowercase)
pub fn similarity(label: &str, key: &str) -> f64 {
    let label = label.to_lowercase();
    let key = key.to_lowercase();
    let shares_group = SIMILARITY_GROUPS.iter().any(|group| {
        group.iter().any(|kw| label.contains(kw)) && group.iter().any(|kw| key.contains(kw))
    });
    if shares_group {
        0.8
    } else if label.contains(&key) || key.contains(&label) {
        0.5
    } else {
        0.0
    }
}

/// Attach the best-scoring SSOT path (above the threshold) to each candidate
pub fn suggest_ssot_paths(fields: &mut [FieldCandidate], ssot_root: &Value) {
    // Sequences cannot be placed into a single marker.
    let leaves: Vec<(String, Value)> = ssot::flatten(ssot_root)
        .into_iter()
        .filter(|(_, v)| !v.is_array())
        .collect();

    for field in fields.iter_mut() {
        let mut best: Option<(&String, &Value)> = None;
        let mut best_score = 0.0;
        for (key, value) in &leaves {
            let score = similarity(&field.field_name, key);
            if score > best_score {
                best_score = score;
                best = Some((key, value));
            }
        }
        match best {
            Some((key, value)) if best_score > SIMILARITY_THRESHOLD => {
                field.suggested_ssot_path = Some(key.clone());
                field.ssot_value = Some(value.clone());
            }
            _ => {
                field.suggested_ssot_path = None;
                field.ssot_value = None;
            }
        }
    }
}

/// Mapping with one Word template holding every candidate that has an SSOT path
pub fn suggested_mapping(fields: &[FieldCandidate], template_name: &str) -> MappingConfig {
    let mut template = TemplateMapping::new(format!("templates/{}.docx", template_name));
    for field in fields {
        if let Some(path) = &field.suggested_ssot_path {
            template
                .mappings
                .insert(path.clone(), Marker::Named(field.suggested_marker.clone()));
        }
    }
    let mut word_mappings = BTreeMap::new();
    word_mappings.insert(template_name.to_string(), template);
    MappingConfig {
        mapping_version: Some("1.0.0".to_string()),
        last_updated: Some(Local::now().format("%Y-%m-%d").to_string()),
        word_mappings,
        ..Default::default()
    }
}

/// Plain-text report grouped by confidence
pub fn render_report(fields: &[FieldCandidate]) -> String {
    let rule = "=".repeat(80);
    let high: Vec<_> = fields.iter().filter(|f| f.confidence == Confidence::High).collect();
    let medium: Vec<_> = fields.iter().filter(|f| f.confidence == Confidence::Medium).collect();
    let suggested = fields.iter().filter(|f| f.suggested_ssot_path.is_some()).count();

    let mut out = String::new();
    out.push_str(&format!("{}\nMarker suggestions\n{}\n\n", rule, rule));
    out.push_str("Summary:\n");
    out.push_str(&format!("  - candidate fields: {}\n", fields.len()));
    out.push_str(&format!("  - high confidence: {}\n", high.len()));
    out.push_str(&format!("  - medium confidence: {}\n", medium.len()));
    out.push_str(&format!("  - with suggested SSOT path: {}\n\n", suggested));

    out.push_str(&format!("{}\nHigh confidence (mark these first)\n{}\n\n", rule, rule));
    for (index, field) in high.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", index + 1, field.field_name));
        out.push_str(&format!("   location: {}\n", field.location));
        out.push_str(&format!("   source: {}\n", field.source));
        out.push_str(&format!("   marker: {}\n", field.suggested_marker));
        if let Some(path) = &field.suggested_ssot_path {
            out.push_str(&format!("   SSOT path: {}\n", path));
            let value = field
                .ssot_value
                .as_ref()
                .map(ssot::render)
                .unwrap_or_else(|| "N/A".to_string());
            out.push_str(&format!("   current value: {}\n", value));
        }
        out.push_str(&format!("   context: {}\n\n", field.context));
    }

    if !medium.is_empty() {
        out.push_str(&format!("{}\nMedium confidence (confirm manually)\n{}\n\n", rule, rule));
        for (index, field) in medium.iter().enumerate() {
            out.push_str(&format!("{}. {}\n", index + 1, field.field_name));
            out.push_str(&format!("   location: {}\n", field.location));
            out.push_str(&format!("   marker: {}\n", field.suggested_marker));
            if let Some(path) = &field.suggested_ssot_path {
                out.push_str(&format!("   SSOT path: {}\n", path));
            }
            out.push('\n');
        }
    }
    out
}
