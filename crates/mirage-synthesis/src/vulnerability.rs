//! Vulnerability corpus entries
//!
//! Records are loaded once from an NVD-style JSON feed and never modified.

use crate::error::SynthesisError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// CVSS v3 fields that contribute to a record's embedding text, in order
pub const IMPACT_FIELDS: [&str; 11] = [
    "baseScore",
    "baseSeverity",
    "vectorString",
    "attackVector",
    "attackComplexity",
    "privilegesRequired",
    "userInteraction",
    "scope",
    "confidentialityImpact",
    "integrityImpact",
    "availabilityImpact",
];

/// Structured severity metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Severity {
    /// CWE-style problem types
    #[serde(default)]
    pub problem_types: Vec<String>,
    /// CVSS v3 fields, in [`IMPACT_FIELDS`] order
    #[serde(default)]
    pub cvss_v3: IndexMap<String, String>,
}

impl Severity {
    /// CVSS v3 base score, if present and numeric
    #[must_use]
    pub fn base_score(&self) -> Option<f64> {
        self.cvss_v3.get("baseScore")?.parse().ok()
    }
}

/// One corpus entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    /// CVE identifier
    pub id: String,
    /// Free-text description
    pub description: String,
    /// Severity metadata
    #[serde(default)]
    pub severity: Severity,
}

impl VulnerabilityRecord {
    /// Create a record without severity metadata
    #[must_use]
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            severity: Severity::default(),
        }
    }

    /// Attach severity metadata
    #[inline]
    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Interpret one `CVE_Items` entry of an NVD feed
    ///
    /// Returns `None` if the entry has no CVE id.
    #[must_use]
    pub fn from_nvd_item(item: &Value) -> Option<Self> {
        let cve = item.get("cve")?;
        let id = cve.pointer("/CVE_data_meta/ID")?.as_str()?.to_string();

        let description = cve
            .pointer("/description/description_data")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("value").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        let problem_types = cve
            .pointer("/problemtype/problemtype_data")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|problem| problem.get("description").and_then(Value::as_array))
            .flatten()
            .filter_map(|entry| entry.get("value").and_then(Value::as_str))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();

        let mut cvss_v3 = IndexMap::new();
        if let Some(metrics) = item.pointer("/impact/baseMetricV3/cvssV3") {
            for key in IMPACT_FIELDS {
                let text = match metrics.get(key) {
                    Some(Value::String(s)) if !s.is_empty() => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => continue,
                };
                cvss_v3.insert(key.to_string(), text);
            }
        }

        Some(Self {
            id,
            description,
            severity: Severity {
                problem_types,
                cvss_v3,
            },
        })
    }

    /// Text embedded for similarity search
    ///
    /// Description, problem types and CVSS impact fields, space-separated.
    #[must_use]
    pub fn embedding_text(&self) -> String {
        let problem_types = self.severity.problem_types.join(" ");
        let impact = self
            .severity
            .cvss_v3
            .values()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {problem_types} {impact}", self.description)
    }
}

/// Parse an NVD feed
///
/// Accepts either the feed object (`{"CVE_Items": [...]}`) or a bare list of
/// items. Items without a CVE id are skipped.
///
/// # Errors
/// Returns [`SynthesisError`] if the text is not JSON or has neither shape.
pub fn parse_nvd_feed(text: &str) -> Result<Vec<VulnerabilityRecord>, SynthesisError> {
    let feed: Value = serde_json::from_str(text)?;
    let items = match &feed {
        Value::Array(items) => items,
        Value::Object(map) => map
            .get("CVE_Items")
            .and_then(Value::as_array)
            .ok_or_else(|| SynthesisError::InvalidCorpus("missing `CVE_Items` list".into()))?,
        _ => {
            return Err(SynthesisError::InvalidCorpus(
                "feed must be an object or a list".into(),
            ))
        }
    };

    let records: Vec<_> = items
        .iter()
        .filter_map(VulnerabilityRecord::from_nvd_item)
        .collect();

    let skipped = items.len() - records.len();
    if skipped > 0 {
        tracing::warn!("Skipped {} corpus entries without a CVE id", skipped);
    }
    Ok(records)
}

/// Load an NVD feed from disk
///
/// # Errors
/// See [`parse_nvd_feed`]; also fails on I/O errors.
pub async fn load_nvd_feed(path: impl AsRef<Path>) -> Result<Vec<VulnerabilityRecord>, SynthesisError> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    let records = parse_nvd_feed(&text)?;
    tracing::info!(
        "Loaded {} vulnerability records from {}",
        records.len(),
        path.as_ref().display()
    );
    Ok(records)
}
