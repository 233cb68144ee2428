//! Typed honeypot configuration
//!
//! The synthesis pipeline works on untyped JSON until the document has passed
//! schema validation; only then is it converted into a
//! [`HoneypotConfiguration`]. Field names follow the honeypot's own service
//! file format (`apiVersion`, `passwordRegex`, ...).

use crate::error::SynthesisError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Service protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTP service
    Http,
    /// Interactive SSH service
    Ssh,
    /// Raw TCP banner service
    Tcp,
}

impl Protocol {
    /// All supported protocols
    pub const ALL: [Self; 3] = [Self::Http, Self::Ssh, Self::Tcp];

    /// Whether services of this protocol may carry a generative-response plugin
    #[inline]
    #[must_use]
    pub fn supports_plugin(self) -> bool {
        matches!(self, Self::Http | Self::Ssh)
    }

    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Ssh => "ssh",
            Self::Tcp => "tcp",
        }
    }

    /// Parse a wire name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generative-response plugin reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmPlugin {
    /// Provider name
    pub llm_provider: String,
    /// Model name
    pub llm_model: String,
    /// Credential placeholder
    #[serde(rename = "openAISecretKey")]
    pub open_ai_secret_key: String,
    /// System prompt for the emulated service
    pub prompt: String,
}

/// HTTP request-matching rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpCommand {
    /// Request pattern
    pub regex: String,
    /// Response body
    pub handler: String,
    /// Response headers
    #[serde(default)]
    pub headers: Vec<String>,
    /// Response status
    pub status_code: u16,
}

/// SSH command-matching rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshCommand {
    /// Command pattern
    pub regex: String,
    /// Response text
    pub handler: String,
    /// Plugin handling matched commands
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

/// Protocol-specific service fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "lowercase")]
pub enum ServiceDetails {
    /// HTTP service
    Http {
        /// Request rules
        commands: Vec<HttpCommand>,
        /// Plugin, serialized as `null` when unused
        plugin: Option<LlmPlugin>,
    },
    /// SSH service
    #[serde(rename_all = "camelCase")]
    Ssh {
        /// Command rules
        commands: Vec<SshCommand>,
        /// Accepted passwords
        password_regex: String,
        /// Session deadline
        deadline_timeout_seconds: u32,
        /// Reported server name
        server_name: String,
        /// Plugin, serialized as `null` when unused
        plugin: Option<LlmPlugin>,
    },
    /// TCP banner service
    #[serde(rename_all = "camelCase")]
    Tcp {
        /// Banner sent on connect
        banner: String,
        /// Connection deadline
        deadline_timeout_seconds: u32,
    },
}

impl ServiceDetails {
    /// Protocol tag
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http { .. } => Protocol::Http,
            Self::Ssh { .. } => Protocol::Ssh,
            Self::Tcp { .. } => Protocol::Tcp,
        }
    }

    /// Plugin, for protocols that support one
    #[must_use]
    pub fn plugin(&self) -> Option<&LlmPlugin> {
        match self {
            Self::Http { plugin, .. } | Self::Ssh { plugin, .. } => plugin.as_ref(),
            Self::Tcp { .. } => None,
        }
    }
}

fn default_api_version() -> String {
    "v1".to_string()
}

/// One service descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service file format version
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    /// Listen address (e.g. `:22`)
    pub address: String,
    /// Free-text description
    pub description: String,
    /// CVEs this service exposes
    #[serde(default)]
    pub cve_tags: Vec<String>,
    /// Description of the exposed vulnerabilities
    #[serde(default)]
    pub cve_description: String,
    /// Protocol-specific fields
    #[serde(flatten)]
    pub details: ServiceDetails,
}

impl Service {
    /// Protocol tag
    #[inline]
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.details.protocol()
    }
}

/// A complete honeypot configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoneypotConfiguration {
    /// Unique id
    pub id: Uuid,
    /// Creation time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Summary of the configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Services in order
    pub services: Vec<Service>,
}

impl HoneypotConfiguration {
    /// Build from a validated JSON document
    ///
    /// # Errors
    /// Returns [`SynthesisError::Config`] if the document does not map onto
    /// the typed model.
    pub fn from_value(document: Value) -> Result<Self, SynthesisError> {
        serde_json::from_value(document).map_err(|e| SynthesisError::Config(e.to_string()))
    }

    /// JSON document form
    ///
    /// # Errors
    /// Returns [`SynthesisError::Serialization`] on encoder failure.
    pub fn to_value(&self) -> Result<Value, SynthesisError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Id as a string
    #[must_use]
    pub fn id_string(&self) -> String {
        self.id.to_string()
    }

    /// Every CVE tag across services, in service order
    pub fn cve_tags(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .flat_map(|service| service.cve_tags.iter().map(String::as_str))
    }

    /// Non-empty CVE descriptions, in service order
    pub fn cve_descriptions(&self) -> impl Iterator<Item = &str> {
        self.services
            .iter()
            .map(|service| service.cve_description.as_str())
            .filter(|text| !text.trim().is_empty())
    }

    /// Service descriptions, in service order
    pub fn service_descriptions(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|service| service.description.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn document() -> Value {
        json!({
            "id": "7f1c2a4e-0b5d-4d1e-9c1a-2f6f1b9d8e11",
            "timestamp": "2025-06-12T14:30:00Z",
            "description": "Legacy web and shell host",
            "services": [
                {
                    "apiVersion": "v1",
                    "protocol": "ssh",
                    "address": ":22",
                    "description": "OpenSSH 7.4",
                    "cve_tags": ["CVE-2018-15473"],
                    "cve_description": "User enumeration",
                    "commands": [{"regex": "^ls$", "handler": "bin etc home"}],
                    "passwordRegex": "^(root|123456)$",
                    "deadlineTimeoutSeconds": 60,
                    "serverName": "ubuntu",
                    "plugin": null
                },
                {
                    "protocol": "tcp",
                    "address": ":3306",
                    "description": "MySQL banner",
                    "cve_tags": [],
                    "cve_description": "",
                    "banner": "5.7.38-log",
                    "deadlineTimeoutSeconds": 10
                }
            ]
        })
    }

    #[test]
    fn typed_model_from_document() {
        let config = HoneypotConfiguration::from_value(document()).unwrap();
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[0].protocol(), Protocol::Ssh);
        assert_eq!(config.services[1].api_version, "v1");
        assert_eq!(config.cve_tags().collect::<Vec<_>>(), vec!["CVE-2018-15473"]);
        assert_eq!(config.cve_descriptions().count(), 1);
    }

    #[test]
    fn plugin_field_rule_on_serialization() {
        let config = HoneypotConfiguration::from_value(document()).unwrap();
        let value = config.to_value().unwrap();

        assert_eq!(value["services"][0]["plugin"], Value::Null);
        assert!(value["services"][0].as_object().unwrap().contains_key("plugin"));
        assert!(!value["services"][1].as_object().unwrap().contains_key("plugin"));
        assert_eq!(value["services"][1]["protocol"], "tcp");
    }

    #[test]
    fn protocol_names() {
        assert_eq!(Protocol::parse("ssh"), Some(Protocol::Ssh));
        assert_eq!(Protocol::parse("ftp"), None);
        assert!(Protocol::Http.supports_plugin());
        assert!(!Protocol::Tcp.supports_plugin());
    }
}
