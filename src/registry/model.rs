//! Serde types for the versioned registry files

use std::collections::BTreeMap;

use serde::Deserialize;

/// `manifest.yml`: version pin plus the relative source list
#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    /// Semver string; the major line is pinned at load time
    pub version: String,

    /// Relative paths of the files this manifest covers
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Message direction relative to the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Broker → gateway
    #[default]
    Inbound,
    /// Gateway → broker
    Outbound,
}

/// One entry of `modules.yml`
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleEntry {
    /// VDA serial number (e.g. `SVR4H76449`)
    pub serial: String,

    /// Short identifier used by callers (e.g. `DRILL`)
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Module kind (e.g. `Processing`, `Storage`, `Input/Output`)
    #[serde(rename = "type")]
    pub kind: String,

    /// Known IP addresses of the module controller
    #[serde(default)]
    pub ip_addresses: Vec<String>,

    /// Commands this module accepts
    #[serde(default)]
    pub commands: Vec<String>,

    /// Disabled modules stay listed but are not addressable
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}

/// `modules.yml` container
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModulesFile {
    /// Declared modules, in file order
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
}

/// One entry of the topic→template mapping
///
/// Exactly one of `topic` (exact) or `pattern` (with `{name}` variables)
/// is expected; entries carrying both are treated as exact.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingEntry {
    /// Exact topic match
    #[serde(default)]
    pub topic: Option<String>,

    /// Pattern match; `{name}` captures one MQTT level
    #[serde(default)]
    pub pattern: Option<String>,

    /// Template key this topic maps to
    pub template: String,

    /// Direction override; file default applies when absent
    #[serde(default)]
    pub direction: Option<Direction>,

    /// Free-form metadata passed through to the route result
    #[serde(default)]
    pub meta: Option<serde_yaml::Value>,
}

/// `mappings/topic_template.yml` container
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingFile {
    /// Mapping entries, declaration order is significant
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,

    /// Direction applied to entries without their own
    #[serde(default)]
    pub default_direction: Direction,
}

/// Match constraints of a template
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateMatch {
    /// Fields a payload must carry
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Allowed values for the payload's `command` field
    #[serde(default)]
    pub command_enum: Option<Vec<String>>,

    /// Additional per-field enum constraints
    #[serde(default)]
    pub enums: BTreeMap<String, Vec<String>>,
}

/// One template file under `templates/`
///
/// The key is the file stem; it is not part of the YAML body.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    /// Key of the template this one extends
    #[serde(default)]
    pub extends: Option<String>,

    /// Validation constraints
    #[serde(default, rename = "match")]
    pub matcher: TemplateMatch,

    /// Example/documentation structure, not used for validation
    #[serde(default)]
    pub structure: Option<serde_yaml::Value>,

    /// Free-form metadata
    #[serde(default)]
    pub meta: Option<serde_yaml::Value>,
}

/// One per-topic configuration file under `topics/`
#[derive(Debug, Clone, Deserialize)]
pub struct TopicConfig {
    /// Concrete topic this file configures
    pub topic: String,

    /// Default publish QoS
    #[serde(default)]
    pub qos: Option<u8>,

    /// Default retain flag
    #[serde(default)]
    pub retain: Option<bool>,

    /// Human description
    #[serde(default)]
    pub description: Option<String>,
}

/// `workpieces.yml` container; an empty file yields the empty map
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkpiecesFile {
    /// NFC code → workpiece descriptor
    #[serde(default)]
    pub nfc_codes: BTreeMap<String, serde_yaml::Value>,
}

/// `enums.yml`: named enumerations shared across templates
pub type EnumsFile = BTreeMap<String, Vec<String>>;
