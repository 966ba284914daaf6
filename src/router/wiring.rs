//! Dashboard templates and declarative event wiring.
//!
//! A template names the worker columns and the wiring rules that route
//! events between them. Validation happens at deserialization time, so a
//! successfully parsed [`Template`] is internally consistent: unique column
//! ids, known column kinds, and no dangling wiring references.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MarigraphError;
use crate::ipc::frame::MessageType;

/// Column kinds the worker runtime knows how to host.
pub const KNOWN_COLUMN_KINDS: &[&str] = &["surface3d", "metrics", "smile", "term", "log", "probe"];

/// One worker column of the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Opaque options forwarded to the worker via `WORKER_OPTIONS`.
    #[serde(default)]
    pub options: Value,
}

/// The `(column, event)` pattern a rule matches on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSource {
    pub column: String,
    /// Canonical event name, e.g. `SELECTED`.
    pub event: String,
}

/// The `(column, action)` a rule fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleAction {
    /// Target column id, or `*` for every column except the source.
    pub column: String,
    /// Message type to send; defaults to `SET_DATA`.
    #[serde(default = "default_action")]
    pub action: String,
}

fn default_action() -> String {
    "SET_DATA".into()
}

/// A declarative routing entry, evaluated on every inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringRule {
    pub on: RuleSource,
    #[serde(rename = "do")]
    pub action: RuleAction,
}

impl WiringRule {
    /// The message type this rule emits.
    ///
    /// Guaranteed to resolve for rules inside a validated [`Template`].
    pub fn action_type(&self) -> MessageType {
        MessageType::from_name(&self.action.action).unwrap_or(MessageType::SetData)
    }
}

/// A validated dashboard description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TemplateRaw", into = "TemplateRaw")]
pub struct Template {
    pub name: String,
    pub columns: Vec<Column>,
    pub wiring: Vec<WiringRule>,
}

#[derive(Serialize, Deserialize)]
struct TemplateRaw {
    name: String,
    #[serde(default)]
    columns: Vec<Column>,
    #[serde(default)]
    wiring: Vec<WiringRule>,
}

impl TryFrom<TemplateRaw> for Template {
    type Error = MarigraphError;
    fn try_from(raw: TemplateRaw) -> Result<Self, Self::Error> {
        validate(&raw.columns, &raw.wiring)?;
        Ok(Template {
            name: raw.name,
            columns: raw.columns,
            wiring: raw.wiring,
        })
    }
}

impl From<Template> for TemplateRaw {
    fn from(t: Template) -> Self {
        Self {
            name: t.name,
            columns: t.columns,
            wiring: t.wiring,
        }
    }
}

fn validate(columns: &[Column], wiring: &[WiringRule]) -> crate::error::Result<()> {
    let mut ids = HashSet::new();
    for column in columns {
        if column.id.is_empty() {
            return Err(MarigraphError::config("column id must not be empty"));
        }
        if !ids.insert(column.id.as_str()) {
            return Err(MarigraphError::config(format!(
                "duplicate column id '{}'",
                column.id
            )));
        }
        if !KNOWN_COLUMN_KINDS.contains(&column.kind.as_str()) {
            return Err(MarigraphError::config(format!(
                "unknown column type '{}' for column '{}'",
                column.kind, column.id
            )));
        }
    }
    for rule in wiring {
        if !ids.contains(rule.on.column.as_str()) {
            return Err(MarigraphError::config(format!(
                "wiring source '{}' is not a known column",
                rule.on.column
            )));
        }
        if MessageType::from_name(&rule.on.event).is_none() {
            return Err(MarigraphError::config(format!(
                "unknown event '{}' in wiring rule",
                rule.on.event
            )));
        }
        if rule.action.column != "*" && !ids.contains(rule.action.column.as_str()) {
            return Err(MarigraphError::config(format!(
                "wiring target '{}' is not a known column",
                rule.action.column
            )));
        }
        if MessageType::from_name(&rule.action.action).is_none() {
            return Err(MarigraphError::config(format!(
                "unknown action '{}' in wiring rule",
                rule.action.action
            )));
        }
    }
    Ok(())
}

impl Template {
    /// Parse and validate a JSON template document.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load and validate a JSON template file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Rules matching an inbound `(source column, event name)` pair, in
    /// table order.
    pub fn matching_rules<'a>(
        rules: &'a [WiringRule],
        source: &str,
        event: &str,
    ) -> impl Iterator<Item = &'a WiringRule> {
        let source = source.to_owned();
        let event = event.to_owned();
        rules
            .iter()
            .filter(move |r| r.on.column == source && r.on.event == event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template_json() -> &'static str {
        r#"{
            "name": "demo",
            "columns": [
                {"id": "chart", "type": "surface3d", "options": {"rotate_deg": 5}},
                {"id": "risk", "type": "metrics"},
                {"id": "log", "type": "log"}
            ],
            "wiring": [
                {"on": {"column": "chart", "event": "SELECTED"},
                 "do": {"column": "risk", "action": "SET_DATA"}},
                {"on": {"column": "chart", "event": "CLICKED"},
                 "do": {"column": "*"}}
            ]
        }"#
    }

    #[test]
    fn valid_template_parses() {
        let t = Template::from_json(template_json()).unwrap();
        assert_eq!(t.name, "demo");
        assert_eq!(t.columns.len(), 3);
        assert_eq!(t.wiring.len(), 2);
        assert_eq!(t.columns[0].options["rotate_deg"], 5);
    }

    #[test]
    fn action_defaults_to_set_data() {
        let t = Template::from_json(template_json()).unwrap();
        assert_eq!(t.wiring[1].action.action, "SET_DATA");
        assert_eq!(t.wiring[1].action_type(), MessageType::SetData);
    }

    #[test]
    fn duplicate_column_ids_rejected() {
        let json = r#"{"name":"x","columns":[
            {"id":"a","type":"log"},{"id":"a","type":"log"}]}"#;
        let r = Template::from_json(json);
        assert!(matches!(r, Err(MarigraphError::Config { .. }) | Err(MarigraphError::Json(_))));
    }

    #[test]
    fn unknown_column_kind_rejected() {
        let json = r#"{"name":"x","columns":[{"id":"a","type":"hologram"}]}"#;
        assert!(Template::from_json(json).is_err());
    }

    #[test]
    fn dangling_wiring_source_rejected() {
        let json = r#"{"name":"x","columns":[{"id":"a","type":"log"}],
            "wiring":[{"on":{"column":"ghost","event":"SELECTED"},
                       "do":{"column":"a"}}]}"#;
        assert!(Template::from_json(json).is_err());
    }

    #[test]
    fn dangling_wiring_target_rejected() {
        let json = r#"{"name":"x","columns":[{"id":"a","type":"log"}],
            "wiring":[{"on":{"column":"a","event":"SELECTED"},
                       "do":{"column":"ghost"}}]}"#;
        assert!(Template::from_json(json).is_err());
    }

    #[test]
    fn wildcard_target_accepted() {
        let json = r#"{"name":"x","columns":[{"id":"a","type":"log"}],
            "wiring":[{"on":{"column":"a","event":"SELECTED"},
                       "do":{"column":"*"}}]}"#;
        assert!(Template::from_json(json).is_ok());
    }

    #[test]
    fn unknown_event_name_rejected() {
        let json = r#"{"name":"x","columns":[{"id":"a","type":"log"}],
            "wiring":[{"on":{"column":"a","event":"TELEPORTED"},
                       "do":{"column":"a"}}]}"#;
        assert!(Template::from_json(json).is_err());
    }

    #[test]
    fn unknown_action_name_rejected() {
        let json = r#"{"name":"x","columns":[{"id":"a","type":"log"}],
            "wiring":[{"on":{"column":"a","event":"SELECTED"},
                       "do":{"column":"a","action":"EXPLODE"}}]}"#;
        assert!(Template::from_json(json).is_err());
    }

    #[test]
    fn matching_rules_preserve_table_order() {
        let json = r#"{"name":"x","columns":[{"id":"a","type":"log"},{"id":"b","type":"log"}],
            "wiring":[
                {"on":{"column":"a","event":"SELECTED"},"do":{"column":"b","action":"SET_DATA"}},
                {"on":{"column":"a","event":"CLICKED"},"do":{"column":"b"}},
                {"on":{"column":"a","event":"SELECTED"},"do":{"column":"b","action":"FOCUS"}}
            ]}"#;
        let t = Template::from_json(json).unwrap();
        let hits: Vec<_> = Template::matching_rules(&t.wiring, "a", "SELECTED").collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].action.action, "SET_DATA");
        assert_eq!(hits[1].action.action, "FOCUS");
        assert_eq!(
            Template::matching_rules(&t.wiring, "b", "SELECTED").count(),
            0
        );
    }

    #[test]
    fn serde_round_trip() {
        let t = Template::from_json(template_json()).unwrap();
        let json = serde_json::to_string(&t).unwrap();
        let back = Template::from_json(&json).unwrap();
        assert_eq!(t, back);
    }
}
