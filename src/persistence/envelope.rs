//! Graph definition record and its versioned JSON envelope

use serde::{Deserialize, Serialize};

use crate::Color;
use crate::error::{Error, Result};
use crate::sim::Params;

/// Current file format version
pub const FORMAT_VERSION: u32 = 1;

/// One line as saved: formula text and colors, never the hit counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineDefinition {
    pub formula: String,
    pub graph_if: String,
    pub bounce: String,
    pub min_x: String,
    pub max_x: String,
    pub min_y: String,
    pub max_y: String,
    pub color: Color,
    pub hit_color: Color,
}

impl Default for LineDefinition {
    fn default() -> Self {
        Self {
            formula: String::new(),
            graph_if: String::new(),
            bounce: String::new(),
            min_x: String::new(),
            max_x: String::new(),
            min_y: String::new(),
            max_y: String::new(),
            color: Color::BLUE,
            hit_color: Color::RED,
        }
    }
}

impl LineDefinition {
    pub fn with_formula(formula: &str) -> Self {
        Self {
            formula: formula.to_string(),
            ..Default::default()
        }
    }
}

/// Everything needed to rebuild a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphDefinition {
    pub lines: Vec<LineDefinition>,
    pub params: Params,
}

impl Default for GraphDefinition {
    /// A bowl with a ramp above it
    fn default() -> Self {
        let mut ramp = LineDefinition::with_formula("-x/3 + 2");
        ramp.min_x = "-8".to_string();
        ramp.max_x = "2".to_string();
        ramp.bounce = "0.8".to_string();
        Self {
            lines: vec![LineDefinition::with_formula("x^2/10 - 8"), ramp],
            params: Params::default(),
        }
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u32,
    graph: &'a GraphDefinition,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    graph: serde_json::Value,
}

pub fn to_json(graph: &GraphDefinition) -> Result<String> {
    let envelope = EnvelopeRef {
        version: FORMAT_VERSION,
        graph,
    };
    Ok(serde_json::to_string_pretty(&envelope)?)
}

pub fn from_json(json: &str) -> Result<GraphDefinition> {
    let envelope: Envelope = serde_json::from_str(json)?;
    if envelope.version != FORMAT_VERSION {
        return Err(Error::UnsupportedVersion(envelope.version));
    }
    Ok(serde_json::from_value(envelope.graph)?)
}
