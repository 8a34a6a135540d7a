use crate::utils::levenshtein_distance;
use schemars::JsonSchema;
use serde::de;
use serde::{Deserialize, Serialize};
use std::fmt;

fn normalize_literal(value: &str) -> String {
    value
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .flat_map(|ch| ch.to_lowercase())
        .collect()
}

fn suggest_literal<'a>(input: &str, valid: &'a [&'a str]) -> Option<&'a str> {
    let normalized_input = normalize_literal(input);
    let mut best: Option<(&str, usize)> = None;

    for candidate in valid {
        let distance = levenshtein_distance(&normalized_input, &normalize_literal(candidate));
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((candidate, distance)),
        }
    }

    match best {
        Some((candidate, distance)) if distance <= 6 => Some(candidate),
        _ => None,
    }
}

fn enum_value_error(label: &str, input: &str, valid: &[&str], suggestion: Option<&str>) -> String {
    let valid_list = valid.join("|");
    match suggestion {
        Some(candidate) if !candidate.eq_ignore_ascii_case(input) => {
            format!("invalid {label} '{input}'. Did you mean '{candidate}'? valid: {valid_list}")
        }
        _ => format!("invalid {label} '{input}'. valid: {valid_list}"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum SearchScope {
    HeaderOnly,
    SpecificRange,
    #[default]
    EntireSheet,
    AllSheets,
}

impl SearchScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HeaderOnly => "header_only",
            Self::SpecificRange => "specific_range",
            Self::EntireSheet => "entire_sheet",
            Self::AllSheets => "all_sheets",
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SearchScope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "header_only" | "header" | "headers" => Ok(Self::HeaderOnly),
            "specific_range" | "range" => Ok(Self::SpecificRange),
            "entire_sheet" | "sheet" => Ok(Self::EntireSheet),
            "all_sheets" | "all" | "workbook" => Ok(Self::AllSheets),
            other => {
                let valid = ["header_only", "specific_range", "entire_sheet", "all_sheets"];
                let message =
                    enum_value_error("scope", other, &valid, suggest_literal(other, &valid));
                Err(de::Error::custom(message))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum SearchStrategy {
    #[default]
    Text,
    LabelNeighbor,
}

impl SearchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::LabelNeighbor => "label_neighbor",
        }
    }
}

impl<'de> Deserialize<'de> for SearchStrategy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "label_neighbor" | "label" | "labels" => Ok(Self::LabelNeighbor),
            other => {
                let valid = ["text", "label_neighbor"];
                let message =
                    enum_value_error("strategy", other, &valid, suggest_literal(other, &valid));
                Err(de::Error::custom(message))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FindReplaceMode {
    Preview,
    Apply,
}

impl FindReplaceMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preview => "preview",
            Self::Apply => "apply",
        }
    }
}

impl<'de> Deserialize<'de> for FindReplaceMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "preview" => Ok(Self::Preview),
            "apply" => Ok(Self::Apply),
            other => {
                let valid = ["preview", "apply"];
                let message =
                    enum_value_error("mode", other, &valid, suggest_literal(other, &valid));
                Err(de::Error::custom(message))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum NeighborDirection {
    Right,
    Down,
    #[default]
    Both,
}

impl NeighborDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Right => "right",
            Self::Down => "down",
            Self::Both => "both",
        }
    }

    pub fn scans_right(self) -> bool {
        matches!(self, Self::Right | Self::Both)
    }

    pub fn scans_down(self) -> bool {
        matches!(self, Self::Down | Self::Both)
    }
}

impl<'de> Deserialize<'de> for NeighborDirection {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_ascii_lowercase().as_str() {
            "right" => Ok(Self::Right),
            "down" | "below" => Ok(Self::Down),
            "both" => Ok(Self::Both),
            other => {
                let valid = ["right", "down", "both"];
                let message =
                    enum_value_error("direction", other, &valid, suggest_literal(other, &valid));
                Err(de::Error::custom(message))
            }
        }
    }
}
