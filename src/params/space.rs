//! Declarative parameter-space descriptions
//!
//! The wire shape mirrors the request's `hyperparameter_configs` entries:
//! `{ enabled, type, min, max, options, default_options, scale }`. A spec is
//! resolved into a typed [`ParamRange`] before sampling; entries that are
//! disabled or malformed resolve to nothing and are skipped, never fatal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameter space for one model: parameter name -> range spec.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSpace(pub BTreeMap<String, ParamSpec>);

impl ParamSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate over (name, resolved range) for every usable entry.
    pub fn resolved(&self) -> impl Iterator<Item = (&str, ParamRange)> {
        self.0
            .iter()
            .filter_map(|(name, spec)| spec.resolve().map(|r| (name.as_str(), r)))
    }

    /// True when at least one entry is enabled and well-formed.
    ///
    /// Gates whether a trial search is worth running at all; with nothing to
    /// sample the caller trains on defaults directly.
    pub fn has_searchable(&self) -> bool {
        self.resolved().next().is_some()
    }
}

/// Raw per-parameter range spec as sent by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamSpec {
    #[serde(default)]
    pub enabled: bool,
    /// One of "float", "int", "categorical", "tuple"
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub default_min: Option<f64>,
    #[serde(default)]
    pub default_max: Option<f64>,
    #[serde(default)]
    pub options: Vec<serde_json::Value>,
    #[serde(default)]
    pub default_options: Vec<String>,
    /// "log" selects log-uniform sampling for float ranges
    #[serde(default)]
    pub scale: Option<String>,
}

/// Typed, validated range a trial can sample from.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamRange {
    /// Continuous range [min, max], optionally log-uniform
    Float { min: f64, max: f64, log: bool },
    /// Integer range [min, max] inclusive
    Int { min: i64, max: i64 },
    /// Discrete set of JSON scalar options
    Categorical {
        options: Vec<serde_json::Value>,
        /// Whether the whole set reads as booleans ({true,false} or their
        /// string spellings), so draws are normalized to real booleans
        boolean: bool,
    },
    /// Enumerated tuple literals, each parsed to a fixed-arity integer tuple
    Tuple { options: Vec<Vec<i64>> },
}

impl ParamSpec {
    /// Resolve into a typed range, or `None` when the entry is disabled or
    /// fails the space invariants (min >= max, no options, unknown type).
    pub fn resolve(&self) -> Option<ParamRange> {
        if !self.enabled {
            return None;
        }
        // Explicit bounds win over defaults; callers may send both.
        let lo = self.min.or(self.default_min);
        let hi = self.max.or(self.default_max);

        match self.kind.as_deref().unwrap_or("float") {
            "float" => {
                let (min, max) = (lo?, hi?);
                if !(min < max) || !min.is_finite() || !max.is_finite() {
                    return None;
                }
                let log = self.scale.as_deref() == Some("log");
                // Log-uniform sampling needs strictly positive bounds
                if log && min <= 0.0 {
                    return None;
                }
                Some(ParamRange::Float { min, max, log })
            }
            "int" => {
                let (min, max) = (lo? as i64, hi? as i64);
                if min >= max {
                    return None;
                }
                Some(ParamRange::Int { min, max })
            }
            "categorical" => {
                let options: Vec<serde_json::Value> = self
                    .options
                    .iter()
                    .filter(|v| !v.is_null())
                    .cloned()
                    .collect();
                if options.is_empty() {
                    return None;
                }
                let boolean = is_boolean_set(&options);
                Some(ParamRange::Categorical { options, boolean })
            }
            "tuple" => {
                let options: Vec<Vec<i64>> = self
                    .default_options
                    .iter()
                    .filter_map(|s| parse_tuple_literal(s))
                    .collect();
                if options.is_empty() {
                    return None;
                }
                Some(ParamRange::Tuple { options })
            }
            _ => None,
        }
    }
}

/// Recognize option sets that spell booleans, either as JSON booleans or as
/// the strings "True"/"False" (any case) coming from loosely-typed callers.
fn is_boolean_set(options: &[serde_json::Value]) -> bool {
    !options.is_empty()
        && options.iter().all(|v| match v {
            serde_json::Value::Bool(_) => true,
            serde_json::Value::String(s) => {
                s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false")
            }
            _ => false,
        })
}

/// Parse a tuple literal like `"(100,)"` or `"(64, 32)"` into its integers.
/// Returns `None` for anything that does not parse cleanly.
pub fn parse_tuple_literal(literal: &str) -> Option<Vec<i64>> {
    let inner = literal.trim().trim_start_matches('(').trim_end_matches(')');
    let parts: Vec<i64> = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<i64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}
