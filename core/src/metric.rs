//! The tagged metric value shared by every storage backend and transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two kinds of metric this system understands. There is no third kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Gauge,
    Counter,
}

impl Kind {
    /// Parses a kind from its wire string, rejecting anything else.
    pub fn parse(raw: &str) -> Result<Self, MetricError> {
        match raw {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            other => Err(MetricError::UnknownKind(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("unknown metric kind '{0}', expected 'gauge' or 'counter'")]
    UnknownKind(String),
    #[error("could not parse '{raw}' as a {kind} value: {reason}")]
    InvalidNumber {
        kind: Kind,
        raw: String,
        reason: String,
    },
}

/// `{id, kind, number}` — a gauge carries `value`, a counter carries `delta`.
/// Exactly one of the two is populated; the other stays `None` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: Kind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl Metric {
    /// Builds a metric from the path-param route form: `/update/{kind}/{id}/{value}`.
    pub fn parse(kind: &str, id: &str, raw: &str) -> Result<Self, MetricError> {
        let kind = Kind::parse(kind)?;
        let mut metric = Self {
            id: id.to_string(),
            kind,
            value: None,
            delta: None,
        };
        metric.set_value(raw)?;
        Ok(metric)
    }

    /// Mutates the stored number in place using the same parsing rules as `parse`.
    /// For a counter with an existing delta, the new stored delta is `prior + parsed`;
    /// a gauge's value is replaced outright.
    pub fn set_value(&mut self, raw: &str) -> Result<(), MetricError> {
        match self.kind {
            Kind::Gauge => {
                let parsed: f64 = raw.trim().parse().map_err(|error: std::num::ParseFloatError| {
                    MetricError::InvalidNumber {
                        kind: self.kind,
                        raw: raw.to_string(),
                        reason: error.to_string(),
                    }
                })?;
                self.value = Some(parsed);
            }
            Kind::Counter => {
                let parsed: i64 = raw.trim().parse().map_err(|error: std::num::ParseIntError| {
                    MetricError::InvalidNumber {
                        kind: self.kind,
                        raw: raw.to_string(),
                        reason: error.to_string(),
                    }
                })?;
                self.delta = Some(self.delta.unwrap_or(0) + parsed);
            }
        }
        Ok(())
    }

    /// Renders the stored number using a minimal decimal form.
    pub fn as_text(&self) -> String {
        match self.kind {
            Kind::Gauge => self
                .value
                .map(format_gauge)
                .unwrap_or_default(),
            Kind::Counter => self.delta.map(|delta| delta.to_string()).unwrap_or_default(),
        }
    }

    /// `"<kind>_<id>"` — the literal key form other components and tests depend on.
    pub fn key(&self) -> String {
        format!("{}_{}", self.kind.as_str(), self.id)
    }

    /// Fails only when the declared kind carries the wrong numeric field, or both/neither.
    pub fn validate(&self) -> Result<(), MetricError> {
        match self.kind {
            Kind::Gauge => {
                if self.value.is_none() {
                    return Err(MetricError::InvalidNumber {
                        kind: self.kind,
                        raw: String::new(),
                        reason: "gauge metric is missing a value".to_string(),
                    });
                }
            }
            Kind::Counter => {
                if self.delta.is_none() {
                    return Err(MetricError::InvalidNumber {
                        kind: self.kind,
                        raw: String::new(),
                        reason: "counter metric is missing a delta".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Mimics the source's default float formatting: integral gauges print without
/// a trailing `.0`, everything else prints with full precision.
fn format_gauge(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        let mut text = format!("{value}");
        if !text.contains('.') && !text.contains('e') {
            text.push_str(".0");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_gauge_accepts_decimal() {
        let metric = Metric::parse("gauge", "temp", "2.5").unwrap();
        assert_eq!(metric.value, Some(2.5));
        assert_eq!(metric.as_text(), "2.5");
    }

    #[test]
    fn parse_counter_accepts_integer() {
        let metric = Metric::parse("counter", "hits", "3").unwrap();
        assert_eq!(metric.delta, Some(3));
        assert_eq!(metric.as_text(), "3");
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let error = Metric::parse("bogus", "x", "1").unwrap_err();
        assert_eq!(error, MetricError::UnknownKind("bogus".to_string()));
    }

    #[test]
    fn set_value_accumulates_counter_delta() {
        let mut metric = Metric::parse("counter", "hits", "3").unwrap();
        metric.set_value("4").unwrap();
        assert_eq!(metric.delta, Some(7));
    }

    #[test]
    fn set_value_replaces_gauge() {
        let mut metric = Metric::parse("gauge", "temp", "1.5").unwrap();
        metric.set_value("2.5").unwrap();
        assert_eq!(metric.value, Some(2.5));
    }

    #[test]
    fn key_is_kind_underscore_id() {
        let metric = Metric::parse("counter", "hits", "1").unwrap();
        assert_eq!(metric.key(), "counter_hits");
    }

    #[test]
    fn validate_fails_without_matching_number() {
        let metric = Metric {
            id: "x".to_string(),
            kind: Kind::Gauge,
            value: None,
            delta: None,
        };
        assert!(metric.validate().is_err());
    }

    #[test]
    fn integral_gauge_renders_without_fraction() {
        let metric = Metric::parse("gauge", "temp", "42").unwrap();
        assert_eq!(metric.as_text(), "42");
    }
}
