use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{GenerationFailure, SynthError, SynthResult};
use crate::record::value_to_text;

/// Top-level sections every report must carry
pub const REQUIRED_SECTIONS: &[&str] = &[
    "report_info",
    "property",
    "valuation",
    "market_analysis",
    "neighborhood_info",
];

/// Sections the template knows how to lay out
pub const KNOWN_SECTIONS: &[&str] = &[
    "report_info",
    "property",
    "valuation",
    "comparables",
    "market_analysis",
    "neighborhood_info",
    "risk_factors",
    "disclaimers",
];

/// Any scalar the model may return (string, number, bool), kept as display text.
/// Arrays are joined with commas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Text(pub String);

impl<'de> Deserialize<'de> for Text {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(_) => Err(de::Error::custom("expected a text value, found an object")),
            Value::Array(items) => Ok(Text(items.iter().map(value_to_text).collect::<Vec<_>>().join(", "))),
            other => Ok(Text(value_to_text(&other))),
        }
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Money or area figure; numeric strings like `"$452,000"` are accepted
#[derive(Debug, Clone, PartialEq)]
pub struct Amount {
    pub value: Option<f64>,
    pub raw: String,
}

impl Amount {
    pub fn parse(raw: &str) -> Self {
        let cleaned: String = raw
            .chars()
            .filter(|c| !matches!(c, '$' | ',' | ' '))
            .collect();
        Self {
            value: cleaned.parse::<f64>().ok().filter(|v| v.is_finite()),
            raw: raw.trim().to_string(),
        }
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => Ok(Amount {
                value: n.as_f64(),
                raw: n.to_string(),
            }),
            Value::String(s) => Ok(Amount::parse(&s)),
            other => Err(de::Error::custom(format!("expected an amount, found {}", other))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportInfo {
    pub report_id: Text,
    pub report_date: Text,
    pub effective_date: Text,
    pub prepared_by: Text,
    pub client_name: Text,
    #[serde(default = "not_available")]
    pub appraiser_license: Text,
}

fn not_available() -> Text {
    Text("N/A".to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct Property {
    pub address: Text,
    pub city: Text,
    pub state: Text,
    pub zip_code: Text,
    pub apn: Text,
    pub property_type: Text,
    pub year_built: Text,
    pub square_feet: Amount,
    pub lot_size: Amount,
    pub bedrooms: Text,
    pub bathrooms: Text,
    pub garage: Text,
    pub pool: Text,
    pub condition: Text,
    pub occupancy: Text,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Valuation {
    pub estimated_value: Amount,
    pub value_range_low: Amount,
    pub value_range_high: Amount,
    pub confidence_score: Text,
    pub price_per_sqft: Amount,
    pub methodology: Text,
    pub data_sources: Text,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Comparable {
    pub comp_number: Text,
    pub address: Text,
    pub sale_date: Text,
    pub sale_price: Amount,
    pub square_feet: Amount,
    pub bedrooms: Text,
    pub bathrooms: Text,
    pub distance: Text,
    pub adjusted_price: Amount,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketAnalysis {
    pub median_price_per_sqft: Amount,
    pub days_on_market_avg: Text,
    pub price_trend_6m: Text,
    pub inventory_level: Text,
    pub market_conditions: Text,
    pub absorption_rate: Text,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NeighborhoodInfo {
    pub school_district: Text,
    pub school_rating: Text,
    pub crime_rate: Text,
    pub walkability_score: Text,
    #[serde(default)]
    pub nearby_amenities: Vec<Text>,
}

#[derive(Debug, Clone, Deserialize)]
struct Sections {
    report_info: ReportInfo,
    property: Property,
    valuation: Valuation,
    market_analysis: MarketAnalysis,
    neighborhood_info: NeighborhoodInfo,
    #[serde(default)]
    comparables: Vec<Comparable>,
    #[serde(default)]
    risk_factors: Vec<Text>,
    #[serde(default)]
    disclaimers: Vec<Text>,
}

/// A validated AVM payload.
///
/// The typed sections drive the template; `raw` is the payload exactly as
/// received and is what gets written to JSON.
#[derive(Debug, Clone)]
pub struct AvmReport {
    pub raw: Map<String, Value>,
    pub report_info: ReportInfo,
    pub property: Property,
    pub valuation: Valuation,
    pub market_analysis: MarketAnalysis,
    pub neighborhood_info: NeighborhoodInfo,
    pub comparables: Vec<Comparable>,
    pub risk_factors: Vec<Text>,
    pub disclaimers: Vec<Text>,
}

impl AvmReport {
    pub fn from_json(raw: Map<String, Value>) -> SynthResult<Self> {
        let missing: Vec<&str> = REQUIRED_SECTIONS
            .iter()
            .copied()
            .filter(|section| !raw.get(*section).map(Value::is_object).unwrap_or(false))
            .collect();
        if !missing.is_empty() {
            return Err(SynthError::generation(
                GenerationFailure::MissingKeys,
                format!("AVM payload is missing sections: {}", missing.join(", ")),
            ));
        }

        let sections: Sections = serde_json::from_value(Value::Object(raw.clone())).map_err(|e| {
            SynthError::generation_with_source(GenerationFailure::Schema, "AVM payload does not match the report schema", e)
        })?;

        Ok(Self {
            raw,
            report_info: sections.report_info,
            property: sections.property,
            valuation: sections.valuation,
            market_analysis: sections.market_analysis,
            neighborhood_info: sections.neighborhood_info,
            comparables: sections.comparables,
            risk_factors: sections.risk_factors,
            disclaimers: sections.disclaimers,
        })
    }

    /// Top-level keys the template has no dedicated section for, in payload order
    pub fn extra_sections(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.raw
            .iter()
            .filter(|(key, _)| !KNOWN_SECTIONS.contains(&key.as_str()))
            .map(|(key, value)| (key.as_str(), value))
    }

    pub fn address(&self) -> &str {
        &self.property.address.0
    }
}
