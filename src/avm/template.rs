use html_escape::{encode_double_quoted_attribute, encode_text};
use serde_json::Value;
use std::collections::HashMap;

use super::model::{Amount, AvmReport, Comparable, Text};
use crate::error::{SynthError, SynthResult};
use crate::record::value_to_text;

const REPORT_TEMPLATE: &str = include_str!("report.html");

/// `1234567.5` -> `1,234,567.50`; whole numbers get no decimals
pub fn format_thousands(value: f64) -> String {
    let formatted = if value.fract() == 0.0 {
        format!("{:.0}", value.abs())
    } else {
        format!("{:.2}", value.abs())
    };
    let (whole, fraction) = match formatted.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    match fraction {
        Some(fraction) => format!("{}{}.{}", sign, grouped, fraction),
        None => format!("{}{}", sign, grouped),
    }
}

fn amount(value: &Amount) -> String {
    match value.value {
        Some(number) => format_thousands(number),
        None => encode_text(&value.raw).into_owned(),
    }
}

fn text(value: &Text) -> String {
    encode_text(&value.0).into_owned()
}

pub fn trend_class(trend: &str) -> &'static str {
    if trend.contains('+') {
        "trend-positive"
    } else {
        "trend-negative"
    }
}

/// Replace every `{{name}}` with its value; an unknown name is an error
pub fn fill_template(template: &str, values: &HashMap<&str, String>) -> SynthResult<String> {
    let mut output = String::with_capacity(template.len() * 2);
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| SynthError::template("unclosed '{{' in report template"))?;
        let name = after[..end].trim();
        let value = values
            .get(name)
            .ok_or_else(|| SynthError::template(format!("no value for '{{{{{}}}}}'", name)))?;
        output.push_str(value);
        rest = &after[end + 2..];
    }
    output.push_str(rest);
    Ok(output)
}

fn comparable_row(comp: &Comparable) -> String {
    let cells = [
        format!("Comp {}", text(&comp.comp_number)),
        text(&comp.address),
        text(&comp.sale_date),
        format!("${}", amount(&comp.sale_price)),
        amount(&comp.square_feet),
        format!("{}/{}", text(&comp.bedrooms), text(&comp.bathrooms)),
        text(&comp.distance),
        format!("${}", amount(&comp.adjusted_price)),
    ];

    let mut row = String::from("                    <tr>\n");
    for cell in cells {
        row.push_str(&format!("                        <td>{}</td>\n", cell));
    }
    row.push_str("                    </tr>\n");
    row
}

fn list_items(items: &[Text]) -> String {
    items
        .iter()
        .map(|item| format!("                <li>{}</li>\n", text(item)))
        .collect()
}

/// `lender_notes` -> `Lender Notes`
fn title_case(key: &str) -> String {
    key.split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Generic HTML for a JSON value of unknown shape
fn render_value(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut html = String::from("<table>\n");
            for (key, inner) in map {
                html.push_str(&format!(
                    "<tr><th>{}</th><td>{}</td></tr>\n",
                    encode_text(&title_case(key)),
                    render_value(inner)
                ));
            }
            html.push_str("</table>");
            html
        }
        Value::Array(items) => {
            let mut html = String::from("<ul>\n");
            for item in items {
                html.push_str(&format!("<li>{}</li>\n", render_value(item)));
            }
            html.push_str("</ul>");
            html
        }
        scalar => encode_text(&value_to_text(scalar)).into_owned(),
    }
}

fn additional_sections(report: &AvmReport) -> String {
    let extras: Vec<(&str, &Value)> = report.extra_sections().collect();
    if extras.is_empty() {
        return String::new();
    }

    let mut html = String::from("\n        <div class=\"section\">\n            <h2>Additional Details</h2>\n");
    for (key, value) in extras {
        html.push_str(&format!(
            "            <div data-section=\"{}\">\n                <h3>{}</h3>\n                {}\n            </div>\n",
            encode_double_quoted_attribute(key),
            encode_text(&title_case(key)),
            render_value(value)
        ));
    }
    html.push_str("        </div>\n");
    html
}

/// The complete HTML document for one report
pub fn render_report(report: &AvmReport) -> SynthResult<String> {
    let info = &report.report_info;
    let property = &report.property;
    let valuation = &report.valuation;
    let market = &report.market_analysis;
    let neighborhood = &report.neighborhood_info;

    let values: HashMap<&str, String> = HashMap::from([
        ("report_id", text(&info.report_id)),
        ("report_date", text(&info.report_date)),
        ("effective_date", text(&info.effective_date)),
        ("prepared_by", text(&info.prepared_by)),
        ("client_name", text(&info.client_name)),
        ("appraiser_license", text(&info.appraiser_license)),
        ("address", text(&property.address)),
        ("city", text(&property.city)),
        ("state", text(&property.state)),
        ("zip_code", text(&property.zip_code)),
        ("apn", text(&property.apn)),
        ("property_type", text(&property.property_type)),
        ("year_built", text(&property.year_built)),
        ("square_feet", amount(&property.square_feet)),
        ("lot_size", amount(&property.lot_size)),
        ("bedrooms", text(&property.bedrooms)),
        ("bathrooms", text(&property.bathrooms)),
        ("garage", text(&property.garage)),
        ("pool", text(&property.pool)),
        ("condition", text(&property.condition)),
        ("occupancy", text(&property.occupancy)),
        ("estimated_value", amount(&valuation.estimated_value)),
        ("value_range_low", amount(&valuation.value_range_low)),
        ("value_range_high", amount(&valuation.value_range_high)),
        ("confidence_score", text(&valuation.confidence_score)),
        ("price_per_sqft", amount(&valuation.price_per_sqft)),
        ("methodology", text(&valuation.methodology)),
        ("data_sources", text(&valuation.data_sources)),
        ("median_price_per_sqft", amount(&market.median_price_per_sqft)),
        ("days_on_market_avg", text(&market.days_on_market_avg)),
        ("price_trend_6m", text(&market.price_trend_6m)),
        ("inventory_level", text(&market.inventory_level)),
        ("market_conditions", text(&market.market_conditions)),
        ("absorption_rate", text(&market.absorption_rate)),
        ("trend_class", trend_class(&market.price_trend_6m.0).to_string()),
        ("school_district", text(&neighborhood.school_district)),
        ("school_rating", text(&neighborhood.school_rating)),
        ("crime_rate", text(&neighborhood.crime_rate)),
        ("walkability_score", text(&neighborhood.walkability_score)),
        ("comparables_html", report.comparables.iter().map(comparable_row).collect::<String>()),
        ("amenities_html", list_items(&neighborhood.nearby_amenities)),
        ("risk_factors_html", list_items(&report.risk_factors)),
        ("disclaimers_html", list_items(&report.disclaimers)),
        ("additional_html", additional_sections(report)),
    ]);

    fill_template(REPORT_TEMPLATE, &values)
}
