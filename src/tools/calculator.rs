//! Deterministic profit/loss distribution engine
//!
//! Musharakah: profits follow the agreed ratios when given, otherwise the
//! capital ratios. Losses always follow the capital ratios.
//!
//! Mudharabah: profits follow the agreed ratio. On a loss the capital
//! provider bears all of it and the entrepreneur's share is exactly zero.

use crate::models::CalculationType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Tolerance for ratio sets that must sum to one
pub const RATIO_TOLERANCE: f64 = 1e-4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalculatorError {
    #[error("Validation Error: {0}")]
    Validation(String),
}

fn invalid(message: impl Into<String>) -> CalculatorError {
    CalculatorError::Validation(message.into())
}

//
// ================= Inputs =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Partner {
    pub name: String,
    pub investment: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MusharakahParams {
    pub partners: Vec<Partner>,
    /// Negative for a loss
    pub profit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_ratios: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MudharabahParams {
    pub capital: f64,
    /// Negative for a loss
    pub profit: f64,
    pub capital_provider_ratio: f64,
    pub entrepreneur_ratio: f64,
}

/// Contract type plus its parameters, as `{"type": ..., "parameters": {...}}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "parameters", rename_all = "lowercase")]
pub enum CalculationRequest {
    Musharakah(MusharakahParams),
    Mudharabah(MudharabahParams),
}

impl CalculationRequest {
    pub fn calculation_type(&self) -> CalculationType {
        match self {
            CalculationRequest::Musharakah(_) => CalculationType::Musharakah,
            CalculationRequest::Mudharabah(_) => CalculationType::Mudharabah,
        }
    }

    pub fn tool_name(&self) -> &'static str {
        match self {
            CalculationRequest::Musharakah(_) => MUSHARAKAH_TOOL,
            CalculationRequest::Mudharabah(_) => MUDHARABAH_TOOL,
        }
    }
}

pub const MUSHARAKAH_TOOL: &str = "calculate_musharakah";
pub const MUDHARABAH_TOOL: &str = "calculate_mudharabah";

//
// ================= Outputs =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Distribution {
    pub name: String,
    pub share: f64,
    /// Percentage of the profit or loss allocated to this party
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalculationOutput {
    #[serde(rename = "type")]
    pub calculation_type: CalculationType,
    pub is_loss: bool,
    pub total_capital: f64,
    pub profit: f64,
    pub inputs: BTreeMap<String, f64>,
    pub distribution: Vec<Distribution>,
    pub compliance_note: String,
    pub steps: Vec<String>,
}

pub fn calculate(request: &CalculationRequest) -> Result<CalculationOutput, CalculatorError> {
    match request {
        CalculationRequest::Musharakah(params) => musharakah(params),
        CalculationRequest::Mudharabah(params) => mudharabah(params),
    }
}

pub fn musharakah(params: &MusharakahParams) -> Result<CalculationOutput, CalculatorError> {
    if params.partners.len() < 2 {
        return Err(invalid("Musharakah requires at least two partners"));
    }
    for partner in &params.partners {
        if partner.name.trim().is_empty() {
            return Err(invalid("Every partner needs a name"));
        }
        if !partner.investment.is_finite() || partner.investment <= 0.0 {
            return Err(invalid(format!(
                "Investment for {} must be a positive amount",
                partner.name
            )));
        }
    }
    ensure_finite("profit", params.profit)?;

    let total_capital: f64 = params.partners.iter().map(|p| p.investment).sum();
    let capital_ratios: Vec<f64> = params
        .partners
        .iter()
        .map(|p| p.investment / total_capital)
        .collect();

    if let Some(ratios) = &params.profit_ratios {
        if ratios.len() != params.partners.len() {
            return Err(invalid(format!(
                "Expected {} profit ratios, got {}",
                params.partners.len(),
                ratios.len()
            )));
        }
        ensure_ratio_set(ratios)?;
    }

    let is_loss = params.profit < 0.0;
    let mut steps = Vec::new();
    steps.push(format!(
        "Total capital: {}",
        params
            .partners
            .iter()
            .map(|p| format_currency(p.investment))
            .collect::<Vec<_>>()
            .join(" + ")
            + " = "
            + &format_currency(total_capital)
    ));
    for (partner, ratio) in params.partners.iter().zip(&capital_ratios) {
        steps.push(format!(
            "{} capital ratio: {} / {} = {}",
            partner.name,
            format_currency(partner.investment),
            format_currency(total_capital),
            format_percent(*ratio)
        ));
    }

    let applied_ratios: &[f64] = match (&params.profit_ratios, is_loss) {
        (_, true) => {
            steps.push(format!(
                "Loss of {} is shared strictly by capital ratio",
                format_currency(params.profit.abs())
            ));
            &capital_ratios
        }
        (Some(ratios), false) => {
            steps.push("Profit is shared by the agreed profit ratios".to_string());
            ratios
        }
        (None, false) => {
            steps.push("No profit ratio agreed, profit is shared by capital ratio".to_string());
            &capital_ratios
        }
    };

    let mut distribution = Vec::with_capacity(params.partners.len());
    for (partner, ratio) in params.partners.iter().zip(applied_ratios) {
        let share = params.profit * ratio;
        steps.push(format!(
            "{} share: {} × {} = {}",
            partner.name,
            format_percent(*ratio),
            format_currency(params.profit),
            format_currency(share)
        ));
        distribution.push(Distribution {
            name: partner.name.clone(),
            share,
            percentage: ratio * 100.0,
        });
    }

    let mut inputs = BTreeMap::new();
    for partner in &params.partners {
        inputs.insert(format!("{} investment", partner.name), partner.investment);
    }
    inputs.insert("profit".to_string(), params.profit);

    let compliance_note = if is_loss {
        "Losses in a Musharakah are borne by each partner in proportion to capital contributed, \
         regardless of any agreed profit ratio."
    } else {
        "Profit in a Musharakah may follow any ratio agreed in advance; no partner is guaranteed \
         a fixed return, which keeps the contract free of Riba."
    };

    Ok(CalculationOutput {
        calculation_type: CalculationType::Musharakah,
        is_loss,
        total_capital,
        profit: params.profit,
        inputs,
        distribution,
        compliance_note: compliance_note.to_string(),
        steps,
    })
}

pub fn mudharabah(params: &MudharabahParams) -> Result<CalculationOutput, CalculatorError> {
    if !params.capital.is_finite() || params.capital <= 0.0 {
        return Err(invalid("Capital must be a positive amount"));
    }
    ensure_finite("profit", params.profit)?;
    ensure_ratio_set(&[params.capital_provider_ratio, params.entrepreneur_ratio])?;

    let is_loss = params.profit < 0.0;
    let mut steps = vec![format!("Capital provided: {}", format_currency(params.capital))];

    let (provider_share, entrepreneur_share, provider_pct, entrepreneur_pct) = if is_loss {
        steps.push(format!(
            "Loss of {} is borne entirely by the capital provider",
            format_currency(params.profit.abs())
        ));
        steps.push("The entrepreneur loses only the value of their effort: share = $0.00".to_string());
        (params.profit, 0.0, 100.0, 0.0)
    } else {
        let provider = params.profit * params.capital_provider_ratio;
        let entrepreneur = params.profit * params.entrepreneur_ratio;
        steps.push(format!(
            "Capital provider share: {} × {} = {}",
            format_percent(params.capital_provider_ratio),
            format_currency(params.profit),
            format_currency(provider)
        ));
        steps.push(format!(
            "Entrepreneur share: {} × {} = {}",
            format_percent(params.entrepreneur_ratio),
            format_currency(params.profit),
            format_currency(entrepreneur)
        ));
        (
            provider,
            entrepreneur,
            params.capital_provider_ratio * 100.0,
            params.entrepreneur_ratio * 100.0,
        )
    };

    let mut inputs = BTreeMap::new();
    inputs.insert("capital".to_string(), params.capital);
    inputs.insert("profit".to_string(), params.profit);
    inputs.insert("capitalProviderRatio".to_string(), params.capital_provider_ratio);
    inputs.insert("entrepreneurRatio".to_string(), params.entrepreneur_ratio);

    let compliance_note = if is_loss {
        "In a Mudharabah the capital provider bears all financial loss unless the entrepreneur \
         was negligent; the entrepreneur forfeits only their effort."
    } else {
        "Profit in a Mudharabah is shared by a ratio agreed at the outset, never as a fixed \
         amount or a percentage of capital."
    };

    Ok(CalculationOutput {
        calculation_type: CalculationType::Mudharabah,
        is_loss,
        total_capital: params.capital,
        profit: params.profit,
        inputs,
        distribution: vec![
            Distribution {
                name: "Capital Provider".to_string(),
                share: provider_share,
                percentage: provider_pct,
            },
            Distribution {
                name: "Entrepreneur".to_string(),
                share: entrepreneur_share,
                percentage: entrepreneur_pct,
            },
        ],
        compliance_note: compliance_note.to_string(),
        steps,
    })
}

fn ensure_finite(name: &str, value: f64) -> Result<(), CalculatorError> {
    if !value.is_finite() {
        return Err(invalid(format!("{} must be a finite number", name)));
    }
    Ok(())
}

fn ensure_ratio_set(ratios: &[f64]) -> Result<(), CalculatorError> {
    if ratios.iter().any(|r| !r.is_finite() || *r < 0.0 || *r > 1.0) {
        return Err(invalid("Each ratio must be between 0 and 1"));
    }
    let sum: f64 = ratios.iter().sum();
    if (sum - 1.0).abs() > RATIO_TOLERANCE {
        return Err(invalid(format!("Ratios must sum to 1, got {:.4}", sum)));
    }
    Ok(())
}

/// `$12,345.67` / `-$20,000.00`
pub fn format_currency(amount: f64) -> String {
    let rounded = format!("{:.2}", amount.abs());
    let (whole, cents) = rounded.split_once('.').unwrap_or((rounded.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 && rounded != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, cents)
}

/// Ratio in [0, 1] as `60.00%`
pub fn format_percent(ratio: f64) -> String {
    format!("{:.2}%", ratio * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partner(name: &str, investment: f64) -> Partner {
        Partner {
            name: name.to_string(),
            investment,
        }
    }

    fn share(output: &CalculationOutput, name: &str) -> f64 {
        output
            .distribution
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.share)
            .unwrap()
    }

    #[test]
    fn test_musharakah_profit_by_capital_ratio() {
        let output = musharakah(&MusharakahParams {
            partners: vec![partner("A", 60_000.0), partner("B", 40_000.0)],
            profit: 20_000.0,
            profit_ratios: None,
        })
        .unwrap();

        assert!(!output.is_loss);
        assert!((share(&output, "A") - 12_000.0).abs() < 1e-9);
        assert!((share(&output, "B") - 8_000.0).abs() < 1e-9);
        assert_eq!(format_currency(share(&output, "A")), "$12,000.00");
        assert_eq!(format_currency(share(&output, "B")), "$8,000.00");
    }

    #[test]
    fn test_musharakah_profit_by_agreed_ratio() {
        let output = musharakah(&MusharakahParams {
            partners: vec![partner("A", 60_000.0), partner("B", 40_000.0)],
            profit: 10_000.0,
            profit_ratios: Some(vec![0.5, 0.5]),
        })
        .unwrap();

        assert!((share(&output, "A") - 5_000.0).abs() < 1e-9);
        assert!((share(&output, "B") - 5_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_musharakah_loss_ignores_agreed_ratio() {
        let partners = vec![
            partner("A", 50_000.0),
            partner("B", 30_000.0),
            partner("C", 20_000.0),
        ];
        let total_investment = 100_000.0;
        let total_loss = -15_000.0;

        let output = musharakah(&MusharakahParams {
            partners: partners.clone(),
            profit: total_loss,
            profit_ratios: Some(vec![0.2, 0.3, 0.5]),
        })
        .unwrap();

        assert!(output.is_loss);
        for p in &partners {
            let ratio = share(&output, &p.name) / p.investment;
            assert!((ratio - total_loss / total_investment).abs() < 1e-9);
        }
    }

    #[test]
    fn test_musharakah_validation() {
        let err = musharakah(&MusharakahParams {
            partners: vec![partner("A", 1_000.0)],
            profit: 100.0,
            profit_ratios: None,
        })
        .unwrap_err();
        assert!(err.to_string().starts_with("Validation Error"));

        let err = musharakah(&MusharakahParams {
            partners: vec![partner("A", 1_000.0), partner("B", 1_000.0)],
            profit: 100.0,
            profit_ratios: Some(vec![0.6, 0.3]),
        })
        .unwrap_err();
        assert!(err.to_string().contains("sum to 1"));

        let err = musharakah(&MusharakahParams {
            partners: vec![partner("A", 1_000.0), partner("B", 0.0)],
            profit: 100.0,
            profit_ratios: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_ratio_tolerance() {
        assert!(ensure_ratio_set(&[0.33333, 0.33333, 0.33334]).is_ok());
        assert!(ensure_ratio_set(&[0.5, 0.49995]).is_ok());
        assert!(ensure_ratio_set(&[0.5, 0.4998]).is_err());
        assert!(ensure_ratio_set(&[0.6, 0.5]).is_err());
    }

    #[test]
    fn test_mudharabah_profit_split() {
        let output = mudharabah(&MudharabahParams {
            capital: 100_000.0,
            profit: 30_000.0,
            capital_provider_ratio: 0.6,
            entrepreneur_ratio: 0.4,
        })
        .unwrap();

        assert!((share(&output, "Capital Provider") - 18_000.0).abs() < 1e-9);
        assert!((share(&output, "Entrepreneur") - 12_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_mudharabah_loss_borne_by_capital_provider() {
        let output = mudharabah(&MudharabahParams {
            capital: 100_000.0,
            profit: -20_000.0,
            capital_provider_ratio: 0.6,
            entrepreneur_ratio: 0.4,
        })
        .unwrap();

        assert!(output.is_loss);
        assert_eq!(share(&output, "Entrepreneur"), 0.0);
        assert_eq!(share(&output, "Capital Provider"), -20_000.0);
        assert_eq!(format_currency(share(&output, "Capital Provider")), "-$20,000.00");
        assert_eq!(format_currency(share(&output, "Entrepreneur")), "$0.00");
    }

    #[test]
    fn test_mudharabah_rejects_bad_ratios() {
        let err = mudharabah(&MudharabahParams {
            capital: 100_000.0,
            profit: 1_000.0,
            capital_provider_ratio: 0.7,
            entrepreneur_ratio: 0.4,
        })
        .unwrap_err();
        assert!(matches!(err, CalculatorError::Validation(_)));
    }

    #[test]
    fn test_request_wire_format() {
        let request: CalculationRequest = serde_json::from_str(
            r#"{"type":"mudharabah","parameters":{"capital":100000,"profit":-20000,"capitalProviderRatio":0.6,"entrepreneurRatio":0.4}}"#,
        )
        .unwrap();
        assert_eq!(request.calculation_type(), CalculationType::Mudharabah);
        assert_eq!(request.tool_name(), MUDHARABAH_TOOL);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(999.999), "$1,000.00");
        assert_eq!(format_currency(1_234_567.891), "$1,234,567.89");
        assert_eq!(format_currency(-0.001), "$0.00");
        assert_eq!(format_percent(0.6), "60.00%");
    }
}
