//! Per-model token prices used for job cost reporting.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::PricingOverrides;
use crate::llm::provider::{Usage, cost_for};

/// Approximate USD per million tokens, (input, output).
const DEFAULT_PRICES: &[(&str, Decimal, Decimal)] = &[
    ("claude-3-5-haiku", dec!(0.80), dec!(4.00)),
    ("claude-3-5-sonnet", dec!(3.00), dec!(15.00)),
    ("claude-3-7-sonnet", dec!(3.00), dec!(15.00)),
    ("claude-sonnet-4", dec!(3.00), dec!(15.00)),
    ("claude-3-opus", dec!(15.00), dec!(75.00)),
    ("claude-opus-4", dec!(15.00), dec!(75.00)),
];

const FALLBACK_INPUT: Decimal = dec!(1.00);
const FALLBACK_OUTPUT: Decimal = dec!(4.00);

/// Resolved prices for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub input_per_million: Decimal,
    pub output_per_million: Decimal,
}

impl Pricing {
    /// Look up prices for `model`, letting explicit overrides win.
    ///
    /// The longest table key contained in the model name is used, so
    /// `claude-3-5-sonnet-v2@20241022` resolves to `claude-3-5-sonnet`.
    pub fn for_model(model: &str, overrides: &PricingOverrides) -> Self {
        let model = model.to_lowercase();
        let table = DEFAULT_PRICES
            .iter()
            .filter(|(key, _, _)| model.contains(key))
            .max_by_key(|(key, _, _)| key.len())
            .map(|(_, input, output)| (*input, *output));

        let input = overrides
            .input_per_million
            .and_then(|v| Decimal::try_from(v).ok())
            .or(table.map(|(i, _)| i))
            .unwrap_or(FALLBACK_INPUT);
        let output = overrides
            .output_per_million
            .and_then(|v| Decimal::try_from(v).ok())
            .or(table.map(|(_, o)| o))
            .unwrap_or(FALLBACK_OUTPUT);

        Self {
            input_per_million: input,
            output_per_million: output,
        }
    }

    /// Cost in USD, rounded to four decimal places.
    pub fn cost(&self, usage: Usage) -> Decimal {
        cost_for(usage, self.input_per_million, self.output_per_million)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_longest_key_wins() {
        let pricing = Pricing::for_model("claude-3-5-sonnet-v2@20241022", &PricingOverrides::default());
        assert_eq!(pricing.input_per_million, dec!(3.00));
        assert_eq!(pricing.output_per_million, dec!(15.00));

        let pricing = Pricing::for_model("Claude-3-5-Haiku@20241022", &PricingOverrides::default());
        assert_eq!(pricing.input_per_million, dec!(0.80));
    }

    #[test]
    fn test_unknown_model_falls_back() {
        let pricing = Pricing::for_model("mystery-model", &PricingOverrides::default());
        assert_eq!(pricing.input_per_million, FALLBACK_INPUT);
        assert_eq!(pricing.output_per_million, FALLBACK_OUTPUT);
    }

    #[test]
    fn test_overrides_apply_per_side() {
        let overrides = PricingOverrides {
            input_per_million: Some(2.0),
            output_per_million: None,
        };
        let pricing = Pricing::for_model("claude-3-opus@20240229", &overrides);
        assert_eq!(pricing.input_per_million, dec!(2));
        assert_eq!(pricing.output_per_million, dec!(75.00));

        let cost = pricing.cost(Usage {
            input_tokens: 500_000,
            output_tokens: 0,
        });
        assert_eq!(cost, dec!(1));
    }
}
