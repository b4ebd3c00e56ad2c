//! Token cost model.
//!
//! Costs are computed in decimal so large token counts do not drift at the
//! $0.000001 granularity reports use. Prices come from configuration.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use xp_config::PricingConfig;

/// Decimal places kept on every reported cost.
pub const COST_DECIMAL_PLACES: u32 = 6;

/// Maps token counts to USD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostModel {
    price_in: Decimal,
    price_out: Decimal,
}

impl CostModel {
    /// Build from per-token prices.
    pub fn per_token(price_in: Decimal, price_out: Decimal) -> Self {
        Self {
            price_in,
            price_out,
        }
    }

    /// Build from prices quoted per 1,000 tokens.
    pub fn per_thousand(input_per_1k: Decimal, output_per_1k: Decimal) -> Self {
        let thousand = Decimal::from(1000u32);
        Self::per_token(input_per_1k / thousand, output_per_1k / thousand)
    }

    pub fn from_pricing(pricing: &PricingConfig) -> Self {
        Self::per_thousand(
            pricing.input_price_per_1k_tokens,
            pricing.output_price_per_1k_tokens,
        )
    }

    /// `input_tokens * price_in + output_tokens * price_out`, rounded to
    /// [`COST_DECIMAL_PLACES`]. Saturates at `Decimal::MAX` rather than
    /// overflowing.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Decimal {
        let input = Decimal::from(input_tokens).checked_mul(self.price_in);
        let output = Decimal::from(output_tokens).checked_mul(self.price_out);
        let total = match (input, output) {
            (Some(i), Some(o)) => i.checked_add(o).unwrap_or(Decimal::MAX),
            _ => Decimal::MAX,
        };
        round_cost(total)
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::from_pricing(&PricingConfig::default())
    }
}

/// Round a USD amount the way every reported cost is rounded.
pub fn round_cost(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(COST_DECIMAL_PLACES, RoundingStrategy::MidpointNearestEven)
}
