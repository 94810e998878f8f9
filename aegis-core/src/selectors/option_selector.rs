//! Option selector (C6): liquidity-filtered OTM-N selection.

use rust_decimal::Decimal;

use crate::core::{OptionType, VtSymbol};

#[derive(Debug, Clone, PartialEq)]
pub struct OptionChainRow {
    pub vt_symbol: VtSymbol,
    pub option_type: OptionType,
    pub strike: Decimal,
    pub bid_price_1: Decimal,
    pub bid_volume_1: Decimal,
    pub ask_price_1: Decimal,
    pub pricetick: Decimal,
    pub days_to_expiry: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LiquidityFilter {
    pub min_bid_volume: Decimal,
    pub spread_max_ticks: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpiryWindow {
    pub min_days: u32,
    pub max_days: u32,
}

/// The hard pre-trade liquidity gate (SPEC_FULL §4.4): before sending a taker slice of volume
/// `v`, the book must show at least `v` on the side being taken, and the spread must be tight
/// enough relative to the tick size.
pub fn passes_liquidity_gate(row: &OptionChainRow, volume: Decimal, filter: &LiquidityFilter) -> bool {
    if row.pricetick <= Decimal::ZERO {
        return false;
    }
    let spread_ticks = (row.ask_price_1 - row.bid_price_1) / row.pricetick;
    row.bid_volume_1 >= volume && row.bid_volume_1 >= filter.min_bid_volume && spread_ticks < filter.spread_max_ticks
}

fn signed_moneyness(row: &OptionChainRow, underlying_price: Decimal) -> Decimal {
    match row.option_type {
        OptionType::Call => row.strike - underlying_price,
        OptionType::Put => underlying_price - row.strike,
    }
}

/// Selects the OTM-`n` option of the requested type. Procedure, per SPEC_FULL §4.4:
/// 1. drop rows failing the liquidity filter;
/// 2. compute signed moneyness (positive = out-of-the-money for this option type);
/// 3. keep only truly OTM rows and sort by moneyness ascending (nearest-the-money first);
/// 4. select the `n`-th row (0-indexed);
/// 5. reject it if its days-to-expiry falls outside `expiry_window`.
///
/// Returns `None` if nothing qualifies — callers must not retry with looser parameters.
pub fn select_otm_option(
    chain: &[OptionChainRow],
    option_type: OptionType,
    n: usize,
    underlying_price: Decimal,
    reference_volume: Decimal,
    liquidity: &LiquidityFilter,
    expiry_window: &ExpiryWindow,
) -> Option<OptionChainRow> {
    let mut candidates: Vec<&OptionChainRow> = chain
        .iter()
        .filter(|row| row.option_type == option_type)
        .filter(|row| passes_liquidity_gate(row, reference_volume, liquidity))
        .filter(|row| signed_moneyness(row, underlying_price) > Decimal::ZERO)
        .collect();

    candidates.sort_by(|a, b| {
        signed_moneyness(a, underlying_price).cmp(&signed_moneyness(b, underlying_price))
    });

    let picked = candidates.get(n)?;
    if picked.days_to_expiry < expiry_window.min_days || picked.days_to_expiry > expiry_window.max_days {
        return None;
    }
    Some((*picked).clone())
}
