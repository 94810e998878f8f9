//! OHLCV bars and ticks (C15 data model).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar. `datetime` is the bar's close time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub vt_symbol: String,
    pub datetime: DateTime<Utc>,
    pub interval_minutes: u32,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub open_interest: Decimal,
}

impl Bar {
    pub fn new(
        vt_symbol: impl Into<String>,
        datetime: DateTime<Utc>,
        interval_minutes: u32,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            vt_symbol: vt_symbol.into(),
            datetime,
            interval_minutes,
            open,
            high,
            low,
            close,
            volume,
            open_interest: Decimal::ZERO,
        }
    }
}

/// A single tick update, the raw input to the bar pipeline (C15) when running from ticks rather
/// than pre-aggregated 1-minute bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub vt_symbol: String,
    pub datetime: DateTime<Utc>,
    pub last_price: Decimal,
    pub volume: Decimal,
    pub bid_price_1: Decimal,
    pub bid_volume_1: Decimal,
    pub ask_price_1: Decimal,
    pub ask_volume_1: Decimal,
}

impl Tick {
    pub fn spread(&self) -> Decimal {
        self.ask_price_1 - self.bid_price_1
    }

    pub fn mid_price(&self) -> Decimal {
        (self.ask_price_1 + self.bid_price_1) / Decimal::from(2)
    }
}
