//! Trade-target selectors (C5, C6).

pub mod future_selector;
pub mod option_selector;

pub use future_selector::{parse_expiry_yymm, select_dominant_future, FutureCandidate};
pub use option_selector::{passes_liquidity_gate, select_otm_option, ExpiryWindow, LiquidityFilter, OptionChainRow};
