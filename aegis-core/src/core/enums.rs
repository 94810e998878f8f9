//! Closed-vocabulary domain enums.
//!
//! Manual `Display` impls, same pattern as `Side`/`OrderType`/`TimeInForce` elsewhere in this
//! codebase, rather than deriving `strum`, since the set here is small and stable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Long or short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short — used to sign volumes for Greeks aggregation.
    pub fn sign(self) -> i32 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Whether an order opens or closes a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offset {
    Open,
    Close,
    CloseToday,
    CloseYesterday,
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Offset::Open => "OPEN",
            Offset::Close => "CLOSE",
            Offset::CloseToday => "CLOSE_TODAY",
            Offset::CloseYesterday => "CLOSE_YESTERDAY",
        };
        write!(f, "{s}")
    }
}

/// Broker order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
    Fak,
    Fok,
}

/// Broker order status, per SPEC_FULL §3's tracked-order lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitting,
    NotTraded,
    PartTraded,
    AllTraded,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses never transition further (§3's "terminal status is immutable").
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::AllTraded | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Submitting => "SUBMITTING",
            OrderStatus::NotTraded => "NOT_TRADED",
            OrderStatus::PartTraded => "PART_TRADED",
            OrderStatus::AllTraded => "ALL_TRADED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// Option contract type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "CALL"),
            OptionType::Put => write!(f, "PUT"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::AllTraded.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::NotTraded.is_terminal());
        assert!(!OrderStatus::PartTraded.is_terminal());
    }

    #[test]
    fn direction_sign_and_opposite() {
        assert_eq!(Direction::Long.sign(), 1);
        assert_eq!(Direction::Short.sign(), -1);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }
}
