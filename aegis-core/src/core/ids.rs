//! Identifier newtypes.
//!
//! Rather than a cache-line `OrderId(u128)`, every id here is broker- or
//! scheduler-assigned and string-shaped (`vt_symbol`, `vt_orderid`), so these are plain
//! `String`-backed newtypes rather than a zero-alloc encoding.

use std::fmt;

macro_rules! string_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(VtSymbol, "A broker-qualified instrument symbol, e.g. `rb2505.SHFE`.");
string_id!(VtOrderId, "A broker-assigned order id, unique within a trading day.");
string_id!(VtQuoteId, "A broker-assigned quote id.");
string_id!(AdvancedOrderId, "Scheduler-assigned id for a parent advanced order.");
string_id!(Product, "An exchange product code, e.g. `rb` or `IF`.");

impl VtSymbol {
    /// The product code a futures/options symbol belongs to: the leading alphabetic run.
    ///
    /// `rb2505` -> `rb`, `IF2501` -> `IF`, `rb2505.SHFE` -> `rb`.
    pub fn product_code(&self) -> String {
        self.0
            .split('.')
            .next()
            .unwrap_or(&self.0)
            .chars()
            .take_while(|c| c.is_alphabetic())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn product_code_strips_expiry_and_exchange() {
        assert_eq!(VtSymbol::from("rb2505.SHFE").product_code(), "rb");
        assert_eq!(VtSymbol::from("IF2501").product_code(), "IF");
    }
}
