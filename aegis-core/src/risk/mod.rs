//! Portfolio risk aggregator (C8): position- and portfolio-level Greek limits, with
//! edge-triggered breach events.

use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::config::{GreekLimits, RiskThresholds};
use crate::core::VtSymbol;
use crate::events::{DomainEvent, RiskScope};
use crate::greeks::Greeks;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionRiskCheck {
    pub ok: bool,
    pub breached_fields: Vec<String>,
}

/// Weighted sum of per-position Greeks, per SPEC_FULL §4.8.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortfolioGreeks {
    pub delta: Decimal,
    pub gamma: Decimal,
    pub theta: Decimal,
    pub vega: Decimal,
}

fn breached_fields(greeks: &Greeks, limits: &GreekLimits) -> Vec<String> {
    let mut breached = Vec::new();
    if greeks.delta.abs() > limits.delta {
        breached.push("delta".to_string());
    }
    if greeks.gamma.abs() > limits.gamma {
        breached.push("gamma".to_string());
    }
    if greeks.vega.abs() > limits.vega {
        breached.push("vega".to_string());
    }
    if greeks.theta.abs() > limits.theta {
        breached.push("theta".to_string());
    }
    breached
}

fn portfolio_breached_fields(greeks: &PortfolioGreeks, limits: &GreekLimits) -> Vec<String> {
    breached_fields(
        &Greeks { delta: greeks.delta, gamma: greeks.gamma, theta: greeks.theta, vega: greeks.vega },
        limits,
    )
}

/// Tracks whether each scope (position or the whole portfolio) was last known to be in breach,
/// so that events are only emitted on the ok→breach and breach→ok transitions (edge-triggered).
#[derive(Debug)]
pub struct PortfolioRiskAggregator {
    thresholds: RiskThresholds,
    position_breach_state: HashMap<VtSymbol, bool>,
    portfolio_breach_state: bool,
}

impl PortfolioRiskAggregator {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self {
            thresholds,
            position_breach_state: HashMap::new(),
            portfolio_breach_state: false,
        }
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    pub fn check_position_risk(&self, greeks: &Greeks) -> PositionRiskCheck {
        let breached = breached_fields(greeks, &self.thresholds.position);
        PositionRiskCheck { ok: breached.is_empty(), breached_fields: breached }
    }

    /// Runs the position-risk check and, as a side effect, records the breach transition for
    /// `vt_symbol`, returning any resulting domain event.
    pub fn check_position_risk_and_emit(&mut self, vt_symbol: &VtSymbol, greeks: &Greeks) -> (PositionRiskCheck, Option<DomainEvent>) {
        let check = self.check_position_risk(greeks);
        let was_breached = self.position_breach_state.get(vt_symbol).copied().unwrap_or(false);
        self.position_breach_state.insert(vt_symbol.clone(), !check.ok);

        let event = match (was_breached, check.ok) {
            (false, false) => Some(DomainEvent::GreeksRiskBreach {
                scope: RiskScope::Position,
                vt_symbol: Some(vt_symbol.clone()),
                breached_fields: check.breached_fields.clone(),
                at: Utc::now(),
            }),
            (true, true) => Some(DomainEvent::GreeksRiskCleared {
                scope: RiskScope::Position,
                vt_symbol: Some(vt_symbol.clone()),
                at: Utc::now(),
            }),
            _ => None,
        };
        (check, event)
    }

    /// Weighted sum of `per_position_greeks` by `volume * multiplier`, plus any breach/clear
    /// event for the portfolio scope as a whole.
    pub fn aggregate_portfolio_greeks(
        &mut self,
        per_position_greeks: &[(Decimal, Decimal, Greeks)],
    ) -> (PortfolioGreeks, Vec<DomainEvent>) {
        let mut aggregate = PortfolioGreeks::default();
        for (volume, multiplier, greeks) in per_position_greeks {
            let weight = volume * multiplier;
            aggregate.delta += greeks.delta * weight;
            aggregate.gamma += greeks.gamma * weight;
            aggregate.theta += greeks.theta * weight;
            aggregate.vega += greeks.vega * weight;
        }

        let breached = portfolio_breached_fields(&aggregate, &self.thresholds.portfolio);
        let is_breached = !breached.is_empty();
        let was_breached = self.portfolio_breach_state;
        self.portfolio_breach_state = is_breached;

        let mut events = Vec::new();
        match (was_breached, is_breached) {
            (false, true) => events.push(DomainEvent::GreeksRiskBreach {
                scope: RiskScope::Portfolio,
                vt_symbol: None,
                breached_fields: breached,
                at: Utc::now(),
            }),
            (true, false) => events.push(DomainEvent::GreeksRiskCleared {
                scope: RiskScope::Portfolio,
                vt_symbol: None,
                at: Utc::now(),
            }),
            _ => {}
        }

        (aggregate, events)
    }

    pub fn portfolio_is_breached(&self) -> bool {
        self.portfolio_breach_state
    }
}
