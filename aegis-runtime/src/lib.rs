//! Process-model layer: the supervisor (C20) and worker (C21) binaries, plus the pieces they
//! share — CLI/log bootstrap, trading-session gating, the paper-trading gateway adapter, and a
//! minimal reference indicator/signal pair so the worker binary has something runnable to plug
//! into `aegis_core::StrategyEngine` out of the box. A production deployment swaps
//! [`reference_strategy`]'s services for its own and [`simulated_gateway::SimulatedGateway`] for
//! a real CTP-style adapter; nothing in `aegis-core` depends on either.

pub mod common;
pub mod reference_strategy;
pub mod session;
pub mod simulated_gateway;
pub mod worker_runtime;
