//! Order execution (C9, C10): adaptive-price/tick-rounding/timeout-retry for single orders, plus
//! the advanced-order scheduler that splits a parent order into a sequence of children.

pub mod order_fsm;
pub mod scheduler;
pub mod smart_executor;

pub use order_fsm::{ManagedOrder, ManagedOrderState};
pub use scheduler::{AdvancedOrder, AdvancedOrderType, ChildOrder, Scheduler, SchedulerError};
pub use smart_executor::{AdaptiveSide, SmartExecutor, SmartExecutorConfig};
