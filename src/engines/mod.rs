//! Concrete per-rail engine implementations.
//!
//! One engine per (source-kind, target-kind, action) family; everything
//! rail-specific lives here (fee estimation, quote locking, bank
//! transfer terms), behind the shared [`TxEngine`](crate::application::engine::TxEngine)
//! surface.

pub mod fiat;
pub mod interest;
pub mod on_chain;
pub mod sign;
pub mod swap;
pub mod trading;

pub use fiat::{FiatDepositEngine, FiatWithdrawEngine};
pub use interest::{InterestDepositEngine, InterestWithdrawEngine};
pub use on_chain::OnChainSendEngine;
pub use sign::OnChainSignEngine;
pub use swap::SwapEngine;
pub use trading::TradingSendEngine;
