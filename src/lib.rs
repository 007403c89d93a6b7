pub mod application;
pub mod domain;
pub mod engines;
pub mod error;

pub use application::engine::{TxEngine, TxResult};
pub use application::processor::TransactionProcessor;
pub use application::registry::{EngineKey, EnginePorts, EngineRegistry, default_registry};
pub use domain::pending::PendingTx;
pub use domain::validation::TxValidation;
pub use error::{ProcessorError, Result, TransferError};
