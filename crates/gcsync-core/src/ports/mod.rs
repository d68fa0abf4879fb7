//! Port definitions
//!
//! Interfaces the scheduling core depends on, whose implementations live in
//! adapter modules.
//!
//! ## Ports Overview
//!
//! - [`ITransferInvoker`] - One complete source → destination synchronization

pub mod transfer;

pub use transfer::{ITransferInvoker, SyncReason, TransferOutcome, TransferRequest};
