//! Abstract storage contract for the Lattis ledger.
//!
//! Every storage backend (LMDB today, anything with ordered tables and
//! transactional snapshots tomorrow) implements the traits in this crate.
//! The rest of the workspace depends only on the contract: named tables with
//! get/put/delete/exists/count and ranged iteration, plus
//! `begin_read`/`begin_write`/`commit`/`renew` transaction primitives.
//!
//! Blocks cross this boundary as raw bytes; the ledger crate owns the block
//! and sideband codecs.

pub mod account;
pub mod confirmation_height;
pub mod error;
pub mod pending;
pub mod transaction;

pub use account::AccountInfo;
pub use confirmation_height::ConfirmationHeightInfo;
pub use error::StoreError;
pub use pending::{PendingInfo, PendingKey};
pub use transaction::{ReadTxn, Store, WriteTxn};
