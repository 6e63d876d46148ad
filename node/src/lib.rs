//! Confirmation-height pipeline.
//!
//! The node-side half of the accounting core: the single-writer admission
//! queue, the asynchronous confirmation-height processor, and the two
//! cementing strategies it dispatches to.

pub mod bounded_cementer;
pub mod config;
pub mod confirmation_processor;
pub mod logging;
pub mod unbounded_cementer;
pub mod write_queue;

pub use bounded_cementer::BoundedCementer;
pub use config::ConfirmationConfig;
pub use confirmation_processor::{
    CementCallbacks, CementedBlock, ConfirmationHeightMode, ConfirmationHeightProcessor,
    UNBOUNDED_CUTOFF,
};
pub use logging::{init_logging, LogFormat};
pub use unbounded_cementer::UnboundedCementer;
pub use write_queue::{WriteGuard, WriteQueue, Writer};
