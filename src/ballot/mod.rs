//! One encrypted ballot per voter and election

pub mod guard;

pub use guard::{BallotGuard, CastReceipt, validate_selections};
