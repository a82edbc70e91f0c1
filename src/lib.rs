//! depimg - Incremental container image builder
//!
//! Decomposes a declarative build into single-purpose layers, reuses
//! previously built images via set-intersection planning, and builds the
//! residual layers by mutating container snapshots.

pub mod builder;
pub mod checksum;
pub mod cli;
pub mod declaration;
pub mod envinherit;
pub mod error;
pub mod inventory;
pub mod labels;
pub mod layer;
pub mod orchestrator;
pub mod planner;
pub mod pm;
pub mod runtime;
pub mod shell;

pub use error::{DepimgError, DepimgResult};
