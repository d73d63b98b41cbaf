//! Swing modulo scheduling and branch-path balancing over a machine CFG.
//!
//! Two independent passes over post-register-allocation MIR (§2):
//!
//! - [`sms`] (Core A) pipelines a single-block loop into prologue/kernel/
//!   epilogue form at the smallest initiation interval its recurrences and
//!   target resources allow.
//! - [`bpb`] (Core B) equalizes the cycle cost of every branch's
//!   alternatives against their dominator-tree reconvergence point, so a
//!   branch's timing no longer depends on which side is taken.
//!
//! Both operate through [`target::TargetInfo`], the only seam to the
//! surrounding compiler's instruction-description tables, and share
//! [`error::PassError`] as their typed failure surface. [`domtree::DomTree`]
//! is the dominator-tree helper BPB drives and incrementally updates as it
//! inserts dummy blocks.

pub mod bpb;
pub mod config;
pub mod domtree;
pub mod error;
pub mod mir;
pub mod sms;
pub mod target;
pub mod testutil;

pub use config::Config;
pub use domtree::DomTree;
pub use error::{PassError, PassResult};
pub use mir::Function;
pub use target::TargetInfo;
