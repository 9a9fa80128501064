//! # PromptChain Engine
//!
//! The algorithmic core: which earlier outputs and inputs feed a block set's
//! context, how that context is assembled and executed, and how a preset's
//! block sets stay densely ordered under moves.
//!
//! - [`chain`]: backward walk over preceding block sets
//! - [`context`]: final message list and completion request for a target
//! - [`reconciler`]: dense renumbering for a single move
//! - [`executor`]: one completion call, written back as a new output block
//! - [`service`]: owner-scoped operations over a [`promptchain_core::Store`]

pub mod chain;
pub mod context;
pub mod executor;
pub mod reconciler;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;

pub use chain::{collect_preceding_messages, ChainStep, PrecedingChain};
pub use context::{build_messages, build_request};
pub use executor::Executor;
pub use reconciler::{plan_move, MovePlan};
pub use service::{EngineSettings, PresetService, WorkspaceSeed};
