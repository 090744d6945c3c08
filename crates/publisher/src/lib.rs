//! ScholarMint Publisher
//!
//! The publication pipeline for one draft at a time:
//! 1. Renders the article PDF
//! 2. Generates or validates the cover image
//! 3. Pins the PDF, cover, article payload and metadata documents to IPFS
//! 4. Registers the IP asset on-chain
//! 5. Persists the article and its authors, then deletes the draft
//!
//! Drafts are auto-saved while being edited and the pipeline state is
//! checkpointed after every transition.

pub mod autosave;
pub mod compose;
pub mod cover;
pub mod errors;
pub mod orchestrator;
pub mod pdf;
pub mod pipeline;
pub mod registry;

pub use compose::ComposeInput;
pub use errors::PublishError;
pub use orchestrator::{PipelineView, Publisher};
pub use pipeline::{PipelineState, PipelineStep};
