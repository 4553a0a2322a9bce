//! Event engine: dual scoring, the state machine with action gating, the
//! alert dispatcher, the live broadcaster and the feedback sink.

pub mod alerts;
pub mod broadcast;
pub mod engine;
pub mod feedback;
pub mod maintenance;
pub mod oceano;
pub mod pipeline;
pub mod plantao;
pub mod state;

pub use broadcast::Broadcaster;
pub use engine::EventEngine;
pub use feedback::FeedbackSink;
pub use pipeline::Pipeline;
