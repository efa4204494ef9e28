//! Conversation layer.
//!
//! - `orchestrator`: the tool-calling loop for one conversation
//! - `prompt`: system prompt assembly
//! - `response`: final-answer parsing
//! - `session`: concurrent conversations keyed by session id
//! - `render`: terminal output of answers

pub mod orchestrator;
pub mod prompt;
pub mod render;
pub mod response;
pub mod session;

pub use orchestrator::Orchestrator;
pub use prompt::build_system_prompt;
pub use render::render_response;
pub use response::parse_response;
pub use session::{SessionStore, generate_session_id};
