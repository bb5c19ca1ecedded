//! The objects passed between the agent, the model endpoint, and the tools.
//!
//! `message` holds the chat wire format: these structs serialize directly into
//! the shape the completions endpoint expects, so the conversation history can
//! be sent verbatim on every call. `tool` holds the schemas the registry
//! advertises to the model.
pub mod message;
pub mod tool;
