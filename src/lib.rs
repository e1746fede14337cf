//! Retrieval-augmented chat over the CGR audit reports ("informes de
//! control"), backed by Snowflake Cortex Search and Cortex `COMPLETE`.

pub mod auth;
pub mod client;
pub mod config;
pub mod convo;
pub mod datam;
pub mod discovery;
pub mod error;
pub mod modes;
pub mod orchestra;
pub mod prompts;
pub mod providers;
pub mod retrieval;
pub mod session;
pub mod topic;

pub use convo::{Chat, Conversation, SessionConfig};
pub use error::RagError;
pub use orchestra::{Orchestra, TurnOutcome};
