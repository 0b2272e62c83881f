//! Transparency module for the MindBalance agent.
//!
//! Tracks how many samples were acquired live or synthetically and how much
//! was exported, so every result can be traced back to its origin.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, Counters, SharedTransparencyLog,
    TransparencyLog, TransparencyStats, TRANSPARENCY_FILE,
};
