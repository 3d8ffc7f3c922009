//! CSV adapters used by the replay binary.

pub mod interaction_reader;
pub mod reply_writer;
