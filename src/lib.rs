//! Text summarization and sentiment analysis over background inference
//! workers - library exports for testing

pub mod api;
pub mod core;
pub mod infrastructure;
