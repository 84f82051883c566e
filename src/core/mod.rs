pub mod bridge;
pub mod sentiment;
pub mod summarize;
pub mod traits;
pub mod worker;
