pub mod client;
pub mod oracles;
pub mod prompts;
pub mod types;

pub use client::*;
pub use oracles::*;
pub use types::*;
