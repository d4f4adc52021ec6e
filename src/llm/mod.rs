pub mod client;
pub mod extract;
pub mod manager;
pub mod prompts;
pub mod validation;

pub use client::*;
pub use extract::*;
pub use manager::*;
pub use prompts::*;
pub use validation::*;
