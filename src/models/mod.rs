pub mod guideline;
pub mod run;
pub mod stage_result;
pub mod transcript;

pub use guideline::*;
pub use run::*;
pub use stage_result::*;
pub use transcript::*;
