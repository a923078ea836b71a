// Map pipeline stages

pub mod assemble;
pub mod crop;
pub mod dust;
pub mod export;
pub mod orchestrator;
pub mod skew;
pub mod slice;
pub mod types;
