//! Instrumentation and debloat phases plus the mode dispatch that runs them.

pub mod debloat;
pub mod instrument;
pub mod pipeline;
