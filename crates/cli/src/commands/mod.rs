pub mod coverage;
pub mod ids;
pub mod inspect;
pub mod run;

pub use coverage::*;
pub use ids::*;
pub use inspect::*;
pub use run::*;
