pub mod meridian;
pub mod run;
pub mod status;
pub mod validate;

// Re-export command functions for convenience
pub use meridian::meridian;
pub use run::{run, RunParams};
pub use status::status;
pub use validate::validate;
