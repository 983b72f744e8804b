//! CLI commands implementation

pub mod init;
pub mod run;
pub mod status;

pub use init::*;
pub use run::*;
pub use status::*;
