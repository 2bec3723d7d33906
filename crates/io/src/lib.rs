// File I/O: input discovery and loading, persistence, session runs

pub mod boundary;
pub mod csv;
pub mod discover;
pub mod error;
pub mod gpkg;
pub mod json;
pub mod loader;
pub mod persist;
pub mod session;

pub use error::IoError;
pub use loader::{SessionDirLoader, SourceLoader};
pub use persist::{PersistOptions, PersistReport};
pub use session::{FusionReport, RunOutcome, SessionRunner, SessionStore};
