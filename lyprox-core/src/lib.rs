//! LyProX Core - Dataset Types
//!
//! Identity, schema and table types shared by every other crate, plus the
//! error taxonomy, loader configuration and the boundary traits.

mod config;
mod error;
mod identity;
mod metadata;
mod schema;
mod source;
mod table;

pub use config::*;
pub use error::*;
pub use identity::*;
pub use metadata::*;
pub use schema::*;
pub use source::*;
pub use table::*;

// ============================================================================
// PROPERTY TESTS
// ============================================================================
