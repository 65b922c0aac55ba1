pub mod config;
pub mod extract;
pub mod fallback;
pub mod plan;
pub mod prompt;
pub mod text;
pub mod types;

// Flat re-exports; downstream crates import from the root.
pub use config::*;
pub use extract::*;
pub use fallback::*;
pub use plan::*;
pub use prompt::*;
pub use text::*;
pub use types::*;
