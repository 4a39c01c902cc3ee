//! Prompt construction for Counsel.
//!
//! - [`TagResolver`] expands `<$...$>` inclusion tags into literal text
//! - [`TemplateLoader`] turns an advisor into its opening messages
//! - [`AdvisorCatalog`] finds and parses advisor files on disk

pub mod advisor_file;
pub mod catalog;
pub mod loader;
pub mod resolver;
pub mod tags;

pub use catalog::AdvisorCatalog;
pub use loader::TemplateLoader;
pub use resolver::{MissingFilePolicy, ResolverOptions, TagResolver, format_datetime};
