pub mod browser;
pub mod config;
pub mod element;
pub mod error;
pub mod executor;
pub mod identifier;
pub mod locator;
pub mod page;
pub mod runner;
pub mod schema;
pub mod surface;
pub mod timing;
pub mod value;

pub use browser::AutofillBrowser;
pub use config::{BrowserConfig, RunOptions};
pub use error::{Error, Result};
pub use executor::{Executor, FieldOutcome, SkipReason};
pub use identifier::{FileIdentifierStore, IdentifierStore, MemoryIdentifierStore};
pub use page::Page;
pub use runner::{RunReport, Runner};
pub use schema::{FieldAction, FieldDefinition, Schema, SchemaError};
pub use surface::{DocumentSurface, Locator};
pub use value::Record;
