//! animix-api-core: typed values, property paths and blend math shared by the mixer.

pub mod blend;
pub mod property_path;
pub mod value;

pub use property_path::{PathError, PropertyPath};
pub use value::{Value, ValueKind};
