pub mod loader;
pub mod validate;
