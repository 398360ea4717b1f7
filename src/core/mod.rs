pub mod composer;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod selection;
pub mod template;
