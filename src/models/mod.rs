//! Data models for refpromote

pub mod outcome;
pub mod project;
pub mod reference;
pub mod request;

pub use outcome::*;
pub use project::*;
pub use reference::*;
pub use request::*;
