//! Small shared utilities.

pub mod layout;
pub mod size;
