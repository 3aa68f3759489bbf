pub mod hook;
pub mod module;
pub mod winapi;
