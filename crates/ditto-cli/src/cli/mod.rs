pub mod args;
pub mod commands;
pub(crate) mod input;
