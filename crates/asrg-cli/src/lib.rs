pub mod cli;
pub mod worker;

pub use cli::{Cli, Commands, ServeArgs};
