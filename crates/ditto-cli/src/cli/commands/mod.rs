use super::args::{Cli, Command};

pub mod build;
pub mod verify;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Build(args) => build::run(args),
        Command::Verify(args) => verify::run(args),
    }
}
