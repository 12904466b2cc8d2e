use clap::Command;
use clap_complete::Shell;
use std::io;

pub fn generate(mut cmd: Command, shell: Shell) {
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
}
