use std::process::ExitCode;

fn main() -> ExitCode {
    handset_cli::run()
}
