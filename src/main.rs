use std::process::ExitCode;

fn main() -> ExitCode {
    dispose_rs::run_cli()
}
