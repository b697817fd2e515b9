use std::process::ExitCode;

fn main() -> ExitCode {
    sitescope_cli::run()
}
