use std::process::ExitCode;

fn main() -> ExitCode {
    match trebuchet::pipeline::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
