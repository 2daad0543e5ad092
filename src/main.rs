mod backup;
mod cli;
mod clone;
mod config;
mod github;
mod logging;

fn main() -> std::process::ExitCode {
    cli::run()
}
