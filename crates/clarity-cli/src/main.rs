use clap::Parser;

fn main() -> std::process::ExitCode {
    let args = clarity_cli::Args::parse();
    clarity_cli::run(args)
}
