pub mod cli;
pub mod compress;
pub mod render;

pub use cli::Args;

/// Initialize tracing/logging with the given directives
pub fn init_logging(directives: &[&str]) {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in directives {
        match directive.parse::<tracing_subscriber::filter::Directive>() {
            Ok(d) => filter = filter.add_directive(d),
            Err(e) => eprintln!("Ignoring invalid log directive '{}': {}", directive, e),
        }
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Run the compressor with parsed arguments. Returns the process exit code.
pub fn run(args: Args) -> std::process::ExitCode {
    if args.verbose {
        init_logging(&["clarity_cli=debug", "clarity_core=debug"]);
    } else {
        init_logging(&["clarity_cli=info", "clarity_core=info"]);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create tokio runtime: {}", e);
            return std::process::ExitCode::FAILURE;
        }
    };

    let config = clarity_core::Config::load_or_default();
    let mut stdout = std::io::stdout();

    match rt.block_on(compress::run(&args, &config, &mut stdout)) {
        Ok(summary) => {
            tracing::info!("{}", summary.status_line());
            std::process::ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::ExitCode::FAILURE
        }
    }
}
