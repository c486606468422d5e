/*!
 * Paystream CLI
 *
 * Every command prints one JSON envelope on stdout; the process exit code
 * follows the envelope (0 success, 1 caller error, 2 fatal).
 */

use clap::Parser;

use paystream::{
    cli::Cli,
    commands,
    error::{Result, EXIT_SUCCESS},
    logging, Envelope, OutputWriter, Paystream,
};

fn main() {
    let cli = Cli::parse();
    let output = OutputWriter::new(cli.pretty);

    let code = match run(cli) {
        Ok(envelope) => {
            output.emit(&envelope);
            EXIT_SUCCESS
        }
        Err(e) => {
            output.emit(&Envelope::error(&e));
            e.exit_code()
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<Envelope> {
    let config = cli.resolve_config()?;

    if let Err(e) = logging::init_logging(&config) {
        eprintln!("Warning: failed to initialise logging: {}", e);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let app = Paystream::open(&config).await?;
        let result = commands::execute(&app, &config, cli.command).await;
        app.shutdown().await;
        result
    })
}
