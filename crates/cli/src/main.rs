mod cli;
mod commands;
mod logging;
mod output;
mod styles;

use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = commands::dispatch(cli).await {
		output::print_error_stderr(&err);
		std::process::exit(1);
	}
}
