use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use taxi::ClientConfig;

use crate::output::OutputFormat;
use crate::styles::cli_styles;

/// Pickup used when `--pickup` is not given.
pub const DEFAULT_PICKUP: &str = "Tecnologico de Monterrey, campus Puebla, Mexico";

/// Drop-off used when `--dropoff` is not given.
pub const DEFAULT_DROPOFF: &str = "Triangulo Las Animas, Puebla, Mexico";

#[derive(Parser, Debug)]
#[command(name = "taxi")]
#[command(about = "Taxi booking client - book rides and follow their status live")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	/// Output format: text (default) or json
	#[arg(short = 'f', long, global = true, value_enum, default_value = "text")]
	pub format: OutputFormat,

	/// Load client settings from a JSON file
	#[arg(long, global = true, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// REST root of the booking service
	#[arg(long, global = true, value_name = "URL")]
	pub base_url: Option<String>,

	/// Channel socket endpoint
	#[arg(long, global = true, value_name = "URL")]
	pub socket_url: Option<String>,

	/// Channel role, the part before ':' in the topic
	#[arg(long, global = true, value_name = "ROLE")]
	pub role: Option<String>,

	/// Token sent when joining the channel
	#[arg(long, global = true, value_name = "TOKEN")]
	pub token: Option<String>,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Book a ride and print status updates as they arrive
	Book(BookArgs),
	/// Join the customer channel and print pushes until Ctrl-C
	Listen(ListenArgs),
}

#[derive(Args, Debug)]
pub struct BookArgs {
	/// Customer name; also scopes the channel topic
	#[arg(short, long)]
	pub username: String,

	/// Pickup address
	#[arg(long, default_value = DEFAULT_PICKUP)]
	pub pickup: String,

	/// Drop-off address
	#[arg(long, default_value = DEFAULT_DROPOFF)]
	pub dropoff: String,

	/// Seconds to keep listening for pushes after the booking reply
	#[arg(long, default_value_t = 10, value_name = "SECS")]
	pub wait: u64,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
	/// Customer name; also scopes the channel topic
	#[arg(short, long)]
	pub username: String,
}

impl Cli {
	/// Config file (if any) with command-line overrides applied.
	pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
		let mut config = match &self.config {
			Some(path) => ClientConfig::from_file(path).with_context(|| format!("failed to load config from {}", path.display()))?,
			None => ClientConfig::default(),
		};

		if let Some(base_url) = &self.base_url {
			config.base_url = base_url.clone();
		}
		if let Some(socket_url) = &self.socket_url {
			config.socket_url = socket_url.clone();
		}
		if let Some(role) = &self.role {
			config.topic_prefix = role.clone();
		}
		if let Some(token) = &self.token {
			config.auth_token = token.clone();
		}

		config.validate()?;
		Ok(config)
	}
}
