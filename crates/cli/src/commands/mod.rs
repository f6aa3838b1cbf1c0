mod book;
mod listen;

use anyhow::Context;
use taxi::{ClientConfig, CustomerClient};

use crate::cli::{Cli, Commands};
use crate::output::{OutputEvent, OutputFormat, print_event};

/// Settings shared by every command.
pub struct CommandContext {
	pub config: ClientConfig,
	pub format: OutputFormat,
}

impl CommandContext {
	pub fn emit(&self, event: &OutputEvent) {
		print_event(event, self.format);
	}

	/// Connects, switches to `username`, and waits for the join.
	async fn join(&self, username: &str) -> anyhow::Result<CustomerClient> {
		let client = CustomerClient::connect(&self.config)
			.await
			.with_context(|| format!("failed to connect to {}", self.config.socket_url))?;

		let session = client.set_identity(username)?;
		session
			.joined()
			.await
			.with_context(|| format!("failed to join {}", session.topic()))?;
		self.emit(&OutputEvent::joined(session.topic()));
		Ok(client)
	}
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<()> {
	let ctx = CommandContext {
		config: cli.client_config()?,
		format: cli.format,
	};
	tracing::debug!(base_url = %ctx.config.base_url, socket_url = %ctx.config.socket_url, "Resolved client config");

	match cli.command {
		Commands::Book(args) => book::execute(&ctx, args).await,
		Commands::Listen(args) => listen::execute(&ctx, args).await,
	}
}
