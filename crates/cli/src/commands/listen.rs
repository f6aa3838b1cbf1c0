use tokio::sync::broadcast::error::RecvError;

use super::CommandContext;
use crate::cli::ListenArgs;
use crate::output::OutputEvent;

pub async fn execute(ctx: &CommandContext, args: ListenArgs) -> anyhow::Result<()> {
	let client = ctx.join(&args.username).await?;
	let mut outcomes = client.outcomes();
	let mut errors = client.errors();
	tracing::info!(username = %args.username, "Listening for booking updates, Ctrl-C to stop");

	let result = loop {
		tokio::select! {
			_ = tokio::signal::ctrl_c() => break Ok(()),
			outcome = outcomes.changed() => match outcome {
				Some(outcome) => {
					if let Some(event) = OutputEvent::from_outcome(&outcome) {
						ctx.emit(&event);
					}
				}
				None => break Ok(()),
			},
			err = errors.recv() => match err {
				Ok(err) => {
					ctx.emit(&OutputEvent::channel_error(&err));
					break Err(anyhow::Error::new(err).context("channel dropped"));
				}
				Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Missed channel errors"),
				Err(RecvError::Closed) => break Ok(()),
			},
		}
	};

	client.shutdown().await;
	result
}
