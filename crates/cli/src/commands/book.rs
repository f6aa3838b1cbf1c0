use std::time::Duration;

use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;

use super::CommandContext;
use crate::cli::BookArgs;
use crate::output::OutputEvent;

pub async fn execute(ctx: &CommandContext, args: BookArgs) -> anyhow::Result<()> {
	let client = ctx.join(&args.username).await?;
	let mut outcomes = client.outcomes();
	let mut errors = client.errors();

	let submitted = client.submit(&args.pickup, &args.dropoff).await;
	if let Some(event) = OutputEvent::from_outcome(&outcomes.observe()) {
		ctx.emit(&event);
	}
	submitted.context("booking failed")?;

	let deadline = tokio::time::sleep(Duration::from_secs(args.wait));
	tokio::pin!(deadline);

	let result = loop {
		tokio::select! {
			_ = &mut deadline => break Ok(()),
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
					break Err(anyhow::Error::new(err).context("channel dropped while waiting for updates"));
				}
				Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "Missed channel errors"),
				Err(RecvError::Closed) => break Ok(()),
			},
		}
	};

	client.shutdown().await;
	result
}
