//! Help output colors.

use clap::builder::Styles;
use clap::builder::styling::AnsiColor;

/// Yellow bold headings, green commands and flags, cyan placeholders.
pub fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Yellow.on_default().bold())
		.usage(AnsiColor::Yellow.on_default().bold())
		.literal(AnsiColor::Green.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.error(AnsiColor::Red.on_default().bold())
}
