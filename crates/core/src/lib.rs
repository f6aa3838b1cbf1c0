//! taxi: real-time booking client for customers
//!
//! One customer channel per identity on a Phoenix-style socket, plus a REST
//! booking dispatcher. The booking reply and later `booking_request` pushes
//! race into a single last-write-wins outcome slot.
//!
//! # Example
//!
//! ```ignore
//! use taxi::{ClientConfig, CustomerClient};
//!
//! #[tokio::main]
//! async fn main() -> taxi::Result<()> {
//!     let client = CustomerClient::connect(&ClientConfig::default()).await?;
//!     let session = client.set_identity("luciano")?;
//!     session.joined().await?;
//!
//!     let mut outcomes = client.outcomes();
//!     client
//!         .submit("Tecnologico de Monterrey, campus Puebla, Mexico", "Triangulo Las Animas, Puebla, Mexico")
//!         .await?;
//!
//!     while let Some(outcome) = outcomes.changed().await {
//!         println!("{:?}", outcome.message());
//!     }
//!     Ok(())
//! }
//! ```

pub mod booking;
pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod manager;
pub mod outcome;
pub mod session;

pub use booking::{BookingRequest, CorrelationId};
pub use client::{CustomerClient, spawn_connection};
pub use config::ClientConfig;
pub use dispatcher::BookingDispatcher;
pub use error::{ConnectionError, ConnectionErrorKind, Error, Result, SubmissionError};
pub use handlers::Subscription;
pub use identity::Identity;
pub use manager::{ChannelSessionManager, ManagerStats};
pub use outcome::{BookingOutcome, FailureNotice, OutcomeReader, OutcomeSink, OutcomeSource, StatusUpdate};
pub use session::{ChannelSession, SessionStatus};
pub use taxi_runtime::{Connection, MemoryServer, MemoryTransport};
