//! Gateway: HTTP front of the bot.
//!
//! `POST /` takes the serverless function envelope, `POST /telegram/webhook`
//! takes a Telegram update directly, `GET /health` answers probes. Each
//! invocation is dispatched under its own cancellation token.

mod envelope;
mod server;

pub use envelope::{FunctionRequest, FunctionResponse, SECRET_HEADER};
pub use server::{handle_invocation, handle_update, router, run_gateway, GatewayState, InvocationError};
