//! # Ledger Adapter
//!
//! The only crate that talks to ledger RPC endpoints.
//!
//! ```text
//! LedgerReader ──► FailoverRouter ──► EndpointClient (deadline) ──► LedgerEndpoint
//!  typed calls      ordered failover      per-call timeout           HttpEndpoint | MockLedger
//! ```
//!
//! Failures are classified once, at the endpoint, as retryable (timeouts,
//! transport, rate limits, malformed responses) or fatal (reverts, call
//! exceptions, undecodable output). The router fails over on the former and
//! stops on the latter.

pub mod endpoint;
pub mod error;
pub mod http;
pub mod reader;
pub mod router;

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;

pub use endpoint::{EndpointClient, LedgerEndpoint, LogQuery, RawLogEntry, TxReceipt};
pub use error::{classify_rpc_error, ClassifiedError, Disposition, ErrorKind, RouterError};
pub use http::HttpEndpoint;
pub use reader::LedgerReader;
pub use router::FailoverRouter;
