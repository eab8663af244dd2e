//! Credential spraying against form-based login endpoints.
//!
//! Every username is paired with every password, each pair is rendered into a
//! url-encoded form body from operator-supplied `key:value` templates, and the
//! resulting POSTs are dispatched with bounded concurrency and an optional launch
//! stagger. Responses are classified against a declared failure signature so that
//! only notable results reach the operator.
//!
//! ```no_run
//! # async fn run() -> stomper::Result<()> {
//! use std::sync::Arc;
//! use stomper::{ReqwestHttpClient, Spray, SprayConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let mut config = SprayConfig::new(
//!     "users.txt",
//!     "passwords.txt",
//!     "https://app.example.com/login",
//!     vec!["user:{USER}".into(), "pass:{PASS}".into()],
//! );
//! config.failure_status = Some(401);
//!
//! let spray = Spray::load(config).await?;
//! let client = Arc::new(ReqwestHttpClient::new()?);
//! spray
//!     .run(client, CancellationToken::new(), |outcome| {
//!         if outcome.is_notable() {
//!             println!("{:?}", outcome.result.credential);
//!         }
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod generator;
pub mod http;
pub mod report;
pub mod spray;
pub mod template;
pub mod wordlist;

// Re-export commonly used types
pub use classify::{Classification, FailureSignature};
pub use config::SprayConfig;
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherConfig, JobOutcome, RetryConfig};
pub use domain::job::{Credential, JobIndex, RequestJob};
pub use domain::result::{FailureReason, RequestResult, ResponseBody};
pub use error::{Result, StomperError};
pub use generator::Combinations;
pub use http::{HttpClient, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use report::{OutputFormat, Reporter};
pub use spray::Spray;
pub use template::FieldTemplate;
