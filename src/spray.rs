//! Wiring of a whole run: load inputs, then dispatch every combination.
//!
//! All startup failures (unreadable or empty word lists, malformed templates, bad
//! target or settings) surface from [`Spray::load`], before any request is sent.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::{SprayConfig, parse_target};
use crate::dispatcher::{DispatchStats, Dispatcher, JobOutcome};
use crate::error::Result;
use crate::generator::Combinations;
use crate::http::HttpClient;
use crate::template::{self, FieldTemplate, Placeholders};
use crate::wordlist;

/// A validated run with its inputs loaded.
pub struct Spray {
    config: SprayConfig,
    target: Url,
    users: Arc<[String]>,
    passwords: Arc<[String]>,
    templates: Arc<[FieldTemplate]>,
}

impl Spray {
    /// Validate `config`, parse the templates and load both word lists.
    #[tracing::instrument(skip_all, fields(target = %config.target))]
    pub async fn load(config: SprayConfig) -> Result<Self> {
        config.validate()?;
        let target = parse_target(&config.target)?;
        let templates = template::parse_all(&config.form_fields)?;

        let users = wordlist::load_required(&config.user_file).await?;
        let passwords = wordlist::load_required(&config.pass_file).await?;

        tracing::info!(
            users = users.len(),
            passwords = passwords.len(),
            fields = templates.len(),
            "Loaded spray inputs"
        );

        Ok(Self {
            config,
            target,
            users: users.into(),
            passwords: passwords.into(),
            templates: templates.into(),
        })
    }

    pub fn config(&self) -> &SprayConfig {
        &self.config
    }

    /// Fresh job sequence from the first combination.
    pub fn jobs(&self) -> Combinations {
        Combinations::new(
            self.target.clone(),
            self.users.clone(),
            self.passwords.clone(),
            self.templates.clone(),
            self.config.interval(),
        )
    }

    pub fn total_jobs(&self) -> u64 {
        self.jobs().total()
    }

    /// Placeholders referenced by any template.
    pub fn placeholders(&self) -> Placeholders {
        template::placeholders_used(&self.templates)
    }

    /// Dispatch every combination through `http_client`.
    pub async fn run<H, F>(
        &self,
        http_client: Arc<H>,
        shutdown_token: CancellationToken,
        on_outcome: F,
    ) -> Result<DispatchStats>
    where
        H: HttpClient + 'static,
        F: FnMut(JobOutcome),
    {
        let dispatcher = Dispatcher::new(
            http_client,
            self.config.dispatcher.clone(),
            self.config.signature(),
            shutdown_token,
        );

        tracing::info!(
            jobs = self.total_jobs(),
            interval_ms = self.config.interval_ms,
            concurrency = self.config.dispatcher.concurrency,
            "Starting spray"
        );
        dispatcher.run(self.jobs(), on_outcome).await
    }
}
