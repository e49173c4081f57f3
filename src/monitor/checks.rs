//! Manual checks and on-demand distribution.

use crate::distribution::DistributionRequest;
use crate::error::{Error, Result};
use crate::retry::with_retry;
use crate::source::ResourceQuery;
use crate::types::{Channel, CheckOutcome, DistributionResult, Event, Variant};

use super::UpdateMonitor;

impl UpdateMonitor {
    /// Check a consumer's watches right away
    ///
    /// With `rid`, only watches of that resource (any variant) are checked;
    /// without it, all of them. Watches are checked one after another and one
    /// outcome is returned per watch, in subscription order. `force`
    /// announces the current release without touching the recorded version.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when no watch matches.
    pub async fn check_now(
        &self,
        consumer_id: &str,
        rid: Option<&str>,
        force: bool,
    ) -> Result<Vec<CheckOutcome>> {
        self.ensure_accepting()?;

        let targets: Vec<_> = self
            .registry
            .list(consumer_id)
            .await
            .into_iter()
            .filter(|w| rid.is_none_or(|rid| w.rid == rid))
            .collect();

        if targets.is_empty() {
            return Err(Error::NotFound(match rid {
                Some(rid) => format!("{rid} is not subscribed for {consumer_id}"),
                None => format!("{consumer_id} has no subscriptions"),
            }));
        }

        tracing::info!(
            consumer_id = %consumer_id,
            rid = ?rid,
            force,
            watches = targets.len(),
            "Manual check requested"
        );

        let mut outcomes = Vec::with_capacity(targets.len());
        for watch in &targets {
            outcomes.push(self.checker.check(consumer_id, watch, force).await);
        }
        Ok(outcomes)
    }

    /// Download the latest release of a resource and upload it for a consumer
    ///
    /// Works for any resource, subscribed or not. The version state is not
    /// consulted or changed.
    ///
    /// # Errors
    ///
    /// [`Error::MissingCredential`] when no cdk is configured,
    /// [`Error::NotFound`] when the source has no release for the resource,
    /// or the metadata fetch error after retries. Download and upload
    /// failures are reported in the returned result, not as errors.
    pub async fn download_now(
        &self,
        consumer_id: &str,
        rid: &str,
        variant: Variant,
        channel: Channel,
    ) -> Result<DistributionResult> {
        self.ensure_accepting()?;
        if rid.trim().is_empty() {
            return Err(Error::Validation("resource id cannot be empty".into()));
        }
        let credential = self
            .registry
            .credential()
            .await
            .ok_or(Error::MissingCredential)?;

        let query = ResourceQuery::new(rid, variant, channel);
        let release = with_retry(&self.config.retry, || {
            self.source.fetch_latest(&query, None)
        })
        .await?
        .filter(|r| !r.version_name.trim().is_empty())
        .ok_or_else(|| Error::NotFound(format!("no release found for {rid}")))?;

        tracing::info!(
            consumer_id = %consumer_id,
            rid = %rid,
            variant = %variant,
            version = %release.version_name,
            "Manual distribution started"
        );

        let request = DistributionRequest {
            consumer_id: consumer_id.to_string(),
            rid: rid.to_string(),
            variant,
            channel,
        };
        let result = self
            .distribution
            .distribute(&request, &credential, &release)
            .await;

        let _ = self.event_tx.send(Event::DistributionFinished {
            consumer_id: consumer_id.to_string(),
            rid: rid.to_string(),
            result: result.clone(),
        });
        Ok(result)
    }
}
