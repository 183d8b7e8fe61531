use crate::{
    db::{
        design::{DesignDocument, merge_design_document},
        store::DocumentStore,
    },
    error::InternalError,
    obs::sink::{GlobalMetricsSink, MetricsEvent, MetricsSink},
};
use derive_more::Display;
use std::sync::Arc;

/// Write attempts per design document before a conflict is surfaced.
pub const DEFAULT_DESIGN_ATTEMPTS: u32 = 3;

///
/// SyncOptions
///
/// update_if_exists : rewrite documents that already exist when the merge changed them
/// prune            : drop stored views the desired document does not mention
/// dry_run          : compute the would-be writes without writing
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SyncOptions {
    pub update_if_exists: bool,
    pub prune: bool,
    pub dry_run: bool,
}

impl SyncOptions {
    #[must_use]
    pub const fn updating() -> Self {
        Self {
            update_if_exists: true,
            prune: false,
            dry_run: false,
        }
    }

    #[must_use]
    pub const fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    #[must_use]
    pub const fn pruning(mut self) -> Self {
        self.prune = true;
        self
    }
}

///
/// SyncAction
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SyncAction {
    Created,
    Updated,
    Unchanged,
    Skipped,
}

impl SyncAction {
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

///
/// SyncOutcome
///
/// Result for one design document. `document` is the applied (or, in dry-run
/// mode, would-be-applied) definition; for `Unchanged`/`Skipped` it is the
/// stored one.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SyncOutcome {
    pub id: String,
    pub action: SyncAction,
    pub attempts: u32,
    pub document: DesignDocument,
}

///
/// SyncReport
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SyncReport {
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncReport {
    /// Documents written, or that would be written in dry-run mode.
    #[must_use]
    pub fn applied(&self) -> Vec<&DesignDocument> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.action.is_write())
            .map(|outcome| &outcome.document)
            .collect()
    }

    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.outcomes.iter().all(|outcome| !outcome.action.is_write())
    }
}

///
/// DesignSynchronizer
///
/// Reconciles desired design documents with the store. Concurrent
/// initializers racing on one document are expected: a revision conflict
/// re-fetches, re-merges and retries, up to `max_attempts` writes.
///

pub struct DesignSynchronizer {
    store: Arc<dyn DocumentStore>,
    max_attempts: u32,
    sink: Arc<dyn MetricsSink>,
}

impl DesignSynchronizer {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_DESIGN_ATTEMPTS,
            sink: Arc::new(GlobalMetricsSink),
        }
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Reconcile every desired document, in order.
    pub async fn sync(
        &self,
        desired: &[DesignDocument],
        options: SyncOptions,
    ) -> Result<SyncReport, InternalError> {
        let mut report = SyncReport::default();
        for doc in desired {
            report.outcomes.push(self.sync_one(doc, options).await?);
        }

        Ok(report)
    }

    /// Reconcile one desired document.
    pub async fn sync_one(
        &self,
        desired: &DesignDocument,
        options: SyncOptions,
    ) -> Result<SyncOutcome, InternalError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let current = self.store.get_design_document(&desired.id).await?;
            let exists = current.is_some();
            let (mut merged, changed) =
                merge_design_document(current.as_ref(), desired, options.prune);

            if !changed {
                return Ok(Self::outcome(desired, SyncAction::Unchanged, attempt, merged));
            }
            if exists && !options.update_if_exists {
                let stored = current.unwrap_or(merged);
                return Ok(Self::outcome(desired, SyncAction::Skipped, attempt, stored));
            }

            let action = if exists {
                SyncAction::Updated
            } else {
                SyncAction::Created
            };
            if options.dry_run {
                return Ok(Self::outcome(desired, action, attempt, merged));
            }

            match self.store.put_design_document(&merged).await {
                Ok(rev) => {
                    self.sink
                        .record(MetricsEvent::DesignWrite { conflicted: false });
                    tracing::debug!(id = %desired.id, %action, attempt, "design document written");
                    merged.rev = Some(rev);
                    return Ok(Self::outcome(desired, action, attempt, merged));
                }
                Err(err) if err.is_design_conflict() && attempt < self.max_attempts => {
                    self.sink
                        .record(MetricsEvent::DesignWrite { conflicted: true });
                    tracing::warn!(
                        id = %desired.id,
                        attempt,
                        max_attempts = self.max_attempts,
                        "design document conflict, retrying"
                    );
                }
                Err(err) => {
                    if err.is_design_conflict() {
                        self.sink
                            .record(MetricsEvent::DesignWrite { conflicted: true });
                    }
                    tracing::warn!(id = %desired.id, attempt, error = %err, "design document sync failed");
                    return Err(err);
                }
            }
        }
    }

    fn outcome(
        desired: &DesignDocument,
        action: SyncAction,
        attempts: u32,
        document: DesignDocument,
    ) -> SyncOutcome {
        SyncOutcome {
            id: desired.id.clone(),
            action,
            attempts,
            document,
        }
    }
}
