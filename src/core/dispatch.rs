//! Dispatch job - sends the notifications due today.
//!
//! Every due row goes through the same single-row path: claim it, render the message, hand it
//! to the transport under a timeout, then write SENT or FAILED through the compare-and-set in
//! [`records::complete_dispatch`]. One row failing never stops the others, and nothing is
//! retried automatically. FAILED rows wait for an operator resend.
//!
//! Each run first fails rows still claimed by a run that stopped partway, so no row stays
//! PENDING behind an abandoned claim.

use crate::{
    core::{
        profiles, records,
        records::DeliveryOutcome,
        recurrence, settings,
        template::{MessageContext, MessageTemplate},
    },
    entities::{alumni_profile, birthday_notification, notification_settings},
    errors::{Error, Result},
    transport::{self, MessageTransport},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::ConnectionTrait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Aggregate outcome of a dispatch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    /// Local date the run was evaluated for
    pub as_of: Option<NaiveDate>,
    /// Rows that were due
    pub due: usize,
    /// Rows this run claimed and tried to deliver
    pub attempted: usize,
    /// Rows moved to SENT
    pub sent: usize,
    /// Rows moved to FAILED
    pub failed: usize,
    /// Due rows another dispatcher claimed first
    pub skipped: usize,
    /// Rows left claimed by an interrupted run, moved to FAILED
    pub abandoned: u64,
    /// Set when the run did nothing because of the settings
    pub skipped_reason: Option<String>,
}

impl DispatchSummary {
    fn short_circuit(as_of: Option<NaiveDate>, reason: impl Into<String>) -> Self {
        Self {
            as_of,
            skipped_reason: Some(reason.into()),
            ..Self::default()
        }
    }
}

/// Claims older than this many send timeouts are treated as abandoned.
const STALE_CLAIM_TIMEOUTS: u32 = 4;

/// Lower bound on the age of an abandoned claim.
const MIN_STALE_CLAIM_AGE: Duration = Duration::from_secs(60);

enum RowOutcome {
    Sent,
    Failed,
    ClaimedElsewhere,
}

/// Everything needed to deliver messages: the store, a transport, and the per-send bound.
pub struct Dispatcher<'a, C> {
    db: &'a C,
    transport: &'a dyn MessageTransport,
    send_timeout: Duration,
}

impl<'a, C> Dispatcher<'a, C>
where
    C: ConnectionTrait,
{
    /// Creates a dispatcher over `db` delivering through `transport`.
    pub const fn new(db: &'a C, transport: &'a dyn MessageTransport, send_timeout: Duration) -> Self {
        Self {
            db,
            transport,
            send_timeout,
        }
    }

    /// The underlying connection.
    pub const fn db(&self) -> &'a C {
        self.db
    }

    /// "Send today's notifications now": loads the settings and dispatches for today in the
    /// configured timezone.
    ///
    /// Settings problems (disabled, unknown timezone, broken template) produce an empty
    /// summary with `skipped_reason` set, never an error.
    pub async fn send_due_now(&self) -> Result<DispatchSummary> {
        let settings = settings::get_settings(self.db).await?;
        if !settings.enabled {
            info!("Birthday notifications are disabled; nothing sent");
            return Ok(DispatchSummary::short_circuit(None, "notifications are disabled"));
        }
        let today = match settings::today_in(&settings) {
            Ok(today) => today,
            Err(e) => {
                warn!(error = %e, "Cannot determine today's date; nothing sent");
                return Ok(DispatchSummary::short_circuit(None, e.to_string()));
            }
        };
        self.run(&settings, today).await
    }

    /// Dispatches every row due on `as_of` under `settings`.
    #[instrument(skip(self, settings), fields(lead_days = settings.lead_days))]
    pub async fn run(
        &self,
        settings: &notification_settings::Model,
        as_of: NaiveDate,
    ) -> Result<DispatchSummary> {
        if !settings.enabled {
            info!("Birthday notifications are disabled; nothing sent");
            return Ok(DispatchSummary::short_circuit(
                Some(as_of),
                "notifications are disabled",
            ));
        }
        let template = match MessageTemplate::parse(&settings.message_template) {
            Ok(template) => template,
            Err(e) => {
                warn!(error = %e, "Message template is invalid; nothing sent");
                return Ok(DispatchSummary::short_circuit(Some(as_of), e.to_string()));
            }
        };

        let abandoned = records::fail_stale_claims(self.db, self.stale_claim_cutoff()).await?;
        let due = records::list_due(self.db, as_of, settings.lead_days).await?;
        let mut summary = DispatchSummary {
            as_of: Some(as_of),
            due: due.len(),
            abandoned,
            ..DispatchSummary::default()
        };

        for record in due {
            let record_id = record.id;
            match self.dispatch_row(settings, &template, record).await {
                Ok(RowOutcome::Sent) => {
                    summary.attempted += 1;
                    summary.sent += 1;
                }
                Ok(RowOutcome::Failed) => {
                    summary.attempted += 1;
                    summary.failed += 1;
                }
                Ok(RowOutcome::ClaimedElsewhere) => summary.skipped += 1,
                Err(e) => {
                    error!(record_id, error = %e, "Could not process birthday notification");
                    summary.attempted += 1;
                    summary.failed += 1;
                }
            }
        }

        info!(
            due = summary.due,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            abandoned = summary.abandoned,
            "Birthday dispatch finished"
        );
        Ok(summary)
    }

    async fn dispatch_row(
        &self,
        settings: &notification_settings::Model,
        template: &MessageTemplate,
        record: birthday_notification::Model,
    ) -> Result<RowOutcome> {
        let Some(token) = records::claim_for_dispatch(self.db, record.id).await? else {
            return Ok(RowOutcome::ClaimedElsewhere);
        };

        let outcome = match self.attempt(settings, template, &record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let failed = DeliveryOutcome::Failed {
                    reason: e.to_string(),
                };
                if let Err(write_err) =
                    records::complete_dispatch(self.db, record.id, &token, &failed).await
                {
                    error!(
                        record_id = record.id,
                        error = %write_err,
                        "Could not record dispatch failure; the claim will expire"
                    );
                }
                return Err(e);
            }
        };

        if !records::complete_dispatch(self.db, record.id, &token, &outcome).await? {
            // An operator touched the row mid-flight; their write wins
            return Ok(RowOutcome::ClaimedElsewhere);
        }
        Ok(match outcome {
            DeliveryOutcome::Delivered { .. } => RowOutcome::Sent,
            DeliveryOutcome::Failed { .. } => RowOutcome::Failed,
        })
    }

    async fn attempt(
        &self,
        settings: &notification_settings::Model,
        template: &MessageTemplate,
        record: &birthday_notification::Model,
    ) -> Result<DeliveryOutcome> {
        Ok(match profiles::get_profile(self.db, record.profile_id).await? {
            Some(profile) => self.deliver(settings, template, record, &profile).await,
            None => DeliveryOutcome::Failed {
                reason: format!("profile {} no longer exists", record.profile_id),
            },
        })
    }

    /// Claims taken before this instant belong to a dispatcher that never finished.
    fn stale_claim_cutoff(&self) -> DateTime<Utc> {
        let age = self
            .send_timeout
            .saturating_mul(STALE_CLAIM_TIMEOUTS)
            .max(MIN_STALE_CLAIM_AGE);
        let age = chrono::Duration::from_std(age).unwrap_or_else(|_| chrono::Duration::days(1));
        Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Renders and sends one record's message. Never touches the store.
    pub(crate) async fn deliver(
        &self,
        settings: &notification_settings::Model,
        template: &MessageTemplate,
        record: &birthday_notification::Model,
        profile: &alumni_profile::Model,
    ) -> DeliveryOutcome {
        let Some(phone_number) = profile.phone_number.as_deref().filter(|p| !p.trim().is_empty())
        else {
            warn!(
                record_id = record.id,
                profile_id = profile.id,
                "No phone number on file"
            );
            return DeliveryOutcome::Failed {
                reason: "no phone number on file".to_string(),
            };
        };

        let message = compose(template, settings, profile, record.birth_date, record.year);
        match self
            .send(phone_number, &message, settings.attachment_image_url.as_deref())
            .await
        {
            Ok(()) => {
                info!(
                    record_id = record.id,
                    profile_id = profile.id,
                    transport = self.transport.name(),
                    "Birthday message sent"
                );
                DeliveryOutcome::Delivered { at: Utc::now() }
            }
            Err(e) => {
                warn!(
                    record_id = record.id,
                    profile_id = profile.id,
                    error = %e,
                    "Birthday message failed"
                );
                DeliveryOutcome::Failed {
                    reason: failure_reason(e),
                }
            }
        }
    }

    /// One bounded transport call.
    pub(crate) async fn send(
        &self,
        phone_number: &str,
        message: &str,
        attachment_url: Option<&str>,
    ) -> Result<()> {
        transport::send_with_timeout(
            self.transport,
            self.send_timeout,
            phone_number,
            message,
            attachment_url,
        )
        .await
    }
}

/// Renders the message a profile receives for its occurrence in `year`.
pub(crate) fn compose(
    template: &MessageTemplate,
    settings: &notification_settings::Model,
    profile: &alumni_profile::Model,
    birth_date: NaiveDate,
    year: i32,
) -> String {
    let context = MessageContext {
        name: &profile.full_name,
        cohort: profile.alumni_cohort.as_deref(),
        age: recurrence::age_at_occurrence(birth_date, year),
        year,
    };
    template.render(&context, settings.include_age)
}

fn failure_reason(error: Error) -> String {
    match error {
        Error::Transport { reason } => reason,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::generation::generate_for_year;
    use crate::core::report;
    use crate::core::settings::{SettingsUpdate, get_settings, update_settings};
    use crate::entities::NotificationStatus;
    use sea_orm::{ActiveModelTrait, Set};
    use crate::test_utils::{
        ProfileSeed, RecordingTransport, create_profile, date, setup_test_db,
    };

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn test_end_to_end_generate_then_send() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;

        let generated = generate_for_year(&db, 2025).await?;
        assert_eq!(generated.created, 1);
        let record = records::get(&db, profile.id, 2025).await?.unwrap();
        assert_eq!(record.occurrence_date, date(2025, 6, 15));
        assert_eq!(record.status, NotificationStatus::Pending);

        let transport = RecordingTransport::new();
        let dispatcher = Dispatcher::new(&db, &transport, TIMEOUT);
        let settings = get_settings(&db).await?;
        let summary = dispatcher.run(&settings, date(2025, 6, 15)).await?;

        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(transport.call_count(), 1);
        let sent = transport.sent();
        assert_eq!(sent[0].phone_number, "+6281200000000");
        assert!(sent[0].message.contains("Rina"));
        assert!(sent[0].message.contains("turning 35"));

        let stored = records::get_by_id(&db, record.id).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
        assert!(stored.sent_at.is_some());

        // A second run finds nothing due
        let again = dispatcher.run(&settings, date(2025, 6, 15)).await?;
        assert_eq!(again.due, 0);
        assert_eq!(transport.call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_runs_send_at_most_once() -> Result<()> {
        let db = setup_test_db().await?;
        for name in ["Rina", "Budi", "Sari"] {
            create_profile(&db, ProfileSeed::born(name, date(1990, 6, 15))).await?;
        }
        generate_for_year(&db, 2025).await?;

        let transport = RecordingTransport::stalling(Duration::from_millis(50));
        let dispatcher = Dispatcher::new(&db, &transport, TIMEOUT);
        let settings = get_settings(&db).await?;

        let (first, second) = tokio::join!(
            dispatcher.run(&settings, date(2025, 6, 15)),
            dispatcher.run(&settings, date(2025, 6, 15)),
        );
        let (first, second) = (first?, second?);

        assert_eq!(first.sent + second.sent, 3);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.sent().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_abandoned_claim_is_failed_on_next_run() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        generate_for_year(&db, 2025).await?;
        let record = records::get(&db, profile.id, 2025).await?.unwrap();

        // A dispatcher claimed the row an hour ago and never came back
        records::claim_for_dispatch(&db, record.id).await?.unwrap();
        let claimed = records::get_by_id(&db, record.id).await?.unwrap();
        let mut backdated: birthday_notification::ActiveModel = claimed.into();
        backdated.claimed_at = Set(Some(Utc::now() - chrono::Duration::hours(1)));
        backdated.update(&db).await?;

        let transport = RecordingTransport::new();
        let dispatcher = Dispatcher::new(&db, &transport, TIMEOUT);
        let settings = get_settings(&db).await?;
        let summary = dispatcher.run(&settings, date(2025, 6, 15)).await?;

        assert_eq!(summary.abandoned, 1);
        assert_eq!(summary.due, 0);
        assert_eq!(transport.call_count(), 0);

        let stored = records::get_by_id(&db, record.id).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some(records::STALE_CLAIM_ERROR));
        assert!(stored.claim_token.is_none());

        let stats = report::statistics(&db, 2025).await?;
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.failed, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_fresh_claim_is_left_to_its_owner() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        generate_for_year(&db, 2025).await?;
        let record = records::get(&db, profile.id, 2025).await?.unwrap();
        records::claim_for_dispatch(&db, record.id).await?.unwrap();

        let transport = RecordingTransport::new();
        let dispatcher = Dispatcher::new(&db, &transport, TIMEOUT);
        let settings = get_settings(&db).await?;
        let summary = dispatcher.run(&settings, date(2025, 6, 15)).await?;

        assert_eq!(summary.abandoned, 0);
        assert_eq!(transport.call_count(), 0);
        let stored = records::get_by_id(&db, record.id).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_failure_does_not_stop_batch() -> Result<()> {
        let db = setup_test_db().await?;
        let reachable =
            create_profile(&db, ProfileSeed::born("Reachable", date(1991, 6, 15))).await?;
        let unreachable = create_profile(
            &db,
            ProfileSeed {
                phone_number: None,
                ..ProfileSeed::born("No Phone", date(1992, 6, 15))
            },
        )
        .await?;
        generate_for_year(&db, 2025).await?;

        let transport = RecordingTransport::new();
        let dispatcher = Dispatcher::new(&db, &transport, TIMEOUT);
        let settings = get_settings(&db).await?;
        let summary = dispatcher.run(&settings, date(2025, 6, 15)).await?;

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.sent, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(transport.call_count(), 1);

        let failed = records::get(&db, unreachable.id, 2025).await?.unwrap();
        assert_eq!(failed.status, NotificationStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("no phone number on file"));
        let sent = records::get(&db, reachable.id, 2025).await?.unwrap();
        assert_eq!(sent.status, NotificationStatus::Sent);
        Ok(())
    }

    #[tokio::test]
    async fn test_transport_failure_is_recorded() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        generate_for_year(&db, 2025).await?;

        let transport = RecordingTransport::failing("invalid phone number");
        let dispatcher = Dispatcher::new(&db, &transport, TIMEOUT);
        let settings = get_settings(&db).await?;
        let summary = dispatcher.run(&settings, date(2025, 6, 15)).await?;
        assert_eq!(summary.failed, 1);

        let stored = records::get(&db, profile.id, 2025).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("invalid phone number"));
        assert!(stored.claim_token.is_none());

        // FAILED rows are not retried by the next run
        dispatcher.run(&settings, date(2025, 6, 15)).await?;
        assert_eq!(transport.call_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_timeout_marks_row_failed() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        generate_for_year(&db, 2025).await?;

        let transport = RecordingTransport::stalling(Duration::from_secs(5));
        let dispatcher = Dispatcher::new(&db, &transport, Duration::from_millis(50));
        let settings = get_settings(&db).await?;
        let summary = dispatcher.run(&settings, date(2025, 6, 15)).await?;
        assert_eq!(summary.failed, 1);

        let stored = records::get(&db, profile.id, 2025).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(
            stored.last_error.as_deref(),
            Some("transport timed out after 50ms")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_disabled_settings_are_a_no_op() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        generate_for_year(&db, 2025).await?;
        let settings = update_settings(
            &db,
            SettingsUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await?;

        let transport = RecordingTransport::new();
        let dispatcher = Dispatcher::new(&db, &transport, TIMEOUT);
        let summary = dispatcher.run(&settings, date(2025, 6, 15)).await?;
        assert_eq!(
            summary.skipped_reason.as_deref(),
            Some("notifications are disabled")
        );
        assert_eq!(transport.call_count(), 0);

        let now = dispatcher.send_due_now().await?;
        assert!(now.skipped_reason.is_some());

        let stored = records::get(&db, profile.id, 2025).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Pending);
        Ok(())
    }

    #[tokio::test]
    async fn test_lead_days_and_age_toggle() -> Result<()> {
        let db = setup_test_db().await?;
        create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        generate_for_year(&db, 2025).await?;
        let settings = update_settings(
            &db,
            SettingsUpdate {
                lead_days: Some(2),
                include_age: Some(false),
                attachment_image_url: Some(Some("https://cdn.example.org/cake.png".to_string())),
                ..Default::default()
            },
        )
        .await?;

        let transport = RecordingTransport::new();
        let dispatcher = Dispatcher::new(&db, &transport, TIMEOUT);

        let too_early = dispatcher.run(&settings, date(2025, 6, 12)).await?;
        assert_eq!(too_early.due, 0);
        let on_time = dispatcher.run(&settings, date(2025, 6, 13)).await?;
        assert_eq!(on_time.sent, 1);

        let sent = transport.sent();
        assert!(!sent[0].message.contains("35"));
        assert_eq!(
            sent[0].attachment_url.as_deref(),
            Some("https://cdn.example.org/cake.png")
        );
        Ok(())
    }
}
