//! Background trigger for the generation and dispatch jobs.
//!
//! The loop wakes every poll interval, reads the settings, and fires when a local minute
//! matching the cron expression has passed since the previous poll. A minute fires at most
//! once, however often it is polled. The jobs themselves are plain async functions and know nothing about this loop.

pub mod cron;

use crate::{
    core::{
        dispatch::{DispatchSummary, Dispatcher},
        generation::{self, GenerationSummary},
        settings,
    },
    errors::Result,
    transport::MessageTransport,
};
use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveDateTime, Timelike, Utc};
use self::cron::CronSchedule;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What one firing did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    /// Scheduled local minute that fired
    pub fired_at: NaiveDateTime,
    /// One summary per generated year
    pub generated: Vec<GenerationSummary>,
    /// Dispatch outcome
    pub dispatch: DispatchSummary,
}

/// Years whose records the due window touches: today's year, plus next year when
/// `today + lead_days` already falls in it.
#[must_use]
pub fn generation_years(today: NaiveDate, lead_days: i32) -> Vec<i32> {
    let horizon = today + ChronoDuration::days(i64::from(lead_days));
    if horizon.year() > today.year() {
        vec![today.year(), horizon.year()]
    } else {
        vec![today.year()]
    }
}

/// Evaluates the schedule at `now` and runs the jobs if a matching minute has passed.
///
/// `last_evaluated` holds the local minute of the previous evaluation. The jobs run when a
/// matching minute lies in `(last_evaluated, now]`, so a late or infrequent poll still
/// catches the firing, and at most once however many matches the gap spans. With no previous
/// evaluation only the current minute is checked. Returns `None` when nothing ran.
pub async fn tick(
    dispatcher: &Dispatcher<'_, DatabaseConnection>,
    now: DateTime<Utc>,
    last_evaluated: &mut Option<NaiveDateTime>,
) -> Result<Option<TickReport>> {
    let db = dispatcher.db();
    let settings = settings::get_settings(db).await?;
    if !settings.enabled {
        debug!("Birthday notifications disabled; scheduler idle");
        *last_evaluated = None;
        return Ok(None);
    }

    let (tz, schedule) = match (
        settings::parse_timezone(&settings.timezone),
        CronSchedule::parse(&settings.schedule_expression),
    ) {
        (Ok(tz), Ok(schedule)) => (tz, schedule),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Scheduler settings are invalid; skipping tick");
            *last_evaluated = None;
            return Ok(None);
        }
    };

    let local = now.with_timezone(&tz).naive_local();
    let Some(minute) = local.with_second(0).and_then(|t| t.with_nanosecond(0)) else {
        return Ok(None);
    };
    let due_match = match last_evaluated.replace(minute) {
        Some(previous) if previous >= minute => None,
        Some(previous) => schedule.next_after(previous).filter(|next| *next <= minute),
        None => schedule.matches(&minute).then_some(minute),
    };
    let Some(fired_at) = due_match else {
        return Ok(None);
    };

    let today = minute.date();
    if fired_at != minute {
        info!(%fired_at, %minute, "Catching up a scheduled minute missed between polls");
    }
    info!(%fired_at, timezone = %settings.timezone, "Birthday schedule fired");

    let mut generated = Vec::new();
    for year in generation_years(today, settings.lead_days) {
        match generation::generate_for_year(db, year).await {
            Ok(summary) => generated.push(summary),
            Err(e) => error!(year, error = %e, "Birthday generation failed"),
        }
    }

    let dispatch = dispatcher.run(&settings, today).await?;

    Ok(Some(TickReport {
        fired_at,
        generated,
        dispatch,
    }))
}

/// Runs the trigger loop until `cancel` fires.
pub async fn run(
    db: DatabaseConnection,
    transport: Arc<dyn MessageTransport>,
    poll_interval: Duration,
    send_timeout: Duration,
    cancel: CancellationToken,
) {
    info!(
        poll_interval_secs = poll_interval.as_secs(),
        transport = transport.name(),
        "Birthday scheduler started"
    );

    let dispatcher = Dispatcher::new(&db, transport.as_ref(), send_timeout);
    let mut interval = tokio::time::interval(poll_interval);
    let mut last_evaluated = None;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                info!("Birthday scheduler stopping");
                break;
            }
            _ = interval.tick() => {
                match tick(&dispatcher, Utc::now(), &mut last_evaluated).await {
                    Ok(Some(report)) => info!(
                        sent = report.dispatch.sent,
                        failed = report.dispatch.failed,
                        "Scheduled birthday run finished"
                    ),
                    Ok(None) => {}
                    Err(e) => error!(error = %e, "Scheduled birthday run failed"),
                }
            }
        }
    }
}
