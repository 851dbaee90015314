//! Moving posts between days
//!
//! A reschedule changes only the calendar date of a post. Hour and minute are
//! kept as they read in the calendar time zone, seconds are dropped. There is
//! no locking: two concurrent reschedules of the same post both succeed and
//! the last write wins.

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::{info, warn};

use super::events::{Event, EventBus};
use crate::calendar::combine_date_time;
use crate::error::{Result, SchedcastError};
use crate::repository::PostRepository;
use crate::types::{PostUpdate, ScheduledPost};

/// Same local hour and minute as `current`, on `target_date`.
///
/// # Errors
///
/// `Validation` if that local time does not exist on `target_date` (DST gap).
pub fn move_to_date(
    current: DateTime<Utc>,
    target_date: NaiveDate,
    tz: &Tz,
) -> Result<DateTime<Utc>> {
    let local = current.with_timezone(tz);
    let time = NaiveTime::from_hms_opt(local.hour(), local.minute(), 0).ok_or_else(|| {
        SchedcastError::Validation(format!("cannot read time of day from {}", current))
    })?;
    combine_date_time(target_date, time, tz)
}

#[derive(Clone)]
pub struct RescheduleService {
    posts: Arc<dyn PostRepository>,
    timezone: Tz,
    event_bus: EventBus,
}

impl RescheduleService {
    pub fn new(posts: Arc<dyn PostRepository>, timezone: Tz, event_bus: EventBus) -> Self {
        Self {
            posts,
            timezone,
            event_bus,
        }
    }

    /// Move a post to `target_date`, keeping its time of day
    ///
    /// Past dates are accepted.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the post does not exist or is deleted mid-operation
    /// - `Validation` if the post is already published, failed or cancelled,
    ///   or its time of day does not exist on `target_date`
    pub async fn reschedule(&self, post_id: &str, target_date: NaiveDate) -> Result<ScheduledPost> {
        let post = self.posts.get_post(post_id).await?;

        if post.status.is_terminal() {
            return Err(SchedcastError::Validation(format!(
                "post {} is {} and can no longer be moved",
                post.id, post.status
            )));
        }

        let scheduled_at = move_to_date(post.scheduled_at, target_date, &self.timezone)?;

        let today = Utc::now().with_timezone(&self.timezone).date_naive();
        if target_date < today {
            warn!(post_id, %target_date, "rescheduling post into the past");
        }

        let updated = self
            .posts
            .update_post(post_id, PostUpdate::scheduled_at(scheduled_at))
            .await?;

        info!(
            post_id,
            from = %post.scheduled_at,
            to = %updated.scheduled_at,
            "post rescheduled"
        );
        self.event_bus.emit(Event::PostRescheduled {
            post_id: updated.id.clone(),
            previous: post.scheduled_at,
            scheduled_at: updated.scheduled_at,
        });

        Ok(updated)
    }
}
