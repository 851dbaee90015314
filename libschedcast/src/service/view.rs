//! Calendar view state
//!
//! [`CalendarView`] is the state a calendar screen keeps between user actions:
//! the month being shown, the selected day and post, the post currently being
//! dragged, and the posts of the shown month grouped by day. Rendering and
//! hover/drag visuals belong to the caller.

use chrono::NaiveDate;
use tracing::warn;

use super::reschedule::RescheduleService;
use super::scheduling::{PostsByDay, SchedulingService};
use crate::calendar::{first_of_month, month_grid, shift_month, MonthGrid};
use crate::error::{Result, SchedcastError};
use crate::types::ScheduledPost;

pub struct CalendarView {
    scheduling: SchedulingService,
    reschedule: RescheduleService,
    owner_id: String,
    reference_date: NaiveDate,
    selected_date: Option<NaiveDate>,
    selected_post: Option<String>,
    dragging: Option<String>,
    posts_by_day: PostsByDay,
}

impl CalendarView {
    /// Create a view on the month of `reference_date`. Nothing is loaded until
    /// [`CalendarView::reload`] is called.
    pub fn new(
        scheduling: SchedulingService,
        reschedule: RescheduleService,
        owner_id: impl Into<String>,
        reference_date: NaiveDate,
    ) -> Self {
        Self {
            scheduling,
            reschedule,
            owner_id: owner_id.into(),
            reference_date: first_of_month(reference_date),
            selected_date: None,
            selected_post: None,
            dragging: None,
            posts_by_day: PostsByDay::new(),
        }
    }

    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }

    pub fn selected_date(&self) -> Option<NaiveDate> {
        self.selected_date
    }

    pub fn dragging(&self) -> Option<&str> {
        self.dragging.as_deref()
    }

    pub fn grid(&self) -> MonthGrid {
        month_grid(self.reference_date)
    }

    pub fn posts_by_day(&self) -> &PostsByDay {
        &self.posts_by_day
    }

    pub fn posts_on(&self, date: NaiveDate) -> &[ScheduledPost] {
        self.posts_by_day
            .get(&date)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Re-read the posts of the shown month
    pub async fn reload(&mut self) -> Result<()> {
        self.posts_by_day = self
            .scheduling
            .posts_in_month(&self.owner_id, self.reference_date)
            .await?;

        if let Some(id) = &self.selected_post {
            if self.find(id).is_none() {
                self.selected_post = None;
            }
        }
        Ok(())
    }

    pub fn select_date(&mut self, date: NaiveDate) {
        self.selected_date = Some(date);
        self.selected_post = None;
    }

    /// Select a loaded post
    ///
    /// # Errors
    ///
    /// `NotFound` if the post is not in the shown month.
    pub fn select_post(&mut self, post_id: &str) -> Result<&ScheduledPost> {
        let day = self
            .find(post_id)
            .ok_or_else(|| SchedcastError::post_not_found(post_id))?
            .scheduled_at
            .with_timezone(&self.scheduling.timezone())
            .date_naive();
        self.selected_date = Some(day);
        self.selected_post = Some(post_id.to_string());
        self.find(post_id)
            .ok_or_else(|| SchedcastError::post_not_found(post_id))
    }

    pub fn selected_post(&self) -> Option<&ScheduledPost> {
        self.selected_post.as_deref().and_then(|id| self.find(id))
    }

    pub async fn next_month(&mut self) -> Result<()> {
        self.shift(1).await
    }

    pub async fn previous_month(&mut self) -> Result<()> {
        self.shift(-1).await
    }

    async fn shift(&mut self, delta: i32) -> Result<()> {
        self.reference_date = shift_month(self.reference_date, delta).ok_or_else(|| {
            SchedcastError::Validation("month is outside the supported range".to_string())
        })?;
        self.selected_date = None;
        self.selected_post = None;
        self.reload().await
    }

    /// Mark a loaded post as the one being moved
    pub fn begin_drag(&mut self, post_id: &str) -> Result<()> {
        if self.find(post_id).is_none() {
            return Err(SchedcastError::post_not_found(post_id));
        }
        self.dragging = Some(post_id.to_string());
        Ok(())
    }

    pub fn cancel_drag(&mut self) {
        self.dragging = None;
    }

    /// Move the dragged post to `target_date`, then reload
    ///
    /// The drag state is cleared whether or not the move succeeds. The result
    /// is the reschedule's; a failed reload is only logged and leaves the
    /// previously loaded posts in place.
    ///
    /// # Errors
    ///
    /// `Validation` if nothing is being dragged, otherwise whatever the
    /// reschedule returned.
    pub async fn commit_drop(&mut self, target_date: NaiveDate) -> Result<ScheduledPost> {
        let post_id = self
            .dragging
            .take()
            .ok_or_else(|| SchedcastError::Validation("no post is being moved".to_string()))?;

        let moved = self.reschedule.reschedule(&post_id, target_date).await;

        if let Err(e) = self.reload().await {
            warn!(post_id = %post_id, error = %e, "calendar reload after drop failed");
        }

        moved
    }

    /// Delete a post and reload
    pub async fn delete_post(&mut self, post_id: &str) -> Result<()> {
        self.scheduling.delete_post(post_id).await?;
        if self.dragging.as_deref() == Some(post_id) {
            self.dragging = None;
        }
        self.reload().await
    }

    fn find(&self, post_id: &str) -> Option<&ScheduledPost> {
        self.posts_by_day
            .values()
            .flatten()
            .find(|post| post.id == post_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticToken;
    use crate::publish::mock::MockPublisher;
    use crate::repository::memory::{MemoryConnectionRegistry, MemoryPostRepository};
    use crate::repository::PostRepository;
    use crate::service::events::EventBus;
    use crate::types::{Platform, PostDraft, PostStatus, PostUpdate};
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::Arc;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seed(repo: &MemoryPostRepository, at: DateTime<Utc>) -> ScheduledPost {
        repo.create_post(
            "owner-1",
            PostDraft {
                connection_id: "conn-1".to_string(),
                platform: Platform::Facebook,
                image_url: "https://cdn.example.com/a.jpg".to_string(),
                caption: "hi".to_string(),
                scheduled_at: at,
            },
        )
        .await
        .unwrap()
    }

    fn view(repo: &MemoryPostRepository, reference: NaiveDate) -> CalendarView {
        let bus = EventBus::new(16);
        let posts: Arc<dyn PostRepository> = Arc::new(repo.clone());
        let scheduling = SchedulingService::new(
            Arc::clone(&posts),
            Arc::new(MemoryConnectionRegistry::new()),
            Arc::new(MockPublisher::success()),
            Arc::new(StaticToken::new("tok")),
            chrono_tz::UTC,
            bus.clone(),
        );
        let reschedule = RescheduleService::new(posts, chrono_tz::UTC, bus);
        CalendarView::new(scheduling, reschedule, "owner-1", reference)
    }

    #[tokio::test]
    async fn test_reload_and_grid() {
        let repo = MemoryPostRepository::new();
        seed(&repo, Utc.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()).await;
        seed(&repo, Utc.with_ymd_and_hms(2024, 8, 2, 9, 0, 0).unwrap()).await;

        let mut view = view(&repo, ymd(2024, 7, 22));
        assert_eq!(view.reference_date(), ymd(2024, 7, 1));
        assert!(view.posts_by_day().is_empty());

        view.reload().await.unwrap();
        assert_eq!(view.grid().leading_placeholders(), 1);
        assert_eq!(view.posts_on(ymd(2024, 7, 10)).len(), 1);
        assert!(view.posts_on(ymd(2024, 7, 11)).is_empty());
        assert_eq!(view.posts_by_day().len(), 1);
    }

    #[tokio::test]
    async fn test_month_navigation_reloads() {
        let repo = MemoryPostRepository::new();
        seed(&repo, Utc.with_ymd_and_hms(2024, 8, 2, 9, 0, 0).unwrap()).await;

        let mut view = view(&repo, ymd(2024, 7, 1));
        view.select_date(ymd(2024, 7, 4));
        view.next_month().await.unwrap();

        assert_eq!(view.reference_date(), ymd(2024, 8, 1));
        assert_eq!(view.selected_date(), None);
        assert_eq!(view.posts_on(ymd(2024, 8, 2)).len(), 1);

        view.previous_month().await.unwrap();
        view.previous_month().await.unwrap();
        assert_eq!(view.reference_date(), ymd(2024, 6, 1));
    }

    #[tokio::test]
    async fn test_select_post_selects_its_day() {
        let repo = MemoryPostRepository::new();
        let post = seed(&repo, Utc.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()).await;

        let mut view = view(&repo, ymd(2024, 7, 1));
        view.reload().await.unwrap();

        assert_eq!(view.select_post(&post.id).unwrap().id, post.id);
        assert_eq!(view.selected_date(), Some(ymd(2024, 7, 10)));
        assert_eq!(view.selected_post().map(|p| p.id.as_str()), Some(post.id.as_str()));

        view.select_date(ymd(2024, 7, 12));
        assert!(view.selected_post().is_none());
        assert!(matches!(
            view.select_post("missing"),
            Err(SchedcastError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_drag_and_drop_moves_post() {
        let repo = MemoryPostRepository::new();
        let post = seed(&repo, Utc.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()).await;

        let mut view = view(&repo, ymd(2024, 7, 1));
        view.reload().await.unwrap();
        view.begin_drag(&post.id).unwrap();
        assert_eq!(view.dragging(), Some(post.id.as_str()));

        let moved = view.commit_drop(ymd(2024, 7, 15)).await.unwrap();

        assert_eq!(
            moved.scheduled_at,
            Utc.with_ymd_and_hms(2024, 7, 15, 14, 30, 0).unwrap()
        );
        assert_eq!(view.dragging(), None);
        assert!(view.posts_on(ymd(2024, 7, 10)).is_empty());
        assert_eq!(view.posts_on(ymd(2024, 7, 15)).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_drop_clears_drag() {
        let repo = MemoryPostRepository::new();
        let post = seed(&repo, Utc.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()).await;
        repo.update_post(&post.id, PostUpdate::status(PostStatus::Cancelled))
            .await
            .unwrap();

        let mut view = view(&repo, ymd(2024, 7, 1));
        view.reload().await.unwrap();
        view.begin_drag(&post.id).unwrap();

        let result = view.commit_drop(ymd(2024, 7, 15)).await;

        assert!(matches!(result, Err(SchedcastError::Validation(_))));
        assert_eq!(view.dragging(), None);
        assert_eq!(view.posts_on(ymd(2024, 7, 10)).len(), 1);
    }

    #[tokio::test]
    async fn test_drop_reports_move_when_reload_fails() {
        let repo = MemoryPostRepository::new();
        let post = seed(&repo, Utc.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()).await;

        let mut view = view(&repo, ymd(2024, 7, 1));
        view.reload().await.unwrap();
        view.begin_drag(&post.id).unwrap();
        repo.fail_lists(Some("database is locked"));

        let moved = view.commit_drop(ymd(2024, 7, 15)).await.unwrap();

        assert_eq!(
            moved.scheduled_at,
            Utc.with_ymd_and_hms(2024, 7, 15, 14, 30, 0).unwrap()
        );
        assert_eq!(view.dragging(), None);
        // the stale month stays on screen until the next successful reload
        assert_eq!(view.posts_on(ymd(2024, 7, 10)).len(), 1);

        repo.fail_lists(None);
        view.reload().await.unwrap();
        assert_eq!(view.posts_on(ymd(2024, 7, 15)).len(), 1);
    }

    #[tokio::test]
    async fn test_drop_without_drag() {
        let repo = MemoryPostRepository::new();
        let mut view = view(&repo, ymd(2024, 7, 1));

        assert!(matches!(
            view.commit_drop(ymd(2024, 7, 15)).await,
            Err(SchedcastError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_drag() {
        let repo = MemoryPostRepository::new();
        let post = seed(&repo, Utc.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()).await;

        let mut view = view(&repo, ymd(2024, 7, 1));
        view.reload().await.unwrap();
        assert!(view.begin_drag("missing").is_err());

        view.begin_drag(&post.id).unwrap();
        view.cancel_drag();
        assert_eq!(view.dragging(), None);
    }

    #[tokio::test]
    async fn test_delete_from_view() {
        let repo = MemoryPostRepository::new();
        let post = seed(&repo, Utc.with_ymd_and_hms(2024, 7, 10, 14, 30, 0).unwrap()).await;

        let mut view = view(&repo, ymd(2024, 7, 1));
        view.reload().await.unwrap();
        view.select_post(&post.id).unwrap();

        view.delete_post(&post.id).await.unwrap();

        assert!(view.selected_post().is_none());
        assert!(view.posts_by_day().is_empty());
        assert!(matches!(
            view.delete_post(&post.id).await,
            Err(SchedcastError::NotFound(_))
        ));
    }
}
