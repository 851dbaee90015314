//! Service layer for Schedcast
//!
//! Business logic shared by every front end (the `sched-queue` CLI, an
//! embedding UI). `SchedcastService` is the facade; it wires the storage,
//! publish and identity adapters once and hands out the sub-services:
//!
//! - [`SchedulingService`]: create, dispatch, list, cancel and delete posts
//! - [`RescheduleService`]: move posts to another day
//! - [`CalendarView`]: per-screen state on top of both
//! - [`EventBus`]: change notifications
//!
//! # Example
//!
//! ```no_run
//! use libschedcast::service::SchedcastService;
//! use libschedcast::Config;
//!
//! # async fn example() -> libschedcast::Result<()> {
//! let config = Config::load()?;
//! let service = SchedcastService::from_config(config).await?;
//!
//! let posts = service.scheduling().list_posts("default").await?;
//! println!("{} posts", posts.len());
//! # Ok(())
//! # }
//! ```

pub mod events;
pub mod reschedule;
pub mod scheduling;
pub mod view;

pub use self::events::{Event, EventBus};
pub use self::reschedule::{move_to_date, RescheduleService};
pub use self::scheduling::{DeliveryOutcome, PostsByDay, ScheduleRequest, SchedulingService};
pub use self::view::CalendarView;

use chrono::NaiveDate;
use chrono_tz::Tz;
use std::sync::Arc;
use tracing::info;

use crate::config::{resolve_db_path, Config};
use crate::db::Database;
use crate::error::{ConfigError, Result};
use crate::identity::{EnvTokenProvider, IdentityProvider};
use crate::publish::http::HttpPublisher;
use crate::publish::{PublishService, UnconfiguredPublisher};
use crate::repository::{ConnectionRegistry, PostRepository};

const DEFAULT_TOKEN_ENV: &str = "SCHEDCAST_TOKEN";

/// Main service facade
///
/// All sub-services share the same adapters and the same event bus.
pub struct SchedcastService {
    connections: Arc<dyn ConnectionRegistry>,
    scheduling: SchedulingService,
    reschedule: RescheduleService,
    event_bus: EventBus,
}

impl SchedcastService {
    /// Build the production stack: SQLite storage, HTTP publisher (when a
    /// `[publish]` section exists) and a token read from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the calendar time zone or publish endpoint is
    /// invalid, or the database cannot be opened or migrated.
    pub async fn from_config(config: Config) -> Result<Self> {
        let timezone = config.timezone()?;

        let db_path = resolve_db_path(Some(&config.database.path))?;
        let db_path_str = db_path.to_str().ok_or_else(|| ConfigError::InvalidValue {
            field: "database.path".to_string(),
            reason: "path is not valid UTF-8".to_string(),
        })?;
        let db = Arc::new(Database::new(db_path_str).await?);

        let (publisher, token_env): (Arc<dyn PublishService>, String) = match &config.publish {
            Some(publish) => (
                Arc::new(HttpPublisher::from_config(publish)?),
                publish.token_env.clone(),
            ),
            None => {
                info!("no [publish] section configured, posts will be stored without dispatch");
                (Arc::new(UnconfiguredPublisher), DEFAULT_TOKEN_ENV.to_string())
            }
        };

        Ok(Self::with_components(
            db.clone(),
            db,
            publisher,
            Arc::new(EnvTokenProvider::new(token_env)),
            timezone,
        ))
    }

    /// Assemble the service from explicit adapters
    pub fn with_components(
        posts: Arc<dyn PostRepository>,
        connections: Arc<dyn ConnectionRegistry>,
        publisher: Arc<dyn PublishService>,
        identity: Arc<dyn IdentityProvider>,
        timezone: Tz,
    ) -> Self {
        let event_bus = EventBus::new(100);

        let scheduling = SchedulingService::new(
            Arc::clone(&posts),
            Arc::clone(&connections),
            publisher,
            identity,
            timezone,
            event_bus.clone(),
        );
        let reschedule = RescheduleService::new(posts, timezone, event_bus.clone());

        Self {
            connections,
            scheduling,
            reschedule,
            event_bus,
        }
    }

    /// Connection registry, for registering and removing accounts
    pub fn connections(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.connections
    }

    pub fn scheduling(&self) -> &SchedulingService {
        &self.scheduling
    }

    pub fn reschedule(&self) -> &RescheduleService {
        &self.reschedule
    }

    pub fn timezone(&self) -> Tz {
        self.scheduling.timezone()
    }

    /// Fresh view state on the month of `reference_date`
    pub fn calendar_view(&self, owner_id: &str, reference_date: NaiveDate) -> CalendarView {
        CalendarView::new(
            self.scheduling.clone(),
            self.reschedule.clone(),
            owner_id,
            reference_date,
        )
    }

    pub fn subscribe(&self) -> events::EventReceiver {
        self.event_bus.subscribe()
    }
}
