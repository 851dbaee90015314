//! sched-queue - Plan and manage scheduled posts
//!
//! Unix-style front end for the Schedcast calendar.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use libschedcast::calendar::{combine_date_time, parse_date, parse_month, parse_time, CalendarCell};
use libschedcast::logging::LoggingConfig;
use libschedcast::service::events::Event;
use libschedcast::service::{DeliveryOutcome, ScheduleRequest};
use libschedcast::{
    Config, Connection, NewConnection, Platform, PostStatus, SchedcastError, SchedcastService,
    ScheduledPost,
};
use std::io::{self, Write};

#[derive(Parser, Debug)]
#[command(name = "sched-queue")]
#[command(version)]
#[command(about = "Plan and manage scheduled posts")]
#[command(long_about = "\
sched-queue - Plan and manage scheduled posts

DESCRIPTION:
    sched-queue plans image posts for connected Facebook and Instagram accounts
    on a month calendar. New posts are stored locally, then dispatched to the
    configured publish service. Posts can be moved to another day, cancelled,
    marked with their delivery outcome, or deleted.

COMMANDS:
    connections  List, add or remove connected accounts
    calendar     Show a month grid with the posts on each day
    list         List all posts
    schedule     Schedule a new post
    retry        Dispatch a stored post again
    reschedule   Move a post to another day, keeping its time
    cancel       Cancel a scheduled post
    mark         Record that a post was published or failed
    delete       Permanently delete a post

USAGE EXAMPLES:
    # Register an account authorized elsewhere
    sched-queue connections add --platform instagram --label @cornerbakery

    # Show July 2024
    sched-queue calendar --month 2024-07

    # Schedule a post
    sched-queue schedule --connection <CONNECTION_ID> --platform instagram \\
        --image https://cdn.example.com/bread.jpg --caption \"Fresh bread\" \\
        --date 2024-07-10 --time 14:30

    # Move it to the 15th, same time of day
    sched-queue reschedule <POST_ID> 2024-07-15

    # Delete without the confirmation prompt
    sched-queue delete <POST_ID> --force

CONFIGURATION:
    Configuration file: ~/.config/schedcast/config.toml
    Database location: ~/.local/share/schedcast/posts.db

    Override with environment variables:
        SCHEDCAST_CONFIG      - Path to config file
        SCHEDCAST_DB_PATH     - Path to database file
        SCHEDCAST_TOKEN       - Bearer token for the publish service
        SCHEDCAST_LOG_FORMAT  - text, json or pretty
        SCHEDCAST_LOG_LEVEL   - error, warn, info, debug or trace

EXIT CODES:
    0 - Success
    1 - Operation failed (storage, dispatch, configuration)
    2 - Publish service refused the credential
    3 - Invalid input or unknown post/connection
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Owner whose calendar to use (defaults to [defaults] owner_id)
    #[arg(long, global = true, env = "SCHEDCAST_OWNER")]
    owner: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage connected accounts
    Connections {
        #[command(subcommand)]
        action: ConnectionCommands,
    },

    /// Show a month calendar
    Calendar {
        /// Month to show (YYYY-MM), defaults to the current month
        #[arg(short, long)]
        month: Option<String>,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// List posts, earliest first
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Only posts with this status
        #[arg(short, long)]
        status: Option<String>,
    },

    /// Schedule a new post
    Schedule {
        /// Connection to publish through
        #[arg(short, long)]
        connection: String,

        /// Platform of the connection: facebook or instagram
        #[arg(short, long)]
        platform: String,

        /// Public URL of the image
        #[arg(short, long)]
        image: String,

        /// Caption text
        #[arg(long, default_value = "")]
        caption: String,

        /// Day to publish (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Time of day in the calendar time zone (HH:MM)
        #[arg(short, long)]
        time: String,
    },

    /// Dispatch a stored post that never reached the publish service
    Retry {
        post_id: String,
    },

    /// Move a post to another day
    Reschedule {
        post_id: String,

        /// New day (YYYY-MM-DD)
        date: String,
    },

    /// Cancel a scheduled post
    Cancel {
        post_id: String,
    },

    /// Record the delivery outcome reported by the platform
    Mark {
        post_id: String,

        /// published or failed
        outcome: String,
    },

    /// Permanently delete a post
    Delete {
        post_id: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ConnectionCommands {
    /// List connected accounts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Register an account authorized outside sched-queue
    Add {
        /// facebook or instagram
        #[arg(short, long)]
        platform: String,

        /// Page or account name shown in listings
        #[arg(short, long)]
        label: String,

        /// Granted permission scope
        #[arg(long)]
        scope: Option<String>,
    },

    /// Remove a connection; its posts are kept
    Remove {
        connection_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    logging.verbose = cli.verbose;
    logging.init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        let code = e
            .downcast_ref::<SchedcastError>()
            .map_or(1, SchedcastError::exit_code);
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    let owner = cli
        .owner
        .clone()
        .unwrap_or_else(|| config.defaults.owner_id.clone());
    tracing::debug!(owner = %owner, "loaded configuration");

    let service = SchedcastService::from_config(config).await?;

    match cli.command {
        Commands::Connections { action } => match action {
            ConnectionCommands::List { format } => {
                cmd_connections_list(&service, &owner, parse_format(&format)?).await
            }
            ConnectionCommands::Add {
                platform,
                label,
                scope,
            } => cmd_connections_add(&service, &owner, &platform, label, scope).await,
            ConnectionCommands::Remove { connection_id } => {
                service.connections().delete_connection(&connection_id).await?;
                println!("Removed connection {}", connection_id);
                Ok(())
            }
        },
        Commands::Calendar { month, format } => {
            cmd_calendar(&service, &owner, month.as_deref(), parse_format(&format)?).await
        }
        Commands::List { format, status } => {
            cmd_list(&service, &owner, parse_format(&format)?, status.as_deref()).await
        }
        Commands::Schedule {
            connection,
            platform,
            image,
            caption,
            date,
            time,
        } => {
            let scheduled_at = combine_date_time(
                parse_date(&date)?,
                parse_time(&time)?,
                &service.timezone(),
            )?;
            let request = ScheduleRequest {
                owner_id: owner,
                connection_id: connection,
                platform: parse_platform(&platform)?,
                image_url: image,
                caption,
                scheduled_at,
            };
            cmd_schedule(&service, request).await
        }
        Commands::Retry { post_id } => {
            let post = service.scheduling().retry_dispatch(&post_id).await?;
            print_dispatched(&post);
            Ok(())
        }
        Commands::Reschedule { post_id, date } => {
            let post = service
                .reschedule()
                .reschedule(&post_id, parse_date(&date)?)
                .await?;
            println!(
                "Rescheduled {} to {}",
                post.id,
                format_local(&service, &post)
            );
            Ok(())
        }
        Commands::Cancel { post_id } => {
            let post = service.scheduling().cancel_post(&post_id).await?;
            println!("Cancelled {}", post.id);
            Ok(())
        }
        Commands::Mark { post_id, outcome } => {
            let outcome = match outcome.to_lowercase().as_str() {
                "published" => DeliveryOutcome::Published,
                "failed" => DeliveryOutcome::Failed,
                other => {
                    return Err(SchedcastError::Validation(format!(
                        "Invalid outcome '{}'. Must be 'published' or 'failed'",
                        other
                    ))
                    .into())
                }
            };
            let post = service.scheduling().record_outcome(&post_id, outcome).await?;
            println!("Marked {} as {}", post.id, post.status);
            Ok(())
        }
        Commands::Delete { post_id, force } => cmd_delete(&service, &post_id, force).await,
    }
}

fn parse_format(format: &str) -> Result<OutputFormat, SchedcastError> {
    match format {
        "text" => Ok(OutputFormat::Text),
        "json" => Ok(OutputFormat::Json),
        other => Err(SchedcastError::Validation(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            other
        ))),
    }
}

fn parse_platform(platform: &str) -> Result<Platform, SchedcastError> {
    platform.parse().map_err(SchedcastError::Validation)
}

async fn cmd_connections_list(
    service: &SchedcastService,
    owner: &str,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let connections = service.connections().list_connections(owner).await?;

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&connections)?);
        return Ok(());
    }

    for connection in &connections {
        println!("{}", format_connection(connection));
    }
    Ok(())
}

fn format_connection(connection: &Connection) -> String {
    format!(
        "{} | {} | {}{}",
        connection.id,
        connection.platform,
        connection.account_label,
        connection
            .scope
            .as_deref()
            .map(|s| format!(" | {}", s))
            .unwrap_or_default()
    )
}

async fn cmd_connections_add(
    service: &SchedcastService,
    owner: &str,
    platform: &str,
    label: String,
    scope: Option<String>,
) -> anyhow::Result<()> {
    if label.trim().is_empty() {
        return Err(SchedcastError::Validation("account label is required".to_string()).into());
    }

    let connection = service
        .connections()
        .create_connection(
            owner,
            NewConnection {
                platform: parse_platform(platform)?,
                account_label: label,
                scope,
            },
        )
        .await?;

    // Bare id on stdout so scripts can capture it
    println!("{}", connection.id);
    Ok(())
}

async fn cmd_calendar(
    service: &SchedcastService,
    owner: &str,
    month: Option<&str>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let reference = match month {
        Some(month) => parse_month(month)?,
        None => Utc::now().with_timezone(&service.timezone()).date_naive(),
    };

    let mut view = service.calendar_view(owner, reference);
    view.reload().await?;
    let grid = view.grid();

    if format == OutputFormat::Json {
        let json = serde_json::json!({
            "year": grid.year,
            "month": grid.month,
            "timezone": service.timezone().name(),
            "cells": grid.cells,
            "posts": view.posts_by_day(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{}", view.reference_date().format("%B %Y"));
    println!("Su Mo Tu We Th Fr Sa");
    for week in grid.weeks() {
        let row: String = week
            .iter()
            .map(|cell| match cell {
                CalendarCell::Placeholder => "   ".to_string(),
                CalendarCell::Day(date) => {
                    let marker = if view.posts_on(*date).is_empty() { ' ' } else { '*' };
                    format!("{:>2}{}", date.format("%-d"), marker)
                }
            })
            .collect();
        println!("{}", row.trim_end());
    }

    for (day, posts) in view.posts_by_day() {
        println!();
        println!("{}", day);
        for post in posts {
            println!("  {}", format_post_line(service, post));
        }
    }
    Ok(())
}

async fn cmd_list(
    service: &SchedcastService,
    owner: &str,
    format: OutputFormat,
    status: Option<&str>,
) -> anyhow::Result<()> {
    let status = status
        .map(|s| s.parse::<PostStatus>().map_err(SchedcastError::Validation))
        .transpose()?;

    let mut posts = service.scheduling().list_posts(owner).await?;
    if let Some(status) = status {
        posts.retain(|p| p.status == status);
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&posts)?);
        return Ok(());
    }

    for post in &posts {
        println!("{}", format_post_line(service, post));
    }
    Ok(())
}

async fn cmd_schedule(service: &SchedcastService, request: ScheduleRequest) -> anyhow::Result<()> {
    let mut events = service.subscribe();

    match service.scheduling().schedule(request).await {
        Ok(post) => {
            print_dispatched(&post);
            Ok(())
        }
        Err(e) if e.is_dispatch_failure() => {
            // The post is stored; tell the user how to dispatch it later
            while let Ok(event) = events.try_recv() {
                if let Event::DispatchFailed { post_id, .. } = event {
                    println!("{}", post_id);
                    eprintln!(
                        "Post {} was saved but not dispatched. Run `sched-queue retry {}` to try again.",
                        post_id, post_id
                    );
                }
            }
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_dispatched(post: &ScheduledPost) {
    match &post.external_post_id {
        Some(external) => println!("{} ({})", post.id, external),
        None => println!("{}", post.id),
    }
}

async fn cmd_delete(service: &SchedcastService, post_id: &str, force: bool) -> anyhow::Result<()> {
    let post = service.scheduling().get_post(post_id).await?;

    if !force && !confirm(&format!(
        "Delete post {} scheduled for {}? [y/N]: ",
        post.id,
        format_local(service, &post)
    ))? {
        println!("Cancelled");
        return Ok(());
    }

    service.scheduling().delete_post(post_id).await?;
    println!("Deleted {}", post_id);
    Ok(())
}

/// Ask on stdout, read the answer from stdin. EOF counts as "no".
fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{}", prompt);
    io::stdout().flush().context("could not write prompt")?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("could not read confirmation")?;

    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn format_local(service: &SchedcastService, post: &ScheduledPost) -> String {
    post.scheduled_at
        .with_timezone(&service.timezone())
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

fn format_post_line(service: &SchedcastService, post: &ScheduledPost) -> String {
    format!(
        "{} | {} | {} | {} | {}",
        post.id,
        format_local(service, post),
        post.platform,
        post.status,
        truncate_caption(&post.caption, 40)
    )
}

fn truncate_caption(caption: &str, max_chars: usize) -> String {
    let single_line = caption.replace('\n', " ");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let head: String = single_line.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
