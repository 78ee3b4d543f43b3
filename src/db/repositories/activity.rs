use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;

use crate::entities::{activity_logs, prelude::*, users};

/// One audit row joined with the acting user's name.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub user_id: i32,
    pub username: String,
    pub action: String,
    pub details: Option<String>,
    pub ip_address: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityPage {
    pub entries: Vec<ActivityEntry>,
    pub page: u64,
    pub total_pages: u64,
    pub total_items: u64,
}

pub struct ActivityRepository {
    conn: DatabaseConnection,
}

impl ActivityRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Append one audit entry. This is the only write path for the table.
    pub async fn add(
        &self,
        user_id: i32,
        action: &str,
        details: Option<String>,
        ip_address: Option<String>,
    ) -> Result<()> {
        let active_model = activity_logs::ActiveModel {
            user_id: Set(user_id),
            action: Set(action.to_string()),
            details: Set(details),
            ip_address: Set(ip_address),
            timestamp: Set(chrono::Utc::now().to_rfc3339()),
            ..Default::default()
        };

        ActivityLogs::insert(active_model)
            .exec(&self.conn)
            .await
            .context("Failed to append activity log entry")?;
        Ok(())
    }

    /// Filtered, descending, offset-paginated listing for the admin view.
    /// Filters combine conjunctively when both are given.
    pub async fn list(
        &self,
        username_filter: Option<&str>,
        details_filter: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<ActivityPage> {
        let mut query = ActivityLogs::find()
            .find_also_related(Users)
            .order_by_desc(activity_logs::Column::Timestamp)
            .order_by_desc(activity_logs::Column::Id);

        if let Some(username) = username_filter {
            query = query.filter(users::Column::Username.contains(username));
        }

        if let Some(details) = details_filter {
            query = query.filter(activity_logs::Column::Details.contains(details));
        }

        let page = page.max(1);
        let paginator = query.paginate(&self.conn, page_size);
        let totals = paginator
            .num_items_and_pages()
            .await
            .context("Failed to count activity log entries")?;
        let rows = paginator
            .fetch_page(page - 1)
            .await
            .context("Failed to fetch activity log page")?;

        let entries = rows
            .into_iter()
            .map(|(log, user)| ActivityEntry {
                id: log.id,
                user_id: log.user_id,
                username: user.map_or_else(|| "unknown".to_string(), |u| u.username),
                action: log.action,
                details: log.details,
                ip_address: log.ip_address,
                timestamp: log.timestamp,
            })
            .collect();

        Ok(ActivityPage {
            entries,
            page,
            total_pages: totals.number_of_pages,
            total_items: totals.number_of_items,
        })
    }
}
