use anyhow::Result;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;

pub mod migrator;
pub mod repositories;

pub use repositories::activity::{ActivityEntry, ActivityPage};
pub use repositories::user::{Role, User};

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str, max_connections: u32, min_connections: u32) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn activity_repo(&self) -> repositories::activity::ActivityRepository {
        repositories::activity::ActivityRepository::new(self.conn.clone())
    }

    /// Seed the first admin account on an empty database. No default password
    /// is shipped: an empty user table without a configured bootstrap password
    /// is a fatal startup error.
    pub async fn bootstrap_admin(&self, security: &SecurityConfig) -> Result<()> {
        if self.user_repo().count().await? > 0 {
            return Ok(());
        }

        let Some(password) = security.bootstrap_admin_password.as_deref() else {
            anyhow::bail!(
                "User table is empty and no bootstrap admin password is configured. \
                 Set security.bootstrap_admin_password or DCMRELAY_ADMIN_PASSWORD."
            );
        };

        if password.len() < security.min_password_length {
            anyhow::bail!("Bootstrap admin password is shorter than the configured minimum");
        }

        self.user_repo()
            .create(
                "admin",
                &security.bootstrap_admin_email,
                password,
                Role::Admin,
                security,
            )
            .await?;

        info!("Bootstrapped initial admin account");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_with_password(
        &self,
        username: &str,
    ) -> Result<Option<(User, String)>> {
        self.user_repo().get_by_username_with_password(username).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list_all().await
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        self.user_repo().username_exists(username).await
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        self.user_repo().email_exists(email).await
    }

    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
        security: &SecurityConfig,
    ) -> Result<User> {
        self.user_repo()
            .create(username, email, password, role, security)
            .await
    }

    pub async fn update_user_profile(
        &self,
        id: i32,
        email: &str,
        active: bool,
        role: Role,
    ) -> Result<Option<User>> {
        self.user_repo().update_profile(id, email, active, role).await
    }

    pub async fn update_user_password(
        &self,
        id: i32,
        new_password: &str,
        security: &SecurityConfig,
    ) -> Result<Option<User>> {
        self.user_repo()
            .update_password(id, new_password, security)
            .await
    }

    pub async fn touch_last_login(&self, id: i32) -> Result<()> {
        self.user_repo().touch_last_login(id).await
    }

    // ------------------------------------------------------------------
    // Activity log
    // ------------------------------------------------------------------

    pub async fn log_activity(
        &self,
        user_id: i32,
        action: &str,
        details: Option<String>,
        ip_address: Option<String>,
    ) -> Result<()> {
        self.activity_repo()
            .add(user_id, action, details, ip_address)
            .await
    }

    pub async fn list_activity(
        &self,
        username_filter: Option<&str>,
        details_filter: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<ActivityPage> {
        self.activity_repo()
            .list(username_filter, details_filter, page, page_size)
            .await
    }
}
