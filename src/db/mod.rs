use anyhow::{Context, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::config::SecurityConfig;
use crate::entities::users::Role;
use crate::entities::{attachments, audit_log, password_reset_tokens, tickets};

pub mod migrator;
pub mod repositories;

pub use repositories::ticket::{TicketFilter, TicketPatch, UpdateOutcome};
pub use repositories::user::User;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
    security: SecurityConfig,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
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

        Ok(Self {
            conn,
            security: SecurityConfig::default(),
        })
    }

    /// Use the deployment's Argon2 parameters instead of the defaults.
    #[must_use]
    pub fn with_security(mut self, security: SecurityConfig) -> Self {
        self.security = security;
        self
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone(), self.security.clone())
    }

    fn ticket_repo(&self) -> repositories::ticket::TicketRepository {
        repositories::ticket::TicketRepository::new(self.conn.clone())
    }

    fn attachment_repo(&self) -> repositories::attachment::AttachmentRepository {
        repositories::attachment::AttachmentRepository::new(self.conn.clone())
    }

    fn audit_repo(&self) -> repositories::audit::AuditRepository {
        repositories::audit::AuditRepository::new(self.conn.clone())
    }

    fn reset_token_repo(&self) -> repositories::reset_token::ResetTokenRepository {
        repositories::reset_token::ResetTokenRepository::new(self.conn.clone())
    }

    // ========== Users ==========

    pub async fn create_user(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
        role: Role,
    ) -> Result<Option<User>> {
        self.user_repo().create(username, email, password, role).await
    }

    pub async fn get_user(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.user_repo().get_by_email(email).await
    }

    pub async fn verify_user_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn set_user_role(&self, user_id: i32, role: Role) -> Result<Option<User>> {
        self.user_repo().set_role(user_id, role).await
    }

    pub async fn list_users(&self, page: u64, page_size: u64) -> Result<(Vec<User>, u64)> {
        self.user_repo().list(page, page_size).await
    }

    // ========== Tickets ==========

    pub async fn create_ticket(
        &self,
        owner_id: i32,
        title: &str,
        description: &str,
        priority: tickets::TicketPriority,
    ) -> Result<tickets::Model> {
        self.ticket_repo()
            .create(owner_id, title, description, priority)
            .await
    }

    pub async fn get_ticket(&self, id: i32) -> Result<Option<tickets::Model>> {
        self.ticket_repo().get(id).await
    }

    pub async fn list_tickets(
        &self,
        filter: &TicketFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<tickets::Model>, u64)> {
        self.ticket_repo().list(filter, page, page_size).await
    }

    pub async fn update_ticket<F, E>(
        &self,
        id: i32,
        patch: TicketPatch,
        validate: F,
    ) -> Result<UpdateOutcome<E>>
    where
        F: FnOnce(&tickets::Model) -> Result<(), E> + Send,
        E: Send,
    {
        self.ticket_repo().update(id, patch, validate).await
    }

    pub async fn delete_ticket(&self, id: i32) -> Result<bool> {
        self.ticket_repo().delete(id).await
    }

    // ========== Attachments ==========

    pub async fn add_attachment(
        &self,
        ticket_id: i32,
        filename: &str,
        stored_ref: &str,
        mime: &str,
        size: i64,
        uploader_id: i32,
    ) -> Result<attachments::Model> {
        self.attachment_repo()
            .add(ticket_id, filename, stored_ref, mime, size, uploader_id)
            .await
    }

    pub async fn get_attachment(&self, id: i32) -> Result<Option<attachments::Model>> {
        self.attachment_repo().get(id).await
    }

    pub async fn list_attachments(&self, ticket_id: i32) -> Result<Vec<attachments::Model>> {
        self.attachment_repo().list_for_ticket(ticket_id).await
    }

    // ========== Audit log ==========

    pub async fn append_audit(
        &self,
        actor_id: Option<i32>,
        action: &str,
        entity: &str,
        entity_id: i32,
        details: &str,
    ) -> Result<()> {
        self.audit_repo()
            .append(actor_id, action, entity, entity_id, details)
            .await
    }

    pub async fn list_audit(
        &self,
        action_filter: Option<String>,
        entity_filter: Option<String>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<audit_log::Model>, u64)> {
        self.audit_repo()
            .list(action_filter, entity_filter, page, page_size)
            .await
    }

    // ========== Password reset tokens ==========

    pub async fn create_reset_token(
        &self,
        user_id: i32,
    ) -> Result<password_reset_tokens::Model> {
        self.reset_token_repo().create(user_id).await
    }

    /// Redeem a reset token and rotate the owner's password. The hash is
    /// computed up front; the token flip and the rotation commit together.
    pub async fn redeem_reset_token(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<Option<i32>> {
        let password = new_password.to_string();
        let security = self.security.clone();
        let hash = tokio::task::spawn_blocking(move || {
            repositories::user::hash_password(&password, Some(&security))
        })
        .await
        .context("Password hashing task panicked")??;

        self.reset_token_repo().redeem(token, &hash).await
    }

    pub async fn prune_reset_tokens(&self) -> Result<u64> {
        self.reset_token_repo().prune().await
    }
}
