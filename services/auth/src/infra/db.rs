use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbBackend, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
    TransactionTrait,
};
use uuid::Uuid;

use crm_auth_schema::{otp_attempts, otp_requests, users};
use crm_domain::phone::Phone;

use crate::domain::repository::{OtpRepository, OtpRequestLog, UserRepository};
use crate::domain::types::{AuthUser, FailedAttempt, OtpRecord, RequestWindow};
use crate::error::AuthServiceError;

// ── User repository ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbUserRepository {
    pub db: DatabaseConnection,
}

impl UserRepository for DbUserRepository {
    async fn find_by_phone(&self, phone: &Phone) -> Result<Option<AuthUser>, AuthServiceError> {
        let model = users::Entity::find()
            .filter(users::Column::Phone.eq(phone.as_str()))
            .one(&self.db)
            .await
            .context("find user by phone")?;
        model.map(user_from_model).transpose()
    }

    async fn insert(&self, user: &AuthUser) -> Result<AuthUser, AuthServiceError> {
        let model = users::ActiveModel {
            id: Set(user.id),
            phone: Set(user.phone.as_str().to_owned()),
            role: Set(user.role.as_str().to_owned()),
            is_active: Set(user.is_active),
            created_at: Set(user.created_at),
            last_login_at: Set(user.last_login_at),
        };
        users::Entity::insert(model)
            .on_conflict(
                OnConflict::column(users::Column::Phone)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("insert user")?;

        self.find_by_phone(&user.phone)
            .await?
            .context("user missing after insert")
            .map_err(AuthServiceError::from)
    }

    async fn find_active_by_id(&self, id: Uuid) -> Result<Option<AuthUser>, AuthServiceError> {
        let model = users::Entity::find_by_id(id)
            .filter(users::Column::IsActive.eq(true))
            .one(&self.db)
            .await
            .context("find active user by id")?;
        model.map(user_from_model).transpose()
    }

    async fn touch_last_login(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), AuthServiceError> {
        users::Entity::update_many()
            .col_expr(users::Column::LastLoginAt, Expr::value(at))
            .filter(users::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("touch last login")?;
        Ok(())
    }
}

fn user_from_model(model: users::Model) -> Result<AuthUser, AuthServiceError> {
    Ok(AuthUser {
        id: model.id,
        phone: Phone::parse(&model.phone).context("users.phone is not normalized")?,
        role: model.role.parse().context("users.role")?,
        is_active: model.is_active,
        created_at: model.created_at,
        last_login_at: model.last_login_at,
    })
}

// ── OTP challenge repository ──────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOtpRepository {
    pub db: DatabaseConnection,
}

impl OtpRepository for DbOtpRepository {
    async fn upsert(&self, record: &OtpRecord) -> Result<(), AuthServiceError> {
        let model = otp_attempts::ActiveModel {
            phone: Set(record.phone.as_str().to_owned()),
            code_hash: Set(record.code_hash.clone()),
            created_at: Set(record.created_at),
            expires_at: Set(record.expires_at),
            attempts: Set(i32::try_from(record.attempts).unwrap_or(i32::MAX)),
        };
        otp_attempts::Entity::insert(model)
            .on_conflict(
                OnConflict::column(otp_attempts::Column::Phone)
                    .update_columns([
                        otp_attempts::Column::CodeHash,
                        otp_attempts::Column::CreatedAt,
                        otp_attempts::Column::ExpiresAt,
                        otp_attempts::Column::Attempts,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("upsert otp challenge")?;
        Ok(())
    }

    async fn find(&self, phone: &Phone) -> Result<Option<OtpRecord>, AuthServiceError> {
        let model = otp_attempts::Entity::find_by_id(phone.as_str().to_owned())
            .one(&self.db)
            .await
            .context("find otp challenge")?;
        Ok(model.map(|m| OtpRecord {
            phone: phone.clone(),
            code_hash: m.code_hash,
            created_at: m.created_at,
            expires_at: m.expires_at,
            attempts: u32::try_from(m.attempts).unwrap_or_default(),
        }))
    }

    async fn remove(&self, phone: &Phone, code_hash: &str) -> Result<bool, AuthServiceError> {
        let result = otp_attempts::Entity::delete_many()
            .filter(otp_attempts::Column::Phone.eq(phone.as_str()))
            .filter(otp_attempts::Column::CodeHash.eq(code_hash))
            .exec(&self.db)
            .await
            .context("remove otp challenge")?;
        Ok(result.rows_affected > 0)
    }

    async fn register_failure(
        &self,
        phone: &Phone,
        code_hash: &str,
        max_attempts: u32,
    ) -> Result<FailedAttempt, AuthServiceError> {
        let txn = self.db.begin().await.context("begin otp failure")?;

        // Row lock serializes concurrent failures for the same phone.
        let model = otp_attempts::Entity::find_by_id(phone.as_str().to_owned())
            .filter(otp_attempts::Column::CodeHash.eq(code_hash))
            .lock_exclusive()
            .one(&txn)
            .await
            .context("lock otp challenge")?;
        let Some(model) = model else {
            return Ok(FailedAttempt::Missing);
        };

        let attempts = u32::try_from(model.attempts).unwrap_or_default() + 1;
        let outcome = if attempts > max_attempts {
            otp_attempts::Entity::delete_by_id(model.phone)
                .exec(&txn)
                .await
                .context("delete exhausted otp challenge")?;
            FailedAttempt::Exhausted
        } else {
            otp_attempts::ActiveModel {
                phone: Set(model.phone),
                attempts: Set(i32::try_from(attempts).unwrap_or(i32::MAX)),
                ..Default::default()
            }
            .update(&txn)
            .await
            .context("count otp failure")?;
            FailedAttempt::Counted(attempts)
        };

        txn.commit().await.context("commit otp failure")?;
        Ok(outcome)
    }

    async fn prune_expired(&self, now: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let result = otp_attempts::Entity::delete_many()
            .filter(otp_attempts::Column::ExpiresAt.lt(now))
            .exec(&self.db)
            .await
            .context("prune expired otp challenges")?;
        Ok(result.rows_affected)
    }
}

// ── OTP request log ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbOtpRequestLog {
    pub db: DatabaseConnection,
}

impl OtpRequestLog for DbOtpRequestLog {
    async fn record_if_below(
        &self,
        phone: &Phone,
        max: u32,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<RequestWindow, AuthServiceError> {
        let txn = self.db.begin().await.context("begin otp request")?;

        // Transaction-scoped lock per phone makes count-then-insert atomic
        // across instances, even when the phone has no rows yet.
        txn.execute(Statement::from_sql_and_values(
            DbBackend::Postgres,
            "SELECT pg_advisory_xact_lock(hashtext($1))",
            [phone.as_str().into()],
        ))
        .await
        .context("lock otp request log")?;

        let in_window = otp_requests::Entity::find()
            .filter(otp_requests::Column::Phone.eq(phone.as_str()))
            .filter(otp_requests::Column::CreatedAt.gt(since));
        let count = in_window
            .clone()
            .count(&txn)
            .await
            .context("count otp requests")?;
        let oldest = in_window
            .order_by_asc(otp_requests::Column::CreatedAt)
            .one(&txn)
            .await
            .context("find oldest otp request")?
            .map(|m| m.created_at);

        let count = u32::try_from(count).unwrap_or(u32::MAX);
        if count >= max {
            return Ok(RequestWindow {
                count,
                oldest,
                recorded: false,
            });
        }

        otp_requests::ActiveModel {
            id: Set(Uuid::now_v7()),
            phone: Set(phone.as_str().to_owned()),
            created_at: Set(now),
        }
        .insert(&txn)
        .await
        .context("record otp request")?;
        txn.commit().await.context("commit otp request")?;

        Ok(RequestWindow {
            count: count + 1,
            oldest: oldest.or(Some(now)),
            recorded: true,
        })
    }

    async fn prune_before(&self, before: DateTime<Utc>) -> Result<u64, AuthServiceError> {
        let result = otp_requests::Entity::delete_many()
            .filter(otp_requests::Column::CreatedAt.lt(before))
            .exec(&self.db)
            .await
            .context("prune otp requests")?;
        Ok(result.rows_affected)
    }
}

/// Readiness probe.
pub async fn ping(db: &DatabaseConnection) -> Result<(), AuthServiceError> {
    db.ping().await.context("database ping")?;
    Ok(())
}
