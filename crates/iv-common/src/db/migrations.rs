use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::PgPool;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "interviews, transcript messages and settings",
        sql: r#"
CREATE TABLE IF NOT EXISTS iv.interviews (
    id TEXT PRIMARY KEY,
    public_token TEXT NOT NULL UNIQUE,
    org_id TEXT NOT NULL,
    room_name TEXT NOT NULL UNIQUE,
    candidate_identity TEXT NOT NULL,
    candidate_name TEXT NOT NULL,
    prompt TEXT NOT NULL,
    opening_message TEXT,
    status TEXT NOT NULL DEFAULT 'created',
    duration_sec INTEGER NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    used_at TIMESTAMPTZ,
    recording_started_at TIMESTAMPTZ,
    ended_at TIMESTAMPTZ,
    expires_at TIMESTAMPTZ NOT NULL,
    agent_dispatch_id TEXT,
    egress_id TEXT,
    storage_object_key TEXT,
    decision TEXT NOT NULL DEFAULT 'undecided',
    failure_reason TEXT,
    CONSTRAINT chk_interview_status CHECK (
        status IN ('created', 'used', 'recording', 'ending', 'completed', 'failed')
    ),
    CONSTRAINT chk_interview_decision CHECK (
        decision IN ('undecided', 'pass', 'fail', 'hold')
    ),
    CONSTRAINT chk_interview_duration CHECK (duration_sec BETWEEN 60 AND 1800)
);

CREATE INDEX IF NOT EXISTS idx_interviews_org_created
    ON iv.interviews(org_id, created_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_interviews_active
    ON iv.interviews(org_id)
    WHERE status IN ('used', 'recording', 'ending');

CREATE TABLE IF NOT EXISTS iv.interview_messages (
    message_id TEXT PRIMARY KEY,
    interview_id TEXT NOT NULL REFERENCES iv.interviews(id),
    role TEXT NOT NULL,
    text TEXT NOT NULL,
    offset_ms BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT chk_message_role CHECK (role IN ('interviewer', 'candidate')),
    CONSTRAINT chk_message_offset CHECK (offset_ms >= 0)
);

CREATE INDEX IF NOT EXISTS idx_interview_messages_interview
    ON iv.interview_messages(interview_id, offset_ms);

CREATE TABLE IF NOT EXISTS iv.org_settings (
    org_id TEXT PRIMARY KEY,
    default_duration_min INTEGER NOT NULL DEFAULT 10,
    default_expires_weeks INTEGER NOT NULL DEFAULT 1,
    default_expires_days INTEGER NOT NULL DEFAULT 0,
    default_expires_hours INTEGER NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS iv.system_settings (
    id SMALLINT PRIMARY KEY DEFAULT 1,
    default_duration_min INTEGER,
    default_expires_weeks INTEGER,
    default_expires_days INTEGER,
    default_expires_hours INTEGER,
    max_concurrent_interviews INTEGER,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CONSTRAINT chk_system_settings_singleton CHECK (id = 1)
);
"#,
    },
    Migration {
        id: 2,
        description: "plans, subscriptions and applications",
        sql: r#"
CREATE TABLE IF NOT EXISTS iv.plans (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    max_concurrent_interviews INTEGER
);

CREATE TABLE IF NOT EXISTS iv.subscriptions (
    org_id TEXT PRIMARY KEY,
    plan_id TEXT NOT NULL REFERENCES iv.plans(id),
    max_concurrent_override INTEGER,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS iv.applications (
    id TEXT PRIMARY KEY,
    org_id TEXT NOT NULL,
    candidate_name TEXT,
    interview_id TEXT REFERENCES iv.interviews(id),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_applications_org ON iv.applications(org_id);
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS iv;
             CREATE TABLE IF NOT EXISTS iv.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM iv.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO iv.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migration_ids_are_strictly_increasing() {
        let ids: Vec<i32> = MIGRATIONS.iter().map(|m| m.id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(ids.first(), Some(&1));
    }

    #[test]
    fn migrations_stay_inside_iv_schema() {
        for migration in MIGRATIONS {
            for line in migration.sql.lines() {
                let line = line.trim_start();
                if line.starts_with("CREATE TABLE") || line.starts_with("ON ") {
                    assert!(line.contains("iv."), "unqualified DDL: {line}");
                }
            }
        }
    }
}
