//! SQL schema for the Dealflow SQLite store.
//!
//! Executed once at connection startup. Later migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS users (
    user_id          TEXT PRIMARY KEY,
    name             TEXT NOT NULL,
    email            TEXT NOT NULL UNIQUE COLLATE NOCASE,
    phone            TEXT,
    password_hash    TEXT,             -- NULL for Google-only accounts
    role             TEXT NOT NULL,    -- 'ADMIN' | 'SALES' | 'VIEWER'
    status           TEXT NOT NULL,    -- 'ACTIVE' | 'INACTIVE'
    department       TEXT,
    location         TEXT,
    bio              TEXT,
    skills           TEXT NOT NULL DEFAULT '[]',
    avatar           TEXT,
    google_id        TEXT UNIQUE,
    reports_to_id    TEXT REFERENCES users(user_id) ON DELETE SET NULL,
    reset_code       TEXT,
    reset_expires_at TEXT,
    joined_at        TEXT,
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS leads (
    lead_id       TEXT PRIMARY KEY,
    title         TEXT NOT NULL,
    company       TEXT,
    description   TEXT,
    contacts      TEXT NOT NULL DEFAULT '[]',
    value         REAL NOT NULL DEFAULT 0,
    currency      TEXT NOT NULL,
    status        TEXT NOT NULL,
    priority      TEXT NOT NULL,
    source_origin TEXT,
    due_date      TEXT,
    won_at        TEXT,
    lost_at       TEXT,
    is_archived   INTEGER NOT NULL DEFAULT 0,
    -- No cascade: a user who still owns leads cannot be deleted.
    created_by_id TEXT NOT NULL REFERENCES users(user_id),
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS lead_assignees (
    lead_id TEXT NOT NULL REFERENCES leads(lead_id) ON DELETE CASCADE,
    user_id TEXT NOT NULL REFERENCES users(user_id) ON DELETE CASCADE,
    PRIMARY KEY (lead_id, user_id)
);

CREATE TABLE IF NOT EXISTS activities (
    activity_id   TEXT PRIMARY KEY,
    lead_id       TEXT NOT NULL REFERENCES leads(lead_id) ON DELETE CASCADE,
    created_by_id TEXT NOT NULL REFERENCES users(user_id),
    kind          TEXT NOT NULL,       -- discriminant of ActivityDetail
    title         TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    scheduled_at  TEXT,
    location      TEXT,
    is_completed  INTEGER NOT NULL DEFAULT 0,
    meta          TEXT NOT NULL DEFAULT '{}',  -- JSON payload (inner data only)
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS leads_created_idx       ON leads(created_at);
CREATE INDEX IF NOT EXISTS leads_won_idx           ON leads(won_at);
CREATE INDEX IF NOT EXISTS lead_assignees_user_idx ON lead_assignees(user_id);
CREATE INDEX IF NOT EXISTS activities_lead_idx     ON activities(lead_id);
CREATE INDEX IF NOT EXISTS activities_kind_idx     ON activities(kind, created_at);

PRAGMA user_version = 1;
";
