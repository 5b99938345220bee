//! SQL schema for the AgentOS SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS tenants (
    tenant_id   TEXT PRIMARY KEY,
    created_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS api_keys (
    key_id      TEXT PRIMARY KEY,
    tenant_id   TEXT NOT NULL REFERENCES tenants(tenant_id),
    secret_hash TEXT NOT NULL,   -- argon2 PHC string
    scopes      TEXT NOT NULL DEFAULT '[]',
    label       TEXT,
    created_at  TEXT NOT NULL,
    revoked_at  TEXT
);

-- Entry versions are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS entry_versions (
    version_id   TEXT PRIMARY KEY,
    tenant_id    TEXT NOT NULL,
    agent        TEXT NOT NULL,
    path         TEXT NOT NULL,
    value_json   TEXT NOT NULL,
    tags         TEXT NOT NULL DEFAULT '[]',
    importance   REAL NOT NULL DEFAULT 0.5,
    searchable   INTEGER NOT NULL DEFAULT 0,
    content_hash TEXT NOT NULL,   -- sha256 hex; 'tombstone' for deletions
    created_at   TEXT NOT NULL,   -- RFC 3339 UTC; server-assigned
    expires_at   TEXT,
    deleted_at   TEXT             -- non-null marks a tombstone
);

-- Latest pointer: exactly one row per (tenant, agent, path), moved in the
-- same transaction as each version insert.
CREATE TABLE IF NOT EXISTS entries (
    tenant_id         TEXT NOT NULL,
    agent             TEXT NOT NULL,
    path              TEXT NOT NULL,
    latest_version_id TEXT NOT NULL REFERENCES entry_versions(version_id),
    PRIMARY KEY (tenant_id, agent, path)
);

-- At most one embedding per version; replaced on conflict.
CREATE TABLE IF NOT EXISTS embeddings (
    version_id TEXT PRIMARY KEY REFERENCES entry_versions(version_id),
    tenant_id  TEXT NOT NULL,
    agent      TEXT NOT NULL,
    path       TEXT NOT NULL,
    model      TEXT NOT NULL,
    vector     BLOB NOT NULL,    -- little-endian f32, fixed dimension
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS embedding_jobs (
    version_id TEXT PRIMARY KEY,
    status     TEXT NOT NULL DEFAULT 'queued',
    attempts   INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,              -- bounded; never an upstream response body
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS idempotency_keys (
    tenant_id     TEXT NOT NULL,
    idem_key      TEXT NOT NULL,
    request_hash  TEXT NOT NULL,
    response_json TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    expires_at    TEXT NOT NULL,
    PRIMARY KEY (tenant_id, idem_key)
);

CREATE TABLE IF NOT EXISTS quota_usage (
    tenant_id    TEXT NOT NULL,
    day          TEXT NOT NULL,   -- UTC day, 'YYYY-MM-DD'
    writes       INTEGER NOT NULL DEFAULT 0,
    bytes        INTEGER NOT NULL DEFAULT 0,
    embed_tokens INTEGER NOT NULL DEFAULT 0,
    searches     INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (tenant_id, day)
);

CREATE INDEX IF NOT EXISTS versions_triple_idx
    ON entry_versions(tenant_id, agent, path, created_at DESC);
CREATE INDEX IF NOT EXISTS entries_path_idx
    ON entries(tenant_id, agent, path);
CREATE INDEX IF NOT EXISTS jobs_claim_idx
    ON embedding_jobs(status, created_at)
    WHERE status IN ('queued', 'running');
CREATE INDEX IF NOT EXISTS idempotency_expiry_idx
    ON idempotency_keys(expires_at);
CREATE INDEX IF NOT EXISTS embeddings_scope_idx
    ON embeddings(tenant_id, agent);

PRAGMA user_version = 1;
";
