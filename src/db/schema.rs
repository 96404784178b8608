//! Database schema and migrations for ephemail.
//!
//! Migrations are applied in order when the database is opened. The
//! schema_version table records which ones have run.

/// Database migrations.
pub const MIGRATIONS: &[&str] = &[
    // v1: Disposable addresses
    r#"
CREATE TABLE addresses (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    address         TEXT NOT NULL UNIQUE,
    created_at      INTEGER NOT NULL,           -- unix microseconds
    expires_at      INTEGER NOT NULL,           -- unix microseconds
    creator_ip      TEXT,
    creator_agent   TEXT
);

CREATE INDEX idx_addresses_expires_at ON addresses(expires_at);
"#,
    // v2: Received messages and their attachments
    r#"
CREATE TABLE messages (
    id          BLOB PRIMARY KEY,               -- uuid
    address_id  INTEGER NOT NULL REFERENCES addresses(id) ON DELETE CASCADE,
    sender      TEXT NOT NULL,
    subject     TEXT NOT NULL DEFAULT '',
    text_body   TEXT NOT NULL DEFAULT '',
    html_body   TEXT NOT NULL DEFAULT '',
    created_at  INTEGER NOT NULL
);

CREATE INDEX idx_messages_address_id ON messages(address_id, created_at);

CREATE TABLE attachments (
    id              BLOB PRIMARY KEY,           -- uuid
    message_id      BLOB NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
    position        INTEGER NOT NULL,
    filename        TEXT NOT NULL DEFAULT '',
    content_type    TEXT NOT NULL DEFAULT 'application/octet-stream',
    data            BLOB NOT NULL
);

CREATE INDEX idx_attachments_message_id ON attachments(message_id, position);
"#,
    // v3: Append-only audit trail. No foreign key: entries outlive their address.
    r#"
CREATE TABLE audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    address_id  INTEGER NOT NULL,
    address     TEXT NOT NULL,
    action      TEXT NOT NULL CHECK (action IN ('create', 'delete')),
    ip          TEXT,
    user_agent  TEXT,
    created_at  INTEGER NOT NULL
);

CREATE INDEX idx_audit_log_address_id ON audit_log(address_id);

CREATE TRIGGER audit_log_no_update BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE TRIGGER audit_log_no_delete BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;
"#,
];
