use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

/// Ordered schema history. Entry `n` moves the database from
/// `user_version = n` to `n + 1`; entries are never edited once released.
const MIGRATIONS: &[&str] = &[SCHEMA_V1, SEED_V2];

const SCHEMA_V1: &str = "
    CREATE TABLE users (
        id                   INTEGER PRIMARY KEY AUTOINCREMENT,
        username             TEXT NOT NULL UNIQUE,
        email                TEXT NOT NULL UNIQUE,
        password             TEXT NOT NULL,
        name                 TEXT,
        avatar               TEXT,
        role                 TEXT NOT NULL DEFAULT 'free',
        mfa_enabled          INTEGER NOT NULL DEFAULT 0,
        subscription_status  TEXT NOT NULL DEFAULT 'inactive',
        subscription_expiry  TEXT,
        subscription_started TEXT,
        stripe_session_id    TEXT,
        payment_failed       INTEGER NOT NULL DEFAULT 0,
        xp                   INTEGER NOT NULL DEFAULT 0,
        level                INTEGER NOT NULL DEFAULT 1,
        last_seen            TEXT,
        metadata             TEXT NOT NULL DEFAULT '{}',
        created_at           TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );

    CREATE INDEX idx_users_last_seen ON users(last_seen);

    CREATE TABLE channels (
        id                TEXT PRIMARY KEY,
        name              TEXT NOT NULL,
        category          TEXT,
        description       TEXT,
        access_level      TEXT NOT NULL DEFAULT 'open',
        is_system_channel INTEGER NOT NULL DEFAULT 0,
        hidden            INTEGER NOT NULL DEFAULT 0,
        created_at        TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );

    CREATE TABLE messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_id  TEXT NOT NULL,
        user_id     INTEGER,
        username    TEXT NOT NULL,
        content     TEXT NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
        edited_at   TEXT
    );

    CREATE INDEX idx_messages_channel ON messages(channel_id, id);

    CREATE TABLE contact_messages (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        name        TEXT NOT NULL,
        email       TEXT NOT NULL,
        subject     TEXT NOT NULL DEFAULT '',
        message     TEXT NOT NULL,
        is_read     INTEGER NOT NULL DEFAULT 0,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );

    CREATE INDEX idx_contact_created ON contact_messages(created_at);

    CREATE TABLE courses (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        title       TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        level       TEXT NOT NULL DEFAULT 'All Levels',
        duration    INTEGER NOT NULL DEFAULT 0,
        price       REAL NOT NULL DEFAULT 0,
        image_url   TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE reset_codes (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     INTEGER,
        email       TEXT NOT NULL,
        code        TEXT NOT NULL,
        expires_at  INTEGER NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );

    CREATE INDEX idx_reset_codes_email ON reset_codes(email);

    CREATE TABLE mfa_codes (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     INTEGER,
        email       TEXT NOT NULL,
        code        TEXT NOT NULL,
        expires_at  INTEGER NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );

    CREATE INDEX idx_mfa_codes_email ON mfa_codes(email);

    CREATE TABLE signup_verification_codes (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id     INTEGER,
        email       TEXT NOT NULL,
        code        TEXT NOT NULL,
        expires_at  INTEGER NOT NULL,
        created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
    );

    CREATE INDEX idx_signup_codes_email ON signup_verification_codes(email);
";

const SEED_V2: &str = "
    INSERT INTO courses (title, description, level, duration, price, image_url) VALUES
        ('E-Commerce', 'Master Amazon FBA, Shopify, and dropshipping to build multiple income streams', 'All Levels', 6, 99.99, 'https://images.unsplash.com/photo-1556742049-0cfed4f6a45d'),
        ('Health & Fitness', 'Build profitable fitness brands, coaching businesses, and supplement companies', 'All Levels', 5, 79.99, 'https://images.unsplash.com/photo-1571019613454-1cb2f99b2d8b'),
        ('Trading', 'Master forex, stocks, and crypto trading strategies', 'Intermediate', 8, 149.99, 'https://images.unsplash.com/photo-1611974789855-9c2a0a7236a3'),
        ('Real Estate', 'Master strategic property investment, REIT analysis, and PropTech opportunities', 'Intermediate', 7, 119.99, 'https://images.unsplash.com/photo-1560518883-ce09059eeffa'),
        ('Social Media', 'Build massive personal brands and monetize digital influence', 'All Levels', 4, 59.99, 'https://images.unsplash.com/photo-1611224923853-80b023f02d71');

    INSERT INTO channels (id, name, category, description, access_level, is_system_channel) VALUES
        ('welcome', 'welcome', 'announcements', 'Welcome to THE GLITCH community!', 'read-only', 1),
        ('announcements', 'announcements', 'announcements', 'Important announcements', 'read-only', 1),
        ('admin', 'admin', 'staff', 'Admin-only channel', 'admin-only', 1),
        ('general', 'general', 'general', 'General discussion', 'open', 0),
        ('forex', 'forex', 'trading', 'Forex trading discussions', 'open', 0),
        ('crypto', 'crypto', 'trading', 'Cryptocurrency trading discussions', 'open', 0),
        ('stocks', 'stocks', 'trading', 'Stock market discussions', 'open', 0),
        ('indices', 'indices', 'trading', 'Indices trading discussions', 'open', 0),
        ('day-trading', 'day-trading', 'trading', 'Day trading strategies and discussions', 'open', 0),
        ('swing-trading', 'swing-trading', 'trading', 'Swing trading discussions', 'open', 0);

    INSERT INTO channels (id, name, category, description, access_level)
        SELECT 'course-' || id, lower(replace(title, ' ', '-')), 'courses', 'Discussion for ' || title, 'open'
        FROM courses;
";

pub fn run(conn: &Connection) -> Result<()> {
    let current: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    let current = usize::try_from(current).unwrap_or(0);

    if current >= MIGRATIONS.len() {
        info!("Database schema up to date (version {})", current);
        return Ok(());
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = index + 1;
        conn.execute_batch(&format!(
            "BEGIN;\n{sql}\nPRAGMA user_version = {version};\nCOMMIT;"
        ))
        .with_context(|| format!("migration {} failed", version))?;
        info!("Applied database migration {}", version);
    }

    info!("Database migrations complete");
    Ok(())
}
