use crate::Result;
use rusqlite::Connection;

const SCHEMA_VERSION: i64 = 1;

/// Initialize the database schema
pub fn apply_migrations(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        tracing::debug!("Database schema at version {}", version);
        return Ok(());
    }

    tracing::info!("Creating database schema v{}...", SCHEMA_VERSION);

    conn.execute_batch(FULL_SCHEMA)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    tracing::info!("Database schema created successfully");
    Ok(())
}

const FULL_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    ticker       TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    asset_type   TEXT NOT NULL,      -- 'Stock' | 'Bond' | 'ETF' | 'Fund' | 'Cash' | 'Crypto'
    currency     TEXT NOT NULL DEFAULT 'USD',
    sector       TEXT
);

-- Look-through constituents, replaced wholesale with their parent
CREATE TABLE IF NOT EXISTS constituents (
    parent_ticker      TEXT NOT NULL REFERENCES assets(ticker) ON DELETE CASCADE,
    position           INTEGER NOT NULL,   -- order within the parent
    constituent_ticker TEXT NOT NULL,
    name               TEXT,
    weight             REAL NOT NULL,
    PRIMARY KEY (parent_ticker, position)
);

-- Daily closes, one row per (ticker, calendar day)
CREATE TABLE IF NOT EXISTS prices (
    ticker       TEXT NOT NULL,
    date         TEXT NOT NULL,      -- YYYY-MM-DD
    price        REAL,
    PRIMARY KEY (ticker, date)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        apply_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
