use crate::error::DbError;

/// Which pragma set a connection gets on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PragmaProfile {
    /// The manager's primary connection: WAL journaling, foreign keys on,
    /// normal synchronous.
    Primary,
    /// Pool connections additionally get a 64 MiB page cache, in-memory
    /// temp store, and a 256 MiB mmap window.
    Pooled,
}

const POOL_CACHE_SIZE: i64 = -64_000;
const POOL_MMAP_SIZE: i64 = 268_435_456;

pub(super) fn apply_pragmas(
    conn: &rusqlite::Connection,
    profile: PragmaProfile,
) -> Result<(), DbError> {
    // journal_mode returns the resulting mode as a row.
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_row| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;

    if profile == PragmaProfile::Pooled {
        conn.pragma_update(None, "cache_size", POOL_CACHE_SIZE)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        conn.pragma_update(None, "mmap_size", POOL_MMAP_SIZE)?;
    }
    Ok(())
}
