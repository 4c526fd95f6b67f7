use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                user_id                 TEXT PRIMARY KEY,
                age_verified            INTEGER NOT NULL DEFAULT 0,
                terms_accepted_at       INTEGER,
                is_restricted           INTEGER NOT NULL DEFAULT 0,
                private_calls_enabled   INTEGER NOT NULL DEFAULT 0,
                membership_tier         TEXT NOT NULL DEFAULT 'free',
                membership_expires_at   INTEGER,
                language                TEXT NOT NULL DEFAULT 'en',
                updated_at              INTEGER NOT NULL
            );

            CREATE TABLE performers (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT,
                display_name        TEXT NOT NULL,
                base_price_cents    INTEGER NOT NULL,
                currency            TEXT NOT NULL,
                allowed_call_types  TEXT NOT NULL,
                max_call_duration   INTEGER NOT NULL,
                buffer_time_before  INTEGER NOT NULL DEFAULT 0,
                buffer_time_after   INTEGER NOT NULL DEFAULT 0,
                timezone            TEXT NOT NULL DEFAULT 'UTC',
                status              TEXT NOT NULL DEFAULT 'active',
                is_available        INTEGER NOT NULL DEFAULT 1,
                availability_mode   TEXT NOT NULL DEFAULT 'working_hours',
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL
            );

            CREATE TABLE availability_slots (
                id              TEXT PRIMARY KEY,
                performer_id    TEXT NOT NULL REFERENCES performers(id),
                date            TEXT NOT NULL,
                start_time      TEXT NOT NULL,
                end_time        TEXT NOT NULL,
                timezone        TEXT NOT NULL,
                is_available    INTEGER NOT NULL DEFAULT 1,
                is_booked       INTEGER NOT NULL DEFAULT 0,
                booking_id      TEXT,
                version         INTEGER NOT NULL DEFAULT 1,
                created_at      INTEGER NOT NULL,
                updated_at      INTEGER NOT NULL
            );

            CREATE INDEX idx_slots_performer_date
                ON availability_slots(performer_id, date);

            CREATE TABLE bookings (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL,
                performer_id        TEXT NOT NULL REFERENCES performers(id),
                slot_id             TEXT,
                call_type           TEXT NOT NULL,
                duration_minutes    INTEGER NOT NULL,
                start_time_utc      INTEGER NOT NULL,
                end_time_utc        INTEGER NOT NULL,
                price_cents         INTEGER NOT NULL,
                currency            TEXT NOT NULL,
                status              TEXT NOT NULL,
                hold_expires_at     INTEGER,
                rules_confirmed_at  INTEGER,
                cancel_reason       TEXT,
                cancelled_by        TEXT,
                version             INTEGER NOT NULL DEFAULT 1,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL
            );

            CREATE INDEX idx_bookings_performer_start
                ON bookings(performer_id, start_time_utc);
            CREATE INDEX idx_bookings_user
                ON bookings(user_id, start_time_utc);
            CREATE INDEX idx_bookings_status
                ON bookings(status);

            CREATE TABLE booking_transitions (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                booking_id      TEXT NOT NULL REFERENCES bookings(id),
                from_status     TEXT,
                to_status       TEXT NOT NULL,
                version         INTEGER NOT NULL,
                actor           TEXT NOT NULL,
                at              INTEGER NOT NULL
            );

            CREATE INDEX idx_transitions_booking
                ON booking_transitions(booking_id, id);

            CREATE TABLE payments (
                id                  TEXT PRIMARY KEY,
                booking_id          TEXT NOT NULL REFERENCES bookings(id),
                provider            TEXT NOT NULL,
                amount_cents        INTEGER NOT NULL,
                currency            TEXT NOT NULL,
                status              TEXT NOT NULL DEFAULT 'pending',
                payment_link        TEXT NOT NULL,
                expires_at          INTEGER NOT NULL,
                paid_at             INTEGER,
                provider_payment_id TEXT,
                created_at          INTEGER NOT NULL,
                updated_at          INTEGER NOT NULL
            );

            CREATE INDEX idx_payments_booking
                ON payments(booking_id, created_at);

            CREATE TABLE call_sessions (
                id                      TEXT PRIMARY KEY,
                booking_id              TEXT NOT NULL UNIQUE REFERENCES bookings(id),
                room_provider           TEXT NOT NULL,
                room_id                 TEXT NOT NULL,
                room_name               TEXT NOT NULL,
                join_url_user           TEXT NOT NULL,
                join_url_performer      TEXT NOT NULL,
                token_user              TEXT NOT NULL,
                token_performer         TEXT NOT NULL,
                max_participants        INTEGER NOT NULL DEFAULT 2,
                recording_disabled      INTEGER NOT NULL DEFAULT 1,
                status                  TEXT NOT NULL DEFAULT 'scheduled',
                started_at              INTEGER,
                ended_at                INTEGER,
                actual_duration_seconds INTEGER,
                version                 INTEGER NOT NULL DEFAULT 1,
                created_at              INTEGER NOT NULL,
                updated_at              INTEGER NOT NULL
            );

            CREATE INDEX idx_sessions_status
                ON call_sessions(status);

            CREATE TABLE booking_notifications (
                id              TEXT PRIMARY KEY,
                booking_id      TEXT NOT NULL REFERENCES bookings(id),
                user_id         TEXT NOT NULL,
                type            TEXT NOT NULL,
                scheduled_for   INTEGER NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending',
                sent_at         INTEGER,
                failed_at       INTEGER,
                error           TEXT,
                payload         TEXT NOT NULL DEFAULT '{}',
                created_at      INTEGER NOT NULL,
                UNIQUE(booking_id, user_id, type)
            );

            CREATE INDEX idx_notifications_due
                ON booking_notifications(status, scheduled_for);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
