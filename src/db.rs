// 🗄️ Persistence - SQLite schema, entity CRUD and the audit event log
//
// Timestamps are stored as RFC 3339 TEXT and enums as their wire strings.
// Events form a SHA-256 hash chain: each row stores the hash of the row
// before it, so any edit to history breaks `verify_event_chain`.

use crate::entities::{CapTransaction, FundingRound, Shareholder};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Event for the audit trail. Every state change is recorded as one.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,

    /// Filled in by `insert_event`
    #[serde(default)]
    pub prev_hash: String,
    #[serde(default)]
    pub hash: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
            prev_hash: String::new(),
            hash: String::new(),
        }
    }
}

/// Result of walking the event chain from the first row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainReport {
    pub total_events: usize,
    pub verified_events: usize,
    pub valid: bool,
    /// event_id of the first row whose hash or link does not match
    pub first_broken: Option<String>,
    /// The stored head (event count and last hash) disagrees with the rows,
    /// e.g. trailing events were deleted
    pub head_mismatch: bool,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Shareholders
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS shareholders (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            shareholder_type TEXT NOT NULL,
            email TEXT,
            tax_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Cap table transactions
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cap_transactions (
            id TEXT PRIMARY KEY,
            transaction_type TEXT NOT NULL,
            status TEXT NOT NULL,
            from_shareholder_id TEXT REFERENCES shareholders(id),
            to_shareholder_id TEXT REFERENCES shareholders(id),
            share_class TEXT NOT NULL,
            to_share_class TEXT,
            quantity INTEGER NOT NULL,
            price_per_share REAL,
            split_ratio REAL,
            notes TEXT,
            requires_board_approval INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            submitted_at TEXT,
            approved_at TEXT,
            confirmed_at TEXT,
            failed_at TEXT,
            cancelled_at TEXT,
            failure_reason TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Funding rounds
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS funding_rounds (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            round_type TEXT NOT NULL,
            share_class TEXT NOT NULL,
            target_amount REAL NOT NULL,
            minimum_close_amount REAL,
            pre_money_valuation REAL,
            price_per_share REAL NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail, hash chained)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            prev_hash TEXT NOT NULL,
            hash TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // Single-row anchor so truncating the tail of the chain is detectable
    conn.execute(
        "CREATE TABLE IF NOT EXISTS event_chain_head (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            event_count INTEGER NOT NULL,
            head_hash TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tx_status ON cap_transactions(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_shareholder_tax_id ON shareholders(tax_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW HELPERS
// ============================================================================

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

fn parse_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn time_column(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_time(idx, &raw)
}

fn optional_time_column(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| parse_time(idx, &s)).transpose()
}

fn parsed_column<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e))
}

fn to_rfc3339(at: Option<DateTime<Utc>>) -> Option<String> {
    at.map(|dt| dt.to_rfc3339())
}

// ============================================================================
// SHAREHOLDERS
// ============================================================================

const SHAREHOLDER_COLUMNS: &str = "id, name, shareholder_type, email, tax_id, created_at";

fn shareholder_from_row(row: &Row) -> rusqlite::Result<Shareholder> {
    Ok(Shareholder {
        id: row.get(0)?,
        name: row.get(1)?,
        shareholder_type: parsed_column(row, 2)?,
        email: row.get(3)?,
        tax_id: row.get(4)?,
        created_at: time_column(row, 5)?,
    })
}

pub fn insert_shareholder(conn: &Connection, shareholder: &Shareholder) -> Result<()> {
    conn.execute(
        "INSERT INTO shareholders (id, name, shareholder_type, email, tax_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            shareholder.id,
            shareholder.name,
            shareholder.shareholder_type.as_str(),
            shareholder.email,
            shareholder.tax_id,
            shareholder.created_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to insert shareholder {}", shareholder.id))?;
    Ok(())
}

pub fn get_shareholder(conn: &Connection, id: &str) -> Result<Option<Shareholder>> {
    let shareholder = conn
        .query_row(
            &format!("SELECT {} FROM shareholders WHERE id = ?1", SHAREHOLDER_COLUMNS),
            params![id],
            shareholder_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to load shareholder {}", id))?;
    Ok(shareholder)
}

pub fn list_shareholders(conn: &Connection) -> Result<Vec<Shareholder>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM shareholders ORDER BY name COLLATE NOCASE",
        SHAREHOLDER_COLUMNS
    ))?;

    let shareholders = stmt
        .query_map([], shareholder_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read shareholders")?;

    Ok(shareholders)
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

const TRANSACTION_COLUMNS: &str = "id, transaction_type, status, from_shareholder_id,
    to_shareholder_id, share_class, to_share_class, quantity, price_per_share, split_ratio,
    notes, requires_board_approval, created_at, submitted_at, approved_at, confirmed_at,
    failed_at, cancelled_at, failure_reason";

fn transaction_from_row(row: &Row) -> rusqlite::Result<CapTransaction> {
    let quantity: i64 = row.get(7)?;
    Ok(CapTransaction {
        id: row.get(0)?,
        transaction_type: parsed_column(row, 1)?,
        status: parsed_column(row, 2)?,
        from_shareholder_id: row.get(3)?,
        to_shareholder_id: row.get(4)?,
        share_class: row.get(5)?,
        to_share_class: row.get(6)?,
        quantity: u64::try_from(quantity).map_err(|e| conversion_error(7, e))?,
        price_per_share: row.get(8)?,
        split_ratio: row.get(9)?,
        notes: row.get(10)?,
        requires_board_approval: row.get(11)?,
        created_at: time_column(row, 12)?,
        submitted_at: optional_time_column(row, 13)?,
        approved_at: optional_time_column(row, 14)?,
        confirmed_at: optional_time_column(row, 15)?,
        failed_at: optional_time_column(row, 16)?,
        cancelled_at: optional_time_column(row, 17)?,
        failure_reason: row.get(18)?,
    })
}

pub fn insert_transaction(conn: &Connection, tx: &CapTransaction) -> Result<()> {
    let quantity = i64::try_from(tx.quantity).context("Quantity does not fit in SQLite INTEGER")?;

    conn.execute(
        "INSERT INTO cap_transactions (
            id, transaction_type, status, from_shareholder_id, to_shareholder_id,
            share_class, to_share_class, quantity, price_per_share, split_ratio,
            notes, requires_board_approval, created_at, submitted_at, approved_at,
            confirmed_at, failed_at, cancelled_at, failure_reason
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
        params![
            tx.id,
            tx.transaction_type.as_str(),
            tx.status.as_str(),
            tx.from_shareholder_id,
            tx.to_shareholder_id,
            tx.share_class,
            tx.to_share_class,
            quantity,
            tx.price_per_share,
            tx.split_ratio,
            tx.notes,
            tx.requires_board_approval,
            tx.created_at.to_rfc3339(),
            to_rfc3339(tx.submitted_at),
            to_rfc3339(tx.approved_at),
            to_rfc3339(tx.confirmed_at),
            to_rfc3339(tx.failed_at),
            to_rfc3339(tx.cancelled_at),
            tx.failure_reason,
        ],
    )
    .with_context(|| format!("Failed to insert transaction {}", tx.id))?;
    Ok(())
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Option<CapTransaction>> {
    let tx = conn
        .query_row(
            &format!("SELECT {} FROM cap_transactions WHERE id = ?1", TRANSACTION_COLUMNS),
            params![id],
            transaction_from_row,
        )
        .optional()
        .with_context(|| format!("Failed to load transaction {}", id))?;
    Ok(tx)
}

/// Newest first
pub fn list_transactions(conn: &Connection) -> Result<Vec<CapTransaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM cap_transactions ORDER BY created_at DESC",
        TRANSACTION_COLUMNS
    ))?;

    let transactions = stmt
        .query_map([], transaction_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read transactions")?;

    Ok(transactions)
}

/// Persist status, timeline and failure reason. The request fields never change.
pub fn update_transaction_state(conn: &Connection, tx: &CapTransaction) -> Result<()> {
    let updated = conn.execute(
        "UPDATE cap_transactions
         SET status = ?2, submitted_at = ?3, approved_at = ?4, confirmed_at = ?5,
             failed_at = ?6, cancelled_at = ?7, failure_reason = ?8
         WHERE id = ?1",
        params![
            tx.id,
            tx.status.as_str(),
            to_rfc3339(tx.submitted_at),
            to_rfc3339(tx.approved_at),
            to_rfc3339(tx.confirmed_at),
            to_rfc3339(tx.failed_at),
            to_rfc3339(tx.cancelled_at),
            tx.failure_reason,
        ],
    )?;

    if updated == 0 {
        bail!("Transaction {} does not exist", tx.id);
    }
    Ok(())
}

// ============================================================================
// FUNDING ROUNDS
// ============================================================================

fn round_from_row(row: &Row) -> rusqlite::Result<FundingRound> {
    Ok(FundingRound {
        id: row.get(0)?,
        name: row.get(1)?,
        round_type: parsed_column(row, 2)?,
        share_class: row.get(3)?,
        target_amount: row.get(4)?,
        minimum_close_amount: row.get(5)?,
        pre_money_valuation: row.get(6)?,
        price_per_share: row.get(7)?,
        status: parsed_column(row, 8)?,
        created_at: time_column(row, 9)?,
    })
}

pub fn insert_funding_round(conn: &Connection, round: &FundingRound) -> Result<()> {
    conn.execute(
        "INSERT INTO funding_rounds (
            id, name, round_type, share_class, target_amount, minimum_close_amount,
            pre_money_valuation, price_per_share, status, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            round.id,
            round.name,
            round.round_type.as_str(),
            round.share_class,
            round.target_amount,
            round.minimum_close_amount,
            round.pre_money_valuation,
            round.price_per_share,
            round.status.as_str(),
            round.created_at.to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to insert funding round {}", round.id))?;
    Ok(())
}

pub fn list_funding_rounds(conn: &Connection) -> Result<Vec<FundingRound>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, round_type, share_class, target_amount, minimum_close_amount,
                pre_money_valuation, price_per_share, status, created_at
         FROM funding_rounds
         ORDER BY created_at DESC",
    )?;

    let rounds = stmt
        .query_map([], round_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read funding rounds")?;

    Ok(rounds)
}

// ============================================================================
// EVENTS
// ============================================================================

fn event_hash(
    prev_hash: &str,
    event_id: &str,
    timestamp: &str,
    event_type: &str,
    entity_type: &str,
    entity_id: &str,
    data_json: &str,
    actor: &str,
) -> String {
    let mut hasher = Sha256::new();
    for part in [
        prev_hash, event_id, timestamp, event_type, entity_type, entity_id, data_json, actor,
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

fn last_event_hash(conn: &Connection) -> Result<String> {
    let hash = conn
        .query_row("SELECT hash FROM events ORDER BY id DESC LIMIT 1", [], |row| {
            row.get::<_, String>(0)
        })
        .optional()?;
    Ok(hash.unwrap_or_default())
}

/// Insert event into audit trail, chained to the previous event.
/// Returns the new event's hash.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<String> {
    let data_json = serde_json::to_string(&event.data)?;
    let timestamp = event.timestamp.to_rfc3339();
    let prev_hash = last_event_hash(conn)?;
    let hash = event_hash(
        &prev_hash,
        &event.event_id,
        &timestamp,
        &event.event_type,
        &event.entity_type,
        &event.entity_id,
        &data_json,
        &event.actor,
    );

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor,
            prev_hash, hash
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            event.event_id,
            timestamp,
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
            prev_hash,
            hash,
        ],
    )
    .with_context(|| format!("Failed to record {} event", event.event_type))?;

    conn.execute(
        "INSERT INTO event_chain_head (id, event_count, head_hash) VALUES (1, 1, ?1)
         ON CONFLICT(id) DO UPDATE SET
            event_count = event_count + 1,
            head_hash = excluded.head_hash",
        params![hash],
    )
    .context("Failed to advance event chain head")?;

    Ok(hash)
}

/// Get events for a specific entity, oldest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor,
                prev_hash, hash
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY id ASC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: time_column(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
                prev_hash: row.get(7)?,
                hash: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Recompute every hash from the stored columns, check each link, then check
/// the last row against the stored head
pub fn verify_event_chain(conn: &Connection) -> Result<ChainReport> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor,
                prev_hash, hash
         FROM events
         ORDER BY id ASC",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, String>(8)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut report = ChainReport {
        total_events: rows.len(),
        verified_events: 0,
        valid: true,
        first_broken: None,
        head_mismatch: false,
    };

    let mut expected_prev = String::new();
    for (event_id, timestamp, event_type, entity_type, entity_id, data, actor, prev_hash, hash) in
        rows
    {
        let computed = event_hash(
            &prev_hash,
            &event_id,
            &timestamp,
            &event_type,
            &entity_type,
            &entity_id,
            &data,
            &actor,
        );

        if prev_hash != expected_prev || computed != hash {
            report.valid = false;
            report.first_broken = Some(event_id);
            return Ok(report);
        }

        report.verified_events += 1;
        expected_prev = hash;
    }

    let head = conn
        .query_row(
            "SELECT event_count, head_hash FROM event_chain_head WHERE id = 1",
            [],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?
        .unwrap_or((0, String::new()));

    if head != (report.total_events as i64, expected_prev) {
        report.valid = false;
        report.head_mismatch = true;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ShareholderType;
    use crate::forms::{NewFundingRound, NewShareholder, TransactionDraft};
    use crate::entities::RoundType;
    use crate::lifecycle::{LifecycleAction, TransactionStatus, TransactionType};

    fn test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn shareholder(name: &str) -> Shareholder {
        Shareholder::create(NewShareholder {
            name: name.to_string(),
            shareholder_type: ShareholderType::Individual,
            email: Some(format!("{}@example.com", name.to_lowercase())),
            tax_id: Some("52998224725".to_string()),
        })
    }

    fn issuance(to: &str) -> CapTransaction {
        CapTransaction::create(TransactionDraft {
            transaction_type: TransactionType::Issuance,
            from_shareholder_id: None,
            to_shareholder_id: Some(to.to_string()),
            share_class: "COMMON".to_string(),
            to_share_class: None,
            quantity: 10_000,
            price_per_share: Some(0.01),
            split_ratio: None,
            notes: Some("founder grant".to_string()),
            requires_board_approval: true,
        })
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = test_db();
        setup_database(&conn).unwrap();
        assert!(list_transactions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_shareholder_roundtrip() {
        let conn = test_db();
        let alice = shareholder("Alice");
        insert_shareholder(&conn, &alice).unwrap();
        insert_shareholder(&conn, &shareholder("bob")).unwrap();

        let loaded = get_shareholder(&conn, &alice.id).unwrap().unwrap();
        assert_eq!(loaded, alice);
        assert!(get_shareholder(&conn, "missing").unwrap().is_none());

        let names: Vec<String> = list_shareholders(&conn)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Alice", "bob"]);
    }

    #[test]
    fn test_transaction_state_update() {
        let conn = test_db();
        let alice = shareholder("Alice");
        insert_shareholder(&conn, &alice).unwrap();

        let mut tx = issuance(&alice.id);
        insert_transaction(&conn, &tx).unwrap();
        assert_eq!(get_transaction(&conn, &tx.id).unwrap().unwrap(), tx);

        let now = Utc::now();
        tx.record_status(LifecycleAction::Submit, TransactionStatus::PendingApproval, now, None);
        update_transaction_state(&conn, &tx).unwrap();

        let loaded = get_transaction(&conn, &tx.id).unwrap().unwrap();
        assert_eq!(loaded.status, TransactionStatus::PendingApproval);
        assert_eq!(loaded.submitted_at, Some(now));
        assert_eq!(loaded.notes.as_deref(), Some("founder grant"));
        assert!(loaded.requires_board_approval);
    }

    #[test]
    fn test_update_missing_transaction_fails() {
        let conn = test_db();
        let tx = issuance("nobody");
        assert!(update_transaction_state(&conn, &tx).is_err());
    }

    #[test]
    fn test_funding_round_roundtrip() {
        let conn = test_db();
        let round = FundingRound::create(NewFundingRound {
            name: "Seed".to_string(),
            round_type: RoundType::Seed,
            share_class: "PREFERRED_SEED".to_string(),
            target_amount: 1_500_000.0,
            minimum_close_amount: None,
            pre_money_valuation: Some(6_000_000.0),
            price_per_share: 0.75,
        });
        insert_funding_round(&conn, &round).unwrap();

        let rounds = list_funding_rounds(&conn).unwrap();
        assert_eq!(rounds, vec![round]);
    }

    #[test]
    fn test_event_log() {
        let conn = test_db();

        let event = Event::new(
            "transaction_submitted",
            "transaction",
            "test_id_123",
            serde_json::json!({"status": "SUBMITTED"}),
            "test_actor",
        );

        let hash = insert_event(&conn, &event).unwrap();
        let events = get_events_for_entity(&conn, "transaction", "test_id_123").unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "transaction_submitted");
        assert_eq!(events[0].actor, "test_actor");
        assert_eq!(events[0].prev_hash, "");
        assert_eq!(events[0].hash, hash);
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_event_chain_links_and_detects_tampering() {
        let conn = test_db();
        let mut hashes = Vec::new();
        for i in 0..3 {
            let event = Event::new(
                "transaction_created",
                "transaction",
                &format!("tx-{}", i),
                serde_json::json!({"n": i}),
                "tester",
            );
            hashes.push(insert_event(&conn, &event).unwrap());
        }

        let second = get_events_for_entity(&conn, "transaction", "tx-1").unwrap();
        assert_eq!(second[0].prev_hash, hashes[0]);

        let report = verify_event_chain(&conn).unwrap();
        assert!(report.valid);
        assert_eq!(report.verified_events, 3);

        conn.execute(
            "UPDATE events SET data = '{\"n\":42}' WHERE entity_id = 'tx-1'",
            [],
        )
        .unwrap();

        let report = verify_event_chain(&conn).unwrap();
        assert!(!report.valid);
        assert_eq!(report.verified_events, 1);
        assert_eq!(report.first_broken, Some(second[0].event_id.clone()));
    }

    #[test]
    fn test_event_chain_detects_deleted_tail() {
        let conn = test_db();
        for i in 0..3 {
            let event = Event::new(
                "shareholder_created",
                "shareholder",
                &format!("sh-{}", i),
                serde_json::json!({"n": i}),
                "tester",
            );
            insert_event(&conn, &event).unwrap();
        }
        assert!(verify_event_chain(&conn).unwrap().valid);

        conn.execute("DELETE FROM events WHERE entity_id = 'sh-2'", [])
            .unwrap();

        let report = verify_event_chain(&conn).unwrap();
        assert!(!report.valid);
        assert!(report.head_mismatch);
        assert_eq!(report.verified_events, 2);
        assert_eq!(report.first_broken, None);

        conn.execute("DELETE FROM events", []).unwrap();
        assert!(verify_event_chain(&conn).unwrap().head_mismatch);
    }
}
