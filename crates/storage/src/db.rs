//! SQLite-backed ledger database.
//!
//! One [`LedgerDb`] per node. The connection sits behind a single mutex:
//! writers are fully serialized, and every multi-row mutation happens inside
//! one transaction.

use crate::{Result, StorageError};
use axiom_types::{Block, Fact, FactLink, Hash256, PeerRecord, RelationKind, SourceRecord, ValidatorRecord};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Current schema version, recorded in `meta`.
const SCHEMA_VERSION: u32 = 1;

/// `meta` key guarding the single-vote rule.
const META_LAST_SIGNED: &str = "last_signed_height";

/// Result of appending a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The block and its fact rows were written.
    Inserted,
    /// The identical block was already committed; the call was a no-op.
    AlreadyPresent,
}

/// The node's durable store.
pub struct LedgerDb {
    conn: Mutex<Connection>,
}

impl LedgerDb {
    /// Opens (or creates) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::Database(format!("create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "opened ledger database");
        Self::init(conn)
    }

    /// Opens an in-memory ledger, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(1000))?;
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` against the connection, retrying once with backoff when
    /// SQLite reports a transient busy/locked condition.
    fn with_conn<T>(&self, f: impl Fn(&mut Connection) -> rusqlite::Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        match f(&mut conn) {
            Err(e) if is_transient(&e) => {
                warn!(error = %e, "transient storage error, retrying once");
                std::thread::sleep(Duration::from_millis(250));
                f(&mut conn).map_err(Into::into)
            }
            other => other.map_err(Into::into),
        }
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Inserts the genesis block if the chain is empty.
    pub fn ensure_genesis(&self) -> Result<()> {
        if self.chain_height()?.is_none() {
            let genesis = Block::genesis();
            self.append_block(&genesis, &[])?;
            info!(hash = %genesis.hash, "created genesis block");
        }
        Ok(())
    }

    /// Height of the chain tip, or `None` before genesis exists.
    pub fn chain_height(&self) -> Result<Option<u64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT MAX(height) FROM blocks", [], |row| {
                row.get::<_, Option<u64>>(0)
            })
        })
    }

    /// The chain tip block. Errors if genesis has not been created.
    pub fn tip(&self) -> Result<Block> {
        let height = self
            .chain_height()?
            .ok_or_else(|| StorageError::NotFound("empty chain".into()))?;
        self.get_block_by_height(height)?
            .ok_or_else(|| StorageError::InvariantViolation(format!("missing tip at {height}")))
    }

    /// Fetches a block by height.
    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        self.with_conn(|conn| read_block(conn, "height = ?1", params![height]))
    }

    /// Fetches a block by hash.
    pub fn get_block_by_hash(&self, hash: &Hash256) -> Result<Option<Block>> {
        self.with_conn(|conn| read_block(conn, "hash = ?1", params![hash.to_hex()]))
    }

    /// Blocks with `height > since`, ascending, at most `limit`.
    pub fn blocks_since(&self, since: u64, limit: usize) -> Result<Vec<Block>> {
        self.with_conn(|conn| {
            let heights: Vec<u64> = {
                let mut stmt = conn.prepare(
                    "SELECT height FROM blocks WHERE height > ?1 ORDER BY height ASC LIMIT ?2",
                )?;
                let heights = stmt
                    .query_map(params![since, limit as i64], |row| row.get(0))?
                    .collect::<rusqlite::Result<_>>()?;
                heights
            };
            let mut blocks = Vec::with_capacity(heights.len());
            for h in heights {
                if let Some(block) = read_block(conn, "height = ?1", params![h])? {
                    blocks.push(block);
                }
            }
            Ok(blocks)
        })
    }

    /// Atomically writes a block, any facts not yet present, and the
    /// fact-in-block join rows. Re-appending the identical block is a no-op.
    pub fn append_block(&self, block: &Block, facts: &[Fact]) -> Result<AppendOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StorageError::from)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT hash FROM blocks WHERE height = ?1",
                params![block.height],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        if let Some(hash) = existing {
            if hash == block.hash.to_hex() {
                return Ok(AppendOutcome::AlreadyPresent);
            }
            return Err(StorageError::Conflict(format!(
                "height {} already holds block {hash}",
                block.height
            )));
        }

        tx.execute(
            "INSERT INTO blocks (height, hash, previous_hash, proposer, timestamp, nonce, signature)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                block.height,
                block.hash.to_hex(),
                block.previous_hash.to_hex(),
                block.proposer,
                block.timestamp,
                block.nonce,
                block.signature,
            ],
        )
        .map_err(StorageError::from)?;

        for fact in facts {
            insert_fact_row_if_absent(&tx, fact)?;
        }

        for (position, fact_hash) in block.fact_hashes.iter().enumerate() {
            tx.execute(
                "INSERT INTO block_facts (fact_hash, block_height, position) VALUES (?1, ?2, ?3)",
                params![fact_hash.to_hex(), block.height, position as i64],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(f, _)
                    if f.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StorageError::Conflict(format!("fact {fact_hash} already sealed"))
                }
                other => StorageError::from(other),
            })?;
        }

        tx.commit().map_err(StorageError::from)?;
        debug!(height = block.height, hash = %block.hash, facts = block.fact_hashes.len(), "block appended");
        Ok(AppendOutcome::Inserted)
    }

    /// Height of the block sealing `hash`, if any.
    pub fn sealed_in(&self, hash: &Hash256) -> Result<Option<u64>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT block_height FROM block_facts WHERE fact_hash = ?1",
                params![hash.to_hex()],
                |row| row.get(0),
            )
            .optional()
        })
    }

    // ------------------------------------------------------------------
    // Facts
    // ------------------------------------------------------------------

    /// Inserts a brand-new fact (score 1) and returns it with its assigned
    /// id. The content hash must not already exist.
    pub fn insert_fact(
        &self,
        content: &str,
        semantics: &serde_json::Value,
        created_at: u64,
    ) -> Result<Fact> {
        let content = content.trim();
        let hash = Fact::compute_hash(content);
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO facts (hash, content, semantics, disputed, score, created_at)
                 VALUES (?1, ?2, ?3, 0, 1, ?4)",
                params![hash.to_hex(), content, semantics.to_string(), created_at],
            )?;
            Ok(conn.last_insert_rowid() as u64)
        })?;
        Ok(Fact {
            id,
            hash,
            content: content.to_string(),
            semantics: semantics.clone(),
            disputed: false,
            score: 1,
            created_at,
            sources: Vec::new(),
        })
    }

    /// Fetches a fact (with sources) by content hash.
    pub fn get_fact_by_hash(&self, hash: &Hash256) -> Result<Option<Fact>> {
        self.with_conn(|conn| read_fact(conn, "hash = ?1", params![hash.to_hex()]))
    }

    /// Fetches a fact (with sources) by id.
    pub fn get_fact_by_id(&self, id: u64) -> Result<Option<Fact>> {
        self.with_conn(|conn| read_fact(conn, "id = ?1", params![id]))
    }

    /// All fact ids, ascending.
    pub fn list_fact_ids(&self) -> Result<Vec<u64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM facts ORDER BY id ASC")?;
            let ids = stmt.query_map([], |row| row.get(0))?.collect();
            ids
        })
    }

    /// Facts for the given ids; unknown ids are skipped.
    pub fn facts_by_ids(&self, ids: &[u64]) -> Result<Vec<Fact>> {
        let mut facts = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(fact) = self.get_fact_by_id(*id)? {
                facts.push(fact);
            }
        }
        Ok(facts)
    }

    /// Facts for the given hashes; unknown hashes are skipped.
    pub fn facts_by_hashes(&self, hashes: &[Hash256]) -> Result<Vec<Fact>> {
        let mut facts = Vec::with_capacity(hashes.len());
        for hash in hashes {
            if let Some(fact) = self.get_fact_by_hash(hash)? {
                facts.push(fact);
            }
        }
        Ok(facts)
    }

    /// Trusted (score >= 2, undisputed), unsealed facts ordered by id then
    /// hash, at most `limit`. This is the proposal payload query.
    pub fn list_unsealed_trusted_facts(&self, limit: usize) -> Result<Vec<Fact>> {
        let ids = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM facts
                 WHERE score >= 2 AND disputed = 0
                   AND hash NOT IN (SELECT fact_hash FROM block_facts)
                 ORDER BY id ASC, hash ASC LIMIT ?1",
            )?;
            let ids = stmt
                .query_map(params![limit as i64], |row| row.get::<_, u64>(0))?
                .collect::<rusqlite::Result<Vec<u64>>>();
            ids
        })?;
        self.facts_by_ids(&ids)
    }

    /// Attaches a source domain to a fact. Returns `true` when the domain is
    /// new for this fact (the caller then counts a corroboration).
    pub fn attach_source(&self, fact_id: u64, domain: &str, now: u64) -> Result<bool> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO sources (domain) VALUES (?1)",
                params![domain],
            )?;
            let source_id: i64 = tx.query_row(
                "SELECT id FROM sources WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO fact_sources (fact_id, source_id, retrieved_at)
                 VALUES (?1, ?2, ?3)",
                params![fact_id, source_id, now],
            )?;
            tx.commit()?;
            Ok(inserted > 0)
        })
    }

    /// Increments a fact's corroboration score and returns the new value.
    pub fn increment_score(&self, fact_id: u64) -> Result<u32> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE facts SET score = score + 1 WHERE id = ?1",
                params![fact_id],
            )?;
            conn.query_row(
                "SELECT score FROM facts WHERE id = ?1",
                params![fact_id],
                |row| row.get(0),
            )
        })
    }

    /// Marks two facts as disputed and links them with a `contrast` edge.
    /// The transition is one-way: a disputed fact never becomes trusted.
    pub fn mark_disputed(&self, fact_a: u64, fact_b: u64) -> Result<()> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            for id in [fact_a, fact_b] {
                tx.execute("UPDATE facts SET disputed = 1 WHERE id = ?1", params![id])?;
            }
            tx.execute(
                "INSERT INTO fact_links (fact_a, fact_b, kind) VALUES (?1, ?2, ?3)",
                params![fact_a, fact_b, RelationKind::Contrast.as_str()],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Inserts a knowledge-graph edge between two facts.
    pub fn insert_link(&self, fact_a: u64, fact_b: u64, kind: &RelationKind) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO fact_links (fact_a, fact_b, kind) VALUES (?1, ?2, ?3)",
                params![fact_a, fact_b, kind.as_str()],
            )?;
            Ok(())
        })
    }

    /// All edges touching a fact.
    pub fn links_of(&self, fact_id: u64) -> Result<Vec<FactLink>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT fact_a, fact_b, kind FROM fact_links
                 WHERE fact_a = ?1 OR fact_b = ?1",
            )?;
            let links = stmt
                .query_map(params![fact_id], |row| {
                    Ok(FactLink {
                        fact_a: row.get(0)?,
                        fact_b: row.get(1)?,
                        kind: RelationKind::parse(&row.get::<_, String>(2)?),
                    })
                })?
                .collect();
            links
        })
    }

    // ------------------------------------------------------------------
    // Peers and validators
    // ------------------------------------------------------------------

    /// Inserts or refreshes a peer record.
    pub fn upsert_peer(&self, peer: &PeerRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO peers (addr, pubkey, first_seen, last_seen, reputation)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(addr) DO UPDATE SET
                   pubkey = excluded.pubkey,
                   last_seen = excluded.last_seen,
                   reputation = excluded.reputation",
                params![
                    peer.addr,
                    peer.pubkey,
                    peer.first_seen,
                    peer.last_seen,
                    peer.reputation
                ],
            )?;
            Ok(())
        })
    }

    /// Peers with at least `min_reputation`, best first, at most `limit`.
    pub fn list_peers(&self, min_reputation: i32, limit: usize) -> Result<Vec<PeerRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT addr, pubkey, first_seen, last_seen, reputation FROM peers
                 WHERE reputation >= ?1 ORDER BY reputation DESC, last_seen DESC LIMIT ?2",
            )?;
            let peers = stmt
                .query_map(params![min_reputation, limit as i64], |row| {
                    Ok(PeerRecord {
                        addr: row.get(0)?,
                        pubkey: row.get(1)?,
                        first_seen: row.get(2)?,
                        last_seen: row.get(3)?,
                        reputation: row.get(4)?,
                    })
                })?
                .collect();
            peers
        })
    }

    /// Inserts or updates a validator's stake and public key.
    pub fn upsert_validator(&self, validator: &ValidatorRecord) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO validators (fingerprint, pubkey, stake) VALUES (?1, ?2, ?3)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                   pubkey = CASE WHEN excluded.pubkey != '' THEN excluded.pubkey ELSE validators.pubkey END,
                   stake = excluded.stake",
                params![validator.fingerprint, validator.pubkey, validator.stake],
            )?;
            Ok(())
        })
    }

    /// Looks up a validator by fingerprint.
    pub fn get_validator(&self, fingerprint: &str) -> Result<Option<ValidatorRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT fingerprint, pubkey, stake FROM validators WHERE fingerprint = ?1",
                params![fingerprint],
                |row| {
                    Ok(ValidatorRecord {
                        fingerprint: row.get(0)?,
                        pubkey: row.get(1)?,
                        stake: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    /// Validators with stake > 0, in canonical (ascending fingerprint) order.
    pub fn active_validators(&self) -> Result<Vec<ValidatorRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT fingerprint, pubkey, stake FROM validators
                 WHERE stake > 0 ORDER BY fingerprint ASC",
            )?;
            let validators = stmt
                .query_map([], |row| {
                    Ok(ValidatorRecord {
                        fingerprint: row.get(0)?,
                        pubkey: row.get(1)?,
                        stake: row.get(2)?,
                    })
                })?
                .collect();
            validators
        })
    }

    // ------------------------------------------------------------------
    // Single-vote guard
    // ------------------------------------------------------------------

    /// Reserves `height` for signing. The reservation is persisted before
    /// any signature is produced; a second reservation for the same (or a
    /// lower) height fails, enforcing one proposal per height.
    pub fn reserve_signed_height(&self, height: u64) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StorageError::from)?;
        let last: Option<u64> = tx
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![META_LAST_SIGNED],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(StorageError::from)?
            .and_then(|s| s.parse().ok());
        if let Some(last) = last {
            if height <= last {
                return Err(StorageError::AlreadySigned { height, last });
            }
        }
        tx.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![META_LAST_SIGNED, height.to_string()],
        )
        .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Highest height a signature was issued for, if any.
    pub fn last_signed_height(&self) -> Result<Option<u64>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM meta WHERE key = ?1",
                    params![META_LAST_SIGNED],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .and_then(|s| s.parse().ok()))
        })
    }

    // ------------------------------------------------------------------
    // Startup invariant check
    // ------------------------------------------------------------------

    /// Walks the chain verifying the structural invariants: contiguous
    /// heights, each block linked to its parent's hash, and every sealed
    /// fact hash resolving to a stored fact. Any violation is fatal.
    pub fn check_invariants(&self) -> Result<()> {
        let Some(tip) = self.chain_height()? else {
            return Ok(());
        };
        let mut previous: Option<Block> = None;
        for height in 0..=tip {
            let block = self.get_block_by_height(height)?.ok_or_else(|| {
                StorageError::InvariantViolation(format!("height gap at {height}"))
            })?;
            if let Some(prev) = &previous {
                if block.previous_hash != prev.hash {
                    return Err(StorageError::InvariantViolation(format!(
                        "block {} previous_hash {} does not match parent hash {}",
                        height, block.previous_hash, prev.hash
                    )));
                }
            } else if !block.previous_hash.is_zero() {
                return Err(StorageError::InvariantViolation(
                    "genesis previous_hash is not zero".into(),
                ));
            }
            for fact_hash in &block.fact_hashes {
                if self.get_fact_by_hash(fact_hash)?.is_none() {
                    return Err(StorageError::InvariantViolation(format!(
                        "block {height} references missing fact {fact_hash}"
                    )));
                }
            }
            previous = Some(block);
        }
        debug!(tip, "chain invariants verified");
        Ok(())
    }
}

// ----------------------------------------------------------------------
// Row helpers
// ----------------------------------------------------------------------

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS facts (
            id INTEGER PRIMARY KEY,
            hash TEXT UNIQUE NOT NULL,
            content TEXT NOT NULL,
            semantics TEXT NOT NULL DEFAULT '{}',
            disputed INTEGER NOT NULL DEFAULT 0,
            score INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS sources (
            id INTEGER PRIMARY KEY,
            domain TEXT UNIQUE NOT NULL
        );
        CREATE TABLE IF NOT EXISTS fact_sources (
            fact_id INTEGER NOT NULL REFERENCES facts(id),
            source_id INTEGER NOT NULL REFERENCES sources(id),
            retrieved_at INTEGER NOT NULL,
            PRIMARY KEY (fact_id, source_id)
        );
        CREATE TABLE IF NOT EXISTS fact_links (
            id INTEGER PRIMARY KEY,
            fact_a INTEGER NOT NULL REFERENCES facts(id),
            fact_b INTEGER NOT NULL REFERENCES facts(id),
            kind TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS blocks (
            height INTEGER PRIMARY KEY,
            hash TEXT UNIQUE NOT NULL,
            previous_hash TEXT NOT NULL,
            proposer TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            nonce INTEGER NOT NULL DEFAULT 0,
            signature TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS block_facts (
            fact_hash TEXT PRIMARY KEY,
            block_height INTEGER NOT NULL REFERENCES blocks(height),
            position INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS peers (
            addr TEXT PRIMARY KEY,
            pubkey TEXT NOT NULL DEFAULT '',
            first_seen INTEGER NOT NULL,
            last_seen INTEGER NOT NULL,
            reputation INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS validators (
            fingerprint TEXT PRIMARY KEY,
            pubkey TEXT NOT NULL DEFAULT '',
            stake INTEGER NOT NULL DEFAULT 0
        );
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
        params![SCHEMA_VERSION.to_string()],
    )?;
    Ok(())
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn read_block(
    conn: &Connection,
    where_clause: &str,
    args: impl rusqlite::Params,
) -> rusqlite::Result<Option<Block>> {
    let sql = format!(
        "SELECT height, hash, previous_hash, proposer, timestamp, nonce, signature
         FROM blocks WHERE {where_clause}"
    );
    let row = conn
        .query_row(&sql, args, |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, u64>(4)?,
                row.get::<_, u64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .optional()?;
    let Some((height, hash, previous_hash, proposer, timestamp, nonce, signature)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT fact_hash FROM block_facts WHERE block_height = ?1 ORDER BY position ASC",
    )?;
    let fact_hashes: Vec<Hash256> = stmt
        .query_map(params![height], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?
        .into_iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    Ok(Some(Block {
        height,
        hash: hash.parse().map_err(|_| invalid_column(1))?,
        previous_hash: previous_hash.parse().map_err(|_| invalid_column(2))?,
        fact_hashes,
        proposer,
        timestamp,
        nonce,
        signature,
    }))
}

fn read_fact(
    conn: &Connection,
    where_clause: &str,
    args: impl rusqlite::Params,
) -> rusqlite::Result<Option<Fact>> {
    let sql = format!(
        "SELECT id, hash, content, semantics, disputed, score, created_at
         FROM facts WHERE {where_clause}"
    );
    let row = conn
        .query_row(&sql, args, |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, bool>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, u64>(6)?,
            ))
        })
        .optional()?;
    let Some((id, hash, content, semantics, disputed, score, created_at)) = row else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT s.domain, fs.retrieved_at FROM fact_sources fs
         JOIN sources s ON s.id = fs.source_id
         WHERE fs.fact_id = ?1 ORDER BY fs.retrieved_at ASC",
    )?;
    let sources: Vec<SourceRecord> = stmt
        .query_map(params![id], |row| {
            Ok(SourceRecord {
                domain: row.get(0)?,
                retrieved_at: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<_>>()?;

    Ok(Some(Fact {
        id,
        hash: hash.parse().map_err(|_| invalid_column(1))?,
        content,
        semantics: serde_json::from_str(&semantics).unwrap_or_else(|_| serde_json::json!({})),
        disputed,
        score,
        created_at,
        sources,
    }))
}

fn insert_fact_row_if_absent(tx: &rusqlite::Transaction<'_>, fact: &Fact) -> Result<()> {
    tx.execute(
        "INSERT OR IGNORE INTO facts (id, hash, content, semantics, disputed, score, created_at)
         VALUES (NULL, ?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            fact.hash.to_hex(),
            fact.content,
            fact.semantics.to_string(),
            fact.disputed,
            fact.score,
            fact.created_at,
        ],
    )
    .map_err(StorageError::from)?;
    Ok(())
}

fn invalid_column(index: usize) -> rusqlite::Error {
    rusqlite::Error::InvalidColumnType(index, "hash".into(), rusqlite::types::Type::Text)
}
