//! Durable keyed storage of invoices.
//!
//! The store is the only mutable shared resource. Implementations guarantee:
//!
//! - `deposit_address` uniqueness is enforced at insert time and reported as
//!   [`StoreError::AddressConflict`], never as a generic failure.
//! - [`InvoiceStore::update`] is an atomic read-modify-write per invoice id.
//!   Only `status` and `paid_at` are ever written back; every other field is
//!   fixed at insert.
//! - Listings are ordered by `created_at` descending, ties broken by insertion
//!   order (newest first).

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::invoice::{Invoice, InvoiceId, InvoiceStatus};

/// Result of an [`InvoiceStore::update`] on an existing invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateResult {
    /// The closure produced a new value and it was persisted.
    Written(Invoice),
    /// The closure declined; the stored value is returned as-is.
    Unchanged(Invoice),
}

impl UpdateResult {
    pub fn invoice(&self) -> &Invoice {
        match self {
            UpdateResult::Written(inv) | UpdateResult::Unchanged(inv) => inv,
        }
    }

    pub fn into_invoice(self) -> Invoice {
        match self {
            UpdateResult::Written(inv) | UpdateResult::Unchanged(inv) => inv,
        }
    }
}

/// Trait for invoice storage backends.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait InvoiceStore: Send + Sync {
    /// Persist a new invoice. Fails with [`StoreError::AddressConflict`] if its
    /// deposit address is already taken.
    fn insert(&self, invoice: &Invoice) -> Result<(), StoreError>;

    fn get(&self, id: &InvoiceId) -> Result<Option<Invoice>, StoreError>;

    /// Exact-match lookup by deposit address.
    fn find_by_address(&self, address: &str) -> Result<Option<Invoice>, StoreError>;

    fn list_by_issuer(&self, issuer_contact: &str) -> Result<Vec<Invoice>, StoreError>;

    fn list_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>, StoreError>;

    /// Atomically load invoice `id`, pass it to `apply`, and persist the
    /// returned value's `status`/`paid_at` if `apply` returns `Some`.
    ///
    /// Returns `Ok(None)` if no such invoice exists.
    fn update(
        &self,
        id: &InvoiceId,
        apply: &dyn Fn(&Invoice) -> Option<Invoice>,
    ) -> Result<Option<UpdateResult>, StoreError>;
}

struct Stored {
    seq: u64,
    invoice: Invoice,
}

/// In-memory store backed by DashMap. Fast but lost on restart.
///
/// Per-id updates hold only that entry's shard lock, so unrelated invoices
/// never wait on each other.
pub struct InMemoryInvoiceStore {
    invoices: DashMap<InvoiceId, Stored>,
    addresses: DashMap<String, InvoiceId>,
    next_seq: AtomicU64,
}

impl InMemoryInvoiceStore {
    pub fn new() -> Self {
        Self {
            invoices: DashMap::new(),
            addresses: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    fn list_where(&self, keep: impl Fn(&Invoice) -> bool) -> Vec<Invoice> {
        let mut matched: Vec<(u64, Invoice)> = self
            .invoices
            .iter()
            .filter(|e| keep(&e.invoice))
            .map(|e| (e.seq, e.invoice.clone()))
            .collect();
        matched.sort_by(|(sa, a), (sb, b)| b.created_at.cmp(&a.created_at).then(sb.cmp(sa)));
        matched.into_iter().map(|(_, inv)| inv).collect()
    }
}

impl Default for InMemoryInvoiceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InvoiceStore for InMemoryInvoiceStore {
    fn insert(&self, invoice: &Invoice) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;
        // Lock order is always addresses -> invoices.
        match self.addresses.entry(invoice.deposit_address.clone()) {
            Entry::Occupied(_) => Err(StoreError::AddressConflict(
                invoice.deposit_address.clone(),
            )),
            Entry::Vacant(slot) => {
                let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
                self.invoices.insert(
                    invoice.id,
                    Stored {
                        seq,
                        invoice: invoice.clone(),
                    },
                );
                slot.insert(invoice.id);
                Ok(())
            }
        }
    }

    fn get(&self, id: &InvoiceId) -> Result<Option<Invoice>, StoreError> {
        Ok(self.invoices.get(id).map(|e| e.invoice.clone()))
    }

    fn find_by_address(&self, address: &str) -> Result<Option<Invoice>, StoreError> {
        let id = match self.addresses.get(address) {
            Some(id) => *id,
            None => return Ok(None),
        };
        self.get(&id)
    }

    fn list_by_issuer(&self, issuer_contact: &str) -> Result<Vec<Invoice>, StoreError> {
        Ok(self.list_where(|inv| inv.issuer_contact == issuer_contact))
    }

    fn list_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>, StoreError> {
        Ok(self.list_where(|inv| inv.status == status))
    }

    fn update(
        &self,
        id: &InvoiceId,
        apply: &dyn Fn(&Invoice) -> Option<Invoice>,
    ) -> Result<Option<UpdateResult>, StoreError> {
        let Some(mut entry) = self.invoices.get_mut(id) else {
            return Ok(None);
        };
        match apply(&entry.invoice) {
            Some(next) => {
                entry.invoice.status = next.status;
                entry.invoice.paid_at = next.paid_at;
                Ok(Some(UpdateResult::Written(entry.invoice.clone())))
            }
            None => Ok(Some(UpdateResult::Unchanged(entry.invoice.clone()))),
        }
    }
}

/// Persistent store backed by SQLite. Survives restarts.
///
/// Address uniqueness is a `UNIQUE` column constraint, so it holds across
/// processes sharing the database file.
pub struct SqliteInvoiceStore {
    conn: Mutex<Connection>,
}

const SELECT_COLUMNS: &str = "id, issuer_contact, payer_name, payer_contact, amount, memo, \
     deposit_address, status, created_at, paid_at, expires_at";

impl SqliteInvoiceStore {
    /// Open (or create) an invoice database at `path`. `":memory:"` gives a
    /// private in-process database.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS invoices (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                issuer_contact TEXT NOT NULL,
                payer_name TEXT NOT NULL,
                payer_contact TEXT,
                amount TEXT NOT NULL,
                memo TEXT NOT NULL,
                deposit_address TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                paid_at INTEGER,
                expires_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_invoices_issuer ON invoices(issuer_contact, created_at);
            CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);
            PRAGMA journal_mode=WAL;",
        )?;

        // Invoices carry contact details; keep the file owner-only.
        #[cfg(unix)]
        if path != ":memory:" {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to set invoice database file permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn query_list(
        &self,
        filter: &str,
        value: &dyn rusqlite::ToSql,
    ) -> Result<Vec<Invoice>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLUMNS} FROM invoices WHERE {filter} = ?1 \
             ORDER BY created_at DESC, seq DESC"
        ))?;
        let rows = stmt
            .query_map(params![value], read_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(Invoice::try_from).collect()
    }
}

fn query_one(
    conn: &Connection,
    filter: &str,
    value: &str,
) -> Result<Option<Invoice>, StoreError> {
    conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM invoices WHERE {filter} = ?1"),
        params![value],
        read_row,
    )
    .optional()?
    .map(Invoice::try_from)
    .transpose()
}

impl InvoiceStore for SqliteInvoiceStore {
    fn insert(&self, invoice: &Invoice) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO invoices (id, issuer_contact, payer_name, payer_contact, amount, memo,
                                  deposit_address, status, created_at, paid_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                invoice.id.to_string(),
                invoice.issuer_contact,
                invoice.payer_name,
                invoice.payer_contact,
                invoice.amount.to_string(),
                invoice.memo,
                invoice.deposit_address,
                invoice.status.as_str(),
                invoice.created_at.timestamp_micros(),
                invoice.paid_at.map(|t| t.timestamp_micros()),
                invoice.expires_at.map(|t| t.timestamp_micros()),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &InvoiceId) -> Result<Option<Invoice>, StoreError> {
        let conn = self.lock()?;
        query_one(&conn, "id", &id.to_string())
    }

    fn find_by_address(&self, address: &str) -> Result<Option<Invoice>, StoreError> {
        let conn = self.lock()?;
        query_one(&conn, "deposit_address", address)
    }

    fn list_by_issuer(&self, issuer_contact: &str) -> Result<Vec<Invoice>, StoreError> {
        self.query_list("issuer_contact", &issuer_contact)
    }

    fn list_by_status(&self, status: InvoiceStatus) -> Result<Vec<Invoice>, StoreError> {
        self.query_list("status", &status.as_str())
    }

    fn update(
        &self,
        id: &InvoiceId,
        apply: &dyn Fn(&Invoice) -> Option<Invoice>,
    ) -> Result<Option<UpdateResult>, StoreError> {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so other processes on the
        // same file cannot interleave between the read and the write.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(current) = query_one(&tx, "id", &id.to_string())? else {
            return Ok(None);
        };

        let result = match apply(&current) {
            Some(next) => {
                tx.execute(
                    "UPDATE invoices SET status = ?1, paid_at = ?2 WHERE id = ?3",
                    params![
                        next.status.as_str(),
                        next.paid_at.map(|t| t.timestamp_micros()),
                        id.to_string(),
                    ],
                )?;
                UpdateResult::Written(Invoice {
                    status: next.status,
                    paid_at: next.paid_at,
                    ..current
                })
            }
            None => UpdateResult::Unchanged(current),
        };

        tx.commit()?;
        Ok(Some(result))
    }
}

/// Column values as stored, before decoding.
struct InvoiceRow {
    id: String,
    issuer_contact: String,
    payer_name: String,
    payer_contact: Option<String>,
    amount: String,
    memo: String,
    deposit_address: String,
    status: String,
    created_at: i64,
    paid_at: Option<i64>,
    expires_at: Option<i64>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<InvoiceRow> {
    Ok(InvoiceRow {
        id: row.get(0)?,
        issuer_contact: row.get(1)?,
        payer_name: row.get(2)?,
        payer_contact: row.get(3)?,
        amount: row.get(4)?,
        memo: row.get(5)?,
        deposit_address: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        paid_at: row.get(9)?,
        expires_at: row.get(10)?,
    })
}

fn micros(value: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp_micros(value)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {value}")))
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: row
                .id
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("id {:?}: {e}", row.id)))?,
            issuer_contact: row.issuer_contact,
            payer_name: row.payer_name,
            payer_contact: row.payer_contact,
            amount: row
                .amount
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("amount {:?}: {e}", row.amount)))?,
            memo: row.memo,
            deposit_address: row.deposit_address,
            status: row
                .status
                .parse()
                .map_err(|e| StoreError::Corrupt(format!("{e}")))?,
            created_at: micros(row.created_at)?,
            paid_at: row.paid_at.map(micros).transpose()?,
            expires_at: row.expires_at.map(micros).transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoice::{now, CreateInvoice};
    use chrono::Duration;

    fn invoice(issuer: &str, address: &str) -> Invoice {
        Invoice::open(
            CreateInvoice {
                issuer_contact: issuer.to_string(),
                payer_name: "Acme".to_string(),
                payer_contact: None,
                amount: "100.00".parse().unwrap(),
                memo: "work".to_string(),
            },
            address.to_string(),
            now(),
        )
    }

    fn stores() -> Vec<Box<dyn InvoiceStore>> {
        vec![
            Box::new(InMemoryInvoiceStore::new()),
            Box::new(SqliteInvoiceStore::open(":memory:").unwrap()),
        ]
    }

    #[test]
    fn test_insert_and_lookup() {
        for store in stores() {
            let inv = invoice("dev@example.com", "0xabc");
            store.insert(&inv).unwrap();

            assert_eq!(store.get(&inv.id).unwrap(), Some(inv.clone()));
            assert_eq!(store.find_by_address("0xabc").unwrap(), Some(inv.clone()));
            assert_eq!(store.find_by_address("0xABC").unwrap(), None);
            assert_eq!(store.get(&InvoiceId::new()).unwrap(), None);
        }
    }

    #[test]
    fn test_duplicate_address_is_conflict() {
        for store in stores() {
            store.insert(&invoice("a@example.com", "0xdup")).unwrap();
            let err = store.insert(&invoice("b@example.com", "0xdup")).unwrap_err();
            assert!(matches!(err, StoreError::AddressConflict(_)), "got {err:?}");
            assert_eq!(store.list_by_issuer("b@example.com").unwrap().len(), 0);
        }
    }

    #[test]
    fn test_list_by_issuer_newest_first_with_ties() {
        for store in stores() {
            let t0 = now();
            let mut older = invoice("dev@example.com", "0x1");
            older.created_at = t0 - Duration::seconds(10);
            let mut tie_a = invoice("dev@example.com", "0x2");
            tie_a.created_at = t0;
            let mut tie_b = invoice("dev@example.com", "0x3");
            tie_b.created_at = t0;
            let other = invoice("other@example.com", "0x4");

            store.insert(&older).unwrap();
            store.insert(&tie_a).unwrap();
            store.insert(&tie_b).unwrap();
            store.insert(&other).unwrap();

            let ids: Vec<_> = store
                .list_by_issuer("dev@example.com")
                .unwrap()
                .into_iter()
                .map(|i| i.id)
                .collect();
            assert_eq!(ids, vec![tie_b.id, tie_a.id, older.id]);
        }
    }

    #[test]
    fn test_update_writes_only_status_and_paid_at() {
        for store in stores() {
            let inv = invoice("dev@example.com", "0xabc");
            store.insert(&inv).unwrap();
            let t = now();

            let result = store
                .update(&inv.id, &|cur| {
                    let mut next = cur.with_status(InvoiceStatus::Paid, t);
                    next.amount = "1.00".parse().unwrap();
                    Some(next)
                })
                .unwrap()
                .unwrap();

            let written = match result {
                UpdateResult::Written(i) => i,
                other => panic!("expected write, got {other:?}"),
            };
            assert_eq!(written.status, InvoiceStatus::Paid);
            assert_eq!(written.paid_at, Some(t));
            assert_eq!(written.amount, inv.amount);
            assert_eq!(store.get(&inv.id).unwrap().unwrap(), written);
            assert_eq!(store.list_by_status(InvoiceStatus::Paid).unwrap().len(), 1);
            assert!(store.list_by_status(InvoiceStatus::Pending).unwrap().is_empty());
        }
    }

    #[test]
    fn test_update_declined_and_missing() {
        for store in stores() {
            let inv = invoice("dev@example.com", "0xabc");
            store.insert(&inv).unwrap();

            let result = store.update(&inv.id, &|_| None).unwrap();
            assert_eq!(result, Some(UpdateResult::Unchanged(inv.clone())));

            assert!(store.update(&InvoiceId::new(), &|_| None).unwrap().is_none());
        }
    }
}
