use std::collections::HashMap;

use crate::common::config::{Lsn, TxnId};

pub type Key = String;
pub type Value = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogRecordType {
    Begin,
    Commit,
    Abort,
    Insert,
    Delete,
    Update,
}

/// One entry of the write-ahead log. `prev_lsn` chains every record of a
/// single transaction backwards to its `Begin`; `Rollback` walks that
/// chain to undo a loser.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub lsn: Lsn,
    pub prev_lsn: Option<Lsn>,
    pub txn_id: TxnId,
    pub record_type: LogRecordType,
    pub old_key: Option<Key>,
    pub old_val: Option<Value>,
    pub new_key: Option<Key>,
    pub new_val: Option<Value>,
}

impl LogRecord {
    pub fn begin(lsn: Lsn, txn_id: TxnId, prev_lsn: Option<Lsn>) -> Self {
        Self {
            lsn,
            prev_lsn,
            txn_id,
            record_type: LogRecordType::Begin,
            old_key: None,
            old_val: None,
            new_key: None,
            new_val: None,
        }
    }

    pub fn commit(lsn: Lsn, txn_id: TxnId, prev_lsn: Option<Lsn>) -> Self {
        Self {
            lsn,
            prev_lsn,
            txn_id,
            record_type: LogRecordType::Commit,
            old_key: None,
            old_val: None,
            new_key: None,
            new_val: None,
        }
    }

    pub fn abort(lsn: Lsn, txn_id: TxnId, prev_lsn: Option<Lsn>) -> Self {
        Self {
            lsn,
            prev_lsn,
            txn_id,
            record_type: LogRecordType::Abort,
            old_key: None,
            old_val: None,
            new_key: None,
            new_val: None,
        }
    }

    pub fn insert(lsn: Lsn, txn_id: TxnId, prev_lsn: Option<Lsn>, new_key: Key, new_val: Value) -> Self {
        Self {
            lsn,
            prev_lsn,
            txn_id,
            record_type: LogRecordType::Insert,
            old_key: None,
            old_val: None,
            new_key: Some(new_key),
            new_val: Some(new_val),
        }
    }

    pub fn delete(lsn: Lsn, txn_id: TxnId, prev_lsn: Option<Lsn>, old_key: Key, old_val: Value) -> Self {
        Self {
            lsn,
            prev_lsn,
            txn_id,
            record_type: LogRecordType::Delete,
            old_key: Some(old_key),
            old_val: Some(old_val),
            new_key: None,
            new_val: None,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn update(
        lsn: Lsn,
        txn_id: TxnId,
        prev_lsn: Option<Lsn>,
        old_key: Key,
        old_val: Value,
        new_key: Key,
        new_val: Value,
    ) -> Self {
        Self {
            lsn,
            prev_lsn,
            txn_id,
            record_type: LogRecordType::Update,
            old_key: Some(old_key),
            old_val: Some(old_val),
            new_key: Some(new_key),
            new_val: Some(new_val),
        }
    }
}

/// Snapshot the recovery manager starts from: the last LSN known to be
/// durable, which transactions were still active at that point, and the
/// data those transactions' committed predecessors had already produced.
#[derive(Debug, Clone, Default)]
pub struct CheckPoint {
    pub checkpoint_lsn: Option<Lsn>,
    pub active_txns: HashMap<TxnId, Lsn>,
    pub persist_data: HashMap<Key, Value>,
}

impl CheckPoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_active_txn(&mut self, txn_id: TxnId, last_lsn: Lsn) {
        self.active_txns.insert(txn_id, last_lsn);
    }

    pub fn add_data(&mut self, key: Key, val: Value) {
        self.persist_data.insert(key, val);
    }
}
