use std::collections::{BTreeMap, HashMap};

use crate::common::config::{Lsn, TxnId};

use super::log_record::{CheckPoint, Key, LogRecord, LogRecordType, Value};

/// Replays a checkpoint plus its trailing log against an in-memory KV
/// store, bringing `data` back to "committed-only" state. Operates over
/// an abstract log-record stream; an on-disk log reader feeds it the same
/// records in the same order.
pub struct RecoveryManager {
    log_recs: BTreeMap<Lsn, LogRecord>,
    persist_lsn: Option<Lsn>,
    active_txns: HashMap<TxnId, Lsn>,
    data: HashMap<Key, Value>,
}

impl Default for RecoveryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryManager {
    pub fn new() -> Self {
        Self {
            log_recs: BTreeMap::new(),
            persist_lsn: None,
            active_txns: HashMap::new(),
            data: HashMap::new(),
        }
    }

    /// Test/replay-only: feed one log record into the in-memory log.
    pub fn append_log_record(&mut self, record: LogRecord) {
        self.log_recs.insert(record.lsn, record);
    }

    pub fn data(&self) -> &HashMap<Key, Value> {
        &self.data
    }

    pub fn active_txns(&self) -> &HashMap<TxnId, Lsn> {
        &self.active_txns
    }

    /// Adopts the checkpoint's starting point: its LSN, its active
    /// transaction table, and the data it already knew to be durable.
    pub fn init(&mut self, checkpoint: CheckPoint) {
        self.persist_lsn = checkpoint.checkpoint_lsn;
        self.active_txns = checkpoint.active_txns;
        self.data = checkpoint.persist_data;
    }

    /// Replays every record after the checkpoint LSN in ascending order,
    /// applying its effect and tracking which transactions are still
    /// open.
    pub fn redo(&mut self) {
        let records: Vec<LogRecord> = self
            .log_recs
            .range(self.next_redo_bound()..)
            .map(|(_, r)| r.clone())
            .collect();

        for record in records {
            self.active_txns.insert(record.txn_id, record.lsn);
            match record.record_type {
                LogRecordType::Begin => {}
                LogRecordType::Insert => {
                    self.data.insert(record.new_key.clone().unwrap(), record.new_val.clone().unwrap());
                }
                LogRecordType::Delete => {
                    self.data.remove(record.old_key.as_ref().unwrap());
                }
                LogRecordType::Update => {
                    self.data.remove(record.old_key.as_ref().unwrap());
                    self.data.insert(record.new_key.clone().unwrap(), record.new_val.clone().unwrap());
                }
                LogRecordType::Commit => {
                    self.active_txns.remove(&record.txn_id);
                }
                LogRecordType::Abort => {
                    self.rollback(record.txn_id);
                    self.active_txns.remove(&record.txn_id);
                }
            }
        }
    }

    fn next_redo_bound(&self) -> Lsn {
        match self.persist_lsn {
            Some(lsn) => lsn + 1,
            None => 0,
        }
    }

    /// Rolls back every transaction still open after redo, then clears
    /// the active set.
    pub fn undo(&mut self) {
        let txn_ids: Vec<TxnId> = self.active_txns.keys().copied().collect();
        for txn_id in txn_ids {
            self.rollback(txn_id);
        }
        self.active_txns.clear();
    }

    /// Walks `prev_lsn` pointers from the transaction's last known LSN,
    /// inverting each record's effect. Stops at an absent `prev_lsn` or a
    /// missing record — safe to call twice against the same chain.
    pub fn rollback(&mut self, txn_id: TxnId) {
        let mut cursor = self.active_txns.get(&txn_id).copied();
        while let Some(lsn) = cursor {
            let Some(record) = self.log_recs.get(&lsn) else {
                break;
            };
            match record.record_type {
                LogRecordType::Insert => {
                    self.data.remove(record.new_key.as_ref().unwrap());
                }
                LogRecordType::Delete => {
                    self.data
                        .insert(record.old_key.clone().unwrap(), record.old_val.clone().unwrap());
                }
                LogRecordType::Update => {
                    self.data.remove(record.new_key.as_ref().unwrap());
                    self.data
                        .insert(record.old_key.clone().unwrap(), record.old_val.clone().unwrap());
                }
                LogRecordType::Begin | LogRecordType::Commit | LogRecordType::Abort => {}
            }
            cursor = record.prev_lsn;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> Key {
        s.to_string()
    }
    fn v(s: &str) -> Value {
        s.to_string()
    }

    /// Scenario 6: CheckPoint{lsn=10, active={T1:9}, data={k1:v1}}. Log:
    /// 11 Insert(T1,k2,v2), 12 Update(T1,k2→k3,v3), 13 Commit(T1),
    /// 14 Begin(T2), 15 Insert(T2,k4,v4). After redo+undo:
    /// data = {k1:v1, k3:v3}, active_txns empty.
    #[test]
    fn recovery_scenario_matches_spec() {
        let mut checkpoint = CheckPoint::new();
        checkpoint.checkpoint_lsn = Some(10);
        checkpoint.add_active_txn(1, 9);
        checkpoint.add_data(k("k1"), v("v1"));

        let mut rm = RecoveryManager::new();
        rm.append_log_record(LogRecord::insert(11, 1, Some(9), k("k2"), v("v2")));
        rm.append_log_record(LogRecord::update(12, 1, Some(11), k("k2"), v("v2"), k("k3"), v("v3")));
        rm.append_log_record(LogRecord::commit(13, 1, Some(12)));
        rm.append_log_record(LogRecord::begin(14, 2, None));
        rm.append_log_record(LogRecord::insert(15, 2, Some(14), k("k4"), v("v4")));

        rm.init(checkpoint);
        rm.redo();
        rm.undo();

        let mut expected = HashMap::new();
        expected.insert(k("k1"), v("v1"));
        expected.insert(k("k3"), v("v3"));
        assert_eq!(rm.data(), &expected);
        assert!(rm.active_txns().is_empty());
    }

    #[test]
    fn recovery_is_idempotent_once_settled() {
        let mut checkpoint = CheckPoint::new();
        checkpoint.checkpoint_lsn = None;

        let mut rm = RecoveryManager::new();
        rm.append_log_record(LogRecord::begin(1, 1, None));
        rm.append_log_record(LogRecord::insert(2, 1, Some(1), k("a"), v("1")));
        rm.append_log_record(LogRecord::commit(3, 1, Some(2)));

        rm.init(checkpoint.clone());
        rm.redo();
        rm.undo();
        let first = rm.data().clone();

        rm.init(checkpoint);
        rm.redo();
        rm.undo();
        assert_eq!(rm.data(), &first);
    }

    #[test]
    fn uncommitted_chain_is_fully_rolled_back() {
        let mut rm = RecoveryManager::new();
        rm.append_log_record(LogRecord::begin(1, 1, None));
        rm.append_log_record(LogRecord::insert(2, 1, Some(1), k("a"), v("1")));
        // no commit: transaction 1 never closes.

        rm.init(CheckPoint::new());
        rm.redo();
        rm.undo();
        assert!(rm.data().is_empty());
        assert!(rm.active_txns().is_empty());
    }
}
