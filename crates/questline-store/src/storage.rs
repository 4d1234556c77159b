//! RocksDB-backed progress store, challenge catalog and member roster.
//!
//! Column families hold progress records, processed marks, challenge
//! definitions and members. Values are bincode-encoded.
//!
//! Merges take a per-key lock around the read-modify-write, so concurrent
//! merges of the same key serialize while different keys proceed in
//! parallel. Catalog and roster writes are rare and share one admin lock.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};

use questline_core::error::{InputError, ProgressError, QuestlineError};
use questline_core::progress::merge_record;
use questline_core::traits::{ChallengeCatalog, MemberRoster, ProgressStore};
use questline_core::types::{
    Challenge, Member, MergeOutcome, MonthKey, ProgressKey, ProgressRecord, Tier, Track, UserId,
};

use crate::keys;

// --- Column family names ---

const CF_PROGRESS: &str = "progress";
const CF_PROCESSED: &str = "processed";
const CF_CHALLENGES: &str = "challenges";
const CF_MEMBERS: &str = "members";

/// All column family names.
const ALL_CFS: &[&str] = &[CF_PROGRESS, CF_PROCESSED, CF_CHALLENGES, CF_MEMBERS];

fn storage_err(e: rocksdb::Error) -> QuestlineError {
    QuestlineError::Storage(e.to_string())
}

/// RocksDB-backed persistent store.
pub struct RocksStore {
    db: DB,
    /// One lock per progress key, created on first merge.
    key_locks: DashMap<Vec<u8>, Arc<Mutex<()>>>,
    admin_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a database at the given path.
    ///
    /// Creates all column families if they don't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QuestlineError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(storage_err)?;

        tracing::debug!(path = %path.as_ref().display(), "opened progress store");

        Ok(Self {
            db,
            key_locks: DashMap::new(),
            admin_lock: Mutex::new(()),
        })
    }

    /// Flush all in-memory buffers to disk.
    pub fn flush(&self) -> Result<(), QuestlineError> {
        self.db.flush().map_err(storage_err)
    }

    /// Define a month's challenge. Challenges are write-once.
    ///
    /// # Errors
    ///
    /// - [`InputError::ChallengeExists`] if the month is already defined
    /// - any validation error of [`Challenge::validate`]
    pub fn define_challenge(&self, challenge: &Challenge) -> Result<(), QuestlineError> {
        challenge.validate()?;
        let _guard = self.admin_lock.lock();
        let key = keys::month_key(challenge.month);
        if self.get_value::<Challenge>(CF_CHALLENGES, &key)?.is_some() {
            return Err(InputError::ChallengeExists(challenge.month.to_string()).into());
        }
        self.put_value(CF_CHALLENGES, &key, challenge)?;
        tracing::info!(month = %challenge.month, game = %challenge.main.game_id, "challenge defined");
        Ok(())
    }

    /// Mark a month's shadow track as revealed. The only permitted edit of a challenge.
    pub fn reveal_shadow(&self, month: MonthKey) -> Result<(), QuestlineError> {
        let _guard = self.admin_lock.lock();
        let key = keys::month_key(month);
        let mut challenge = self
            .get_value::<Challenge>(CF_CHALLENGES, &key)?
            .ok_or_else(|| InputError::UnknownChallenge(month.to_string()))?;
        if challenge.shadow.is_none() {
            return Err(InputError::MissingField("shadow").into());
        }
        if !challenge.shadow_revealed {
            challenge.shadow_revealed = true;
            self.put_value(CF_CHALLENGES, &key, &challenge)?;
            tracing::info!(%month, "shadow track revealed");
        }
        Ok(())
    }

    /// Register a member.
    ///
    /// # Errors
    ///
    /// [`InputError::MemberExists`] if the id is already registered.
    pub fn register_member(&self, member: &Member) -> Result<(), QuestlineError> {
        let _guard = self.admin_lock.lock();
        let key = member.id.as_str().as_bytes();
        if self.get_value::<Member>(CF_MEMBERS, key)?.is_some() {
            return Err(InputError::MemberExists(member.id.to_string()).into());
        }
        self.put_value(CF_MEMBERS, key, member)
    }

    // --- Internal helpers ---

    /// Get a column family handle.
    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, QuestlineError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| QuestlineError::Storage(format!("missing column family: {name}")))
    }

    fn get_value<T: bincode::Decode<()>>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>, QuestlineError> {
        let cf = self.cf_handle(cf_name)?;
        match self.db.get_cf(&cf, key).map_err(storage_err)? {
            Some(bytes) => {
                let (value, _): (T, _) =
                    bincode::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(|e| QuestlineError::Storage(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn put_value<T: bincode::Encode>(
        &self,
        cf_name: &str,
        key: &[u8],
        value: &T,
    ) -> Result<(), QuestlineError> {
        let cf = self.cf_handle(cf_name)?;
        let bytes = bincode::encode_to_vec(value, bincode::config::standard())
            .map_err(|e| QuestlineError::Storage(e.to_string()))?;
        self.db.put_cf(&cf, key, bytes).map_err(storage_err)
    }

    /// Decode a progress record, reporting corruption against its key.
    fn decode_record(key: &ProgressKey, bytes: &[u8]) -> Result<ProgressRecord, QuestlineError> {
        bincode::decode_from_slice::<ProgressRecord, _>(bytes, bincode::config::standard())
            .map(|(record, _)| record)
            .map_err(|e| {
                ProgressError::CorruptRecord {
                    key: key.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }

    /// Keys and values of every row in `cf_name` starting with `prefix`.
    fn scan_prefix(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>, QuestlineError> {
        let cf = self.cf_handle(cf_name)?;
        let mut rows = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(storage_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            rows.push((key, value));
        }
        Ok(rows)
    }

    fn key_lock(&self, key: &[u8]) -> Arc<Mutex<()>> {
        self.key_locks.entry(key.to_vec()).or_default().clone()
    }

    /// Drop the table entry once no other merge holds or waits on it.
    fn release_key_lock(&self, key: &[u8], lock: Arc<Mutex<()>>) {
        // One reference in the table plus `lock`.
        self.key_locks.remove_if(key, |_, held| Arc::strong_count(held) == 2);
        drop(lock);
    }

    fn merge_locked(
        &self,
        key: &ProgressKey,
        raw_key: &[u8],
        candidate: Tier,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, QuestlineError> {
        let cf = self.cf_handle(CF_PROGRESS)?;
        let existing = match self.db.get_cf(&cf, raw_key).map_err(storage_err)? {
            Some(bytes) => Some(Self::decode_record(key, &bytes)?),
            None => None,
        };

        let (outcome, write) = merge_record(key, existing, candidate, now)?;
        if let Some(record) = write {
            self.put_value(CF_PROGRESS, raw_key, &record)?;
            tracing::debug!(%key, from = %outcome.previous, to = %outcome.stored, "progress upgraded");
        }
        Ok(outcome)
    }
}

impl ProgressStore for RocksStore {
    fn merge_upsert(
        &self,
        key: &ProgressKey,
        candidate: Tier,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome, QuestlineError> {
        let raw_key = keys::progress_key(&key.user, key.month, key.track)?;
        let lock = self.key_lock(&raw_key);
        let result = {
            let _guard = lock.lock();
            self.merge_locked(key, &raw_key, candidate, now)
        };
        self.release_key_lock(&raw_key, lock);
        result
    }

    fn progress(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, QuestlineError> {
        let raw_key = keys::progress_key(&key.user, key.month, key.track)?;
        let cf = self.cf_handle(CF_PROGRESS)?;
        match self.db.get_cf(&cf, &raw_key).map_err(storage_err)? {
            Some(bytes) => Ok(Some(Self::decode_record(key, &bytes)?)),
            None => Ok(None),
        }
    }

    fn records_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<(MonthKey, Track, ProgressRecord)>, QuestlineError> {
        let prefix = keys::user_prefix(user)?;
        self.scan_prefix(CF_PROGRESS, &prefix)?
            .into_iter()
            .map(|(raw_key, value)| {
                let (month, track) = keys::decode_progress_suffix(&raw_key, prefix.len())?;
                let key = ProgressKey::new(user.clone(), month, track);
                Ok((month, track, Self::decode_record(&key, &value)?))
            })
            .collect()
    }

    fn is_processed(&self, user: &UserId, month: MonthKey) -> Result<bool, QuestlineError> {
        let cf = self.cf_handle(CF_PROCESSED)?;
        let key = keys::processed_key(user, month)?;
        self.db
            .get_cf(&cf, key)
            .map(|v| v.is_some())
            .map_err(storage_err)
    }

    fn mark_processed(&self, user: &UserId, month: MonthKey) -> Result<(), QuestlineError> {
        let cf = self.cf_handle(CF_PROCESSED)?;
        let key = keys::processed_key(user, month)?;
        self.db.put_cf(&cf, key, b"").map_err(storage_err)
    }

    fn reset_processed(&self, user: &UserId) -> Result<usize, QuestlineError> {
        let prefix = keys::user_prefix(user)?;
        let rows = self.scan_prefix(CF_PROCESSED, &prefix)?;
        if rows.is_empty() {
            return Ok(0);
        }
        let cf = self.cf_handle(CF_PROCESSED)?;
        let mut batch = WriteBatch::default();
        for (key, _) in &rows {
            batch.delete_cf(&cf, key);
        }
        self.db.write(batch).map_err(storage_err)?;
        tracing::info!(%user, cleared = rows.len(), "processed marks reset");
        Ok(rows.len())
    }
}

impl ChallengeCatalog for RocksStore {
    fn challenge(&self, month: MonthKey) -> Result<Option<Challenge>, QuestlineError> {
        self.get_value(CF_CHALLENGES, &keys::month_key(month))
    }

    fn months(&self) -> Result<Vec<MonthKey>, QuestlineError> {
        let cf = self.cf_handle(CF_CHALLENGES)?;
        let mut months = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item.map_err(storage_err)?;
            months.push(keys::decode_month(&key)?);
        }
        Ok(months)
    }
}

impl MemberRoster for RocksStore {
    fn members(&self) -> Result<Vec<Member>, QuestlineError> {
        let cf = self.cf_handle(CF_MEMBERS)?;
        let mut members = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(storage_err)?;
            let (member, _): (Member, _) =
                bincode::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|e| QuestlineError::Storage(e.to_string()))?;
            members.push(member);
        }
        Ok(members)
    }

    fn member(&self, id: &UserId) -> Result<Option<Member>, QuestlineError> {
        self.get_value(CF_MEMBERS, id.as_str().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use questline_core::types::{GameId, TrackDefinition};

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn temp_store() -> (RocksStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path().join("progress")).unwrap();
        (store, dir)
    }

    fn month(year: i32, month: u32) -> MonthKey {
        MonthKey::new(year, month).unwrap()
    }

    fn key(user: &str, m: MonthKey, track: Track) -> ProgressKey {
        ProgressKey::new(UserId::new(user), m, track)
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 2, 9, 30, 0).unwrap()
    }

    fn challenge(m: MonthKey, shadow: bool) -> Challenge {
        let track = |game| TrackDefinition {
            game_id: GameId(game),
            progression: [1, 2].into_iter().collect(),
            win: [3].into_iter().collect(),
            total_achievements: 10,
        };
        Challenge {
            month: m,
            main: track(100),
            shadow: shadow.then(|| track(200)),
            shadow_revealed: false,
        }
    }

    // ------------------------------------------------------------------
    // Progress
    // ------------------------------------------------------------------

    #[test]
    fn merge_creates_and_upgrades() {
        let (store, _dir) = temp_store();
        let k = key("u1", month(2025, 2), Track::Main);
        let first = store.merge_upsert(&k, Tier::Participation, now()).unwrap();
        assert_eq!((first.previous, first.stored, first.points), (Tier::None, Tier::Participation, 1));
        let second = store.merge_upsert(&k, Tier::Mastery, now()).unwrap();
        assert_eq!((second.previous, second.stored, second.points), (Tier::Participation, Tier::Mastery, 7));
    }

    #[test]
    fn merge_never_downgrades() {
        let (store, _dir) = temp_store();
        let k = key("u1", month(2025, 2), Track::Main);
        store.merge_upsert(&k, Tier::Beaten, now()).unwrap();
        let out = store.merge_upsert(&k, Tier::Participation, now()).unwrap();
        assert_eq!(out.stored, Tier::Beaten);
        assert_eq!(out.points, 4);
        let record = store.progress(&k).unwrap().unwrap();
        assert_eq!(record.tier, Tier::Beaten);
        assert_eq!(record.points, 4);
    }

    #[test]
    fn merge_refuses_shadow_mastery() {
        let (store, _dir) = temp_store();
        let k = key("u1", month(2025, 2), Track::Shadow);
        let err = store.merge_upsert(&k, Tier::Mastery, now()).unwrap_err();
        assert!(matches!(err, QuestlineError::Progress(ProgressError::InvariantViolation(_))));
        assert!(store.progress(&k).unwrap().is_none());
    }

    #[test]
    fn none_merge_leaves_no_record() {
        let (store, _dir) = temp_store();
        let k = key("u1", month(2025, 2), Track::Main);
        store.merge_upsert(&k, Tier::None, now()).unwrap();
        assert!(store.progress(&k).unwrap().is_none());
    }

    #[test]
    fn records_for_user_scans_only_that_user() {
        let (store, _dir) = temp_store();
        store.merge_upsert(&key("12", month(2025, 2), Track::Shadow), Tier::Beaten, now()).unwrap();
        store.merge_upsert(&key("12", month(2024, 12), Track::Main), Tier::Mastery, now()).unwrap();
        store.merge_upsert(&key("123", month(2025, 1), Track::Main), Tier::Beaten, now()).unwrap();
        store.merge_upsert(&key("1", month(2025, 1), Track::Main), Tier::Beaten, now()).unwrap();

        let records = store.records_for_user(&UserId::new("12")).unwrap();
        let order: Vec<_> = records.iter().map(|(m, t, _)| (m.to_string(), *t)).collect();
        assert_eq!(
            order,
            vec![("2024-12".to_string(), Track::Main), ("2025-02".to_string(), Track::Shadow)]
        );
        assert_eq!(store.total_points(&UserId::new("12")).unwrap(), 11);
    }

    #[test]
    fn records_persist_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress");
        let k = key("u1", month(2025, 2), Track::Main);
        {
            let store = RocksStore::open(&path).unwrap();
            store.merge_upsert(&k, Tier::Beaten, now()).unwrap();
            store.mark_processed(&k.user, k.month).unwrap();
            store.flush().unwrap();
        }
        let store = RocksStore::open(&path).unwrap();
        let record = store.progress(&k).unwrap().unwrap();
        assert_eq!(record.tier, Tier::Beaten);
        assert_eq!(record.updated_at(), Some(now()));
        assert!(store.is_processed(&k.user, k.month).unwrap());
    }

    #[test]
    fn concurrent_merges_same_key_keep_maximum() {
        let (store, _dir) = temp_store();
        let store = Arc::new(store);
        let k = key("u1", month(2025, 2), Track::Main);
        let tiers = [Tier::Participation, Tier::Beaten, Tier::Mastery, Tier::None];
        let handles: Vec<_> = (0..12)
            .map(|i| {
                let store = Arc::clone(&store);
                let k = k.clone();
                std::thread::spawn(move || {
                    store.merge_upsert(&k, tiers[i % tiers.len()], now()).unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.progress(&k).unwrap().unwrap().tier, Tier::Mastery);
        assert!(store.key_locks.is_empty());
    }

    #[test]
    fn key_locks_released_after_merge() {
        let (store, _dir) = temp_store();
        for m in 1..=6 {
            store
                .merge_upsert(&key("u1", month(2025, m), Track::Main), Tier::Participation, now())
                .unwrap();
        }
        let err = store.merge_upsert(&key("u1", month(2025, 1), Track::Shadow), Tier::Mastery, now());
        assert!(err.is_err());
        assert!(store.key_locks.is_empty());
    }

    // ------------------------------------------------------------------
    // Processed marks
    // ------------------------------------------------------------------

    #[test]
    fn processed_marks_and_reset() {
        let (store, _dir) = temp_store();
        let u1 = UserId::new("u1");
        let u10 = UserId::new("u10");
        store.mark_processed(&u1, month(2025, 1)).unwrap();
        store.mark_processed(&u1, month(2025, 2)).unwrap();
        store.mark_processed(&u10, month(2025, 1)).unwrap();

        assert!(store.is_processed(&u1, month(2025, 2)).unwrap());
        assert_eq!(store.reset_processed(&u1).unwrap(), 2);
        assert!(!store.is_processed(&u1, month(2025, 1)).unwrap());
        assert!(store.is_processed(&u10, month(2025, 1)).unwrap());
        assert_eq!(store.reset_processed(&u1).unwrap(), 0);
    }

    // ------------------------------------------------------------------
    // Catalog and roster
    // ------------------------------------------------------------------

    #[test]
    fn challenges_are_write_once() {
        let (store, _dir) = temp_store();
        store.define_challenge(&challenge(month(2025, 2), true)).unwrap();
        let err = store.define_challenge(&challenge(month(2025, 2), false)).unwrap_err();
        assert!(matches!(err, QuestlineError::Input(InputError::ChallengeExists(_))));
        let stored = store.challenge(month(2025, 2)).unwrap().unwrap();
        assert!(stored.shadow.is_some());
    }

    #[test]
    fn months_listed_in_order() {
        let (store, _dir) = temp_store();
        for m in [month(2025, 3), month(2024, 12), month(2025, 1)] {
            store.define_challenge(&challenge(m, false)).unwrap();
        }
        let months: Vec<String> = store.months().unwrap().iter().map(|m| m.to_string()).collect();
        assert_eq!(months, ["2024-12", "2025-01", "2025-03"]);
    }

    #[test]
    fn reveal_shadow_persists() {
        let (store, _dir) = temp_store();
        store.define_challenge(&challenge(month(2025, 2), true)).unwrap();
        store.reveal_shadow(month(2025, 2)).unwrap();
        assert!(store.challenge(month(2025, 2)).unwrap().unwrap().shadow_revealed);
        assert!(store.reveal_shadow(month(2025, 9)).is_err());
    }

    #[test]
    fn members_register_once() {
        let (store, _dir) = temp_store();
        let member = Member { id: UserId::new("77"), source_username: "Runner77".into() };
        store.register_member(&member).unwrap();
        assert!(store.register_member(&member).is_err());
        assert_eq!(store.member(&member.id).unwrap(), Some(member.clone()));
        assert_eq!(store.members().unwrap(), vec![member]);
    }
}
