use crate::model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError, Transactional,
};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The uniqueness constraint on (user, content) rejected an insert.
    #[error("{content_id} is already in the list of {user_id}")]
    Duplicate { user_id: String, content_id: String },

    #[error("corrupt {0}")]
    Corrupt(&'static str),
}

pub type DbResult<T> = Result<T, DbError>;

/// Opens the database at `path`, or a temporary one that is discarded on drop.
pub fn open(path: Option<&Path>) -> sled::Result<sled::Db> {
    match path {
        Some(path) => sled::Config::new().path(path).open(),
        None => sled::Config::new().temporary(true).open(),
    }
}

pub trait CatalogDb {
    /// Inserts or replaces a catalog entry, returning the replaced one.
    fn put_catalog_item(&self, item: &CatalogItem) -> DbResult<Option<CatalogItem>>;
    fn get_catalog_item(
        &self,
        id: &str,
        content_type: ContentType,
    ) -> DbResult<Option<CatalogItem>>;
}

pub trait MembershipDb {
    /// Atomically stores `record` unless the user already has the content in
    /// their list, in which case the stored record is returned untouched.
    fn insert_membership_if_absent(
        &self,
        record: &MembershipRecord,
    ) -> DbResult<Upsert<MembershipRecord>>;
    fn get_membership(&self, user_id: &str, content_id: &str)
        -> DbResult<Option<MembershipRecord>>;
    /// Returns false if there was nothing to remove.
    fn remove_membership(&self, user_id: &str, content_id: &str) -> DbResult<bool>;
    /// Most recently added first.
    fn list_memberships(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> DbResult<Vec<MembershipRecord>>;
    fn count_memberships(&self, user_id: &str) -> DbResult<u64>;
}

const MOVIES: &[u8] = b"movies";
const SHOWS: &[u8] = b"shows";
// (user, content) -> StoredMembership
const MEMBERSHIPS: &[u8] = b"memberships";
// (user, !added_at, !sequence) -> content id
const MEMBERSHIPS_RECENT: &[u8] = b"memberships_recent";
// user -> number of memberships
const MEMBERSHIPS_COUNT: &[u8] = b"memberships_count";

#[derive(Serialize, Deserialize)]
struct StoredMembership {
    sequence: u64,
    record: MembershipRecord,
}

fn catalog_tree(content_type: ContentType) -> &'static [u8] {
    match content_type {
        ContentType::Movie => MOVIES,
        ContentType::Show => SHOWS,
    }
}

fn user_prefix(user_id: &str) -> Vec<u8> {
    let mut key = (user_id.len() as u32).to_be_bytes().to_vec();
    key.extend_from_slice(user_id.as_bytes());
    key
}

fn membership_key(user_id: &str, content_id: &str) -> Vec<u8> {
    let mut key = user_prefix(user_id);
    key.extend_from_slice(content_id.as_bytes());
    key
}

/// Nanoseconds since the epoch, mapped so that byte order matches time order.
fn ordered_nanos(added_at: &DateTime<Utc>) -> u64 {
    let nanos = added_at.timestamp_nanos_opt().unwrap_or(if added_at.timestamp() < 0 {
        i64::MIN
    } else {
        i64::MAX
    });
    (nanos as u64) ^ (1 << 63)
}

fn recent_key(record: &MembershipRecord, sequence: u64) -> Vec<u8> {
    let mut key = user_prefix(&record.user_id);
    key.extend_from_slice(&(!ordered_nanos(&record.added_at)).to_be_bytes());
    key.extend_from_slice(&(!sequence).to_be_bytes());
    key
}

fn serialize_count(count: u64) -> [u8; 8] {
    count.to_be_bytes()
}

fn deserialize_count<V: AsRef<[u8]>>(count: V) -> DbResult<u64> {
    count
        .as_ref()
        .try_into()
        .map(u64::from_be_bytes)
        .map_err(|_| DbError::Corrupt("membership count"))
}

#[derive(Debug)]
enum InsertAbort {
    Existing(sled::IVec),
    Failed(DbError),
}

impl CatalogDb for sled::Db {
    fn put_catalog_item(&self, item: &CatalogItem) -> DbResult<Option<CatalogItem>> {
        let tree = self.open_tree(catalog_tree(item.content_type))?;
        let old = tree.insert(item.id.as_bytes(), bincode::serialize(item)?)?;
        Ok(match old {
            Some(data) => Some(bincode::deserialize(&data)?),
            None => None,
        })
    }

    fn get_catalog_item(
        &self,
        id: &str,
        content_type: ContentType,
    ) -> DbResult<Option<CatalogItem>> {
        let tree = self.open_tree(catalog_tree(content_type))?;
        Ok(match tree.get(id.as_bytes())? {
            Some(data) => Some(bincode::deserialize(&data)?),
            None => None,
        })
    }
}

impl MembershipDb for sled::Db {
    fn insert_membership_if_absent(
        &self,
        record: &MembershipRecord,
    ) -> DbResult<Upsert<MembershipRecord>> {
        let memberships = self.open_tree(MEMBERSHIPS)?;
        let recent = self.open_tree(MEMBERSHIPS_RECENT)?;
        let counts = self.open_tree(MEMBERSHIPS_COUNT)?;

        let sequence = self.generate_id()?;
        let key = membership_key(&record.user_id, &record.content_id);
        let index_key = recent_key(record, sequence);
        let count_key = user_prefix(&record.user_id);
        let value = bincode::serialize(&StoredMembership {
            sequence,
            record: record.clone(),
        })?;

        let result = (&memberships, &recent, &counts).transaction(
            |(memberships, recent, counts)| -> ConflictableTransactionResult<(), InsertAbort> {
                if let Some(existing) = memberships.get(key.as_slice())? {
                    return Err(ConflictableTransactionError::Abort(InsertAbort::Existing(
                        existing,
                    )));
                }
                let count = match counts.get(count_key.as_slice())? {
                    Some(data) => deserialize_count(data).map_err(|err| {
                        ConflictableTransactionError::Abort(InsertAbort::Failed(err))
                    })?,
                    None => 0,
                };
                memberships.insert(key.as_slice(), value.as_slice())?;
                recent.insert(index_key.as_slice(), record.content_id.as_bytes())?;
                counts.insert(count_key.as_slice(), &serialize_count(count + 1)[..])?;
                Ok(())
            },
        );

        match result {
            Ok(()) => Ok(Upsert::Inserted(record.clone())),
            Err(TransactionError::Abort(InsertAbort::Existing(existing))) => {
                let stored: StoredMembership = bincode::deserialize(&existing)?;
                Ok(Upsert::Existing(stored.record))
            }
            Err(TransactionError::Abort(InsertAbort::Failed(err))) => Err(err),
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    fn get_membership(
        &self,
        user_id: &str,
        content_id: &str,
    ) -> DbResult<Option<MembershipRecord>> {
        let memberships = self.open_tree(MEMBERSHIPS)?;
        Ok(match memberships.get(membership_key(user_id, content_id))? {
            Some(data) => Some(bincode::deserialize::<StoredMembership>(&data)?.record),
            None => None,
        })
    }

    fn remove_membership(&self, user_id: &str, content_id: &str) -> DbResult<bool> {
        let memberships = self.open_tree(MEMBERSHIPS)?;
        let recent = self.open_tree(MEMBERSHIPS_RECENT)?;
        let counts = self.open_tree(MEMBERSHIPS_COUNT)?;

        let key = membership_key(user_id, content_id);
        let count_key = user_prefix(user_id);

        let result = (&memberships, &recent, &counts).transaction(
            |(memberships, recent, counts)| -> ConflictableTransactionResult<bool, DbError> {
                let data = match memberships.remove(key.as_slice())? {
                    Some(data) => data,
                    None => return Ok(false),
                };
                let stored: StoredMembership = bincode::deserialize(&data)
                    .map_err(|err| ConflictableTransactionError::Abort(err.into()))?;
                recent.remove(recent_key(&stored.record, stored.sequence))?;
                let count = match counts.get(count_key.as_slice())? {
                    Some(data) => {
                        deserialize_count(data).map_err(ConflictableTransactionError::Abort)?
                    }
                    None => 0,
                };
                if count > 1 {
                    counts.insert(count_key.as_slice(), &serialize_count(count - 1)[..])?;
                } else {
                    counts.remove(count_key.as_slice())?;
                }
                Ok(true)
            },
        );

        result.map_err(|err| match err {
            TransactionError::Storage(err) => DbError::Storage(err),
            TransactionError::Abort(err) => err,
        })
    }

    fn list_memberships(
        &self,
        user_id: &str,
        offset: usize,
        limit: usize,
    ) -> DbResult<Vec<MembershipRecord>> {
        let memberships = self.open_tree(MEMBERSHIPS)?;
        let recent = self.open_tree(MEMBERSHIPS_RECENT)?;
        let mut records = Vec::new();
        let mut skipped = 0;
        for entry in recent.scan_prefix(user_prefix(user_id)) {
            if records.len() >= limit {
                break;
            }
            let (_, content_id) = entry?;
            if skipped < offset {
                skipped += 1;
                continue;
            }
            let mut key = user_prefix(user_id);
            key.extend_from_slice(&content_id);
            match memberships.get(&key)? {
                Some(data) => records.push(bincode::deserialize::<StoredMembership>(&data)?.record),
                None => log::warn!(
                    "Index memberships_recent points at a missing record for {}",
                    user_id
                ),
            }
        }
        Ok(records)
    }

    fn count_memberships(&self, user_id: &str) -> DbResult<u64> {
        let counts = self.open_tree(MEMBERSHIPS_COUNT)?;
        match counts.get(user_prefix(user_id))? {
            Some(data) => deserialize_count(data),
            None => Ok(0),
        }
    }
}
