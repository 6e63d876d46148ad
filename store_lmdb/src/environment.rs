//! LMDB environment setup.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use lattis_store::{Store, StoreError};

use crate::txn::{LmdbReadTxn, LmdbWriteTxn};
use crate::LmdbError;

const MAX_DBS: u32 = 16;

/// Wraps the LMDB environment and all table handles.
pub struct LmdbStore {
    pub(crate) env: Env,
    pub(crate) blocks_db: Database<Bytes, Bytes>,
    pub(crate) accounts_db: Database<Bytes, Bytes>,
    pub(crate) pending_db: Database<Bytes, Bytes>,
    pub(crate) confirmation_height_db: Database<Bytes, Bytes>,
    pub(crate) pruned_db: Database<Bytes, Bytes>,
    pub(crate) frontiers_db: Database<Bytes, Bytes>,
    pub(crate) rep_weights_db: Database<Bytes, Bytes>,
    pub(crate) online_weight_db: Database<Bytes, Bytes>,
    pub(crate) peers_db: Database<Bytes, Bytes>,
    pub(crate) final_votes_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbStore {
    /// Open or create an LMDB environment at the given path.
    ///
    /// Backend faults (bad path, exhausted map, corrupt environment) surface
    /// here, once — per-operation errors after a successful open indicate
    /// bugs, not environmental conditions.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, StoreError> {
        let env = unsafe {
            EnvOpenOptions::new()
                .max_dbs(MAX_DBS)
                .map_size(map_size)
                .open(path)
                .map_err(LmdbError::from)?
        };

        let mut wtxn = env.write_txn().map_err(LmdbError::from)?;
        let blocks_db = env
            .create_database(&mut wtxn, Some("blocks"))
            .map_err(LmdbError::from)?;
        let accounts_db = env
            .create_database(&mut wtxn, Some("accounts"))
            .map_err(LmdbError::from)?;
        let pending_db = env
            .create_database(&mut wtxn, Some("pending"))
            .map_err(LmdbError::from)?;
        let confirmation_height_db = env
            .create_database(&mut wtxn, Some("confirmation_height"))
            .map_err(LmdbError::from)?;
        let pruned_db = env
            .create_database(&mut wtxn, Some("pruned"))
            .map_err(LmdbError::from)?;
        let frontiers_db = env
            .create_database(&mut wtxn, Some("frontiers"))
            .map_err(LmdbError::from)?;
        let rep_weights_db = env
            .create_database(&mut wtxn, Some("rep_weights"))
            .map_err(LmdbError::from)?;
        let online_weight_db = env
            .create_database(&mut wtxn, Some("online_weight"))
            .map_err(LmdbError::from)?;
        let peers_db = env
            .create_database(&mut wtxn, Some("peers"))
            .map_err(LmdbError::from)?;
        let final_votes_db = env
            .create_database(&mut wtxn, Some("final_votes"))
            .map_err(LmdbError::from)?;
        let meta_db = env
            .create_database(&mut wtxn, Some("meta"))
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;

        Ok(Self {
            env,
            blocks_db,
            accounts_db,
            pending_db,
            confirmation_height_db,
            pruned_db,
            frontiers_db,
            rep_weights_db,
            online_weight_db,
            peers_db,
            final_votes_db,
            meta_db,
        })
    }
}

impl Store for LmdbStore {
    fn begin_read(&self) -> Result<Box<dyn lattis_store::ReadTxn + '_>, StoreError> {
        Ok(Box::new(LmdbReadTxn::new(self)?))
    }

    fn begin_write(&self) -> Result<Box<dyn lattis_store::WriteTxn + '_>, StoreError> {
        Ok(Box::new(LmdbWriteTxn::new(self)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattis_store::{ReadTxn, WriteTxn};

    #[test]
    fn open_creates_environment() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).expect("failed to open env");
        let txn = store.begin_read().expect("begin_read");
        assert_eq!(txn.block_count().unwrap(), 0);
        assert_eq!(txn.account_count().unwrap(), 0);
    }

    #[test]
    fn reopen_preserves_data() {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        {
            let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
            let mut txn = store.begin_write().unwrap();
            txn.put_version(7).unwrap();
            txn.commit().unwrap();
        }
        let store = LmdbStore::open(dir.path(), 10 * 1024 * 1024).unwrap();
        let txn = store.begin_read().unwrap();
        assert_eq!(txn.get_version().unwrap(), Some(7));
    }
}
