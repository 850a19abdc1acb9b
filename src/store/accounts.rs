// src/store/accounts.rs

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::account::{derive_address, normalize_private_key};

use super::{Account, AccountSeed, StoreError, StoreResult, TaskStore};

impl TaskStore {
    /// Upsert accounts by private key, refreshing the cached address.
    ///
    /// Keys are normalised first, so spellings of the same key collapse into
    /// one account. Addresses are derived before the transaction starts; one
    /// invalid key rejects the whole batch.
    pub async fn sync_accounts(&self, seeds: &[AccountSeed]) -> StoreResult<Vec<Account>> {
        let mut seen = HashSet::new();
        let mut rows = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let private_key = normalize_private_key(&seed.private_key);
            if !seen.insert(private_key.clone()) {
                continue;
            }
            let address = derive_address(&private_key)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?;
            rows.push((private_key, address));
        }

        let accounts = self
            .transaction(move |tx| {
                let mut accounts = Vec::with_capacity(rows.len());
                for (private_key, address) in &rows {
                    accounts.push(upsert_account(tx, private_key, address)?);
                }
                Ok(accounts)
            })
            .await?;

        info!(count = accounts.len(), "synchronized accounts");
        Ok(accounts)
    }

    pub async fn account_by_address(&self, address: &str) -> StoreResult<Option<Account>> {
        let address = address.to_lowercase();
        self.with_connection(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, private_key, address FROM accounts WHERE address = ?1",
                    [&address],
                    Account::from_row,
                )
                .optional()?)
        })
        .await
    }

    pub async fn list_accounts(&self) -> StoreResult<Vec<Account>> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, private_key, address FROM accounts ORDER BY id")?;
            let accounts = stmt
                .query_map([], Account::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(accounts)
        })
        .await
    }
}

pub(crate) fn upsert_account(
    conn: &Connection,
    private_key: &str,
    address: &str,
) -> StoreResult<Account> {
    conn.execute(
        "INSERT INTO accounts (private_key, address) VALUES (?1, ?2)
         ON CONFLICT(private_key) DO UPDATE SET address = excluded.address",
        params![private_key, address],
    )?;
    let account = conn.query_row(
        "SELECT id, private_key, address FROM accounts WHERE private_key = ?1",
        [private_key],
        Account::from_row,
    )?;
    Ok(account)
}
