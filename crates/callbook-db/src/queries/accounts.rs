use anyhow::Result;
use rusqlite::{Connection, Row};

use callbook_types::Account;

use crate::{Database, OptionalExt, opt_time_col, opt_ts, text_col, time_col, ts};

const ACCOUNT_COLUMNS: &str = "user_id, age_verified, terms_accepted_at, is_restricted, \
     private_calls_enabled, membership_tier, membership_expires_at, language, updated_at";

impl Database {
    // -- Accounts --

    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (user_id, age_verified, terms_accepted_at, is_restricted,
                     private_calls_enabled, membership_tier, membership_expires_at, language, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(user_id) DO UPDATE SET
                     age_verified = excluded.age_verified,
                     terms_accepted_at = excluded.terms_accepted_at,
                     is_restricted = excluded.is_restricted,
                     private_calls_enabled = excluded.private_calls_enabled,
                     membership_tier = excluded.membership_tier,
                     membership_expires_at = excluded.membership_expires_at,
                     language = excluded.language,
                     updated_at = excluded.updated_at",
                rusqlite::params![
                    account.user_id,
                    account.age_verified,
                    opt_ts(account.terms_accepted_at),
                    account.is_restricted,
                    account.private_calls_enabled,
                    account.membership_tier.as_str(),
                    opt_ts(account.membership_expires_at),
                    account.language,
                    ts(account.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        self.with_conn(|conn| query_account(conn, user_id))
    }

    /// Preferred language for rendered notifications, `en` when unknown.
    pub fn account_language(&self, user_id: &str) -> Result<String> {
        Ok(self
            .get_account(user_id)?
            .map(|a| a.language)
            .unwrap_or_else(|| "en".to_string()))
    }
}

fn query_account(conn: &Connection, user_id: &str) -> Result<Option<Account>> {
    let sql = format!("SELECT {} FROM accounts WHERE user_id = ?1", ACCOUNT_COLUMNS);
    conn.query_row(&sql, [user_id], account_from_row).optional()
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        user_id: row.get(0)?,
        age_verified: row.get(1)?,
        terms_accepted_at: opt_time_col(row, 2)?,
        is_restricted: row.get(3)?,
        private_calls_enabled: row.get(4)?,
        membership_tier: text_col(row, 5)?,
        membership_expires_at: opt_time_col(row, 6)?,
        language: row.get(7)?,
        updated_at: time_col(row, 8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::{account, at};
    use callbook_types::MembershipTier;

    #[test]
    fn upsert_replaces_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let mut acc = account("u1");
        db.upsert_account(&acc).unwrap();

        acc.membership_tier = MembershipTier::Free;
        acc.language = "es".into();
        db.upsert_account(&acc).unwrap();

        let loaded = db.get_account("u1").unwrap().unwrap();
        assert_eq!(loaded.membership_tier, MembershipTier::Free);
        assert_eq!(db.account_language("u1").unwrap(), "es");
        assert_eq!(loaded.terms_accepted_at, Some(at(2026, 1, 1, 0, 0)));
    }

    #[test]
    fn unknown_account_defaults_to_english() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_account("ghost").unwrap().is_none());
        assert_eq!(db.account_language("ghost").unwrap(), "en");
    }
}
