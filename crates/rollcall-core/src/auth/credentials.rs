use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "rollcall";

/// Environment override for the stored init data.
pub const ENV_INIT_DATA: &str = "ROLLCALL_INIT_DATA";

/// Keeps the backend's init data token in the OS keychain, one entry per
/// Telegram account.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(telegram_id: i64) -> Result<Entry> {
        Entry::new(SERVICE_NAME, &telegram_id.to_string()).context("Failed to create keyring entry")
    }

    /// Store init data for a Telegram account in the OS keychain
    pub fn store(telegram_id: i64, init_data: &str) -> Result<()> {
        Self::entry(telegram_id)?
            .set_password(init_data)
            .context("Failed to store init data in keychain")
    }

    /// Retrieve init data for a Telegram account from the OS keychain
    pub fn get_init_data(telegram_id: i64) -> Result<String> {
        Self::entry(telegram_id)?
            .get_password()
            .context("Failed to retrieve init data from keychain")
    }

    /// Init data from the environment if set, otherwise from the keychain.
    pub fn resolve(telegram_id: Option<i64>) -> Result<String> {
        if let Some(init_data) = std::env::var(ENV_INIT_DATA).ok().filter(|v| !v.is_empty()) {
            return Ok(init_data);
        }
        let telegram_id = telegram_id.ok_or_else(|| {
            anyhow::anyhow!("No Telegram id configured. Run `rollcall login` first.")
        })?;
        Self::get_init_data(telegram_id)
    }

    /// Delete stored init data for a Telegram account
    pub fn delete(telegram_id: i64) -> Result<()> {
        Self::entry(telegram_id)?
            .delete_credential()
            .context("Failed to delete init data from keychain")
    }
}
