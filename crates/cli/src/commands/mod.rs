//! Subcommand implementations.
//!
//! Each command prints its result to stdout. Diagnostics go through
//! `tracing` to stderr.

pub mod account;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod favorites;
pub mod seller;
pub mod theme;

use secrecy::SecretString;

use cornermarket_storefront::ClientError;
use cornermarket_storefront::storage::StorageError;

/// Use the given password or read one line from stdin.
fn password(given: Option<String>) -> Result<SecretString, ClientError> {
    if let Some(password) = given {
        return Ok(SecretString::from(password));
    }

    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .map_err(StorageError::Io)?;
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Err(ClientError::InvalidForm(vec!["password"]));
    }
    Ok(SecretString::from(line.to_owned()))
}
