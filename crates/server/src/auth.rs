use std::collections::HashMap;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use shared::protocol::Role;

/// External authentication boundary. The protocol core only needs a
/// yes/no answer; the backing store is somebody else's problem.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: &str, password: &str, role: Role) -> bool;
}

pub type SharedAuthenticator = Arc<dyn Authenticator>;

/// In-memory credential store holding hex-encoded SHA-256 digests.
/// Passwords are hashed on insert and never kept in clear.
#[derive(Default)]
pub struct HashedStore {
    accounts: HashMap<String, Account>,
}

struct Account {
    password_digest: String,
    role: Role,
}

impl HashedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&mut self, username: &str, password: &str, role: Role) {
        self.accounts.insert(
            username.to_string(),
            Account {
                password_digest: digest_hex(password),
                role,
            },
        );
    }

    pub fn with_account(mut self, username: &str, password: &str, role: Role) -> Self {
        self.add_account(username, password, role);
        self
    }
}

impl Authenticator for HashedStore {
    fn authenticate(&self, username: &str, password: &str, role: Role) -> bool {
        match self.accounts.get(username) {
            Some(account) => {
                account.role == role && account.password_digest == digest_hex(password)
            }
            None => false,
        }
    }
}

fn digest_hex(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}
