pub mod auth;
pub mod codename;
pub mod domain;
pub mod inbox;
pub mod intake;
pub mod ports;
pub mod reaper;
pub mod session;

#[cfg(test)]
pub(crate) mod testutil;

pub use domain::{
    ApiToken, DecryptedReply, FileUpload, IntakeOutcome, NewSource, ReapReport, Receipt, Reply,
    Source, Submission,
};
pub use ports::{
    ChecksumQueue, CryptoError, Encryption, IdentityStore, Storage, StorageError, StoreError,
};
pub use session::{generate_tab_id, SessionError, SourceSession};
