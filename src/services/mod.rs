// Service exports
pub mod apns;
pub mod apns_token;
pub mod fcm;
pub mod postgres;
pub mod store;

pub use apns::{ApnsClient, ApnsError, ApnsResponse};
pub use apns_token::{CredentialSigner, SignedCredential, SigningError};
pub use fcm::{FcmClient, FcmError};
pub use postgres::PostgresClient;
pub use store::{PreferenceStore, RegistrationStore, StoreError};
