//! Addrbook Core - phone number to address records stored in a single Redis hash
//!
//! - E.164 phone validation for a configured set of regions
//! - `AddressBook` adapter: create-if-absent, get, update-if-exists,
//!   delete-if-exists and a liveness probe

pub mod error;
pub mod phone;
pub mod storage;

pub use error::{AddrBookError, Result};
pub use phone::{DEFAULT_REGION, Phone, PhoneError, PhoneValidator};
pub use storage::{
    AddressBook, CreateEntryOutcome, DEFAULT_HASH_KEY, DeleteEntryOutcome, MemoryAddressBook,
    ReadEntryOutcome, RedisAddressBook, StoreBuilder, UpdateEntryOutcome,
};
