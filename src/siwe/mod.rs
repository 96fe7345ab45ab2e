//! Sign-In-With-Ethereum primitives: addresses, EIP-4361 messages and
//! EIP-191 signatures.

pub mod address;
pub mod message;
pub mod signature;

pub use address::{Address, AddressError};
pub use message::{MessageError, SiweMessage};
pub use signature::{recover_address, verify_signature, SignatureError};
