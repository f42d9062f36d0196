//! Secret store implementations.

#[cfg(feature = "mock")]
pub mod memory;

#[cfg(feature = "keyring-store")]
pub mod os_keyring;
