//! `WireGuard` key types.
//!
//! Keys are 32 bytes and travel as standard base64, both in configuration
//! files and in `wg` output. Only public keys are hashable and printable;
//! private and preshared keys compare in constant time and redact their
//! `Debug` output.

use std::fmt;
use std::str::FromStr;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use rand_core::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use crate::error::WireGuardError;

/// Key length in bytes.
pub const KEY_SIZE: usize = 32;

fn decode_key(s: &str) -> Result<[u8; KEY_SIZE], WireGuardError> {
    let bytes = STANDARD
        .decode(s.trim())
        .map_err(|e| WireGuardError::InvalidBase64(e.to_string()))?;
    <[u8; KEY_SIZE]>::try_from(bytes.as_slice())
        .map_err(|_| WireGuardError::InvalidKeyLength(bytes.len()))
}

/// Declares a 32-byte key newtype with base64 text, serde and `FromStr`.
macro_rules! wg_key {
    ($(#[$meta:meta])* $ty:ident) => {
        $(#[$meta])*
        pub struct $ty([u8; KEY_SIZE]);

        impl $ty {
            /// Wraps raw key bytes.
            #[must_use]
            pub const fn from_bytes_array(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            /// Standard base64, as `wg` prints it.
            #[must_use]
            pub fn to_base64(&self) -> String {
                STANDARD.encode(self.0)
            }

            /// Parses standard base64; surrounding whitespace is ignored.
            ///
            /// # Errors
            ///
            /// Returns an error if the input is not base64 or not 32 bytes.
            pub fn from_base64(s: &str) -> Result<Self, WireGuardError> {
                decode_key(s).map(Self)
            }
        }

        impl FromStr for $ty {
            type Err = WireGuardError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_base64(s)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_base64())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_base64(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Constant-time equality and a redacted `Debug` for secret keys.
macro_rules! secret_key {
    ($ty:ident) => {
        impl PartialEq for $ty {
            fn eq(&self, other: &Self) -> bool {
                self.0.ct_eq(&other.0).into()
            }
        }

        impl Eq for $ty {}

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(concat!(stringify!($ty), "([REDACTED])"))
            }
        }
    };
}

wg_key!(
    /// A Curve25519 public key; identifies a peer.
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    PublicKey
);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b64 = self.to_base64();
        write!(f, "PublicKey({}...)", &b64[..8])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

wg_key!(
    /// A Curve25519 private key.
    #[derive(Clone)]
    PrivateKey
);
secret_key!(PrivateKey);

impl PrivateKey {
    /// Generates a random private key.
    #[must_use]
    pub fn generate() -> Self {
        Self(StaticSecret::random_from_rng(OsRng).to_bytes())
    }

    /// Derives the matching public key, as `wg pubkey` does.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        PublicKey(X25519PublicKey::from(&secret).to_bytes())
    }
}

wg_key!(
    /// A symmetric preshared key, 32 random bytes.
    #[derive(Clone)]
    PresharedKey
);
secret_key!(PresharedKey);

impl PresharedKey {
    /// Generates a random preshared key, as `wg genpsk` does.
    #[must_use]
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self(key)
    }
}

/// A private key with its derived public key.
#[derive(Clone, Debug)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generates a random pair.
    #[must_use]
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::generate())
    }

    /// Completes a pair from its private half.
    #[must_use]
    pub fn from_private_key(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { private, public }
    }

    /// The public half.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Splits the pair into its private and public halves.
    #[must_use]
    pub fn into_parts(self) -> (PrivateKey, PublicKey) {
        (self.private, self.public)
    }
}
