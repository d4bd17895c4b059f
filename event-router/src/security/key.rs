use sha1::{Digest, Sha1};
use std::fmt::{Debug, Display, Formatter};

/// Failure to build a key or key set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    EmptyKey,
    /// A single-set operation was given the dual scheme, or vice versa.
    WrongScheme(KeyScheme),
}

impl Display for KeyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyError::EmptyKey => write!(f, "key data cannot be empty"),
            KeyError::WrongScheme(scheme) => {
                write!(f, "operation is not valid for key scheme {}", scheme.name())
            }
        }
    }
}

impl std::error::Error for KeyError {}

/// Opaque key material. Private and public keys share this type; a public
/// key is the scheme hash of a private one.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(data: impl Into<Vec<u8>>) -> Result<Self, KeyError> {
        let data = data.into();
        if data.is_empty() {
            return Err(KeyError::EmptyKey);
        }
        Ok(Self(data))
    }

    /// A key whose data is the UTF-8 encoding of `password`.
    pub fn from_password(password: &str) -> Result<Self, KeyError> {
        Self::new(password.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// SHA-1 of the key data: the public key for every supported scheme.
    pub fn public_key(&self) -> Key {
        Key(Sha1::digest(&self.0).to_vec())
    }
}

impl Debug for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Key(")?;
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// The key schemes understood by the router.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyScheme {
    /// Both ends authenticate: producer and consumer key sets.
    Sha1Dual,
    /// Consumers verify the producer.
    Sha1Producer,
    /// Producers verify the consumer.
    Sha1Consumer,
}

impl KeyScheme {
    pub fn id(self) -> u32 {
        match self {
            KeyScheme::Sha1Dual => 1,
            KeyScheme::Sha1Producer => 2,
            KeyScheme::Sha1Consumer => 3,
        }
    }

    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(KeyScheme::Sha1Dual),
            2 => Some(KeyScheme::Sha1Producer),
            3 => Some(KeyScheme::Sha1Consumer),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyScheme::Sha1Dual => "SHA1-Dual",
            KeyScheme::Sha1Producer => "SHA1-Producer",
            KeyScheme::Sha1Consumer => "SHA1-Consumer",
        }
    }

    pub fn is_dual(self) -> bool {
        self == KeyScheme::Sha1Dual
    }

    /// True when keys held in `role` are private under this scheme and must
    /// be hashed before matching.
    pub(crate) fn hashes_role(self, role: Role) -> bool {
        match self {
            KeyScheme::Sha1Dual => true,
            KeyScheme::Sha1Producer => role == Role::Producer,
            KeyScheme::Sha1Consumer => role == Role::Consumer,
        }
    }
}

/// Which end of a notification a key set belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Producer,
    Consumer,
}
