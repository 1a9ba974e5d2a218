// src/cache/key.rs - Cache key derivation

use sha2::{Digest, Sha256};
use std::fmt;

/// Which cached operation a key belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Embed,
    Retrieval,
    Response,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Embed => "embed",
            Domain::Retrieval => "retrieval",
            Domain::Response => "response",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One primitive input to a cache key
#[derive(Debug, Clone, Copy)]
pub enum KeyPart<'a> {
    Str(&'a str),
    Int(i64),
    Uint(u64),
    Float(f64),
}

impl KeyPart<'_> {
    // Each part is written as tag byte + u64 length + payload so that
    // ("ab", "c") and ("a", "bc") never encode to the same bytes.
    fn encode_into(&self, buf: &mut Vec<u8>) {
        let (tag, payload): (u8, Vec<u8>) = match self {
            KeyPart::Str(s) => (b's', s.as_bytes().to_vec()),
            KeyPart::Int(i) => (b'i', i.to_be_bytes().to_vec()),
            KeyPart::Uint(u) => (b'u', u.to_be_bytes().to_vec()),
            KeyPart::Float(f) => (b'f', f.to_bits().to_be_bytes().to_vec()),
        };
        buf.push(tag);
        buf.extend_from_slice(&(payload.len() as u64).to_be_bytes());
        buf.extend_from_slice(&payload);
    }
}

impl<'a> From<&'a str> for KeyPart<'a> {
    fn from(s: &'a str) -> Self {
        KeyPart::Str(s)
    }
}

impl<'a> From<&'a String> for KeyPart<'a> {
    fn from(s: &'a String) -> Self {
        KeyPart::Str(s.as_str())
    }
}

impl From<usize> for KeyPart<'_> {
    fn from(n: usize) -> Self {
        KeyPart::Uint(n as u64)
    }
}

impl From<u32> for KeyPart<'_> {
    fn from(n: u32) -> Self {
        KeyPart::Uint(n as u64)
    }
}

impl From<u64> for KeyPart<'_> {
    fn from(n: u64) -> Self {
        KeyPart::Uint(n)
    }
}

impl From<i64> for KeyPart<'_> {
    fn from(n: i64) -> Self {
        KeyPart::Int(n)
    }
}

impl From<i32> for KeyPart<'_> {
    fn from(n: i32) -> Self {
        KeyPart::Int(n as i64)
    }
}

impl From<f64> for KeyPart<'_> {
    fn from(n: f64) -> Self {
        KeyPart::Float(n)
    }
}

/// Fixed-length cache key: `<domain>:<sha256 hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from a domain tag and an ordered list of parts.
    pub fn derive(domain: Domain, parts: &[KeyPart<'_>]) -> Self {
        let mut buf = Vec::with_capacity(64);
        KeyPart::Str(domain.as_str()).encode_into(&mut buf);
        buf.extend_from_slice(&(parts.len() as u64).to_be_bytes());
        for part in parts {
            part.encode_into(&mut buf);
        }

        let digest = Sha256::digest(&buf);
        CacheKey(format!("{}:{:x}", domain.as_str(), digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Shorthand: `cache_key!(Domain::Embed, text, model)`
#[macro_export]
macro_rules! cache_key {
    ($domain:expr $(, $part:expr)* $(,)?) => {
        $crate::cache::key::CacheKey::derive(
            $domain,
            &[$($crate::cache::key::KeyPart::from($part)),*],
        )
    };
}
