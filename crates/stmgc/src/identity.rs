//! Identity and identity hash
//!
//! An object's identity must not change when a commit moves it from a
//! nursery into the shared heap. The rules:
//!
//! - a shared object is identified by its address, unless a token was
//!   recorded for that address when the object was promoted
//! - a private working copy has the identity of its shared original
//! - a fresh private object gets a fabricated token on first request;
//!   promotion carries the token over to the shared twin
//!
//! The hash is a fixed scrambling of the identity.

use crate::error::{OrFatal, Result};
use crate::mutator::{Location, Mutator};
use crate::object::{Address, Version};
use serde::Serialize;
use std::fmt;

/// Scramble an identity into a hash
#[inline]
pub fn mangle_hash(i: usize) -> usize {
    i ^ (i >> 4)
}

/// Stable identity of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct IdentityToken(usize);

impl IdentityToken {
    pub(crate) fn from_address(addr: Address) -> Self {
        IdentityToken(addr.as_usize())
    }

    pub(crate) fn fabricated(raw: usize) -> Self {
        IdentityToken(raw)
    }

    #[inline]
    pub fn value(self) -> usize {
        self.0
    }

    #[inline]
    pub fn hash(self) -> usize {
        mangle_hash(self.0)
    }
}

impl fmt::Display for IdentityToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Mutator {
    pub fn try_identity(&mut self, obj: Address) -> Result<IdentityToken> {
        if self.locate(obj)? == Location::Shared {
            return Ok(self.heap.shared_identity(obj));
        }

        let heap = std::sync::Arc::clone(&self.heap);
        let tx = self.tx_mut("identity")?;
        match tx.nursery.header(obj)?.version() {
            Version::Original(shared) | Version::Forwarded(shared) => {
                Ok(heap.shared_identity(shared))
            }
            Version::Empty => {
                if let Some(&token) = tx.local_ids.get(&obj) {
                    return Ok(token);
                }
                let token = heap.fabricate_token()?;
                tx.local_ids.insert(obj, token);
                log::trace!("identity token {} for private object {}", token, obj);
                Ok(token)
            }
        }
    }

    /// Identity of `obj`, stable across promotion
    pub fn identity(&mut self, obj: Address) -> IdentityToken {
        self.try_identity(obj).or_fatal()
    }

    pub fn try_identity_hash(&mut self, obj: Address) -> Result<usize> {
        self.try_identity(obj).map(IdentityToken::hash)
    }

    /// Identity hash of `obj`, stable across promotion
    pub fn identity_hash(&mut self, obj: Address) -> usize {
        self.try_identity_hash(obj).or_fatal()
    }
}
