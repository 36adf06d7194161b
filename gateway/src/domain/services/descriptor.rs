//! Watch-only descriptor engine: parses a single-chain output descriptor
//! and derives per-index deposit addresses with their scriptPubKeys.
//!
//! Accepted shape: `<type>([origin]xpub/<path>/*)` with
//! `type ∈ {tr, wpkh, sh, pkh}`; `sh` is treated as the common
//! `sh(wpkh(...))` nesting. A trailing `#checksum` is tolerated and
//! ignored (Bitcoin Core validates checksums; we only consume them).

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use bitcoin::bip32::{ChildNumber, Xpub};
use bitcoin::secp256k1::{All, Secp256k1};
use bitcoin::{Address, CompressedPublicKey, XOnlyPublicKey};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Network;

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("unsupported descriptor: {0}")]
    UnsupportedDescriptor(String),
    #[error("invalid xpub: {0}")]
    InvalidXpub(String),
}

/// Script template selected by the descriptor's outer function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScriptKind {
    Tr,
    Wpkh,
    ShWpkh,
    Pkh,
}

/// One derived deposit address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Derived {
    pub address: String,
    pub script_pubkey_hex: String,
}

/// Parsed descriptor plus a per-index derivation memo.
#[derive(Debug)]
pub struct DescriptorEngine {
    descriptor: String,
    kind: ScriptKind,
    xpub: Xpub,
    /// Fixed path prefix between the xpub and the wildcard, e.g. `[0]`
    prefix: Vec<ChildNumber>,
    network: Network,
    secp: Secp256k1<All>,
    memo: Mutex<HashMap<u32, Derived>>,
}

impl DescriptorEngine {
    pub fn parse(descriptor: &str, network: Network) -> Result<Self, DescriptorError> {
        let canonical = descriptor.trim();
        // `desc#checksum`: keep only the descriptor body
        let body = canonical.split('#').next().unwrap_or(canonical);

        let unsupported = |msg: &str| DescriptorError::UnsupportedDescriptor(msg.to_string());

        let (kind, inner) = if let Some(rest) = body.strip_prefix("tr(") {
            (ScriptKind::Tr, rest)
        } else if let Some(rest) = body.strip_prefix("wpkh(") {
            (ScriptKind::Wpkh, rest)
        } else if let Some(rest) = body.strip_prefix("pkh(") {
            (ScriptKind::Pkh, rest)
        } else if let Some(rest) = body.strip_prefix("sh(") {
            let rest = rest
                .strip_prefix("wpkh(")
                .ok_or_else(|| unsupported("sh() is only supported as sh(wpkh(...))"))?;
            (ScriptKind::ShWpkh, rest)
        } else {
            return Err(unsupported(
                "descriptor must be one of tr(...), wpkh(...), sh(wpkh(...)), pkh(...)",
            ));
        };

        let inner = inner
            .strip_suffix(if kind == ScriptKind::ShWpkh { "))" } else { ")" })
            .ok_or_else(|| unsupported("unbalanced parentheses"))?;

        // Strip a [fingerprint/path] key-origin block if present
        let inner = if let Some(rest) = inner.strip_prefix('[') {
            rest.split_once(']')
                .map(|(_, key)| key)
                .ok_or_else(|| unsupported("unterminated key origin"))?
        } else {
            inner
        };

        let (key, path) = match inner.split_once('/') {
            Some((key, path)) => (key, path),
            None => return Err(unsupported("derivation path must end in /*")),
        };

        let mut segments: Vec<&str> = path.split('/').collect();
        match segments.pop() {
            Some("*") => {}
            _ => return Err(unsupported("derivation path must end in /*")),
        }

        let mut prefix = Vec::with_capacity(segments.len());
        for seg in segments {
            if seg.ends_with('h') || seg.ends_with('\'') {
                return Err(unsupported("hardened steps cannot be derived from an xpub"));
            }
            let idx: u32 = seg
                .parse()
                .map_err(|_| unsupported("non-numeric derivation step"))?;
            let child = ChildNumber::from_normal_idx(idx)
                .map_err(|_| unsupported("derivation step out of range"))?;
            prefix.push(child);
        }

        let xpub =
            Xpub::from_str(key).map_err(|e| DescriptorError::InvalidXpub(e.to_string()))?;

        Ok(Self {
            descriptor: body.to_string(),
            kind,
            xpub,
            prefix,
            network,
            secp: Secp256k1::new(),
            memo: Mutex::new(HashMap::new()),
        })
    }

    /// Derive the deposit address and scriptPubKey at `index` on the
    /// descriptor's wildcard chain. Derivations are memoized in process
    /// memory; repeated calls are map lookups.
    pub fn derive(&self, index: u32) -> Result<Derived, DescriptorError> {
        if let Some(hit) = self.memo.lock().expect("descriptor memo poisoned").get(&index) {
            return Ok(hit.clone());
        }

        let mut path = self.prefix.clone();
        path.push(
            ChildNumber::from_normal_idx(index)
                .map_err(|_| DescriptorError::UnsupportedDescriptor("index out of range".into()))?,
        );

        let child = self
            .xpub
            .derive_pub(&self.secp, &path)
            .map_err(|e| DescriptorError::InvalidXpub(e.to_string()))?;
        let network = self.network.to_bitcoin_network();

        let address = match self.kind {
            ScriptKind::Wpkh => Address::p2wpkh(&CompressedPublicKey(child.public_key), network),
            ScriptKind::ShWpkh => {
                Address::p2shwpkh(&CompressedPublicKey(child.public_key), network)
            }
            ScriptKind::Pkh => Address::p2pkh(CompressedPublicKey(child.public_key), network),
            ScriptKind::Tr => Address::p2tr(
                &self.secp,
                XOnlyPublicKey::from(child.public_key),
                None,
                network,
            ),
        };

        let derived = Derived {
            script_pubkey_hex: hex::encode(address.script_pubkey().as_bytes()),
            address: address.to_string(),
        };

        self.memo
            .lock()
            .expect("descriptor memo poisoned")
            .insert(index, derived.clone());
        Ok(derived)
    }

    /// Stable identity of this descriptor, persisted in system metadata so
    /// a database cannot silently be re-pointed at a different wallet.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.descriptor.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn network(&self) -> Network {
        self.network
    }
}
