use std::fmt;
use std::str::FromStr;

use bech32::{FromBase32, ToBase32, Variant};
use sha3::{Digest, Keccak256};

use crate::errors::{LocalnetError, LocalnetResult};

pub const ADDRESS_HRP: &str = "erd";
pub const ADDRESS_LENGTH: usize = 32;

/// VM type marker spliced into every smart-contract address (WASM VM).
const WASM_VM_TYPE: [u8; 2] = [0x05, 0x00];
const CONTRACT_ADDRESS_ZERO_PREFIX: usize = 8;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_LENGTH]);

impl Address {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }

    pub fn from_bech32(value: &str) -> LocalnetResult<Self> {
        let invalid = |reason: String| {
            LocalnetError::KeyMaterial(format!("invalid address `{value}`: {reason}"))
        };

        let (hrp, data, variant) = bech32::decode(value).map_err(|err| invalid(err.to_string()))?;
        if hrp != ADDRESS_HRP {
            return Err(invalid(format!("expected prefix `{ADDRESS_HRP}`, found `{hrp}`")));
        }
        if variant != Variant::Bech32 {
            return Err(invalid("expected bech32, found bech32m".to_string()));
        }
        let bytes = Vec::<u8>::from_base32(&data).map_err(|err| invalid(err.to_string()))?;
        let bytes: [u8; ADDRESS_LENGTH] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| {
                invalid(format!("expected 32 bytes, found {}", bytes.len()))
            })?;
        Ok(Self(bytes))
    }

    pub fn to_bech32(&self) -> String {
        self.to_string()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_smart_contract(&self) -> bool {
        self.0[..CONTRACT_ADDRESS_ZERO_PREFIX].iter().all(|byte| *byte == 0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match bech32::encode_to_fmt(f, ADDRESS_HRP, self.0.to_base32(), Variant::Bech32) {
            Ok(result) => result,
            Err(_) => Err(fmt::Error),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = LocalnetError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_bech32(value)
    }
}

/// Address of the contract deployed by `owner` at account nonce `nonce`.
///
/// Layout: 8 zero bytes, the VM type, bytes 10..30 of
/// `keccak256(owner || nonce_le)`, then the last two bytes of the owner.
pub fn compute_contract_address(owner: &Address, nonce: u64) -> Address {
    let mut hasher = Keccak256::new();
    hasher.update(owner.as_bytes());
    hasher.update(nonce.to_le_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; ADDRESS_LENGTH];
    bytes[CONTRACT_ADDRESS_ZERO_PREFIX..10].copy_from_slice(&WASM_VM_TYPE);
    bytes[10..30].copy_from_slice(&digest[10..30]);
    bytes[30..].copy_from_slice(&owner.as_bytes()[30..]);
    Address(bytes)
}
