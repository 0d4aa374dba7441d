//! Conversions between wire level maps and signature chains.

use cipherise_crypto::{
    Binding, DeviceKeyChain, PrivateKey, PublicKey, SignatureChain, produce_chain, verify_chain,
};
use cipherise_proto::{LevelMap, WireError};

use crate::error::{CipheriseError, Result};

fn levels_from_wire(
    message: &'static str,
    field: &'static str,
    map: &LevelMap,
) -> Result<Vec<(u8, String)>> {
    map.iter()
        .map(|(level, value)| {
            level.parse::<u8>().map(|level| (level, value.clone())).map_err(|_| {
                CipheriseError::from(WireError::InvalidField {
                    message,
                    field,
                    reason: format!("level '{level}'"),
                })
            })
        })
        .collect()
}

/// Device key chain from a wire `publicKeys` map.
pub fn key_chain_from_wire(message: &'static str, map: &LevelMap) -> Result<DeviceKeyChain> {
    Ok(levels_from_wire(message, "publicKeys", map)?.into_iter().collect())
}

/// Signature chain from a wire `signatures` map.
pub fn signatures_from_wire(message: &'static str, map: &LevelMap) -> Result<SignatureChain> {
    Ok(levels_from_wire(message, "signatures", map)?.into_iter().collect())
}

/// Wire `signatures` map.
pub fn signatures_to_wire(chain: SignatureChain) -> LevelMap {
    chain.into_inner().into_iter().map(|(level, sig)| (level.to_string(), sig)).collect()
}

/// Sign a device's wire key chain.
pub fn sign_device(
    service: &PrivateKey,
    binding: &Binding<'_>,
    public_keys: &LevelMap,
) -> Result<LevelMap> {
    let keys = key_chain_from_wire("enrolment validate", public_keys)?;
    Ok(signatures_to_wire(produce_chain(service, binding, &keys)?))
}

/// Verify a device's wire chains. Malformed maps are simply invalid.
pub fn verify_device(
    service: &PublicKey,
    binding: &Binding<'_>,
    public_keys: &LevelMap,
    signatures: &LevelMap,
) -> bool {
    let (Ok(keys), Ok(sigs)) = (
        key_chain_from_wire("device entry", public_keys),
        signatures_from_wire("device entry", signatures),
    ) else {
        return false;
    };
    verify_chain(service, binding, &keys, &sigs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{device_keys, sp_keys};

    const BINDING: Binding<'static> = Binding {
        host: "https://cipherise.example.com/",
        service_id: "sp-1",
        username: "alice",
        device_id: "dev-1",
    };

    fn wire_keys() -> LevelMap {
        (1..=4u8)
            .map(|level| (level.to_string(), device_keys(level).public().to_pem().unwrap()))
            .collect()
    }

    #[test]
    fn signed_wire_chain_verifies() {
        let signatures = sign_device(sp_keys().private(), &BINDING, &wire_keys()).unwrap();

        assert_eq!(signatures.keys().map(String::as_str).collect::<Vec<_>>(), ["1", "2", "3", "4"]);
        assert!(verify_device(sp_keys().public(), &BINDING, &wire_keys(), &signatures));
    }

    #[test]
    fn non_numeric_level_is_schema_error() {
        let mut keys = wire_keys();
        let pem = keys.remove("4").unwrap();
        keys.insert("four".to_string(), pem);

        assert!(sign_device(sp_keys().private(), &BINDING, &keys).is_err());
    }

    #[test]
    fn three_level_chain_cannot_be_signed() {
        let mut keys = wire_keys();
        keys.remove("2");

        assert!(sign_device(sp_keys().private(), &BINDING, &keys).is_err());
    }

    #[test]
    fn chain_for_another_device_fails() {
        let signatures = sign_device(sp_keys().private(), &BINDING, &wire_keys()).unwrap();
        let other = Binding { device_id: "dev-2", ..BINDING };

        assert!(!verify_device(sp_keys().public(), &other, &wire_keys(), &signatures));
    }
}
