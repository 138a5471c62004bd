//! Reversible obfuscation of the session mirror.
//!
//! XOR with the fixed keystream from [`kdf::mirror_keystream`], then
//! standard base64. This is **not** encryption: anyone holding this crate can
//! reverse it. It keeps raw key bytes out of a casual glance at the
//! browser's storage inspector. Protection of the secrets rests on the
//! session store's short lifetime and on the in-memory primary cache.
//!
//! [`kdf::mirror_keystream`]: crate::crypto::kdf::mirror_keystream

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::crypto::kdf::mirror_keystream;
use crate::error::{Error, Result};

fn xor_in_place(data: &mut [u8]) -> Result<()> {
    let keystream = mirror_keystream()?;
    for (byte, k) in data.iter_mut().zip(keystream.iter().cycle()) {
        *byte ^= k;
    }
    Ok(())
}

/// Obfuscate bytes into a storage-safe string
pub fn obfuscate(data: &[u8]) -> Result<String> {
    let mut buf = data.to_vec();
    xor_in_place(&mut buf)?;
    Ok(STANDARD.encode(buf))
}

/// Reverse [`obfuscate`]
pub fn deobfuscate(encoded: &str) -> Result<Vec<u8>> {
    let mut buf = STANDARD
        .decode(encoded)
        .map_err(|e| Error::DeserializationError(format!("Invalid mirror encoding: {}", e)))?;
    xor_in_place(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_round_trip_empty() {
        assert_eq!(deobfuscate(&obfuscate(b"").unwrap()).unwrap(), b"");
    }

    #[test]
    fn test_round_trip_keystream_itself() {
        let keystream = mirror_keystream().unwrap();
        let mut doubled = keystream.to_vec();
        doubled.extend_from_slice(&keystream);

        let encoded = obfuscate(&doubled).unwrap();
        assert_eq!(deobfuscate(&encoded).unwrap(), doubled);
    }

    #[test]
    fn test_output_hides_plaintext() {
        let secret = b"0123456789abcdef0123456789abcdef";
        let encoded = obfuscate(secret).unwrap();
        assert_ne!(encoded, STANDARD.encode(secret));
        assert!(!encoded.contains("0123456789"));
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(matches!(
            deobfuscate("not*base64"),
            Err(Error::DeserializationError(_))
        ));
    }

    proptest! {
        #[test]
        fn obfuscation_round_trips(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let encoded = obfuscate(&data).unwrap();
            prop_assert_eq!(deobfuscate(&encoded).unwrap(), data);
        }
    }
}
