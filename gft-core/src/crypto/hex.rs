use crate::error::{GftError, Result};

pub fn decode(hex_str: &str) -> Result<Vec<u8>> {
    hex::decode(hex_str.trim()).map_err(|e| GftError::InvalidRequest(format!("invalid hex: {e}")))
}

pub fn encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_trims_and_rejects_garbage() {
        assert_eq!(decode(" cbf43926 ").unwrap(), vec![0xcb, 0xf4, 0x39, 0x26]);
        assert_eq!(encode(&[0x00, 0xff]), "00ff");
        assert!(decode("zz").is_err());
        assert!(decode("abc").is_err());
    }
}
