use crc32fast::Hasher;

/// CRC-32 (IEEE polynomial 0xEDB88320, reflected, init/final XOR 0xFFFFFFFF)
/// of an arbitrary byte run. Pure, total.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_matches_known_crc32() {
        assert_eq!(crc32(&[]), 0);
    }

    #[test]
    fn known_vector() {
        // CRC-32/ISO-HDLC of ASCII "123456789" is the standard check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn differs_on_single_bit_flip() {
        let a = [0u8, 1, 2, 3, 4];
        let mut b = a;
        b[2] ^= 0x01;
        assert_ne!(crc32(&a), crc32(&b));
    }
}
