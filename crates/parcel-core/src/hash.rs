//! FNV-1a hashing for save integrity tags.

/// Incremental FNV-1a (64-bit) hasher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }

    /// Finish as 16 lowercase hex digits.
    pub fn finish_hex(self) -> String {
        format!("{:016x}", self.0)
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Tag for a serialized payload.
pub fn integrity_tag(payload: &str) -> String {
    let mut h = StateHash::new();
    h.write_str(payload);
    h.finish_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_offset_basis() {
        assert_eq!(StateHash::new().finish(), 0xcbf29ce484222325);
    }

    #[test]
    fn known_vector() {
        // FNV-1a 64 of "a".
        assert_eq!(integrity_tag("a"), "af63dc4c8601ec8c");
    }

    #[test]
    fn tag_is_sixteen_hex_digits_and_input_sensitive() {
        let a = integrity_tag(r#"{"packages":1}"#);
        let b = integrity_tag(r#"{"packages":2}"#);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
