use core::hash::Hasher as _;
use hash32::{FnvHasher, Hasher};
use std::borrow::Cow;

/// A dictionary name, stored together with its length and hash so most
/// failed comparisons never touch the bytes.
pub struct FaStr {
    text: Cow<'static, str>,
    len_hash: LenHash,
}

impl FaStr {
    /// Builtin names are never copied.
    pub fn from_static(text: &'static str) -> Self {
        Self {
            len_hash: LenHash::from_str(text),
            text: Cow::Borrowed(text),
        }
    }

    pub fn new(text: &str) -> Self {
        Self {
            len_hash: LenHash::from_str(text),
            text: Cow::Owned(text.to_owned()),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn raw(&self) -> u32 {
        self.len_hash.inner
    }
}

impl PartialEq for FaStr {
    fn eq(&self, other: &Self) -> bool {
        self.len_hash.eq_ignore_bits(&other.len_hash) && self.as_bytes().eq(other.as_bytes())
    }
}

impl PartialEq<TmpFaStr<'_>> for FaStr {
    fn eq(&self, other: &TmpFaStr<'_>) -> bool {
        // First, check the hash
        if self.len_hash.eq_ignore_bits(&other.len_hash) {
            // The hash matches, but there might be collisions. Do the strcmp
            // to make sure
            self.as_bytes().eq(other.text.as_bytes())
        } else {
            // If the hash doesn't match, it's definitely not equal.
            false
        }
    }
}

impl core::fmt::Debug for FaStr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(&self.text, f)
    }
}

/// A borrowed, pre-hashed name used for lookups.
pub struct TmpFaStr<'a> {
    text: &'a str,
    len_hash: LenHash,
}

impl<'a> TmpFaStr<'a> {
    pub fn new_from(text: &'a str) -> Self {
        Self {
            text,
            len_hash: LenHash::from_str(text),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub struct LenHash {
    // 29..32: 3-bit bitfield
    // 24..29: 5-bit len (0..31)
    // 00..24: 24-bit FnvHash
    inner: u32,
}

impl LenHash {
    const HASH_MASK: u32 = 0x00FF_FFFF;
    const BITS_MASK: u32 = 0xE000_0000;
    const LEN_MASK: u32 = 0x1F00_0000;

    /// Creates a new LenHash, considering UP TO 31 characters.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        Self::from_bstr(s.as_bytes())
    }

    pub fn from_bstr(s: &[u8]) -> Self {
        let mut hasher = FnvHasher::default();
        let len = s.len().min(31);

        // Longer names share a hash with their 31 character prefix; the byte
        // comparison in `FaStr::eq` still tells them apart.
        hasher.write(&s[..len]);
        let hash = hasher.finish32();
        let inner = ((len as u32) << 24) | (hash & Self::HASH_MASK);
        Self { inner }
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let len_u32 = (self.inner & Self::LEN_MASK) >> 24;
        len_u32 as usize
    }

    pub fn eq_ignore_bits(&self, other: &Self) -> bool {
        (self.inner & !Self::BITS_MASK) == (other.inner & !Self::BITS_MASK)
    }
}

#[cfg(test)]
pub mod test {
    use super::{FaStr, LenHash, TmpFaStr};

    #[test]
    fn static_and_owned_agree() {
        const ITEMS: &[&str] = &["hello", "this", "is", "a", "very", "silly", "test"];

        for txt in ITEMS {
            let owned = FaStr::new(txt);
            let fixed = FaStr::from_static(txt);
            assert!(owned == fixed);
            assert!(owned == TmpFaStr::new_from(txt));
            assert_eq!(owned.raw(), fixed.raw());
        }
        assert!(FaStr::new("dup") != TmpFaStr::new_from("drop"));
    }

    #[test]
    fn long_names_still_compare_bytes() {
        let a = "a-very-long-word-name-that-goes-past-the-limit-one";
        let b = "a-very-long-word-name-that-goes-past-the-limit-two";
        assert_eq!(LenHash::from_str(a).len(), 31);
        assert!(FaStr::new(a) != TmpFaStr::new_from(b));
        assert!(FaStr::new(a) == TmpFaStr::new_from(a));
    }
}
