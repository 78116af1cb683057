use serde::{Deserialize, Serialize};

/// A fixed-size bitset backed by 64-bit words.
///
/// Bits past `len` are always clear; every accessor treats them as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitset {
    len: u32,
    words: Vec<u64>,
}

const WORD_BITS: u32 = u64::BITS;

// === impl Bitset ===

impl Bitset {
    pub fn new(len: u32) -> Self {
        let words = (len as usize + WORD_BITS as usize - 1) / WORD_BITS as usize;
        Self {
            len,
            words: vec![0; words],
        }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    fn locate(i: u32) -> (usize, u64) {
        ((i / WORD_BITS) as usize, 1 << (i % WORD_BITS))
    }

    pub fn test(&self, i: u32) -> bool {
        if i >= self.len {
            return false;
        }
        let (word, mask) = Self::locate(i);
        self.words[word] & mask != 0
    }

    /// Sets bit `i`, returning whether it was already set.
    ///
    /// Indices past the end are ignored.
    pub fn set(&mut self, i: u32) -> bool {
        if i >= self.len {
            return false;
        }
        let (word, mask) = Self::locate(i);
        let was_set = self.words[word] & mask != 0;
        self.words[word] |= mask;
        was_set
    }

    /// Clears bit `i`, returning whether it was set.
    pub fn clear(&mut self, i: u32) -> bool {
        if i >= self.len {
            return false;
        }
        let (word, mask) = Self::locate(i);
        let was_set = self.words[word] & mask != 0;
        self.words[word] &= !mask;
        was_set
    }

    /// Returns the first clear bit at or after `from`.
    pub fn next_clear(&self, from: u32) -> Option<u32> {
        self.scan(from, |w| !w)
    }

    /// Returns the first set bit at or after `from`.
    pub fn next_set(&self, from: u32) -> Option<u32> {
        self.scan(from, |w| w)
    }

    fn scan(&self, from: u32, select: impl Fn(u64) -> u64) -> Option<u32> {
        let mut i = from;
        while i < self.len {
            let word = select(self.words[(i / WORD_BITS) as usize]) >> (i % WORD_BITS);
            if word != 0 {
                let found = i + word.trailing_zeros();
                return (found < self.len).then_some(found);
            }
            // Skip to the start of the next word.
            i = (i / WORD_BITS + 1) * WORD_BITS;
        }
        None
    }

    pub fn count(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        let mut next = self.next_set(0);
        std::iter::from_fn(move || {
            let i = next?;
            next = i.checked_add(1).and_then(|n| self.next_set(n));
            Some(i)
        })
    }
}
