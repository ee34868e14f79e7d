//! Bit patterns and the bit queue the framer searches

use std::collections::VecDeque;
use std::fmt;

use crate::BinvizError;

/// Non-empty bit sequence parsed from a string of '0' and '1'
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitPattern {
    bits: Vec<bool>,
}

impl BitPattern {
    /// Parse a pattern. An empty string means "no pattern" and yields `None`.
    pub fn parse(text: &str) -> Result<Option<Self>, BinvizError> {
        if text.is_empty() {
            return Ok(None);
        }
        let bits = text
            .chars()
            .map(|ch| match ch {
                '0' => Ok(false),
                '1' => Ok(true),
                other => Err(BinvizError::InvalidPattern {
                    pattern: text.to_string(),
                    ch: other,
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Some(Self { bits }))
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// Never true for a parsed pattern
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}

impl fmt::Display for BitPattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for &bit in &self.bits {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

/// FIFO of bits awaiting display
#[derive(Debug, Default, Clone)]
pub struct BitQueue {
    bits: VecDeque<bool>,
}

impl BitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Queue the eight bits of `byte`, most significant first
    pub fn push_byte(&mut self, byte: u8) {
        for shift in (0..8).rev() {
            self.bits.push_back(byte & (1 << shift) != 0);
        }
    }

    pub fn push_bit(&mut self, bit: bool) {
        self.bits.push_back(bit);
    }

    /// First index at or after `from` where `pattern` matches.
    /// A `from` outside the queue searches the whole queue.
    pub fn find(&self, pattern: &BitPattern, from: usize) -> Option<usize> {
        let plen = pattern.len();
        if plen == 0 || plen > self.bits.len() {
            return None;
        }
        let from = if from < self.bits.len() { from } else { 0 };
        (from..=self.bits.len() - plen).find(|&at| {
            pattern
                .bits()
                .iter()
                .enumerate()
                .all(|(i, &bit)| self.bits[at + i] == bit)
        })
    }

    /// Earliest position where a match involving the newest byte could start.
    ///
    /// Earlier positions were already searched when previous bytes arrived.
    /// Falls back to 0 when the result would lie outside the queue.
    pub fn fresh_start(&self, pattern_len: usize) -> usize {
        let len = self.bits.len();
        match len.checked_sub(8 + pattern_len.saturating_sub(1)) {
            Some(start) if start < len => start,
            _ => 0,
        }
    }

    /// Remove `n` bits starting at `at`; out-of-range requests are ignored
    pub fn remove(&mut self, at: usize, n: usize) {
        if n == 0 || at.checked_add(n).is_none_or(|end| end > self.bits.len()) {
            return;
        }
        self.bits.drain(at..at + n);
    }

    /// Remove every occurrence of `pattern`, rescanning from the front after
    /// each removal since the splice may form a new occurrence.
    pub fn strip(&mut self, pattern: &BitPattern) -> usize {
        let mut removed = 0;
        while let Some(at) = self.find(pattern, 0) {
            self.remove(at, pattern.len());
            removed += 1;
        }
        removed
    }

    /// Pop up to `n` bits from the front, in order
    pub fn drain_front(&mut self, n: usize) -> impl Iterator<Item = bool> + '_ {
        let n = n.min(self.bits.len());
        self.bits.drain(..n)
    }

    /// Drop up to `n` bits from the front without returning them
    pub fn discard_front(&mut self, n: usize) {
        let n = n.min(self.bits.len());
        self.bits.drain(..n);
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.bits.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(text: &str) -> BitPattern {
        BitPattern::parse(text).unwrap().unwrap()
    }

    fn queue_of(text: &str) -> BitQueue {
        let mut q = BitQueue::new();
        for ch in text.chars() {
            q.push_bit(ch == '1');
        }
        q
    }

    fn render(q: &BitQueue) -> String {
        q.iter().map(|b| if b { '1' } else { '0' }).collect()
    }

    #[test]
    fn test_parse_pattern() {
        assert_eq!(BitPattern::parse("").unwrap(), None);
        let p = pattern("1010");
        assert_eq!(p.len(), 4);
        assert_eq!(p.to_string(), "1010");
    }

    #[test]
    fn test_parse_rejects_other_characters() {
        let err = BitPattern::parse("10x1").unwrap_err();
        match err {
            BinvizError::InvalidPattern { pattern, ch } => {
                assert_eq!(pattern, "10x1");
                assert_eq!(ch, 'x');
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(BitPattern::parse(" 1").is_err());
    }

    #[test]
    fn test_push_byte_msb_first() {
        let mut q = BitQueue::new();
        q.push_byte(0b1000_0011);
        assert_eq!(render(&q), "10000011");
    }

    #[test]
    fn test_find() {
        let q = queue_of("0011010110");
        assert_eq!(q.find(&pattern("101"), 0), Some(3));
        assert_eq!(q.find(&pattern("101"), 4), Some(5));
        assert_eq!(q.find(&pattern("111"), 0), None);
        // out of range falls back to a full search
        assert_eq!(q.find(&pattern("0011"), 42), Some(0));
        assert_eq!(q.find(&pattern("00110101101"), 0), None);
    }

    #[test]
    fn test_fresh_start() {
        let q = queue_of("0000000000000");
        // 13 bits, 4-bit pattern: 13 - 8 - 3
        assert_eq!(q.fresh_start(4), 2);
        assert_eq!(q.fresh_start(8), 0);
        assert_eq!(BitQueue::new().fresh_start(1), 0);
    }

    #[test]
    fn test_strip_is_repeated() {
        // removing the inner "10" forms a new "10"
        let mut q = queue_of("1100");
        assert_eq!(q.strip(&pattern("10")), 2);
        assert!(q.is_empty());

        let mut q = queue_of("0111");
        assert_eq!(q.strip(&pattern("10")), 0);
        assert_eq!(render(&q), "0111");
    }

    #[test]
    fn test_remove_and_drain() {
        let mut q = queue_of("110010");
        q.remove(1, 2);
        assert_eq!(render(&q), "1010");
        q.remove(3, 5);
        assert_eq!(render(&q), "1010");

        let front: Vec<bool> = q.drain_front(3).collect();
        assert_eq!(front, vec![true, false, true]);
        q.discard_front(10);
        assert!(q.is_empty());
    }
}
