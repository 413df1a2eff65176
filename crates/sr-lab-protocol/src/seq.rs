//! Sequence-space arithmetic shared by the sender and the receiver.
//!
//! ```text
//!        base            base + size
//!  -------|=================|--------------> (mod modulus)
//!         |<---- window --->|
//! ```

/// Forward distance from `from` to `to`, in `[0, modulus)`.
#[inline]
pub fn circular_distance(from: u32, to: u32, modulus: u32) -> u32 {
    let (from, to) = (from % modulus, to % modulus);
    if to >= from {
        to - from
    } else {
        modulus - (from - to)
    }
}

/// True iff `seq` lies in the `size` sequence numbers starting at `base`.
#[inline]
pub fn in_window(seq: u32, base: u32, size: usize, modulus: u32) -> bool {
    (circular_distance(base, seq, modulus) as usize) < size
}

/// `seq + n` wrapped into the sequence space.
#[inline]
pub fn seq_add(seq: u32, n: u32, modulus: u32) -> u32 {
    ((u64::from(seq) + u64::from(n)) % u64::from(modulus)) as u32
}

/// `seq - n` wrapped into the sequence space.
#[inline]
pub fn seq_sub(seq: u32, n: u32, modulus: u32) -> u32 {
    seq_add(seq, modulus - (n % modulus), modulus)
}

/// A sequence space of a fixed modulus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace(u32);

impl SeqSpace {
    pub fn new(modulus: u32) -> Self {
        assert!(modulus > 0, "sequence space must not be empty");
        Self(modulus)
    }

    pub fn modulus(self) -> u32 {
        self.0
    }

    pub fn next(self, seq: u32) -> u32 {
        seq_add(seq, 1, self.0)
    }

    pub fn prev(self, seq: u32) -> u32 {
        seq_sub(seq, 1, self.0)
    }

    pub fn add(self, seq: u32, n: u32) -> u32 {
        seq_add(seq, n, self.0)
    }

    pub fn sub(self, seq: u32, n: u32) -> u32 {
        seq_sub(seq, n, self.0)
    }

    pub fn distance(self, from: u32, to: u32) -> u32 {
        circular_distance(from, to, self.0)
    }

    pub fn in_window(self, seq: u32, base: u32, size: usize) -> bool {
        in_window(seq, base, size, self.0)
    }

    /// Whether `seq` is a valid member of this space.
    pub fn contains(self, seq: u32) -> bool {
        seq < self.0
    }
}
