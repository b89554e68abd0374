//! Raw backing store of an ArrayBuffer
//!
//! A `DataBlock` is a zero-filled run of `AtomicU64` words. Every element
//! access, whatever its width, is a single atomic operation on the one word
//! that contains it: loads extract the element's bits, stores and
//! read-modify-writes splice them back in with a compare-exchange loop.
//! Views of different widths over the same bytes therefore only ever meet
//! as same-sized atomic accesses to the same word. Plain element reads and
//! writes use `Relaxed`; the `Atomics` operations use `SeqCst`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::VmResult;
use crate::memory::MemoryManager;

const WORD_SIZE: usize = std::mem::size_of::<u64>();

/// A native integer type that can live in a data block.
pub trait AtomicElement: Copy + Eq + std::fmt::Debug + Send + Sync + 'static {
    /// Width in bytes
    const SIZE: usize;

    /// Zero-extended bit pattern
    fn to_bits(self) -> u64;
    /// Truncate a bit pattern to this type
    fn from_bits(bits: u64) -> Self;
    /// Wrapping result of `op` applied to `current` and `operand`
    fn apply(op: RmwOp, current: Self, operand: Self) -> Self;
}

/// Read-modify-write operation applied by [`DataBlock::read_modify_write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmwOp {
    /// Wrapping addition
    Add,
    /// Wrapping subtraction
    Sub,
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Bitwise xor
    Xor,
    /// Unconditional swap
    Exchange,
}

macro_rules! impl_atomic_element {
    ($($int:ty => $unsigned:ty),* $(,)?) => {
        $(
            impl AtomicElement for $int {
                const SIZE: usize = std::mem::size_of::<$int>();

                #[inline]
                fn to_bits(self) -> u64 {
                    self as $unsigned as u64
                }

                #[inline]
                fn from_bits(bits: u64) -> Self {
                    bits as $unsigned as $int
                }

                #[inline]
                fn apply(op: RmwOp, current: Self, operand: Self) -> Self {
                    match op {
                        RmwOp::Add => current.wrapping_add(operand),
                        RmwOp::Sub => current.wrapping_sub(operand),
                        RmwOp::And => current & operand,
                        RmwOp::Or => current | operand,
                        RmwOp::Xor => current ^ operand,
                        RmwOp::Exchange => operand,
                    }
                }
            }
        )*
    };
}

impl_atomic_element! {
    i8 => u8,
    u8 => u8,
    i16 => u16,
    u16 => u16,
    i32 => u32,
    u32 => u32,
    i64 => u64,
    u64 => u64,
}

/// The word holding an element and where the element sits inside it
struct Lane<'a> {
    word: &'a AtomicU64,
    shift: u32,
    mask: u64,
}

impl Lane<'_> {
    #[inline]
    fn extract<T: AtomicElement>(&self, word: u64) -> T {
        T::from_bits((word >> self.shift) & self.mask)
    }

    #[inline]
    fn insert<T: AtomicElement>(&self, word: u64, value: T) -> u64 {
        (word & !(self.mask << self.shift)) | ((value.to_bits() & self.mask) << self.shift)
    }

    #[inline]
    fn load<T: AtomicElement>(&self, order: Ordering) -> T {
        self.extract(self.word.load(order))
    }

    /// Replace the element with `f(current)`, returning the previous value.
    /// `f` returning `None` leaves the word untouched.
    #[inline]
    fn update<T: AtomicElement>(&self, order: Ordering, f: impl Fn(T) -> Option<T>) -> T {
        let fetch_order = match order {
            Ordering::SeqCst => Ordering::SeqCst,
            _ => Ordering::Relaxed,
        };
        let previous = self
            .word
            .fetch_update(order, fetch_order, |word| {
                f(self.extract(word)).map(|value| self.insert(word, value))
            })
            .unwrap_or_else(|word| word);
        self.extract(previous)
    }
}

/// Zero-filled backing memory of an ArrayBuffer
pub struct DataBlock {
    words: Box<[AtomicU64]>,
    byte_length: usize,
    memory: Arc<MemoryManager>,
}

impl std::fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataBlock")
            .field("byte_length", &self.byte_length)
            .field("address", &self.base_address())
            .finish()
    }
}

impl DataBlock {
    /// Allocate `byte_length` zeroed bytes, booking them with `memory`.
    pub fn new(byte_length: usize, memory: Arc<MemoryManager>) -> VmResult<Self> {
        memory.alloc(byte_length)?;
        let words: Vec<AtomicU64> = (0..byte_length.div_ceil(WORD_SIZE))
            .map(|_| AtomicU64::new(0))
            .collect();
        Ok(Self {
            words: words.into_boxed_slice(),
            byte_length,
            memory,
        })
    }

    /// Length in bytes
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Address of the first byte. Stable for the lifetime of the block.
    #[inline]
    pub fn base_address(&self) -> usize {
        self.words.as_ptr() as usize
    }

    /// Locate the `T`-sized element starting at `byte_index`.
    ///
    /// `None` when the element is out of bounds or misaligned for `T`. An
    /// aligned element never straddles two words.
    #[inline]
    fn lane<T: AtomicElement>(&self, byte_index: usize) -> Option<Lane<'_>> {
        let end = byte_index.checked_add(T::SIZE)?;
        if end > self.byte_length || byte_index % T::SIZE != 0 {
            return None;
        }
        let word = self.words.get(byte_index / WORD_SIZE)?;
        let offset = byte_index % WORD_SIZE;
        // Byte `k` of a word in memory order, in native byte order.
        let shift = (if cfg!(target_endian = "little") {
            offset * 8
        } else {
            (WORD_SIZE - offset - T::SIZE) * 8
        }) as u32;
        let mask = if T::SIZE == WORD_SIZE {
            u64::MAX
        } else {
            (1u64 << (T::SIZE * 8)) - 1
        };
        Some(Lane { word, shift, mask })
    }

    /// Relaxed element read
    #[inline]
    pub fn get<T: AtomicElement>(&self, byte_index: usize) -> Option<T> {
        self.lane::<T>(byte_index).map(|l| l.load(Ordering::Relaxed))
    }

    /// Relaxed element write
    #[inline]
    pub fn set<T: AtomicElement>(&self, byte_index: usize, value: T) -> bool {
        match self.lane::<T>(byte_index) {
            Some(l) => {
                l.update::<T>(Ordering::Relaxed, |_| Some(value));
                true
            }
            None => false,
        }
    }

    /// Sequentially consistent load
    #[inline]
    pub fn load<T: AtomicElement>(&self, byte_index: usize) -> Option<T> {
        self.lane::<T>(byte_index).map(|l| l.load(Ordering::SeqCst))
    }

    /// Sequentially consistent store
    #[inline]
    pub fn store<T: AtomicElement>(&self, byte_index: usize, value: T) -> bool {
        match self.lane::<T>(byte_index) {
            Some(l) => {
                l.update::<T>(Ordering::SeqCst, |_| Some(value));
                true
            }
            None => false,
        }
    }

    /// Sequentially consistent read-modify-write; returns the previous value
    #[inline]
    pub fn read_modify_write<T: AtomicElement>(
        &self,
        byte_index: usize,
        op: RmwOp,
        operand: T,
    ) -> Option<T> {
        self.lane::<T>(byte_index)
            .map(|l| l.update::<T>(Ordering::SeqCst, |current| Some(T::apply(op, current, operand))))
    }

    /// Sequentially consistent compare-exchange; returns the value observed
    /// before the attempted swap
    #[inline]
    pub fn compare_exchange<T: AtomicElement>(
        &self,
        byte_index: usize,
        expected: T,
        replacement: T,
    ) -> Option<T> {
        self.lane::<T>(byte_index).map(|l| {
            l.update::<T>(Ordering::SeqCst, |current| {
                (current == expected).then_some(replacement)
            })
        })
    }

    /// Copy `dest.len()` bytes starting at `offset` out of the block
    pub fn read_bytes(&self, offset: usize, dest: &mut [u8]) -> bool {
        if offset.checked_add(dest.len()).is_none_or(|end| end > self.byte_length) {
            return false;
        }
        for (i, byte) in dest.iter_mut().enumerate() {
            *byte = self.get::<u8>(offset + i).unwrap_or(0);
        }
        true
    }

    /// Copy `src` into the block starting at `offset`
    pub fn write_bytes(&self, offset: usize, src: &[u8]) -> bool {
        if offset.checked_add(src.len()).is_none_or(|end| end > self.byte_length) {
            return false;
        }
        for (i, &byte) in src.iter().enumerate() {
            self.set::<u8>(offset + i, byte);
        }
        true
    }
}

impl Drop for DataBlock {
    fn drop(&mut self) {
        self.memory.free(self.byte_length);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn block(len: usize) -> DataBlock {
        DataBlock::new(len, Arc::new(MemoryManager::test())).unwrap()
    }

    #[test]
    fn test_zero_filled_and_aligned() {
        let b = block(13);
        assert_eq!(b.byte_length(), 13);
        assert_eq!(b.base_address() % 8, 0);
        let mut out = [1u8; 13];
        assert!(b.read_bytes(0, &mut out));
        assert_eq!(out, [0u8; 13]);
    }

    #[test]
    fn test_bounds_and_alignment() {
        let b = block(12);
        assert!(b.get::<u32>(8).is_some());
        assert!(b.get::<u32>(2).is_none());
        assert!(b.get::<u32>(12).is_none());
        assert!(b.get::<u64>(0).is_some());
        assert!(b.get::<u64>(8).is_none());
        assert!(b.get::<u8>(11).is_some());
        assert!(b.get::<u16>(usize::MAX - 1).is_none());
        assert!(!b.set::<u16>(11, 1));
    }

    #[test]
    fn test_narrow_elements_share_a_word() {
        let b = block(8);
        b.store::<u32>(0, 0x0403_0201);
        b.store::<u16>(4, 0x0605);
        b.store::<u8>(6, 0x07);
        b.store::<u8>(7, 0x08);
        let mut bytes = [0u8; 8];
        assert!(b.read_bytes(0, &mut bytes));
        assert_eq!(u64::from_ne_bytes(bytes), b.load::<u64>(0).unwrap());
        assert_eq!(bytes[..4], 0x0403_0201u32.to_ne_bytes());
        assert_eq!(bytes[4..6], 0x0605u16.to_ne_bytes());
        assert_eq!(bytes[6..], [0x07, 0x08]);

        // Writing one lane leaves its neighbours alone.
        b.store::<i8>(5, -1);
        assert_eq!(b.load::<u8>(5), Some(0xff));
        assert_eq!(b.load::<u32>(0), Some(0x0403_0201));
        assert_eq!(b.load::<u8>(6), Some(0x07));
    }

    #[test]
    fn test_rmw_wraps() {
        let b = block(8);
        b.store::<u8>(0, 250);
        assert_eq!(b.read_modify_write::<u8>(0, RmwOp::Add, 10), Some(250));
        assert_eq!(b.load::<u8>(0), Some(4));

        b.store::<i16>(2, i16::MIN);
        assert_eq!(b.read_modify_write::<i16>(2, RmwOp::Sub, 1), Some(i16::MIN));
        assert_eq!(b.load::<i16>(2), Some(i16::MAX));

        b.store::<u32>(4, 0b1100);
        assert_eq!(b.read_modify_write::<u32>(4, RmwOp::And, 0b1010), Some(0b1100));
        assert_eq!(b.read_modify_write::<u32>(4, RmwOp::Or, 0b0001), Some(0b1000));
        assert_eq!(b.read_modify_write::<u32>(4, RmwOp::Xor, 0b1111), Some(0b1001));
        assert_eq!(b.read_modify_write::<u32>(4, RmwOp::Exchange, 7), Some(0b0110));
        assert_eq!(b.load::<u32>(4), Some(7));
    }

    #[test]
    fn test_compare_exchange_returns_observed() {
        let b = block(8);
        b.store::<i64>(0, 5);
        assert_eq!(b.compare_exchange::<i64>(0, 4, 9), Some(5));
        assert_eq!(b.load::<i64>(0), Some(5));
        assert_eq!(b.compare_exchange::<i64>(0, 5, 9), Some(5));
        assert_eq!(b.load::<i64>(0), Some(9));
    }

    #[test]
    fn test_memory_accounting() {
        let mm = Arc::new(MemoryManager::new(64));
        let b = DataBlock::new(48, mm.clone()).unwrap();
        assert_eq!(mm.allocated(), 48);
        assert!(DataBlock::new(32, mm.clone()).is_err());
        drop(b);
        assert_eq!(mm.allocated(), 0);
    }

    #[test]
    fn test_concurrent_adds() {
        let b = Arc::new(block(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let b = b.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        b.read_modify_write::<i32>(0, RmwOp::Add, 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(b.load::<i32>(0), Some(4000));
    }

    #[test]
    fn test_concurrent_mixed_width_rmw_on_one_word() {
        let b = Arc::new(block(8));
        // Byte 1 lies inside the i32 at 0; byte 5 is a separate lane of the same word.
        let narrow = {
            let b = b.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    b.read_modify_write::<i8>(1, RmwOp::Add, 1);
                    b.read_modify_write::<u8>(5, RmwOp::Add, 1);
                }
            })
        };
        for _ in 0..200 {
            b.read_modify_write::<i32>(0, RmwOp::Add, 1);
        }
        narrow.join().unwrap();
        assert_eq!(b.load::<i32>(0), Some(200 + 100 * 256));
        assert_eq!(b.load::<u8>(1), Some(100));
        assert_eq!(b.load::<u8>(5), Some(100));
    }
}
