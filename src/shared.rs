//! Single-writer shared words.
//!
//! Every piece of state that crosses task boundaries (direction, leg
//! setpoints, measured leg positions) lives in one atomic word. `channel`
//! hands out exactly one [`Writer`] and a cloneable [`Reader`]; the writer is
//! not `Clone`, so only the component that owns it can change the value.
//! Readers see either the old or the new value, never a torn one.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::direction::Direction;

/// A value that packs into one `i32` word.
pub trait Word: Copy {
    fn encode(self) -> i32;
    /// `None` when the bits do not name a valid value.
    fn decode(bits: i32) -> Option<Self>;
}

impl Word for i32 {
    fn encode(self) -> i32 {
        self
    }

    fn decode(bits: i32) -> Option<Self> {
        Some(bits)
    }
}

impl Word for Direction {
    fn encode(self) -> i32 {
        self as u8 as i32
    }

    fn decode(bits: i32) -> Option<Self> {
        u8::try_from(bits).ok().and_then(Direction::from_u8)
    }
}

/// Create a shared word holding `initial`.
pub fn channel<T: Word>(initial: T) -> (Writer<T>, Reader<T>) {
    let cell = Arc::new(AtomicI32::new(initial.encode()));
    (
        Writer {
            cell: cell.clone(),
            _marker: PhantomData,
        },
        Reader {
            cell,
            _marker: PhantomData,
        },
    )
}

/// The one handle allowed to store into a shared word.
#[derive(Debug)]
pub struct Writer<T: Word> {
    cell: Arc<AtomicI32>,
    _marker: PhantomData<T>,
}

impl<T: Word> Writer<T> {
    pub fn store(&mut self, value: T) {
        self.cell.store(value.encode(), Ordering::Release);
    }

    /// Value last stored through this writer.
    pub fn current(&self) -> Option<T> {
        T::decode(self.cell.load(Ordering::Acquire))
    }

    pub fn reader(&self) -> Reader<T> {
        Reader {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn store_raw(&mut self, bits: i32) {
        self.cell.store(bits, Ordering::Release);
    }
}

/// Read-only view of a shared word.
#[derive(Debug)]
pub struct Reader<T: Word> {
    cell: Arc<AtomicI32>,
    _marker: PhantomData<T>,
}

impl<T: Word> Clone for Reader<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Word> Reader<T> {
    /// Snapshot of the current value, `None` if the word does not decode.
    pub fn load(&self) -> Option<T> {
        T::decode(self.cell.load(Ordering::Acquire))
    }
}

impl Reader<i32> {
    pub fn value(&self) -> i32 {
        self.cell.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_sees_writer_updates() {
        let (mut writer, reader) = channel(0i32);
        let other = reader.clone();
        writer.store(-180);
        assert_eq!(reader.value(), -180);
        assert_eq!(other.load(), Some(-180));
        assert_eq!(writer.current(), Some(-180));
    }

    #[test]
    fn test_direction_word() {
        let (mut writer, reader) = channel(Direction::Stop);
        assert_eq!(reader.load(), Some(Direction::Stop));
        writer.store(Direction::BeaconOn);
        assert_eq!(reader.load(), Some(Direction::BeaconOn));
    }

    #[test]
    fn test_invalid_direction_bits_do_not_decode() {
        let (mut writer, reader) = channel(Direction::Stop);
        writer.store_raw(99);
        assert_eq!(reader.load(), None);
        writer.store_raw(-1);
        assert_eq!(reader.load(), None);
    }
}
