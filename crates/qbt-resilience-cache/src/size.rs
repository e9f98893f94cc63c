//! Approximate value sizes for the memory budget.
//!
//! Estimates are deliberately rough: text and bytes count their length,
//! scalars a flat [`SCALAR_SIZE`], collections the sum of their parts. Two
//! values of the same shape always get the same estimate, and adding to a
//! collection never makes it smaller.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;

/// Flat estimate for numbers, booleans, characters and `None`.
pub const SCALAR_SIZE: usize = 64;

/// Suggested estimate for opaque structured values.
pub const OBJECT_SIZE: usize = 1024;

/// Rough size of a cached value in bytes.
///
/// ```
/// use qbt_resilience_cache::SizeEstimate;
/// use std::collections::HashMap;
///
/// assert_eq!("magnet".estimated_size(), 6);
/// assert_eq!(vec![1u64, 2, 3].estimated_size(), 3 * 64);
///
/// let mut tags = HashMap::new();
/// tags.insert(String::from("cat"), String::from("anime"));
/// assert_eq!(tags.estimated_size(), 3 + 5);
/// ```
pub trait SizeEstimate {
    fn estimated_size(&self) -> usize;
}

impl SizeEstimate for str {
    fn estimated_size(&self) -> usize {
        self.len()
    }
}

impl SizeEstimate for String {
    fn estimated_size(&self) -> usize {
        self.len()
    }
}

// a byte is a byte, so `Vec<u8>` counts its length
impl SizeEstimate for u8 {
    fn estimated_size(&self) -> usize {
        1
    }
}

macro_rules! scalar_size {
    ($($t:ty),*) => {
        $(
            impl SizeEstimate for $t {
                fn estimated_size(&self) -> usize {
                    SCALAR_SIZE
                }
            }
        )*
    };
}

scalar_size!(i8, i16, i32, i64, i128, isize, u16, u32, u64, u128, usize, f32, f64, bool, char, ());

impl<T: SizeEstimate> SizeEstimate for [T] {
    fn estimated_size(&self) -> usize {
        self.iter().map(SizeEstimate::estimated_size).sum()
    }
}

impl<T: SizeEstimate> SizeEstimate for Vec<T> {
    fn estimated_size(&self) -> usize {
        self.as_slice().estimated_size()
    }
}

impl<T: SizeEstimate> SizeEstimate for Option<T> {
    fn estimated_size(&self) -> usize {
        self.as_ref().map_or(SCALAR_SIZE, SizeEstimate::estimated_size)
    }
}

impl<K: SizeEstimate, V: SizeEstimate, S> SizeEstimate for HashMap<K, V, S> {
    fn estimated_size(&self) -> usize {
        self.iter()
            .map(|(k, v)| k.estimated_size() + v.estimated_size())
            .sum()
    }
}

impl<K: SizeEstimate, V: SizeEstimate> SizeEstimate for BTreeMap<K, V> {
    fn estimated_size(&self) -> usize {
        self.iter()
            .map(|(k, v)| k.estimated_size() + v.estimated_size())
            .sum()
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for &T {
    fn estimated_size(&self) -> usize {
        (**self).estimated_size()
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Box<T> {
    fn estimated_size(&self) -> usize {
        (**self).estimated_size()
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Arc<T> {
    fn estimated_size(&self) -> usize {
        (**self).estimated_size()
    }
}

impl<T: SizeEstimate + ?Sized> SizeEstimate for Rc<T> {
    fn estimated_size(&self) -> usize {
        (**self).estimated_size()
    }
}
