/*!
A set of Unicode code points, used by character-class nodes and by the
optimizer's first-character analysis.

Code points below 128 are kept in a fixed 128-bit bitmap so that membership
tests on ASCII subjects are a couple of machine instructions; every other
code point lives in a sorted, merged list of inclusive ranges. All mutating
operations keep both representations consistent: a code point is in the set
if and only if the representation responsible for its plane says so.
*/

use std::fmt::{self, Display, Formatter};

use bitvec::array::BitArray;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The largest valid code point.
pub(crate) const MAX_CODE_POINT: u32 = 0x10FFFF;

/// Code points below this limit are stored in the bitmap.
const BITMAP_LIMIT: u32 = 128;

type Bitmap = BitArray<[u64; 2]>;

/// A set of code points backed by an ASCII bitmap plus a sorted range list.
#[derive(Clone, Default, PartialEq, Eq)]
pub(crate) struct ClassSet {
    bitmap: Bitmap,
    /// Sorted, non-overlapping, non-adjacent inclusive ranges, all of them
    /// at or above [`BITMAP_LIMIT`].
    ranges: Vec<(u32, u32)>,
}

impl ClassSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a set containing every code point.
    pub fn full() -> Self {
        let mut set = Self::new();
        set.set_range(0, MAX_CODE_POINT);
        set
    }

    /// Returns true if the set contains no code points.
    pub fn is_empty(&self) -> bool {
        self.bitmap.not_any() && self.ranges.is_empty()
    }

    /// Adds a single code point to the set.
    pub fn set(&mut self, cp: u32) {
        self.set_range(cp, cp);
    }

    /// Adds a single character to the set.
    pub fn add_char(&mut self, c: char) {
        self.set(c as u32);
    }

    /// Adds the inclusive range `low..=high` to the set.
    pub fn set_range(&mut self, low: u32, high: u32) {
        debug_assert!(low <= high && high <= MAX_CODE_POINT);
        if low < BITMAP_LIMIT {
            let end = high.min(BITMAP_LIMIT - 1) as usize;
            self.bitmap[low as usize..=end].fill(true);
        }
        if high >= BITMAP_LIMIT {
            self.insert_range(low.max(BITMAP_LIMIT), high);
        }
    }

    /// Returns true if the set contains the code point `cp`.
    pub fn contains(&self, cp: u32) -> bool {
        if cp < BITMAP_LIMIT {
            self.bitmap[cp as usize]
        } else {
            let idx = self.ranges.partition_point(|&(lo, _)| lo <= cp);
            idx > 0 && self.ranges[idx - 1].1 >= cp
        }
    }

    /// Returns true if the set contains the character `c`.
    pub fn contains_char(&self, c: char) -> bool {
        self.contains(c as u32)
    }

    /// Adds every code point of `other` to this set.
    pub fn union(&mut self, other: &ClassSet) {
        for (a, b) in self
            .bitmap
            .as_raw_mut_slice()
            .iter_mut()
            .zip(other.bitmap.as_raw_slice())
        {
            *a |= *b;
        }
        for &(lo, hi) in other.ranges.iter() {
            self.insert_range(lo, hi);
        }
    }

    /// Adds the complement of `other` (over the full code-point space) to
    /// this set.
    pub fn union_negated(&mut self, other: &ClassSet) {
        for (a, b) in self
            .bitmap
            .as_raw_mut_slice()
            .iter_mut()
            .zip(other.bitmap.as_raw_slice())
        {
            *a |= !*b;
        }
        // The bitmap has 128 bits, all of them meaningful, so no masking of
        // the inverted words is needed.
        let mut next = BITMAP_LIMIT;
        let gaps: Vec<(u32, u32)> = other
            .ranges
            .iter()
            .filter_map(|&(lo, hi)| {
                let gap =
                    if lo > next { Some((next, lo - 1)) } else { None };
                next = hi + 1;
                gap
            })
            .collect();
        for (lo, hi) in gaps {
            self.insert_range(lo, hi);
        }
        if next <= MAX_CODE_POINT {
            self.insert_range(next, MAX_CODE_POINT);
        }
    }

    /// Replaces this set with its intersection with `other`. Returns true
    /// if the two sets were disjoint, that is, if the intersection is
    /// empty. The optimizer uses the return value for its disjointness
    /// analysis.
    pub fn intersect_and_check_disjoint(&mut self, other: &ClassSet) -> bool {
        for (a, b) in self
            .bitmap
            .as_raw_mut_slice()
            .iter_mut()
            .zip(other.bitmap.as_raw_slice())
        {
            *a &= *b;
        }
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.ranges.len() && j < other.ranges.len() {
            let (lo1, hi1) = self.ranges[i];
            let (lo2, hi2) = other.ranges[j];
            let lo = lo1.max(lo2);
            let hi = hi1.min(hi2);
            if lo <= hi {
                result.push((lo, hi));
            }
            if hi1 < hi2 {
                i += 1;
            } else {
                j += 1;
            }
        }
        self.ranges = result;
        self.is_empty()
    }

    /// Removes every code point of `other` from this set.
    #[allow(dead_code)]
    pub fn difference(&mut self, other: &ClassSet) {
        for (a, b) in self
            .bitmap
            .as_raw_mut_slice()
            .iter_mut()
            .zip(other.bitmap.as_raw_slice())
        {
            *a &= !*b;
        }
        let mut result = Vec::new();
        let mut j = 0;
        for &(lo, hi) in self.ranges.iter() {
            while j < other.ranges.len() && other.ranges[j].1 < lo {
                j += 1;
            }
            let mut cursor = lo;
            let mut k = j;
            while k < other.ranges.len() && other.ranges[k].0 <= hi {
                let (olo, ohi) = other.ranges[k];
                if olo > cursor {
                    result.push((cursor, olo - 1));
                }
                cursor = ohi + 1;
                if cursor > hi {
                    break;
                }
                k += 1;
            }
            if cursor <= hi {
                result.push((cursor, hi));
            }
        }
        self.ranges = result;
    }

    /// Inserts `low..=high` into the range list, merging it with any range
    /// it overlaps or touches. Both bounds must be at or above
    /// [`BITMAP_LIMIT`].
    fn insert_range(&mut self, low: u32, high: u32) {
        debug_assert!(low >= BITMAP_LIMIT && low <= high);
        let start = self.ranges.partition_point(|&(_, hi)| hi + 1 < low);
        let mut merged = (low, high);
        let mut end = start;
        while end < self.ranges.len() && self.ranges[end].0 <= high + 1 {
            merged.0 = merged.0.min(self.ranges[end].0);
            merged.1 = merged.1.max(self.ranges[end].1);
            end += 1;
        }
        self.ranges.splice(start..end, [merged]);
    }

    /// Iterates the inclusive ranges of the set, bitmap included, in
    /// ascending order with adjacent ranges merged.
    fn merged_ranges(&self) -> Vec<(u32, u32)> {
        let mut out: Vec<(u32, u32)> = Vec::new();
        let mut push = |lo: u32, hi: u32| match out.last_mut() {
            Some(last) if last.1 + 1 == lo => last.1 = hi,
            _ => out.push((lo, hi)),
        };
        let mut run: Option<u32> = None;
        for cp in 0..BITMAP_LIMIT {
            match (self.bitmap[cp as usize], run) {
                (true, None) => run = Some(cp),
                (false, Some(start)) => {
                    push(start, cp - 1);
                    run = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run {
            push(start, BITMAP_LIMIT - 1);
        }
        for &(lo, hi) in self.ranges.iter() {
            push(lo, hi);
        }
        out
    }
}

impl Serialize for ClassSet {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        (self.bitmap.clone().into_inner(), &self.ranges).serialize(s)
    }
}

impl<'de> Deserialize<'de> for ClassSet {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let (raw, ranges): ([u64; 2], Vec<(u32, u32)>) =
            Deserialize::deserialize(d)?;
        Ok(ClassSet { bitmap: BitArray::new(raw), ranges })
    }
}

impl Display for ClassSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (lo, hi)) in self.merged_ranges().into_iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            if lo == hi {
                write!(f, "{:#04X}", lo)?;
            } else {
                write!(f, "{:#04X}-{:#04X}", lo, hi)?;
            }
        }
        write!(f, "]")
    }
}

impl fmt::Debug for ClassSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassSet, MAX_CODE_POINT};
    use pretty_assertions::assert_eq;

    #[test]
    fn bitmap_and_ranges_agree() {
        let mut set = ClassSet::new();
        set.set_range('a' as u32, 'z' as u32);
        set.set_range(0x70, 0x90);
        assert!(set.contains('b' as u32));
        assert!(set.contains(0x7F));
        assert!(set.contains(0x80));
        assert!(set.contains(0x90));
        assert!(!set.contains(0x91));
        assert!(!set.contains('A' as u32));
    }

    #[test]
    fn insert_merges_overlapping_ranges() {
        let mut set = ClassSet::new();
        set.set_range(0x100, 0x1FF);
        set.set_range(0x300, 0x3FF);
        set.set_range(0x200, 0x2FF);
        assert_eq!(set.to_string(), "[0x100-0x3FF]");
    }

    #[test]
    fn union() {
        let mut a = ClassSet::new();
        a.set_range('a' as u32, 'f' as u32);
        let mut b = ClassSet::new();
        b.set_range('d' as u32, 'k' as u32);
        b.set_range(0x1000, 0x2000);
        a.union(&b);
        assert!(a.contains('a' as u32));
        assert!(a.contains('k' as u32));
        assert!(a.contains(0x1500));
        assert!(!a.contains('l' as u32));
    }

    #[test]
    fn union_negated_covers_complement() {
        let mut digits = ClassSet::new();
        digits.set_range('0' as u32, '9' as u32);
        let mut set = ClassSet::new();
        set.union_negated(&digits);
        assert!(!set.contains('5' as u32));
        assert!(set.contains('a' as u32));
        assert!(set.contains(0x80));
        assert!(set.contains(MAX_CODE_POINT));
    }

    #[test]
    fn intersect_reports_disjointness() {
        let mut a = ClassSet::new();
        a.set_range('a' as u32, 'f' as u32);
        let mut b = ClassSet::new();
        b.set_range('x' as u32, 'z' as u32);
        assert!(a.clone().intersect_and_check_disjoint(&b));

        let mut c = ClassSet::new();
        c.set_range('e' as u32, 'g' as u32);
        assert!(!a.intersect_and_check_disjoint(&c));
        assert_eq!(a.to_string(), "[0x65-0x66]");
    }

    #[test]
    fn difference() {
        let mut a = ClassSet::new();
        a.set_range(0x100, 0x500);
        let mut b = ClassSet::new();
        b.set_range(0x200, 0x2FF);
        b.set_range(0x400, 0x4FF);
        a.difference(&b);
        assert_eq!(a.to_string(), "[0x100-0x1FF,0x300-0x3FF,0x500]");

        let mut c = ClassSet::new();
        c.set_range('a' as u32, 'z' as u32);
        let mut vowels = ClassSet::new();
        for v in "aeiou".chars() {
            vowels.add_char(v);
        }
        c.difference(&vowels);
        assert!(c.contains('b' as u32));
        assert!(!c.contains('e' as u32));
    }
}
