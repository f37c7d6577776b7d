/*!
Predicates for the seven top-level Unicode general categories.

The `\p{L}`-style escapes in a pattern compile down to a [`Category`] test.
Only the top-level categories are supported: letters (L), marks (M), numbers
(N), punctuation (P), symbols (S), separators (Z) and other (C). The first
six are backed by the generated range tables in
[`crate::unicode_tables`]; C is defined as the complement of their union,
which also covers unassigned code points (category Cn).
*/

use serde::{Deserialize, Serialize};

use crate::unicode_tables::{
    CATEGORY_L, CATEGORY_M, CATEGORY_N, CATEGORY_P, CATEGORY_S, CATEGORY_Z,
};

/// One of the seven top-level Unicode general categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Category {
    /// L: letters.
    Letter,
    /// M: combining marks.
    Mark,
    /// N: numbers.
    Number,
    /// P: punctuation.
    Punctuation,
    /// S: symbols.
    Symbol,
    /// Z: separators.
    Separator,
    /// C: everything else, including unassigned code points.
    Other,
}

impl Category {
    /// Returns the category designated by a single letter, as it appears in
    /// `\p{..}` escapes.
    pub fn from_letter(letter: char) -> Option<Category> {
        match letter {
            'L' => Some(Category::Letter),
            'M' => Some(Category::Mark),
            'N' => Some(Category::Number),
            'P' => Some(Category::Punctuation),
            'S' => Some(Category::Symbol),
            'Z' => Some(Category::Separator),
            'C' => Some(Category::Other),
            _ => None,
        }
    }

    /// The single-letter designation for this category.
    pub fn letter(self) -> char {
        match self {
            Category::Letter => 'L',
            Category::Mark => 'M',
            Category::Number => 'N',
            Category::Punctuation => 'P',
            Category::Symbol => 'S',
            Category::Separator => 'Z',
            Category::Other => 'C',
        }
    }

    /// The code-point range table backing this category, or `None` for C,
    /// which is the complement of the union of all other tables.
    pub fn ranges(self) -> Option<&'static [(u32, u32)]> {
        match self {
            Category::Letter => Some(&CATEGORY_L),
            Category::Mark => Some(&CATEGORY_M),
            Category::Number => Some(&CATEGORY_N),
            Category::Punctuation => Some(&CATEGORY_P),
            Category::Symbol => Some(&CATEGORY_S),
            Category::Separator => Some(&CATEGORY_Z),
            Category::Other => None,
        }
    }

    /// Returns true if `c` belongs to this category.
    pub fn contains(self, c: char) -> bool {
        match self.ranges() {
            Some(table) => in_table(table, c as u32),
            None => ![
                &CATEGORY_L[..],
                &CATEGORY_M[..],
                &CATEGORY_N[..],
                &CATEGORY_P[..],
                &CATEGORY_S[..],
                &CATEGORY_Z[..],
            ]
            .iter()
            .any(|table| in_table(table, c as u32)),
        }
    }
}

fn in_table(table: &[(u32, u32)], cp: u32) -> bool {
    let idx = table.partition_point(|&(lo, _)| lo <= cp);
    idx > 0 && table[idx - 1].1 >= cp
}
