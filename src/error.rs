//! Error and outcome types for the map's write operations.
//!
//! Section 7's taxonomy distinguishes conditions, not type names; this is
//! the concrete Rust realization of it, in the teacher's `repr(u8)`
//! one-doc-line-per-variant style.

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Successful outcomes of [`crate::Map::insert`].
pub enum InsertOutcome {
    /// a new key was added
    Inserted,
    /// an existing key's value was overwritten (`update = true`)
    Updated,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
/// Failure conditions of [`crate::Map::insert`]. State is unchanged on
/// either.
pub enum InsertError {
    /// the key is already present and `update` was not requested
    AlreadyExists,
    /// an internal node or leaf allocation failed
    OutOfMemory,
}

/// Direction of a [`crate::Map::find`] query, mirroring `dir ∈ {<, ≤, =, ≥, >}`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[repr(i8)]
pub enum Dir {
    /// strictly less than
    Lt = -2,
    /// less than or equal to
    Le = -1,
    /// exact match
    Eq = 0,
    /// greater than or equal to
    Ge = 1,
    /// strictly greater than
    Gt = 2,
}
