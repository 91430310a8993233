//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** — two instances
/// with the same attribute values are the same value. To "modify" one, build a
/// new one. Entities, by contrast, keep their identity across state changes.
///
/// The supertraits keep value objects cheap to copy, comparable, and
/// debuggable, which is all the engine needs from them.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
