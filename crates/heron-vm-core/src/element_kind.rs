//! Typed array element kinds
//!
//! A pure lookup table: element size, content type and constructor name for
//! each of the eleven typed array kinds.

/// The kind of a typed array element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Int8Array - 8-bit signed integers
    Int8,
    /// Uint8Array - 8-bit unsigned integers
    Uint8,
    /// Uint8ClampedArray - 8-bit unsigned integers (clamped)
    Uint8Clamped,
    /// Int16Array - 16-bit signed integers
    Int16,
    /// Uint16Array - 16-bit unsigned integers
    Uint16,
    /// Int32Array - 32-bit signed integers
    Int32,
    /// Uint32Array - 32-bit unsigned integers
    Uint32,
    /// Float32Array - 32-bit floating point
    Float32,
    /// Float64Array - 64-bit floating point
    Float64,
    /// BigInt64Array - 64-bit signed integers (BigInt)
    BigInt64,
    /// BigUint64Array - 64-bit unsigned integers (BigInt)
    BigUint64,
}

/// Whether elements read and write as Numbers or BigInts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Number elements
    Number,
    /// BigInt elements
    BigInt,
}

impl ElementKind {
    /// Every kind, in constructor-table order
    pub const ALL: [ElementKind; 11] = [
        ElementKind::Int8,
        ElementKind::Uint8,
        ElementKind::Uint8Clamped,
        ElementKind::Int16,
        ElementKind::Uint16,
        ElementKind::Int32,
        ElementKind::Uint32,
        ElementKind::Float32,
        ElementKind::Float64,
        ElementKind::BigInt64,
        ElementKind::BigUint64,
    ];

    /// Get the byte size of each element
    pub const fn element_size(self) -> usize {
        match self {
            ElementKind::Int8 | ElementKind::Uint8 | ElementKind::Uint8Clamped => 1,
            ElementKind::Int16 | ElementKind::Uint16 => 2,
            ElementKind::Int32 | ElementKind::Uint32 | ElementKind::Float32 => 4,
            ElementKind::Float64 | ElementKind::BigInt64 | ElementKind::BigUint64 => 8,
        }
    }

    /// Content type of the elements
    pub const fn content_type(self) -> ContentType {
        if self.is_bigint() {
            ContentType::BigInt
        } else {
            ContentType::Number
        }
    }

    /// Get the constructor name of this kind
    pub const fn name(self) -> &'static str {
        match self {
            ElementKind::Int8 => "Int8Array",
            ElementKind::Uint8 => "Uint8Array",
            ElementKind::Uint8Clamped => "Uint8ClampedArray",
            ElementKind::Int16 => "Int16Array",
            ElementKind::Uint16 => "Uint16Array",
            ElementKind::Int32 => "Int32Array",
            ElementKind::Uint32 => "Uint32Array",
            ElementKind::Float32 => "Float32Array",
            ElementKind::Float64 => "Float64Array",
            ElementKind::BigInt64 => "BigInt64Array",
            ElementKind::BigUint64 => "BigUint64Array",
        }
    }

    /// Look up a kind by constructor name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// BigInt64 or BigUint64
    pub const fn is_bigint(self) -> bool {
        matches!(self, ElementKind::BigInt64 | ElementKind::BigUint64)
    }

    /// Integer kinds that wrap on overflow (everything integral except
    /// Uint8Clamped and the BigInt kinds)
    pub const fn is_unclamped_integer(self) -> bool {
        matches!(
            self,
            ElementKind::Int8
                | ElementKind::Uint8
                | ElementKind::Int16
                | ElementKind::Uint16
                | ElementKind::Int32
                | ElementKind::Uint32
        )
    }

    /// Kinds `Atomics.wait` and `Atomics.notify` accept
    pub const fn is_waitable(self) -> bool {
        matches!(self, ElementKind::Int32 | ElementKind::BigInt64)
    }
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes() {
        let sizes: Vec<usize> = ElementKind::ALL.iter().map(|k| k.element_size()).collect();
        assert_eq!(sizes, vec![1, 1, 1, 2, 2, 4, 4, 4, 8, 8, 8]);
    }

    #[test]
    fn test_name_round_trip() {
        for kind in ElementKind::ALL {
            assert_eq!(ElementKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(ElementKind::from_name("Float16Array"), None);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(ElementKind::BigInt64.content_type(), ContentType::BigInt);
        assert_eq!(ElementKind::BigUint64.content_type(), ContentType::BigInt);
        assert_eq!(ElementKind::Float64.content_type(), ContentType::Number);
        assert_eq!(ElementKind::Uint8Clamped.content_type(), ContentType::Number);
    }

    #[test]
    fn test_integer_classes() {
        assert!(!ElementKind::Uint8Clamped.is_unclamped_integer());
        assert!(!ElementKind::Float32.is_unclamped_integer());
        assert!(!ElementKind::BigInt64.is_unclamped_integer());
        assert!(ElementKind::Uint32.is_unclamped_integer());

        let waitable: Vec<ElementKind> = ElementKind::ALL
            .into_iter()
            .filter(|k| k.is_waitable())
            .collect();
        assert_eq!(waitable, vec![ElementKind::Int32, ElementKind::BigInt64]);
    }
}
