//! Host type objects, as far as slot specialization is concerned.

use std::sync::Arc;

/// Shared handle to a host type object.
pub type TypeRef = Arc<TypeObject>;

/// A host type whose dispatch slots may be specialized by the JIT.
#[derive(Debug)]
pub struct TypeObject {
    name: Arc<str>,
}

impl TypeObject {
    /// Create a type object with the given name.
    pub fn new(name: &str) -> TypeRef {
        Arc::new(Self {
            name: Arc::from(name),
        })
    }

    /// The type's name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_name() {
        let ty = TypeObject::new("list");
        assert_eq!(ty.name(), "list");
    }
}
