use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Capabilities required of values stored in an Object column.
///
/// Object values are opaque to the engine. They can be compared for equality,
/// hashed (so they can be used as group or join keys) and displayed. Nothing
/// else, notably no arithmetic.
pub trait OpaqueObject: fmt::Debug + Send + Sync + 'static {
    fn dyn_eq(&self, other: &dyn OpaqueObject) -> bool;
    fn dyn_hash(&self, state: &mut dyn Hasher);
    fn as_any(&self) -> &dyn Any;
    fn display(&self) -> String;
}

impl<T> OpaqueObject for T
where
    T: Hash + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static,
{
    fn dyn_eq(&self, other: &dyn OpaqueObject) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        self.hash(&mut state)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn display(&self) -> String {
        self.to_string()
    }
}

/// A shared handle to an opaque value.
#[derive(Debug, Clone)]
pub struct ObjectValue(pub Arc<dyn OpaqueObject>);

impl ObjectValue {
    pub fn new<T: OpaqueObject>(value: T) -> Self {
        ObjectValue(Arc::new(value))
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }
}

impl PartialEq for ObjectValue {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl Eq for ObjectValue {}

impl Hash for ObjectValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state)
    }
}

impl fmt::Display for ObjectValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}
