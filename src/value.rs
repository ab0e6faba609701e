use crate::AtomicCell;
use std::any::{self, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// An atomic cell for [`Value`]s: any payload, with a concrete type that may change from one store
/// to the next.
///
/// # Examples
/// ```
/// use atomic_value::{AtomicValue, Value};
///
/// let value = AtomicValue::empty();
/// assert!(value.load().is_nil());
///
/// value.store(Value::new(123));
/// value.store(Value::new(true));
/// assert_eq!(value.load().downcast_ref::<bool>(), Some(&true));
///
/// assert!(!value.compare_and_swap(&Value::new(1), Value::new(false)));
/// assert!(value.compare_and_swap(&Value::new(true), Value::new(false)));
/// ```
pub type AtomicValue = AtomicCell<Value>;

/// A shared, immutable payload of any type, or nil.
///
/// `Value` is the uniform record that lets one [`AtomicCell`] hold payloads of different concrete
/// types. Cloning a `Value` shares the payload.
///
/// Equality depends on how the payload was wrapped:
/// * [`Value::new`] payloads are equal when their concrete types match and the payloads compare
///   equal. Payloads of different types are never equal, whatever they look like.
/// * [`Value::opaque`] payloads need no [`PartialEq`] and are only equal to clones of the same
///   `Value`.
///
/// Two nil values are equal, and a `Value` always equals its own clones, because shared payloads
/// are recognised by address before their [`PartialEq`] is consulted. A payload whose equality is
/// not reflexive, such as `f64::NAN`, is therefore equal to its clones but not to a separately
/// wrapped copy, and [`compare_and_swap`](AtomicCell::compare_and_swap) with a previously loaded
/// NaN succeeds.
#[derive(Clone, Default)]
pub struct Value(Option<Arc<dyn Payload>>);

impl Value {
    /// The nil value, which is also what an empty [`AtomicValue`] loads as.
    pub const fn nil() -> Self {
        Self(None)
    }

    /// Wraps a comparable payload.
    pub fn new<T: Any + Send + Sync + PartialEq + fmt::Debug>(payload: T) -> Self {
        Self(Some(Arc::new(Comparable(payload))))
    }

    /// Wraps a payload that is compared by identity, e.g. an error type without [`PartialEq`].
    pub fn opaque<T: Any + Send + Sync>(payload: T) -> Self {
        Self(Some(Arc::new(Opaque(payload))))
    }

    /// Returns `true` if there is no payload.
    pub fn is_nil(&self) -> bool {
        self.0.is_none()
    }

    /// Returns `true` if the payload's concrete type is `T`. Always `false` for nil.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id() == Some(TypeId::of::<T>())
    }

    /// Returns the payload as a `T`, or [`None`] if it has another type or the value is nil.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_deref()?.as_any().downcast_ref()
    }

    /// The [`TypeId`] of the payload, or [`None`] for nil.
    pub fn type_id(&self) -> Option<TypeId> {
        self.0.as_deref().map(|p| Any::type_id(p.as_any()))
    }

    /// The name of the payload's concrete type, as reported by [`std::any::type_name`].
    pub fn type_name(&self) -> Option<&'static str> {
        self.0.as_deref().map(|p| p.type_name())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            // Identity first: a clone equals its original even if the payload is not reflexive.
            (Some(a), Some(b)) => {
                Arc::as_ptr(a).cast::<u8>() == Arc::as_ptr(b).cast::<u8>() || a.eq_payload(&**b)
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("Value(nil)"),
            Some(payload) => {
                f.write_str("Value(")?;
                payload.fmt_payload(f)?;
                f.write_str(")")
            }
        }
    }
}

trait Payload: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn type_name(&self) -> &'static str;
    fn is_comparable(&self) -> bool;
    fn eq_payload(&self, other: &dyn Payload) -> bool;
    fn fmt_payload(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

struct Comparable<T>(T);

impl<T: Any + Send + Sync + PartialEq + fmt::Debug> Payload for Comparable<T> {
    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn is_comparable(&self) -> bool {
        true
    }

    fn eq_payload(&self, other: &dyn Payload) -> bool {
        // An opaque payload of the same type downcasts too, so the wrapper must match as well.
        other.is_comparable()
            && other
                .as_any()
                .downcast_ref::<T>()
                .is_some_and(|other| self.0 == *other)
    }

    fn fmt_payload(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

struct Opaque<T>(T);

impl<T: Any + Send + Sync> Payload for Opaque<T> {
    fn as_any(&self) -> &dyn Any {
        &self.0
    }

    fn type_name(&self) -> &'static str {
        any::type_name::<T>()
    }

    fn is_comparable(&self) -> bool {
        false
    }

    fn eq_payload(&self, _: &dyn Payload) -> bool {
        false
    }

    fn fmt_payload(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", any::type_name::<T>())
    }
}
