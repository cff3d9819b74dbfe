//! Type-identity pointers and the adapter that supplies them.

use std::fmt;
use std::sync::atomic::AtomicU8;

/// Alignment of every [`IdentityAnchor`]. Covers the largest documented
/// irrelevant bit count (4).
pub const ANCHOR_ALIGN: usize = 16;

/// Address identifying a dynamic type. Only its bit pattern is ever read.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIdentityPtr(u64);

impl TypeIdentityPtr {
    pub const NULL: TypeIdentityPtr = TypeIdentityPtr(0);

    /// Data address of `ptr`; metadata of fat pointers is dropped.
    #[inline]
    pub fn from_ptr<T: ?Sized>(ptr: *const T) -> Self {
        TypeIdentityPtr(ptr.cast::<()>() as usize as u64)
    }

    #[inline]
    pub const fn from_addr(addr: u64) -> Self {
        TypeIdentityPtr(addr)
    }

    #[inline]
    pub fn of_anchor(anchor: &'static IdentityAnchor) -> Self {
        Self::from_ptr(anchor as *const IdentityAnchor)
    }

    #[inline]
    pub const fn addr(self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for TypeIdentityPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for TypeIdentityPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Static marker whose address stands in for a type's identity table.
///
/// The atomic keeps each anchor a distinct, writable static so the linker
/// cannot fold two of them into one address.
#[repr(C, align(16))]
pub struct IdentityAnchor {
    name: &'static str,
    _pin: AtomicU8,
}

impl IdentityAnchor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _pin: AtomicU8::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

const _: () = assert!(std::mem::align_of::<IdentityAnchor>() == ANCHOR_ALIGN);

/// Types that own a static [`IdentityAnchor`]. Implemented by
/// [`type_identity!`](crate::type_identity).
pub trait Anchored {
    fn anchor() -> &'static IdentityAnchor;
}

/// Anything that can name its dynamic type by address.
///
/// Object safe: a trait that extends `TypeIdentity` can be dispatched on
/// through `&dyn Trait`.
pub trait TypeIdentity {
    fn type_identity(&self) -> TypeIdentityPtr;

    /// Human-readable name of the dynamic type, when the adapter knows it.
    fn type_identity_name(&self) -> Option<&'static str> {
        None
    }
}

impl<T: TypeIdentity + ?Sized> TypeIdentity for &T {
    fn type_identity(&self) -> TypeIdentityPtr {
        (**self).type_identity()
    }

    fn type_identity_name(&self) -> Option<&'static str> {
        (**self).type_identity_name()
    }
}

impl<T: TypeIdentity + ?Sized> TypeIdentity for Box<T> {
    fn type_identity(&self) -> TypeIdentityPtr {
        (**self).type_identity()
    }

    fn type_identity_name(&self) -> Option<&'static str> {
        (**self).type_identity_name()
    }
}

/// Implement [`TypeIdentity`] for concrete types, one static anchor each.
///
/// ```
/// use typekey_core::{type_identity, TypeIdentity};
///
/// struct Circle;
/// struct Square;
/// type_identity!(Circle, Square);
///
/// assert_ne!(Circle.type_identity(), Square.type_identity());
/// ```
#[macro_export]
macro_rules! type_identity {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::identity::Anchored for $ty {
                #[inline]
                fn anchor() -> &'static $crate::identity::IdentityAnchor {
                    static ANCHOR: $crate::identity::IdentityAnchor =
                        $crate::identity::IdentityAnchor::new(stringify!($ty));
                    &ANCHOR
                }
            }

            impl $crate::TypeIdentity for $ty {
                #[inline]
                fn type_identity(&self) -> $crate::TypeIdentityPtr {
                    $crate::TypeIdentityPtr::of_anchor(<$ty as $crate::identity::Anchored>::anchor())
                }

                fn type_identity_name(&self) -> Option<&'static str> {
                    Some(<$ty as $crate::identity::Anchored>::anchor().name())
                }
            }
        )+
    };
}
