use stable_deref_trait::StableDeref;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Handle whose identity for equality and hashing is the address of the arena entry it points to,
/// not the data behind it.
///
/// Everything in the class graph is allocated once in an arena and never moved, so two handles
/// are equal exactly when they name the same interned entity. This keeps reference sets cheap:
/// hashing a handle is hashing a pointer.
pub struct RefId<'a, T: ?Sized>(pub &'a T);

impl<'a, T: ?Sized> Clone for RefId<'a, T> {
    fn clone(&self) -> Self {
        RefId(self.0)
    }
}

impl<'a, T: ?Sized> Copy for RefId<'a, T> {}

impl<'a, T: ?Sized> Hash for RefId<'a, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0 as *const T as *const u8, state)
    }
}

impl<'a, 'b, T: ?Sized> PartialEq<RefId<'b, T>> for RefId<'a, T> {
    fn eq(&self, other: &RefId<'b, T>) -> bool {
        std::ptr::eq(self.0 as *const T as *const u8, other.0 as *const T as *const u8)
    }
}

impl<'a, T: ?Sized> Eq for RefId<'a, T> {}

impl<'a, T: ?Sized + fmt::Debug> fmt::Debug for RefId<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'a, T: ?Sized + fmt::Display> fmt::Display for RefId<'a, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<'a, T: ?Sized> Deref for RefId<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

unsafe impl<'a, T: ?Sized> StableDeref for RefId<'a, T> {}

#[cfg(test)]
mod test {
    use super::RefId;
    use std::collections::HashSet;

    #[test]
    fn identity_not_contents() {
        let a = String::from("Lfoo;");
        let b = String::from("Lfoo;");

        assert_eq!(RefId(&a), RefId(&a), "same allocation is the same handle");
        assert_ne!(RefId(&a), RefId(&b), "equal contents are still different handles");

        let set: HashSet<RefId<String>> = vec![RefId(&a), RefId(&b), RefId(&a)]
            .into_iter()
            .collect();
        assert_eq!(set.len(), 2);
    }
}
