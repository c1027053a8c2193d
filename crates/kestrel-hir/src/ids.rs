use std::fmt;

macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            #[must_use]
            pub fn from_raw(raw: usize) -> Self {
                $name(raw as u32)
            }

            #[must_use]
            pub fn idx(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }
    };
}

arena_id!(ExprId);
arena_id!(StmtId);
arena_id!(LocalId);
arena_id!(ScopeId);
arena_id!(
    /// Identifies a [`crate::Declaration`] inside a [`crate::DeclTree`].
    DeclId
);
