use std::{
    collections::{BTreeMap, HashMap},
    hash::Hash,
};

/// A record which can be stored in a [Store](crate::Store).
///
/// Using the [merge()](State::merge()) method, implementors of this
/// trait take a `Patch` submitted to a store via
/// [Store::set()](crate::Store::set()) and produce the next `State`.
/// The merge is shallow: every field named in the patch replaces the
/// corresponding field wholesale, every field absent from the patch is
/// carried over unchanged. The previous state is never mutated.
///
/// Records with named fields are usually declared with
/// [patchable!](crate::patchable!), which generates the `Patch` type.
pub trait State {
    /// The partial update accepted by [Store::set()](crate::Store::set()).
    type Patch;

    /// Produce the next state by shallow merging `patch` over `self`.
    fn merge(&self, patch: Self::Patch) -> Self;
}

impl<K, V> State for HashMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    type Patch = HashMap<K, V>;

    fn merge(&self, patch: Self::Patch) -> Self {
        let mut next = self.clone();
        next.extend(patch);
        next
    }
}

impl<K, V> State for BTreeMap<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    type Patch = BTreeMap<K, V>;

    fn merge(&self, patch: Self::Patch) -> Self {
        let mut next = self.clone();
        next.extend(patch);
        next
    }
}

/// Declare a record implementing [State](crate::State) together with
/// its patch type.
///
/// Every field of the patch is an `Option` of the record's field,
/// `None` meaning the field is absent from the update. The patch
/// implements `Default` and has a builder method per field, both with
/// the visibility of the record field. Record fields must implement
/// `Clone` and `Debug`.
///
/// ```
/// use fast_context::{patchable, State};
///
/// patchable! {
///     #[derive(Clone, Debug, PartialEq)]
///     pub struct Form => FormPatch {
///         pub first: String,
///         pub agreed: bool,
///     }
/// }
///
/// let form = Form { first: "John".into(), agreed: false };
/// let next = form.merge(FormPatch::default().agreed(true));
/// assert_eq!(next, Form { first: "John".into(), agreed: true });
/// ```
#[macro_export]
macro_rules! patchable {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident => $patch:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        #[doc = concat!("A partial update of [`", stringify!($name), "`].")]
        #[derive(Clone, Debug, Default)]
        $vis struct $patch {
            $(
                $field_vis $field: ::std::option::Option<$ty>,
            )*
        }

        impl $patch {
            $(
                $field_vis fn $field(mut self, value: impl ::std::convert::Into<$ty>) -> Self {
                    self.$field = ::std::option::Option::Some(value.into());
                    self
                }
            )*
        }

        impl $crate::State for $name {
            type Patch = $patch;

            fn merge(&self, patch: $patch) -> Self {
                $name {
                    $(
                        $field: match patch.$field {
                            ::std::option::Option::Some(value) => value,
                            ::std::option::Option::None => ::std::clone::Clone::clone(&self.$field),
                        },
                    )*
                }
            }
        }
    };
}
