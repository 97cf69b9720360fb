//! Boilerplate for typed wrappers.

/// Declares a typed handle around an [`farproxy::Object`] of one class.
///
/// The handle derefs to the object, so the untyped attribute protocol stays
/// available next to the typed methods.
macro_rules! wrapper {
    ($(#[$meta:meta])* $name:ident => $class:path) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name(farproxy::Object);

        impl $name {
            /// The class this handle stands for.
            pub fn class() -> &'static farproxy::Class {
                &$class
            }

            pub fn from_object(object: farproxy::Object) -> farproxy::Result<Self> {
                object.expect_class(&$class)?;
                Ok(Self(object))
            }

            /// Accepts an autowrapped value of the right class.
            pub fn from_value(value: farproxy::Value) -> farproxy::Result<Self> {
                match value {
                    farproxy::Value::Object(object) => Self::from_object(object),
                    other => Err(farproxy::Error::type_mismatch(stringify!($name), other.kind())),
                }
            }

            pub fn object(&self) -> &farproxy::Object {
                &self.0
            }

            pub fn into_object(self) -> farproxy::Object {
                self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = farproxy::Object;

            fn deref(&self) -> &farproxy::Object {
                &self.0
            }
        }

        impl From<$name> for farproxy::Value {
            fn from(handle: $name) -> Self {
                farproxy::Value::Object(handle.0)
            }
        }

        impl From<&$name> for farproxy::Value {
            fn from(handle: &$name) -> Self {
                farproxy::Value::Object(handle.0.clone())
            }
        }
    };
}

pub(crate) use wrapper;
