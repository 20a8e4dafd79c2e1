//! Declarative builders for schema objects.
//!
//! * `tl_type!`: a bare constructor. Fields are serialized in order with no
//!   constructor id; use [`crate::boxed`] or an enum to emit the id.
//! * `tl_function!`: an RPC function. Serialization writes the constructor id;
//!   deserialization expects the id to be already consumed by the caller
//!   that peeked it.
//! * `tl_enum!`: a boxed type whose variants each wrap a `tl_type!`.

macro_rules! tl_type {
    (
        $(#[$meta:meta])*
        $name:ident = $id:literal {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl $crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl $crate::Serializable for $name {
            #[allow(unused_variables)]
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $( $crate::Serializable::serialize(&self.$field, buf); )*
            }
        }

        impl $crate::Deserializable for $name {
            #[allow(unused_variables)]
            fn deserialize(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::Deserializable>::deserialize(buf)?, )*
                })
            }
        }
    };
}

macro_rules! tl_function {
    (
        $(#[$meta:meta])*
        $name:ident = $id:literal {
            $( $(#[$fmeta:meta])* $field:ident : $ty:ty ),* $(,)?
        } -> $ret:ty
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name {
            $( $(#[$fmeta])* pub $field: $ty, )*
        }

        impl $crate::Identifiable for $name {
            const CONSTRUCTOR_ID: u32 = $id;
        }

        impl $crate::Serializable for $name {
            #[allow(unused_variables)]
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                $crate::Serializable::serialize(&<Self as $crate::Identifiable>::CONSTRUCTOR_ID, buf);
                $( $crate::Serializable::serialize(&self.$field, buf); )*
            }
        }

        impl $crate::Deserializable for $name {
            #[allow(unused_variables)]
            fn deserialize(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                Ok(Self {
                    $( $field: <$ty as $crate::Deserializable>::deserialize(buf)?, )*
                })
            }
        }

        impl $crate::RemoteCall for $name {
            type Return = $ret;
        }
    };
}

macro_rules! tl_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $variant:ident ( $ty:ty ) ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq)]
        pub enum $name {
            $( $variant($ty), )+
        }

        impl $crate::Serializable for $name {
            fn serialize(&self, buf: &mut impl Extend<u8>) {
                match self {
                    $(
                        Self::$variant(x) => {
                            $crate::Serializable::serialize(
                                &<$ty as $crate::Identifiable>::CONSTRUCTOR_ID, buf);
                            $crate::Serializable::serialize(x, buf);
                        }
                    )+
                }
            }
        }

        impl $crate::Deserializable for $name {
            fn deserialize(buf: $crate::deserialize::Buffer) -> $crate::deserialize::Result<Self> {
                let id = <u32 as $crate::Deserializable>::deserialize(buf)?;
                $(
                    if id == <$ty as $crate::Identifiable>::CONSTRUCTOR_ID {
                        return Ok(Self::$variant(<$ty as $crate::Deserializable>::deserialize(buf)?));
                    }
                )+
                Err($crate::deserialize::Error::UnexpectedConstructor { id })
            }
        }

        $(
            impl From<$ty> for $name {
                fn from(x: $ty) -> Self { Self::$variant(x) }
            }
        )+
    };
}
