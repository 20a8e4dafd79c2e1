//! Digest helpers.
//!
//! Each macro hashes its arguments as one concatenated message without
//! allocating the concatenation.

/// SHA-1 over the concatenation of one or more byte slices.
#[macro_export]
macro_rules! sha1 {
    ( $( $part:expr ),+ $(,)? ) => {{
        let mut hasher = <::sha1::Sha1 as ::sha1::Digest>::new();
        $( ::sha1::Digest::update(&mut hasher, $part); )+
        let digest: [u8; 20] = ::sha1::Digest::finalize(hasher).into();
        digest
    }};
}

/// SHA-256 over the concatenation of one or more byte slices.
#[macro_export]
macro_rules! sha256 {
    ( $( $part:expr ),+ $(,)? ) => {{
        let mut hasher = <::sha2::Sha256 as ::sha2::Digest>::new();
        $( ::sha2::Digest::update(&mut hasher, $part); )+
        let digest: [u8; 32] = ::sha2::Digest::finalize(hasher).into();
        digest
    }};
}
