// SPDX-License-Identifier: (MIT OR Apache-2.0)

use std::{
    io,
    num::{ParseIntError, TryFromIntError},
    str,
};

use thiserror::Error;

/// The master error structure for every fallible operation in this crate.
///
/// Variants are grouped along the outcome classes used throughout the design: a node-tree
/// invariant violation, an exhausted resource, a malformed on-disk structure encountered while
/// importing an existing image, or a precondition the caller failed to satisfy. Recoverable
/// conditions encountered while walking a [`FileSystem`](crate::fs::FileSystem) tree are reported
/// through the [`MessageSink`](crate::message::MessageSink) instead of through this type; only
/// conditions that abort the operation in progress are represented here.
#[derive(Error, Debug)]
pub enum ImageError {
    /// I/O error reading or writing the underlying medium.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// String value that was expected to fit into a UTF-8 shape, in fact did not.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] str::Utf8Error),

    /// `encoding_rs` ran into one or more errors converting a name. Joliet only.
    #[error("UTF-16 / UCS-2 conversion error")]
    Utf16,

    /// An imported filesystem contained an error and could not be parsed.
    #[error("Invalid ISO9660: {0}")]
    InvalidFs(&'static str),

    /// A value expected to contain a number did not parse as one.
    #[error("Int parse error: {0}")]
    ParseInt(#[from] ParseIntError),

    /// An error converting between integer widths (over/underflow).
    #[error("Integer conversion error (over/underflow): {0}")]
    TryFromInt(#[from] TryFromIntError),

    /// The buffer or block did not have enough data. Presumably the imported image is corrupt.
    ///
    /// # See Also
    ///
    /// [`BLOCK_SIZE`](crate::BLOCK_SIZE)
    #[error("Wanted to read '{}' bytes, got '{0}' bytes", crate::BLOCK_SIZE)]
    ReadSize(usize),

    /// A `nom` parser failed while decoding an existing image. Enabling the `verbose-error`
    /// feature replaces this variant with [`ImageError::VerboseNom`].
    #[cfg(not(feature = "verbose-error"))]
    #[error("Parse error: {0:?}")]
    Nom(nom::error::ErrorKind),

    /// A `nom` parser failed while decoding an existing image. This is the verbose variant.
    #[cfg(feature = "verbose-error")]
    #[error("Parse error: {0:?}")]
    VerboseNom(nom::error::VerboseError<Vec<u8>>),

    /// A caller-supplied argument was null, malformed, or otherwise violated a precondition.
    #[error("Precondition violated: {0}")]
    Precondition(&'static str),

    /// A tree invariant (unique sibling names, single parent, registry-once identity) would be
    /// violated by the requested operation, or an internal assertion failed.
    #[error("Invariant violated: {0}")]
    Invariant(&'static str),

    /// The on-disk structure being produced or consumed does not conform to ECMA-119, SUSP,
    /// Rock Ridge, or El Torito.
    #[error("Format error: {0}")]
    Format(&'static str),

    /// A file or tree exceeds a hard limit of the format (e.g. the 2^32-1 byte extent size cap).
    #[error("Resource limit exceeded: {0}")]
    TooBig(&'static str),

    /// A client callback (report callback, replace-policy `Ask`) requested cancellation.
    #[error("Operation cancelled by caller")]
    Cancelled,

    /// The Rock Ridge name-mangling namespace was exhausted for a directory.
    #[error("Could not find a unique mangled name for '{0}'")]
    ManglingExhausted(String),
}

/// [`Result`](std::result::Result) that returns an [`ImageError`].
pub type Result<T> = std::result::Result<T, ImageError>;

#[cfg(not(feature = "verbose-error"))]
impl From<nom::Err<nom::error::Error<&[u8]>>> for ImageError {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> ImageError {
        ImageError::Nom(match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => e.code,
            nom::Err::Incomplete(_) => panic!("nom streaming parsers are not used by this crate"),
        })
    }
}

#[cfg(feature = "verbose-error")]
impl From<nom::Err<nom::error::VerboseError<&[u8]>>> for ImageError {
    fn from(err: nom::Err<nom::error::VerboseError<&[u8]>>) -> ImageError {
        ImageError::VerboseNom(match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => nom::error::VerboseError {
                errors: e
                    .errors
                    .into_iter()
                    .map(|(i, e)| (i.to_owned(), e))
                    .collect(),
            },
            nom::Err::Incomplete(_) => panic!("nom streaming parsers are not used by this crate"),
        })
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "verbose-error")] {
        pub(crate) type OurNomError<T> = nom::error::VerboseError<T>;
    } else {
        pub(crate) type OurNomError<T> = nom::error::Error<T>;
    }
}

pub(crate) type NomRes<T, U> = nom::IResult<T, U, OurNomError<T>>;
