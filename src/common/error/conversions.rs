//! Error conversion implementations.
//!
//! This module contains From trait implementations to convert from the
//! parser and reader error types to the unified Error type.

use super::types::Error;
use crate::common::binary::BinaryError;

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<quick_xml::encoding::EncodingError> for Error {
    fn from(err: quick_xml::encoding::EncodingError) -> Self {
        Error::Xml(err.to_string())
    }
}

impl From<BinaryError> for Error {
    fn from(err: BinaryError) -> Self {
        Error::Binary(err)
    }
}
