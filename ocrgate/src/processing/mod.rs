//! Request normalization and per-item dispatch.
//!
//! `Payload` -> [`PayloadDecoder`] -> [`Dispatcher`] -> [`assemble`].
//! Nothing in here touches HTTP types beyond `Bytes`; the api layer reads
//! the request into a [`Payload`] and renders the [`ResponseBody`].

mod assembler;
mod decoder;
mod dispatcher;
mod item;

pub use assembler::{assemble, ResponseBody};
pub use decoder::{
    decode_base64, ContentKind, DecodedInput, InputShape, Payload, PayloadDecoder, RawField,
};
pub use dispatcher::Dispatcher;
pub use item::{DecodePolicy, ImageItem, ItemFailure, ItemOutcome, OcrOutcome};
