//! Pluggable packet views.
//!
//! An editor turns the raw bytes of a packet into a typed view and back.
//! Iterators are generic over the editor, so the choice is made statically
//! at construction and costs no dynamic dispatch.

use std::marker::PhantomData;

use bytemuck::Pod;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{PacketError, PacketResult};

/// Decode/encode capability for one payload shape.
pub trait PacketEditor {
    type View;

    fn decode(&self, bytes: Vec<u8>) -> PacketResult<Self::View>;

    fn encode(&self, view: &Self::View) -> PacketResult<Vec<u8>>;
}

/// Identity editor: the view is the byte vector itself.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawEditor;

impl PacketEditor for RawEditor {
    type View = Vec<u8>;

    fn decode(&self, bytes: Vec<u8>) -> PacketResult<Vec<u8>> {
        Ok(bytes)
    }

    fn encode(&self, view: &Vec<u8>) -> PacketResult<Vec<u8>> {
        Ok(view.clone())
    }
}

/// Structured payloads encoded with bincode.
pub struct BincodeEditor<T> {
    _view: PhantomData<fn() -> T>,
}

impl<T> BincodeEditor<T> {
    pub fn new() -> Self {
        Self { _view: PhantomData }
    }
}

impl<T> Default for BincodeEditor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for BincodeEditor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BincodeEditor<{}>", std::any::type_name::<T>())
    }
}

impl<T: Serialize + DeserializeOwned> PacketEditor for BincodeEditor<T> {
    type View = T;

    fn decode(&self, bytes: Vec<u8>) -> PacketResult<T> {
        bincode::deserialize(&bytes).map_err(|e| PacketError::Serialization(e.to_string()))
    }

    fn encode(&self, view: &T) -> PacketResult<Vec<u8>> {
        bincode::serialize(view).map_err(|e| PacketError::Serialization(e.to_string()))
    }
}

/// Homogeneous arrays of plain-old-data elements (points, indices, UVs).
///
/// Elements are stored in native byte order, packed without padding.
pub struct PodEditor<T> {
    _elem: PhantomData<fn() -> T>,
}

impl<T> PodEditor<T> {
    pub fn new() -> Self {
        Self { _elem: PhantomData }
    }
}

impl<T> Default for PodEditor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PodEditor<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PodEditor<{}>", std::any::type_name::<T>())
    }
}

impl<T: Pod> PodEditor<T> {
    /// Number of whole elements in `len` bytes, or an error if `len` is not
    /// a multiple of the element size.
    pub fn element_count(len: usize) -> PacketResult<usize> {
        let width = std::mem::size_of::<T>();
        if width == 0 || len % width != 0 {
            return Err(PacketError::Serialization(format!(
                "{len} bytes is not a whole number of {width}-byte elements"
            )));
        }
        Ok(len / width)
    }
}

impl<T: Pod> PacketEditor for PodEditor<T> {
    type View = Vec<T>;

    fn decode(&self, bytes: Vec<u8>) -> PacketResult<Vec<T>> {
        let n = Self::element_count(bytes.len())?;
        // Copy into a correctly aligned buffer; the byte vector may not be.
        let mut out = vec![T::zeroed(); n];
        bytemuck::cast_slice_mut::<T, u8>(&mut out).copy_from_slice(&bytes);
        Ok(out)
    }

    fn encode(&self, view: &Vec<T>) -> PacketResult<Vec<u8>> {
        Ok(bytemuck::cast_slice(view).to_vec())
    }
}
