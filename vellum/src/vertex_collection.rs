// Copyright 2024 the Vellum Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use core::ops::Range;

use vellum_encoding::Vertex;

use crate::{Error, Result};

/// Append-only vertex storage for one frame.
///
/// Ranges are addressed by the offsets handed out by
/// [`VertexCollection::append`], so the whole frame uploads as one buffer.
#[derive(Clone, Debug)]
pub struct VertexCollection {
    vertices: Vec<Vertex>,
    /// Draws address vertices with 32-bit offsets.
    limit: u32,
}

impl Default for VertexCollection {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            limit: u32::MAX,
        }
    }
}

impl VertexCollection {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn with_limit(limit: u32) -> Self {
        Self {
            vertices: Vec::new(),
            limit,
        }
    }

    /// Appends `vertices` and returns the range they occupy.
    ///
    /// Fails without appending anything if the range would end past the
    /// last addressable vertex.
    pub fn append(&mut self, vertices: &[Vertex]) -> Result<Range<u32>> {
        let start = u32::try_from(self.vertices.len()).map_err(|_| Error::TooManyVertices)?;
        let end = u32::try_from(vertices.len())
            .ok()
            .and_then(|count| start.checked_add(count))
            .filter(|&end| end <= self.limit)
            .ok_or(Error::TooManyVertices)?;
        self.vertices.extend_from_slice(vertices);
        Ok(start..end)
    }

    /// The offset the next append will return.
    pub fn current_offset(&self) -> usize {
        self.vertices.len()
    }

    /// Empties the collection, keeping its allocation.
    pub fn clear(&mut self) {
        self.vertices.clear();
    }

    /// Drops every vertex from offset `len` on.
    pub fn truncate(&mut self, len: usize) {
        self.vertices.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn as_slice(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_track_length() {
        let mut collection = VertexCollection::new();
        let quad = [Vertex::default(); 4];
        assert_eq!(collection.append(&quad).unwrap(), 0..4);
        assert_eq!(collection.current_offset(), 4);
        assert_eq!(collection.append(&[]).unwrap(), 4..4);
        assert_eq!(collection.append(&quad[..3]).unwrap(), 4..7);
        assert_eq!(collection.as_bytes().len(), 7 * 16);

        let capacity = collection.vertices.capacity();
        collection.clear();
        assert_eq!(collection.current_offset(), 0);
        assert_eq!(collection.vertices.capacity(), capacity);
    }

    #[test]
    fn appends_past_the_limit_are_rejected() {
        let mut collection = VertexCollection::with_limit(6);
        let quad = [Vertex::default(); 4];
        assert_eq!(collection.append(&quad).unwrap(), 0..4);
        assert!(matches!(
            collection.append(&quad),
            Err(Error::TooManyVertices)
        ));
        assert_eq!(collection.len(), 4);
        assert_eq!(collection.append(&quad[..2]).unwrap(), 4..6);
    }
}
