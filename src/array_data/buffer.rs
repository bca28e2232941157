//! A byte store with flip-buffer bookkeeping counted in components.

/// Growable CPU storage with `position`, `limit` and `capacity`, all in
/// components.
///
/// In write mode `position` advances on every put and `limit == capacity`.
/// [`flip`](Self::flip) switches to read mode (`limit = position`,
/// `position = 0`); [`unflip`](Self::unflip) reverses it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentBuffer {
    bytes: Vec<u8>,
    bytes_per_component: usize,
    position: usize,
    limit: usize,
    capacity: usize,
}

impl ComponentBuffer {
    /// A zeroed buffer of `capacity` components of `bytes_per_component` bytes.
    pub fn new(capacity: usize, bytes_per_component: usize) -> Self {
        Self {
            bytes: vec![0; capacity * bytes_per_component],
            bytes_per_component,
            position: 0,
            limit: capacity,
            capacity,
        }
    }

    /// Current position.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current limit.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `limit - position`.
    pub fn remaining(&self) -> usize {
        self.limit - self.position
    }

    /// Bytes of one component.
    pub fn bytes_per_component(&self) -> usize {
        self.bytes_per_component
    }

    /// Write whole components at `position` and advance.
    ///
    /// The caller guarantees `bytes.len()` is a multiple of the component
    /// size and that enough components remain.
    pub(crate) fn put_bytes(&mut self, bytes: &[u8]) {
        let start = self.position * self.bytes_per_component;
        self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
        self.position += bytes.len() / self.bytes_per_component;
    }

    /// Enter read mode.
    pub fn flip(&mut self) {
        self.limit = self.position;
        self.position = 0;
    }

    /// Return to write mode after a [`flip`](Self::flip), appending after the
    /// previously written extent.
    pub fn unflip(&mut self) {
        self.position = self.limit;
        self.limit = self.capacity;
    }

    /// Write mode from the start; contents are kept but will be overwritten.
    pub fn clear(&mut self) {
        self.position = 0;
        self.limit = self.capacity;
    }

    /// Enlarge to `capacity` components, keeping content and position.
    pub(crate) fn grow_to(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        self.bytes.resize(capacity * self.bytes_per_component, 0);
        if self.limit == self.capacity {
            self.limit = capacity;
        }
        self.capacity = capacity;
    }

    /// The first `components` components as bytes.
    pub fn bytes_until(&self, components: usize) -> &[u8] {
        &self.bytes[..components.min(self.capacity) * self.bytes_per_component]
    }

    /// The whole backing store.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_unflip() {
        let mut buffer = ComponentBuffer::new(4, 4);
        buffer.put_bytes(&[1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!((buffer.position(), buffer.limit()), (2, 4));

        buffer.flip();
        assert_eq!((buffer.position(), buffer.limit(), buffer.remaining()), (0, 2, 2));
        assert_eq!(buffer.bytes_until(buffer.limit()), &[1, 0, 0, 0, 2, 0, 0, 0]);

        buffer.unflip();
        assert_eq!((buffer.position(), buffer.limit()), (2, 4));
    }

    #[test]
    fn test_grow_keeps_content() {
        let mut buffer = ComponentBuffer::new(1, 2);
        buffer.put_bytes(&[9, 8]);
        buffer.grow_to(3);
        assert_eq!(buffer.capacity(), 3);
        assert_eq!(buffer.limit(), 3);
        assert_eq!(buffer.position(), 1);
        buffer.put_bytes(&[7, 6, 5, 4]);
        assert_eq!(buffer.as_bytes(), &[9, 8, 7, 6, 5, 4]);

        buffer.grow_to(2);
        assert_eq!(buffer.capacity(), 3);
    }
}
