//! Structured numeric containers with a stable flatten map.
//!
//! A [`Layout`] names the fields of a state or parameter block and fixes the
//! order and extent of each field inside one flat buffer. A [`Container`]
//! pairs a shared layout with the buffer. Solvers and differentiation
//! operators work on the flat view; field access is for models and callers.

use std::sync::Arc;

/// One named field: a multi-dimensional shape mapped to a flat range.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub shape: Vec<usize>,
    offset: usize,
    len: usize,
}

impl Field {
    /// Flat range of this field inside the container buffer.
    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Immutable field ordering and flatten map, shared across containers.
#[derive(Clone, Debug)]
pub struct Layout {
    fields: Vec<Field>,
    total_len: usize,
}

impl Layout {
    /// Build a layout from `(name, shape)` pairs; fields are laid out in
    /// the given order.
    pub fn new(fields: &[(&str, &[usize])]) -> Arc<Self> {
        let mut out = Vec::with_capacity(fields.len());
        let mut offset = 0;
        for (name, shape) in fields {
            let len = shape.iter().product::<usize>();
            out.push(Field {
                name: (*name).to_string(),
                shape: shape.to_vec(),
                offset,
                len,
            });
            offset += len;
        }
        Arc::new(Layout {
            fields: out,
            total_len: offset,
        })
    }

    /// A single unnamed vector field of length `n`.
    pub fn flat(n: usize) -> Arc<Self> {
        Layout::new(&[("values", &[n])])
    }

    /// Total flat length.
    pub fn len(&self) -> usize {
        self.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.total_len == 0
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A flat buffer interpreted through a shared [`Layout`].
#[derive(Clone, Debug)]
pub struct Container {
    layout: Arc<Layout>,
    data: Vec<f64>,
}

impl Container {
    /// All-zero container for a layout.
    pub fn zeros(layout: &Arc<Layout>) -> Self {
        Container {
            layout: Arc::clone(layout),
            data: vec![0.0; layout.len()],
        }
    }

    /// Rebuild a container from its flat representation.
    ///
    /// This is the inverse of [`flatten`](Self::flatten); the round trip is
    /// exact for every layout.
    pub fn from_flat(layout: &Arc<Layout>, data: Vec<f64>) -> Self {
        assert_eq!(data.len(), layout.len(), "flat length mismatch");
        Container {
            layout: Arc::clone(layout),
            data,
        }
    }

    pub fn layout(&self) -> &Arc<Layout> {
        &self.layout
    }

    /// Flat view of the buffer.
    pub fn flatten(&self) -> &[f64] {
        &self.data
    }

    pub fn flatten_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Consume into the flat buffer.
    pub fn into_flat(self) -> Vec<f64> {
        self.data
    }

    /// Borrow one named field.
    pub fn field(&self, name: &str) -> &[f64] {
        let f = self
            .layout
            .field(name)
            .unwrap_or_else(|| panic!("no field named {name:?}"));
        &self.data[f.range()]
    }

    pub fn field_mut(&mut self, name: &str) -> &mut [f64] {
        let f = self
            .layout
            .field(name)
            .unwrap_or_else(|| panic!("no field named {name:?}"))
            .clone();
        &mut self.data[f.range()]
    }

    fn check_same_layout(&self, other: &Container) {
        assert_eq!(
            self.layout.len(),
            other.layout.len(),
            "container layout mismatch"
        );
    }

    pub fn add(&self, other: &Container) -> Container {
        self.check_same_layout(other);
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a + b)
            .collect();
        Container {
            layout: Arc::clone(&self.layout),
            data,
        }
    }

    pub fn sub(&self, other: &Container) -> Container {
        self.check_same_layout(other);
        let data = self
            .data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| a - b)
            .collect();
        Container {
            layout: Arc::clone(&self.layout),
            data,
        }
    }

    pub fn scale(&self, s: f64) -> Container {
        Container {
            layout: Arc::clone(&self.layout),
            data: self.data.iter().map(|a| a * s).collect(),
        }
    }

    /// Euclidean norm of the flat buffer.
    pub fn norm(&self) -> f64 {
        self.data.iter().map(|a| a * a).sum::<f64>().sqrt()
    }
}

/// l2 norm of the difference `‖a − b‖` between two containers.
pub fn l2_norm_error(a: &Container, b: &Container) -> f64 {
    a.sub(b).norm()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_offsets_are_contiguous() {
        let layout = Layout::new(&[("disp", &[3, 2]), ("pressure", &[4])]);
        assert_eq!(layout.len(), 10);
        assert_eq!(layout.field("disp").unwrap().range(), 0..6);
        assert_eq!(layout.field("pressure").unwrap().range(), 6..10);
    }

    #[test]
    fn flatten_round_trip_is_exact() {
        let layout = Layout::new(&[("a", &[2, 2]), ("b", &[3])]);
        let data: Vec<f64> = (0..7).map(|i| i as f64 * 0.37 - 1.2).collect();
        let c = Container::from_flat(&layout, data.clone());
        let round = Container::from_flat(&layout, c.flatten().to_vec());
        assert_eq!(round.flatten(), &data[..]);
    }

    #[test]
    fn field_views_share_the_buffer() {
        let layout = Layout::new(&[("a", &[2]), ("b", &[2])]);
        let mut c = Container::zeros(&layout);
        c.field_mut("b")[1] = 5.0;
        assert_eq!(c.flatten(), &[0.0, 0.0, 0.0, 5.0]);
        assert_eq!(c.field("b"), &[0.0, 5.0]);
    }

    #[test]
    fn l2_norm_error_of_identical_containers_is_zero() {
        let layout = Layout::flat(4);
        let c = Container::from_flat(&layout, vec![1.0, -2.0, 3.0, 0.5]);
        assert!(l2_norm_error(&c, &c) < 1e-14);
    }

    #[test]
    fn l2_norm_error_is_the_norm_of_the_difference() {
        let layout = Layout::flat(2);
        let a = Container::from_flat(&layout, vec![3.0, 0.0]);
        let b = Container::from_flat(&layout, vec![0.0, 4.0]);
        assert!((l2_norm_error(&a, &b) - 5.0).abs() < 1e-12);
    }
}
