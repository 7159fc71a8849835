//! Labeled voxel volumes and their foreground bounding boxes
//!
//! Volumes are `ndarray` arrays indexed in (Z, Y, X) order. A voxel belongs
//! to the object being meshed iff its value is greater than the type's
//! default (zero for numeric labels, `false` for masks).

use crate::{Error, Result};
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Element type of a labeled volume
pub trait Voxel: Copy + PartialOrd + Default {
    /// Whether this voxel is part of the foreground
    fn is_foreground(self) -> bool {
        self > Self::default()
    }
}

impl<T: Copy + PartialOrd + Default> Voxel for T {}

/// Minimal axis-aligned box around the foreground of a volume.
///
/// Both corners are stored in (Z, Y, X) order; `max` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl BoundingBox {
    /// Create a box from per-axis half-open ranges
    pub fn new(z: Range<usize>, y: Range<usize>, x: Range<usize>) -> Self {
        Self {
            min: [z.start, y.start, x.start],
            max: [z.end, y.end, x.end],
        }
    }

    /// Create a box from corners given as `(z, y, x)`
    pub fn from_zyx_corners(min: [usize; 3], max: [usize; 3]) -> Self {
        Self { min, max }
    }

    /// Create a box from corners given as `(x, y, z)`
    pub fn from_xyz_corners(min: [usize; 3], max: [usize; 3]) -> Self {
        Self {
            min: [min[2], min[1], min[0]],
            max: [max[2], max[1], max[0]],
        }
    }

    /// Compute the minimal box enclosing every foreground voxel.
    ///
    /// Fails with [`Error::EmptyVolume`] when the volume has no foreground.
    pub fn from_volume<T: Voxel>(volume: ArrayView3<'_, T>) -> Result<Self> {
        let mut min = [usize::MAX; 3];
        let mut max = [0usize; 3];
        let mut found = false;

        for ((z, y, x), &value) in volume.indexed_iter() {
            if !value.is_foreground() {
                continue;
            }
            found = true;
            for (axis, index) in [z, y, x].into_iter().enumerate() {
                min[axis] = min[axis].min(index);
                max[axis] = max[axis].max(index + 1);
            }
        }

        if !found {
            return Err(Error::EmptyVolume);
        }

        let bbox = Self { min, max };
        tracing::debug!(?bbox, extent = ?bbox.extent(), "foreground bounding box");
        Ok(bbox)
    }

    /// Per-axis size `(dz, dy, dx)`
    pub fn extent(&self) -> [usize; 3] {
        [
            self.max[0].saturating_sub(self.min[0]),
            self.max[1].saturating_sub(self.min[1]),
            self.max[2].saturating_sub(self.min[2]),
        ]
    }

    /// Whether the box spans zero voxels on any axis
    pub fn is_empty(&self) -> bool {
        self.extent().iter().any(|&d| d == 0)
    }

    /// Whether the voxel at `(z, y, x)` lies inside the box
    pub fn contains(&self, index: [usize; 3]) -> bool {
        (0..3).all(|axis| self.min[axis] <= index[axis] && index[axis] < self.max[axis])
    }

    /// Bounds as `(zMin, zMax, yMin, yMax, xMin, xMax)`
    pub fn bounds(&self) -> [usize; 6] {
        [self.min[0], self.max[0], self.min[1], self.max[1], self.min[2], self.max[2]]
    }

    /// Smallest box covering both boxes
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        Self {
            min: [0, 1, 2].map(|axis| self.min[axis].min(other.min[axis])),
            max: [0, 1, 2].map(|axis| self.max[axis].max(other.max[axis])),
        }
    }

    /// The same box moved by `origin`, given as `(z, y, x)`
    pub fn translated(&self, origin: [usize; 3]) -> BoundingBox {
        Self {
            min: [0, 1, 2].map(|axis| self.min[axis] + origin[axis]),
            max: [0, 1, 2].map(|axis| self.max[axis] + origin[axis]),
        }
    }

    /// Axis range for slicing, axis 0 being Z
    pub fn range(&self, axis: usize) -> Range<usize> {
        self.min[axis]..self.max[axis]
    }

    /// Check that the box is non-empty and fits inside a volume of the given shape
    pub fn check_within(&self, shape: &[usize]) -> Result<()> {
        if self.is_empty() {
            return Err(Error::InvalidData(format!("Bounding box {:?} is empty", self.bounds())));
        }
        if shape.len() != 3 || (0..3).any(|axis| self.max[axis] > shape[axis]) {
            return Err(Error::InvalidData(format!(
                "Bounding box {:?} exceeds volume shape {:?}",
                self.bounds(),
                shape
            )));
        }
        Ok(())
    }
}

/// Compute the foreground box of a volume together with its extent `(dz, dy, dx)`
pub fn find_bounding_box<T: Voxel>(volume: ArrayView3<'_, T>) -> Result<(BoundingBox, [usize; 3])> {
    let bbox = BoundingBox::from_volume(volume)?;
    Ok((bbox, bbox.extent()))
}

/// Binary mask of the voxels carrying one label of a multi-label stack
pub fn select_label<T: Copy + PartialEq>(volume: ArrayView3<'_, T>, label: T) -> Array3<bool> {
    volume.mapv(|value| value == label)
}
