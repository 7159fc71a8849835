//! Cropping a volume to its bounding box and padding it with a zero border

use crate::volume::{BoundingBox, Voxel};
use crate::Result;
use ndarray::{s, Array3, ArrayView3, Zip};

/// Width of the background border added on every face of a cropped volume
pub const PAD_WIDTH: usize = 1;

/// Extract `volume[box]` as a boolean mask surrounded by a one-voxel zero border.
///
/// The result has shape `(dz + 2, dy + 2, dx + 2)` and no foreground voxel on
/// index `0` or the last index of any axis, so isosurfaces of the result are
/// always closed.
pub fn crop_and_pad<T: Voxel>(volume: ArrayView3<'_, T>, bbox: &BoundingBox) -> Result<Array3<bool>> {
    bbox.check_within(volume.shape())?;

    let [dz, dy, dx] = bbox.extent();
    let window = volume.slice(s![bbox.range(0), bbox.range(1), bbox.range(2)]);

    let mut padded = Array3::from_elem(
        (dz + 2 * PAD_WIDTH, dy + 2 * PAD_WIDTH, dx + 2 * PAD_WIDTH),
        false,
    );
    let mut interior = padded.slice_mut(s![
        PAD_WIDTH..PAD_WIDTH + dz,
        PAD_WIDTH..PAD_WIDTH + dy,
        PAD_WIDTH..PAD_WIDTH + dx
    ]);
    Zip::from(&mut interior)
        .and(&window)
        .for_each(|dst, &src| *dst = src.is_foreground());

    tracing::debug!(shape = ?padded.shape(), "padded crop");
    Ok(padded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn border_is_clear(padded: &Array3<bool>) -> bool {
        let shape = padded.shape().to_vec();
        padded.indexed_iter().all(|((z, y, x), &value)| {
            let on_border = [z, y, x]
                .iter()
                .zip(&shape)
                .any(|(&index, &size)| index == 0 || index == size - 1);
            !(value && on_border)
        })
    }

    #[test]
    fn test_single_voxel_stays_in_place() {
        let mut volume = Array3::<u8>::zeros((3, 3, 3));
        volume[[1, 1, 1]] = 1;
        let bbox = BoundingBox::from_volume(volume.view()).unwrap();

        let padded = crop_and_pad(volume.view(), &bbox).unwrap();
        assert_eq!(padded.shape(), &[3, 3, 3]);
        assert!(padded[[1, 1, 1]]);
        assert_eq!(padded.iter().filter(|&&v| v).count(), 1);
    }

    #[test]
    fn test_full_volume_gets_border() {
        let volume = Array3::<u16>::from_elem((4, 2, 3), 5);
        let bbox = BoundingBox::from_volume(volume.view()).unwrap();

        let padded = crop_and_pad(volume.view(), &bbox).unwrap();
        assert_eq!(padded.shape(), &[6, 4, 5]);
        assert!(border_is_clear(&padded));
        assert_eq!(padded.iter().filter(|&&v| v).count(), 4 * 2 * 3);
    }

    #[test]
    fn test_crop_keeps_relative_layout() {
        let mut volume = Array3::<u8>::zeros((5, 6, 7));
        volume[[1, 2, 3]] = 1;
        volume[[3, 4, 6]] = 2;
        let bbox = BoundingBox::from_volume(volume.view()).unwrap();

        let padded = crop_and_pad(volume.view(), &bbox).unwrap();
        assert_eq!(padded.shape(), &[5, 5, 6]);
        assert!(padded[[1, 1, 1]]);
        assert!(padded[[3, 3, 4]]);
        assert!(border_is_clear(&padded));
    }

    #[test]
    fn test_supplied_box_ignores_outside_voxels() {
        let mut volume = Array3::<u8>::zeros((4, 4, 4));
        volume[[0, 0, 0]] = 1;
        volume[[2, 2, 2]] = 1;
        let bbox = BoundingBox::new(2..4, 2..4, 2..4);

        let padded = crop_and_pad(volume.view(), &bbox).unwrap();
        assert_eq!(padded.iter().filter(|&&v| v).count(), 1);
        assert!(padded[[1, 1, 1]]);
    }

    #[test]
    fn test_box_outside_volume_is_rejected() {
        let volume = Array3::<u8>::ones((2, 2, 2));
        let bbox = BoundingBox::new(0..3, 0..2, 0..2);
        assert!(crop_and_pad(volume.view(), &bbox).is_err());
    }
}
