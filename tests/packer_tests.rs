//! Atlas Packer Tests
//!
//! Tests for:
//! - Block capacity per texture size
//! - Single-texture shrinking to the smallest fitting size
//! - Multi-texture packing where only the last texture shrinks
//! - Clips never spanning two textures
//! - Oversized clips reported as capacity errors
//! - Frame block pixel coordinates

use horde::assets::{BLOCK_WIDTH, frame_pixel_coords};
use horde::bake::{AtlasPlan, block_capacity, place, plan};
use horde::core::settings::DEFAULT_TEXTURE_SIZES;
use horde::{ErrorCategory, HordeError};

const BONES: u32 = 20;

fn assert_no_clip_spans_textures(frames: &[u32], plan: &AtlasPlan) {
    let sizes = plan.texture_sizes();
    let placements = place(frames, plan);
    assert_eq!(placements.len(), frames.len());

    for (clip, (p, &count)) in placements.iter().zip(frames).enumerate() {
        let size = sizes[p.texture_index as usize];
        let capacity = block_capacity(size, plan.block_height);
        assert!(
            p.animation_index + count <= capacity,
            "clip {clip} overflows texture {} ({size}x{size})",
            p.texture_index
        );
    }
}

// ============================================================================
// Capacity
// ============================================================================

#[test]
fn capacity_grows_with_texture_size() {
    let capacities: Vec<u32> = DEFAULT_TEXTURE_SIZES
        .iter()
        .map(|&s| block_capacity(s, BONES))
        .collect();

    assert_eq!(capacities, vec![48, 192, 768, 3200, 13_056]);
    assert!(capacities.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(block_capacity(1024, 1), (1024 / BLOCK_WIDTH) * 1024);
}

// ============================================================================
// Single texture
// ============================================================================

#[test]
fn single_texture_uses_smallest_fitting_size() {
    let frames = [10, 20, 15];
    let plan = plan(&frames, BONES, &DEFAULT_TEXTURE_SIZES).unwrap();

    assert_eq!(plan.texture_count, 1);
    assert_eq!(plan.texture_size, 64);
    assert_eq!(plan.block_height, BONES);
    assert_no_clip_spans_textures(&frames, &plan);
}

#[test]
fn clips_are_placed_back_to_back() {
    let frames = [16, 9, 31];
    let plan = plan(&frames, 3, &DEFAULT_TEXTURE_SIZES).unwrap();
    let placements = place(&frames, &plan);

    let starts: Vec<u32> = placements.iter().map(|p| p.animation_index).collect();
    assert_eq!(starts, vec![0, 16, 25]);
    assert!(placements.iter().all(|p| p.texture_index == 0));
}

// ============================================================================
// Multiple textures
// ============================================================================

#[test]
fn overflow_opens_a_second_texture_and_shrinks_it() {
    let frames = [8000, 4000, 2000];
    let plan = plan(&frames, BONES, &DEFAULT_TEXTURE_SIZES).unwrap();

    assert_eq!(plan.texture_count, 2);
    assert_eq!(plan.max_size, 1024);
    // 2000 blocks fit 512 (3200) but not 256 (768)
    assert_eq!(plan.texture_size, 512);
    assert_eq!(plan.texture_sizes(), vec![1024, 512]);

    let placements = place(&frames, &plan);
    let layout: Vec<(u32, u32)> = placements
        .iter()
        .map(|p| (p.texture_index, p.animation_index))
        .collect();
    assert_eq!(layout, vec![(0, 0), (0, 8000), (1, 0)]);
    assert_no_clip_spans_textures(&frames, &plan);
}

#[test]
fn many_medium_clips_never_straddle_textures() {
    let frames = vec![3000; 9];
    let plan = plan(&frames, BONES, &DEFAULT_TEXTURE_SIZES).unwrap();

    // four clips per maximal texture
    assert_eq!(plan.texture_count, 3);
    assert_eq!(plan.texture_size, 512);
    assert_no_clip_spans_textures(&frames, &plan);
}

#[test]
fn oversized_clip_is_a_capacity_error() {
    let err = plan(&[100, 14_000], BONES, &DEFAULT_TEXTURE_SIZES).unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Capacity);
    match err {
        HordeError::ClipExceedsTexture {
            clip,
            frames,
            texture_size,
            capacity,
        } => {
            assert_eq!(clip, 1);
            assert_eq!(frames, 14_000);
            assert_eq!(texture_size, 1024);
            assert_eq!(capacity, 13_056);
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Pixel coordinates
// ============================================================================

#[test]
fn frame_blocks_fill_rows_left_to_right() {
    // 64 wide: 16 blocks per row
    assert_eq!(frame_pixel_coords(0, 64, BLOCK_WIDTH, BONES), (0, 0));
    assert_eq!(frame_pixel_coords(15, 64, BLOCK_WIDTH, BONES), (60, 0));
    assert_eq!(frame_pixel_coords(16, 64, BLOCK_WIDTH, BONES), (0, 20));
    assert_eq!(frame_pixel_coords(17, 64, BLOCK_WIDTH, BONES), (4, 20));
}
