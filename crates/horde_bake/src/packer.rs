//! Texture Atlas Packer
//!
//! Decides how many bone textures an actor needs and how large they are.
//! Frame blocks are `4 x bone_count` texels and fill a texture row by row.
//! A clip never spans two textures.
//!
//! Packing runs greedily at the largest ladder size, opening a new texture
//! whenever the next clip does not fit. Afterwards only the last texture is
//! shrunk:
//!
//! - several textures: the clips of the last one are replayed from the
//!   smallest size upward and the first size that holds them is kept
//! - one texture: the smallest size that still holds every clip is kept

use horde_assets::atlas::BLOCK_WIDTH;
use horde_core::errors::{HordeError, Result};

/// Frame blocks that fit into one `size x size` texture.
#[inline]
#[must_use]
pub fn block_capacity(size: u32, block_height: u32) -> u32 {
    if block_height == 0 {
        return 0;
    }
    (size / BLOCK_WIDTH) * (size / block_height)
}

/// The packer's verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasPlan {
    /// Edge length of the last texture.
    pub texture_size: u32,
    pub texture_count: usize,
    /// Edge length of every texture but the last.
    pub max_size: u32,
    pub block_height: u32,
}

impl AtlasPlan {
    /// Edge lengths of all textures in order.
    #[must_use]
    pub fn texture_sizes(&self) -> Vec<u32> {
        let mut sizes = vec![self.max_size; self.texture_count.saturating_sub(1)];
        sizes.push(self.texture_size);
        sizes
    }
}

/// Where a clip landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipPlacement {
    pub texture_index: u32,
    /// First block of the clip inside its texture.
    pub animation_index: u32,
}

/// Runs the clips through textures of the given capacities.
///
/// `capacity_of(t)` returns the capacity of texture `t`. Returns the
/// placements, or the index of the first clip that does not fit an empty
/// texture.
fn run(
    frames: &[u32],
    capacity_of: impl Fn(usize) -> u32,
) -> std::result::Result<Vec<ClipPlacement>, usize> {
    let mut placements = Vec::with_capacity(frames.len());
    let mut texture = 0usize;
    let mut cursor = 0u32;

    for (i, &count) in frames.iter().enumerate() {
        if u64::from(cursor) + u64::from(count) > u64::from(capacity_of(texture)) {
            if cursor == 0 {
                return Err(i);
            }
            texture += 1;
            cursor = 0;
            if count > capacity_of(texture) {
                return Err(i);
            }
        }
        placements.push(ClipPlacement {
            texture_index: texture as u32,
            animation_index: cursor,
        });
        cursor += count;
    }

    Ok(placements)
}

/// `true` when all `frames` fit one texture of `capacity` blocks.
fn fits_one(frames: &[u32], capacity: u32) -> bool {
    frames.iter().map(|&f| u64::from(f)).sum::<u64>() <= u64::from(capacity)
}

/// Chooses the texture size and count for the given per-clip frame counts.
///
/// `sizes` is the ascending size ladder. Fails with
/// [`HordeError::ClipExceedsTexture`] when one clip alone overflows a
/// maximal texture.
pub fn plan(frames: &[u32], bone_count: u32, sizes: &[u32]) -> Result<AtlasPlan> {
    let max_size = sizes.last().copied().unwrap_or(1024);
    let max_capacity = block_capacity(max_size, bone_count);

    let placements =
        run(frames, |_| max_capacity).map_err(|clip| HordeError::ClipExceedsTexture {
            clip,
            frames: frames[clip],
            texture_size: max_size,
            capacity: max_capacity,
        })?;

    let texture_count = placements.last().map_or(1, |p| p.texture_index as usize + 1);

    let texture_size = if texture_count > 1 {
        let last = texture_count as u32 - 1;
        let first_in_last = placements
            .iter()
            .position(|p| p.texture_index == last)
            .unwrap_or(frames.len());
        let tail = &frames[first_in_last..];

        sizes
            .iter()
            .copied()
            .find(|&s| fits_one(tail, block_capacity(s, bone_count)))
            .unwrap_or(max_size)
    } else {
        let mut best = max_size;
        for &s in sizes.iter().rev() {
            if fits_one(frames, block_capacity(s, bone_count)) {
                best = s;
            } else {
                break;
            }
        }
        best
    };

    log::debug!(
        "Atlas plan: {texture_count} texture(s), last {texture_size}x{texture_size}, {bone_count} bones"
    );

    Ok(AtlasPlan {
        texture_size,
        texture_count,
        max_size,
        block_height: bone_count,
    })
}

/// Assigns every clip its texture and start block under `plan`.
#[must_use]
pub fn place(frames: &[u32], plan: &AtlasPlan) -> Vec<ClipPlacement> {
    let sizes = plan.texture_sizes();
    let capacity_of = |t: usize| {
        sizes
            .get(t)
            .map_or(0, |&s| block_capacity(s, plan.block_height))
    };

    match run(frames, capacity_of) {
        Ok(placements) => placements,
        Err(clip) => {
            // A plan produced by `plan` always holds its clips.
            debug_assert!(false, "clip {clip} does not fit the atlas plan");
            Vec::new()
        }
    }
}
