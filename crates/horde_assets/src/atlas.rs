//! Animation Texture Atlas
//!
//! Baked frames are stored as blocks inside fixed-size RGBA16F textures.
//! A block is `block_width` (always 4) texels wide and `block_height`
//! (one row per bone) texels high. The texels of a block row are the four
//! rows of that bone's matrix.
//!
//! Blocks are laid out row by row:
//!
//! ```text
//! x = (index % (width / block_width)) * block_width
//! y = (index / (width / block_width)) * block_height
//! ```

use glam::{Mat4, Vec4};
use half::f16;

/// Bytes per texel (four half floats).
pub const TEXEL_BYTES: usize = 8;

/// Texels per block row; one per matrix row.
pub const BLOCK_WIDTH: u32 = 4;

/// Pixel coordinates of the top-left texel of frame block `index`.
#[inline]
#[must_use]
pub fn frame_pixel_coords(
    index: u32,
    texture_width: u32,
    block_width: u32,
    block_height: u32,
) -> (u32, u32) {
    let blocks_per_row = (texture_width / block_width).max(1);
    (
        (index % blocks_per_row) * block_width,
        (index / blocks_per_row) * block_height,
    )
}

/// One square bone texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoneTexture {
    pub width: u32,
    pub height: u32,
    /// Little-endian RGBA16F texels, row-major.
    pub pixels: Vec<u8>,
}

impl BoneTexture {
    /// A zero-filled texture.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width as usize * height as usize * TEXEL_BYTES],
        }
    }

    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.width as usize * self.height as usize * TEXEL_BYTES
    }

    fn texel_offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * TEXEL_BYTES)
    }

    pub fn write_texel(&mut self, x: u32, y: u32, value: Vec4) {
        let Some(offset) = self.texel_offset(x, y) else {
            debug_assert!(false, "texel ({x}, {y}) outside {}x{}", self.width, self.height);
            return;
        };
        for (i, c) in value.to_array().into_iter().enumerate() {
            let bytes = f16::from_f32(c).to_le_bytes();
            self.pixels[offset + i * 2..offset + i * 2 + 2].copy_from_slice(&bytes);
        }
    }

    #[must_use]
    pub fn read_texel(&self, x: u32, y: u32) -> Option<Vec4> {
        let offset = self.texel_offset(x, y)?;
        let mut out = [0.0f32; 4];
        for (i, c) in out.iter_mut().enumerate() {
            let at = offset + i * 2;
            *c = f16::from_le_bytes([self.pixels[at], self.pixels[at + 1]]).to_f32();
        }
        Some(Vec4::from_array(out))
    }

    /// Writes one baked frame into block `index`.
    ///
    /// `matrices` holds one matrix per bone slot, in slot order.
    pub fn write_block(&mut self, index: u32, block_height: u32, matrices: &[Mat4]) {
        debug_assert!(matrices.len() <= block_height as usize);
        let (x, y) = frame_pixel_coords(index, self.width, BLOCK_WIDTH, block_height);
        for (bone, m) in matrices.iter().enumerate() {
            for row in 0..BLOCK_WIDTH {
                self.write_texel(x + row, y + bone as u32, m.row(row as usize));
            }
        }
    }

    /// Reads the bone matrices stored in block `index`.
    #[must_use]
    pub fn read_block(&self, index: u32, block_height: u32) -> Option<Vec<Mat4>> {
        let (x, y) = frame_pixel_coords(index, self.width, BLOCK_WIDTH, block_height);
        (0..block_height)
            .map(|bone| {
                let y = y + bone;
                Some(Mat4::from_cols(
                    self.read_texel(x, y)?,
                    self.read_texel(x + 1, y)?,
                    self.read_texel(x + 2, y)?,
                    self.read_texel(x + 3, y)?,
                )
                .transpose())
            })
            .collect()
    }
}

/// All bone textures of one actor type.
///
/// Immutable after baking; the runtime shares it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimationTextureAtlas {
    pub textures: Vec<BoneTexture>,
    pub block_width: u32,
    pub block_height: u32,
}

impl AnimationTextureAtlas {
    /// Allocates zeroed textures of the given edge lengths.
    #[must_use]
    pub fn with_sizes(sizes: &[u32], bone_count: u32) -> Self {
        Self {
            textures: sizes.iter().map(|&s| BoneTexture::new(s, s)).collect(),
            block_width: BLOCK_WIDTH,
            block_height: bone_count,
        }
    }

    #[inline]
    #[must_use]
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    #[inline]
    #[must_use]
    pub fn texture(&self, index: usize) -> Option<&BoneTexture> {
        self.textures.get(index)
    }

    /// Frame blocks that fit into texture `index`.
    #[must_use]
    pub fn block_capacity(&self, index: usize) -> u32 {
        let Some(t) = self.textures.get(index) else {
            return 0;
        };
        if self.block_width == 0 || self.block_height == 0 {
            return 0;
        }
        (t.width / self.block_width) * (t.height / self.block_height)
    }

    pub fn write_frame(&mut self, texture_index: usize, block_index: u32, matrices: &[Mat4]) {
        let block_height = self.block_height;
        if let Some(t) = self.textures.get_mut(texture_index) {
            t.write_block(block_index, block_height, matrices);
        } else {
            debug_assert!(false, "texture {texture_index} does not exist");
        }
    }

    #[must_use]
    pub fn read_frame(&self, texture_index: usize, block_index: u32) -> Option<Vec<Mat4>> {
        self.textures
            .get(texture_index)?
            .read_block(block_index, self.block_height)
    }
}
