//! Binary Animation Asset Format
//!
//! Little-endian layout, strings are UTF-8 prefixed by a 7-bit varint byte
//! count:
//!
//! ```text
//! clipCount:i32
//! per clip:
//!     name:string animationIndex:i32 textureIndex:i32 totalFrame:i32 fps:i32
//!     rootMotion:bool wrapMode:i32
//!     [rootMotion] totalFrame x (velocity.xyz:f32 angularVelocity.xyz:f32)
//!     eventCount:i32
//!     per event: function:string floatParam:f32 intParam:i32
//!                stringParam:string time:f32 objectParamName:string
//! hasExtraBones:bool
//! [hasExtraBones] count:i32 names:string[count] count x 16 x f32 (column-major)
//! textureCount:i32 blockWidth:i32 blockHeight:i32
//! per texture: width:i32 height:i32 byteLength:i32 bytes[byteLength]
//! ```

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use glam::{Mat4, Vec3};
use horde_core::errors::{HordeError, Result};
use log::info;

use crate::atlas::{AnimationTextureAtlas, BoneTexture, TEXEL_BYTES};
use crate::clip::{AnimationClipInfo, AnimationEvent, ExtraBones, WrapMode, clip_name_hash};

/// Largest texture edge accepted when reading.
pub const MAX_TEXTURE_EDGE: u32 = 16_384;

/// Longest string accepted when reading.
const MAX_STRING_BYTES: u64 = 1 << 20;

/// A complete baked animation set for one actor type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationAsset {
    pub clips: Vec<AnimationClipInfo>,
    pub extra_bones: Option<ExtraBones>,
    pub atlas: AnimationTextureAtlas,
}

impl AnimationAsset {
    #[must_use]
    pub fn clip_index(&self, name: &str) -> Option<usize> {
        self.clips.iter().position(|c| c.name == name)
    }

    #[must_use]
    pub fn clip_index_by_hash(&self, name_hash: i32) -> Option<usize> {
        self.clips.iter().position(|c| c.name_hash == name_hash)
    }

    /// Bone slot of a named extra bone (extra bones follow the skeleton).
    #[must_use]
    pub fn extra_bone_slot(&self, name: &str) -> Option<u32> {
        let extra = self.extra_bones.as_ref()?;
        let index = extra.index_of(name)?;
        let skeleton = (self.atlas.block_height as usize).saturating_sub(extra.len());
        Some((skeleton + index) as u32)
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = AssetWriter::new(writer);
        w.write_asset(self)?;
        w.into_inner().flush()?;
        Ok(())
    }

    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        AssetReader::new(reader).read_asset()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.write_to(&mut bytes)?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read_from(bytes)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.write_to(BufWriter::new(File::create(path)?))?;
        info!(
            "Wrote animation asset {} ({} clips, {} textures)",
            path.display(),
            self.clips.len(),
            self.atlas.texture_count()
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let asset = Self::read_from(BufReader::new(File::open(path)?))?;
        info!(
            "Loaded animation asset {} ({} clips, {} textures)",
            path.display(),
            asset.clips.len(),
            asset.atlas.texture_count()
        );
        Ok(asset)
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Writer for the binary animation asset format.
pub struct AssetWriter<W: Write> {
    writer: W,
}

impl<W: Write> AssetWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_asset(&mut self, asset: &AnimationAsset) -> io::Result<()> {
        self.write_len(asset.clips.len())?;
        for clip in &asset.clips {
            self.write_clip(clip)?;
        }

        self.write_extra_bones(asset.extra_bones.as_ref())?;
        self.write_atlas(&asset.atlas)
    }

    fn write_clip(&mut self, clip: &AnimationClipInfo) -> io::Result<()> {
        self.write_string(&clip.name)?;
        self.write_u32_as_i32(clip.animation_index)?;
        self.write_u32_as_i32(clip.texture_index)?;
        self.write_u32_as_i32(clip.total_frames)?;
        self.write_u32_as_i32(clip.fps)?;
        self.write_bool(clip.root_motion)?;
        self.writer.write_i32::<LittleEndian>(clip.wrap_mode.as_i32())?;

        if clip.root_motion {
            for i in 0..clip.total_frames as usize {
                let v = clip.velocity.get(i).copied().unwrap_or(Vec3::ZERO);
                let w = clip.angular_velocity.get(i).copied().unwrap_or(Vec3::ZERO);
                self.write_vec3(v)?;
                self.write_vec3(w)?;
            }
        }

        self.write_len(clip.events.len())?;
        for event in &clip.events {
            self.write_string(&event.function)?;
            self.writer.write_f32::<LittleEndian>(event.float_parameter)?;
            self.writer.write_i32::<LittleEndian>(event.int_parameter)?;
            self.write_string(&event.string_parameter)?;
            self.writer.write_f32::<LittleEndian>(event.time)?;
            self.write_string(&event.object_parameter_name)?;
        }
        Ok(())
    }

    fn write_extra_bones(&mut self, extra: Option<&ExtraBones>) -> io::Result<()> {
        let Some(extra) = extra.filter(|e| !e.is_empty()) else {
            return self.write_bool(false);
        };
        self.write_bool(true)?;
        self.write_len(extra.len())?;
        for name in &extra.names {
            self.write_string(name)?;
        }
        for i in 0..extra.len() {
            let m = extra.bind_poses.get(i).copied().unwrap_or(Mat4::IDENTITY);
            for f in m.to_cols_array() {
                self.writer.write_f32::<LittleEndian>(f)?;
            }
        }
        Ok(())
    }

    fn write_atlas(&mut self, atlas: &AnimationTextureAtlas) -> io::Result<()> {
        self.write_len(atlas.textures.len())?;
        self.write_u32_as_i32(atlas.block_width)?;
        self.write_u32_as_i32(atlas.block_height)?;
        for texture in &atlas.textures {
            self.write_u32_as_i32(texture.width)?;
            self.write_u32_as_i32(texture.height)?;
            self.write_len(texture.pixels.len())?;
            self.writer.write_all(&texture.pixels)?;
        }
        Ok(())
    }

    /// 7-bit varint byte count followed by UTF-8 bytes.
    fn write_string(&mut self, s: &str) -> io::Result<()> {
        let mut len = s.len() as u32;
        while len >= 0x80 {
            self.writer.write_u8((len as u8) | 0x80)?;
            len >>= 7;
        }
        self.writer.write_u8(len as u8)?;
        self.writer.write_all(s.as_bytes())
    }

    fn write_bool(&mut self, value: bool) -> io::Result<()> {
        self.writer.write_u8(u8::from(value))
    }

    fn write_vec3(&mut self, v: Vec3) -> io::Result<()> {
        self.writer.write_f32::<LittleEndian>(v.x)?;
        self.writer.write_f32::<LittleEndian>(v.y)?;
        self.writer.write_f32::<LittleEndian>(v.z)
    }

    fn write_u32_as_i32(&mut self, value: u32) -> io::Result<()> {
        let value = i32::try_from(value)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "value exceeds i32"))?;
        self.writer.write_i32::<LittleEndian>(value)
    }

    fn write_len(&mut self, len: usize) -> io::Result<()> {
        let len = i32::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds i32"))?;
        self.writer.write_i32::<LittleEndian>(len)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Reader for the binary animation asset format.
pub struct AssetReader<R: Read> {
    reader: R,
}

fn invalid(msg: impl Into<String>) -> HordeError {
    HordeError::InvalidAsset(msg.into())
}

fn map_eof(e: io::Error) -> HordeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        invalid("unexpected end of data")
    } else {
        HordeError::IoError(e)
    }
}

impl<R: Read> AssetReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    pub fn read_asset(&mut self) -> Result<AnimationAsset> {
        let clip_count = self.read_count("clip count")?;
        let mut clips = Vec::with_capacity(clip_count.min(1024));
        for _ in 0..clip_count {
            clips.push(self.read_clip()?);
        }

        let extra_bones = self.read_extra_bones()?;
        let atlas = self.read_atlas()?;

        for (i, clip) in clips.iter().enumerate() {
            if clip.texture_index as usize >= atlas.texture_count() {
                return Err(invalid(format!(
                    "clip {i} references texture {} of {}",
                    clip.texture_index,
                    atlas.texture_count()
                )));
            }
        }

        Ok(AnimationAsset {
            clips,
            extra_bones,
            atlas,
        })
    }

    fn read_clip(&mut self) -> Result<AnimationClipInfo> {
        let name = self.read_string()?;
        let animation_index = self.read_non_negative("animation index")?;
        let texture_index = self.read_non_negative("texture index")?;
        let total_frames = self.read_non_negative("total frames")?;
        let fps = self.read_non_negative("fps")?;
        let root_motion = self.read_bool()?;
        let raw_wrap = self.read_i32()?;
        let wrap_mode = WrapMode::from_i32(raw_wrap)
            .ok_or_else(|| invalid(format!("unknown wrap mode {raw_wrap}")))?;

        let mut velocity = Vec::new();
        let mut angular_velocity = Vec::new();
        if root_motion {
            let n = total_frames as usize;
            velocity.reserve(n.min(4096));
            angular_velocity.reserve(n.min(4096));
            for _ in 0..n {
                velocity.push(self.read_vec3()?);
                angular_velocity.push(self.read_vec3()?);
            }
        }

        let event_count = self.read_count("event count")?;
        let mut events = Vec::with_capacity(event_count.min(256));
        for _ in 0..event_count {
            events.push(AnimationEvent {
                function: self.read_string()?,
                float_parameter: self.read_f32()?,
                int_parameter: self.read_i32()?,
                string_parameter: self.read_string()?,
                time: self.read_f32()?,
                object_parameter_name: self.read_string()?,
            });
        }

        Ok(AnimationClipInfo {
            name_hash: clip_name_hash(&name),
            name,
            animation_index,
            texture_index,
            total_frames,
            fps,
            root_motion,
            wrap_mode,
            velocity,
            angular_velocity,
            events,
        })
    }

    fn read_extra_bones(&mut self) -> Result<Option<ExtraBones>> {
        if !self.read_bool()? {
            return Ok(None);
        }
        let count = self.read_count("extra bone count")?;
        let mut names = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            names.push(self.read_string()?);
        }
        let mut bind_poses = Vec::with_capacity(count.min(256));
        for _ in 0..count {
            let mut cols = [0.0f32; 16];
            for f in &mut cols {
                *f = self.read_f32()?;
            }
            bind_poses.push(Mat4::from_cols_array(&cols));
        }
        Ok(Some(ExtraBones { names, bind_poses }))
    }

    fn read_atlas(&mut self) -> Result<AnimationTextureAtlas> {
        let texture_count = self.read_count("texture count")?;
        let block_width = self.read_non_negative("block width")?;
        let block_height = self.read_non_negative("block height")?;

        let mut textures = Vec::with_capacity(texture_count.min(64));
        for i in 0..texture_count {
            let width = self.read_non_negative("texture width")?;
            let height = self.read_non_negative("texture height")?;
            if width > MAX_TEXTURE_EDGE || height > MAX_TEXTURE_EDGE {
                return Err(invalid(format!("texture {i} is {width}x{height}")));
            }
            let byte_len = self.read_count("texture byte length")?;
            let expected = width as usize * height as usize * TEXEL_BYTES;
            if byte_len != expected {
                return Err(invalid(format!(
                    "texture {i} is {width}x{height} but holds {byte_len} bytes, expected {expected}"
                )));
            }
            let mut pixels = vec![0u8; byte_len];
            self.reader.read_exact(&mut pixels).map_err(map_eof)?;
            textures.push(BoneTexture {
                width,
                height,
                pixels,
            });
        }

        Ok(AnimationTextureAtlas {
            textures,
            block_width,
            block_height,
        })
    }

    fn read_string(&mut self) -> Result<String> {
        let mut len: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.reader.read_u8().map_err(map_eof)?;
            len |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 35 {
                return Err(invalid("string length varint is too long"));
            }
        }
        if len > MAX_STRING_BYTES {
            return Err(invalid(format!("string of {len} bytes")));
        }

        let mut bytes = vec![0u8; len as usize];
        self.reader.read_exact(&mut bytes).map_err(map_eof)?;
        String::from_utf8(bytes).map_err(|e| invalid(format!("string is not UTF-8: {e}")))
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.reader.read_u8().map_err(map_eof)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(invalid(format!("bad bool byte {other}"))),
        }
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.reader.read_i32::<LittleEndian>().map_err(map_eof)
    }

    fn read_f32(&mut self) -> Result<f32> {
        self.reader.read_f32::<LittleEndian>().map_err(map_eof)
    }

    fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    fn read_non_negative(&mut self, what: &str) -> Result<u32> {
        let value = self.read_i32()?;
        u32::try_from(value).map_err(|_| invalid(format!("negative {what}: {value}")))
    }

    fn read_count(&mut self, what: &str) -> Result<usize> {
        Ok(self.read_non_negative(what)? as usize)
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horde_core::errors::ErrorCategory;

    fn sample_asset() -> AnimationAsset {
        let mut walk = AnimationClipInfo::new("Walk", 3, 15);
        walk.root_motion = true;
        walk.wrap_mode = WrapMode::Loop;
        walk.velocity = vec![Vec3::Z; 3];
        walk.angular_velocity = vec![Vec3::new(0.0, 90.0, 0.0); 3];
        walk.events.push(AnimationEvent {
            function: "Footstep".into(),
            float_parameter: 0.5,
            int_parameter: 2,
            string_parameter: "left".into(),
            time: 0.1,
            object_parameter_name: String::new(),
        });

        let mut idle = AnimationClipInfo::new("Idle", 2, 15);
        idle.animation_index = 3;

        let mut atlas = AnimationTextureAtlas::with_sizes(&[64], 3);
        atlas.write_frame(0, 0, &[Mat4::IDENTITY; 3]);

        AnimationAsset {
            clips: vec![walk, idle],
            extra_bones: Some(ExtraBones {
                names: vec!["weapon_r".into()],
                bind_poses: vec![Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))],
            }),
            atlas,
        }
    }

    #[test]
    fn round_trip() -> anyhow::Result<()> {
        let asset = sample_asset();
        let bytes = asset.to_bytes()?;
        let back = AnimationAsset::from_bytes(&bytes)?;
        assert_eq!(back, asset);
        assert_eq!(back.clip_index("Idle"), Some(1));
        assert_eq!(back.extra_bone_slot("weapon_r"), Some(2));
        Ok(())
    }

    #[test]
    fn strings_use_varint_prefix() {
        let mut w = AssetWriter::new(Vec::new());
        w.write_string(&"a".repeat(200)).unwrap();
        let bytes = w.into_inner();
        assert_eq!(&bytes[..2], &[0xC8, 0x01]);
        assert_eq!(bytes.len(), 202);

        let mut r = AssetReader::new(bytes.as_slice());
        assert_eq!(r.read_string().unwrap().len(), 200);
    }

    #[test]
    fn bind_pose_is_column_major() {
        let asset = AnimationAsset {
            extra_bones: Some(ExtraBones {
                names: vec![String::new()],
                bind_poses: vec![Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0))],
            }),
            ..Default::default()
        };
        let bytes = asset.to_bytes().unwrap();
        // clipCount(4) + hasExtra(1) + count(4) + name(1) then 16 floats
        let floats = &bytes[10..10 + 64];
        let at = |i: usize| f32::from_le_bytes(floats[i * 4..i * 4 + 4].try_into().unwrap());
        assert_eq!(at(12), 7.0);
        assert_eq!(at(13), 8.0);
        assert_eq!(at(14), 9.0);
        assert_eq!(at(15), 1.0);
    }

    #[test]
    fn byte_length_mismatch_is_rejected() {
        let mut bytes = sample_asset().to_bytes().unwrap();
        // byteLength sits right before the pixel payload
        let pixel_len = 64 * 64 * TEXEL_BYTES;
        let at = bytes.len() - pixel_len - 4;
        bytes[at..at + 4].copy_from_slice(&(pixel_len as i32 - 8).to_le_bytes());

        let err = AnimationAsset::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, HordeError::InvalidAsset(_)));
        assert_eq!(err.category(), ErrorCategory::Format);
    }

    #[test]
    fn truncated_input_is_invalid() {
        let bytes = sample_asset().to_bytes().unwrap();
        let err = AnimationAsset::from_bytes(&bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, HordeError::InvalidAsset(_)));
    }

    #[test]
    fn unknown_wrap_mode_is_invalid() {
        let mut w = AssetWriter::new(Vec::new());
        w.write_len(1).unwrap();
        w.write_string("x").unwrap();
        for _ in 0..4 {
            w.write_u32_as_i32(0).unwrap();
        }
        w.write_bool(false).unwrap();
        w.writer.write_i32::<LittleEndian>(3).unwrap();
        let err = AnimationAsset::from_bytes(&w.into_inner()).unwrap_err();
        assert!(err.to_string().contains("wrap mode"));
    }
}
