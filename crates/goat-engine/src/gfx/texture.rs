use std::fmt;
use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, RgbaImage};

use crate::error::{GfxError, Result};
use crate::gfx::driver::{SharedDriver, TextureId, TextureImage};

/// Upload options for [`TextureUnit`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct TextureOptions {
    /// Build a full mip chain on the CPU before upload.
    pub generate_mipmaps: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            generate_mipmaps: true,
        }
    }
}

/// A GPU texture decoded from an image source.
pub struct TextureUnit {
    driver: SharedDriver,
    handle: TextureId,
    path: PathBuf,
    width: u32,
    height: u32,
}

impl TextureUnit {
    /// Decodes the image at `path` (PNG, JPEG, BMP or DDS) and uploads it as RGBA8.
    ///
    /// Grey, RGB and RGBA sources are accepted; anything else is rejected.
    /// DDS files are decompressed on load: only the top level is read, so block
    /// compression and any stored mip chain are discarded. Mip levels, when
    /// [`TextureOptions::generate_mipmaps`] is set, are always rebuilt on the CPU.
    pub fn load(driver: &SharedDriver, path: impl AsRef<Path>, options: TextureOptions) -> Result<Self> {
        let path = path.as_ref();
        let io_err = |source| GfxError::Io {
            path: path.to_path_buf(),
            source,
        };

        let decoded = ImageReader::open(path)
            .map_err(io_err)?
            .with_guessed_format()
            .map_err(io_err)?
            .decode()
            .map_err(|source| GfxError::TextureDecode {
                path: path.to_path_buf(),
                source,
            })?;

        let rgba = to_rgba(decoded, path)?;
        Self::from_image(driver, path, rgba, options)
    }

    /// Uploads already decoded pixels. `label` stands in for the source path.
    pub fn from_image(
        driver: &SharedDriver,
        label: impl Into<PathBuf>,
        image: RgbaImage,
        options: TextureOptions,
    ) -> Result<Self> {
        let path = label.into();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(GfxError::UnsupportedTextureFormat {
                path,
                detail: "image has no pixels".into(),
            });
        }

        let levels = if options.generate_mipmaps {
            mip_chain(image)
        } else {
            vec![image.into_raw()]
        };
        let level_count = levels.len();

        let handle = driver
            .create_texture(
                &path.display().to_string(),
                &TextureImage {
                    width,
                    height,
                    levels,
                },
            )
            .map_err(|e| GfxError::ResourceCreation {
                what: "texture",
                reason: e.to_string(),
            })?;

        log::info!(
            "[texture] [{}] uploaded {width}x{height} ({level_count} mip levels)",
            path.display()
        );
        Ok(Self {
            driver: driver.clone(),
            handle,
            path,
            width,
            height,
        })
    }

    pub fn handle(&self) -> TextureId {
        self.handle
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl Drop for TextureUnit {
    fn drop(&mut self) {
        self.driver.delete_texture(self.handle);
    }
}

impl fmt::Debug for TextureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextureUnit")
            .field("handle", &self.handle)
            .field("path", &self.path)
            .field("size", &(self.width, self.height))
            .finish()
    }
}

fn to_rgba(image: DynamicImage, path: &Path) -> Result<RgbaImage> {
    match image.color().channel_count() {
        1 | 3 | 4 => Ok(image.into_rgba8()),
        n => Err(GfxError::UnsupportedTextureFormat {
            path: path.to_path_buf(),
            detail: format!("{n} channels ({:?})", image.color()),
        }),
    }
}

/// Base level plus every halved level down to 1x1.
fn mip_chain(base: RgbaImage) -> Vec<Vec<u8>> {
    let mut levels = Vec::new();
    let mut current = base;
    loop {
        let (w, h) = current.dimensions();
        if w == 1 && h == 1 {
            levels.push(current.into_raw());
            return levels;
        }
        let next = imageops::resize(&current, (w / 2).max(1), (h / 2).max(1), FilterType::Triangle);
        levels.push(current.into_raw());
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::driver::GpuCall;
    use crate::gfx::test_support;
    use image::{GrayAlphaImage, LumaA, Rgb, RgbImage};

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let levels = mip_chain(RgbaImage::new(8, 2));
        let sizes: Vec<usize> = levels.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![8 * 2 * 4, 4 * 4, 2 * 4, 4]);
    }

    #[test]
    fn from_image_uploads_every_level() {
        let (headless, driver) = test_support::headless();
        let tex = TextureUnit::from_image(
            &driver,
            "checker",
            RgbaImage::new(4, 4),
            TextureOptions::default(),
        )
        .unwrap();

        assert_eq!(tex.size(), (4, 4));
        assert!(headless.calls().contains(&GpuCall::CreateTexture {
            texture: tex.handle(),
            width: 4,
            height: 4,
            levels: 3,
        }));
    }

    #[test]
    fn load_decodes_rgb_png() {
        let (headless, driver) = test_support::headless();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wall.png");
        RgbImage::from_pixel(2, 2, Rgb([200, 100, 50])).save(&path).unwrap();

        let tex = TextureUnit::load(&driver, &path, TextureOptions { generate_mipmaps: false }).unwrap();
        assert_eq!(tex.path(), path.as_path());
        assert_eq!(headless.texture_size(tex.handle()), Some((2, 2)));
    }

    /// A 4x4 DXT1 file whose header declares three stored mip levels.
    fn dxt1_with_mips() -> Vec<u8> {
        let mut bytes = b"DDS ".to_vec();
        let mut put = |v: u32| bytes.extend_from_slice(&v.to_le_bytes());
        put(124); // header size
        put(0x1 | 0x2 | 0x4 | 0x1000 | 0x20000 | 0x80000);
        put(4); // height
        put(4); // width
        put(8); // linear size
        put(0); // depth
        put(3); // mip count
        for _ in 0..11 {
            put(0);
        }
        put(32); // pixel format size
        put(0x4); // fourcc present
        put(u32::from_le_bytes(*b"DXT1"));
        for _ in 0..5 {
            put(0);
        }
        put(0x1000 | 0x8 | 0x400000); // texture, complex, mipmap
        for _ in 0..4 {
            put(0);
        }
        bytes.extend_from_slice(&[0u8; 8 * 3]);
        bytes
    }

    #[test]
    fn dds_mip_chain_is_not_carried_over() {
        let (headless, driver) = test_support::headless();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block.dds");
        std::fs::write(&path, dxt1_with_mips()).unwrap();

        let tex = TextureUnit::load(&driver, &path, TextureOptions { generate_mipmaps: false }).unwrap();
        assert_eq!(tex.size(), (4, 4));
        assert!(headless.calls().contains(&GpuCall::CreateTexture {
            texture: tex.handle(),
            width: 4,
            height: 4,
            levels: 1,
        }));
    }

    #[test]
    fn two_channel_images_are_unsupported() {
        let (_, driver) = test_support::headless();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("la.png");
        GrayAlphaImage::from_pixel(2, 2, LumaA([1, 2])).save(&path).unwrap();

        let err = TextureUnit::load(&driver, &path, TextureOptions::default()).unwrap_err();
        assert!(matches!(err, GfxError::UnsupportedTextureFormat { .. }));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let (_, driver) = test_support::headless();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();

        let err = TextureUnit::load(&driver, &path, TextureOptions::default()).unwrap_err();
        assert!(matches!(err, GfxError::TextureDecode { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let (_, driver) = test_support::headless();
        let err = TextureUnit::load(&driver, "nope.png", TextureOptions::default()).unwrap_err();
        assert!(matches!(err, GfxError::Io { .. }));
    }

    #[test]
    fn drop_deletes_texture() {
        let (headless, driver) = test_support::headless();
        let tex =
            TextureUnit::from_image(&driver, "t", RgbaImage::new(1, 1), TextureOptions::default())
                .unwrap();
        let id = tex.handle();
        drop(tex);
        assert!(headless.texture_size(id).is_none());
    }
}
