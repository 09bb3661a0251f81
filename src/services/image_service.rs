//! 图片预处理服务
//!
//! 按提供方的参数把图片缩放到长边上限以内，再重新编码为 JPEG。
//! 解码和编码是 CPU 密集操作，放在 blocking 线程池里并行执行。

use std::io::Cursor;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::join_all;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::{debug, info};

use crate::error::{AppResult, ImageError};
use crate::models::{ImageEncoding, ImagePayload, ImageProfile, PreparedImage, RawImage};

const JPEG_MIME: &str = "image/jpeg";
const QUALITY_STEP: u8 = 10;
const MIN_QUALITY: u8 = 30;

/// 图片预处理器
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    profile: ImageProfile,
}

impl ImagePreprocessor {
    pub fn new(profile: ImageProfile) -> Self {
        Self { profile }
    }

    /// 处理单张图片
    pub fn prepare(&self, index: usize, bytes: &[u8]) -> Result<PreparedImage, ImageError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|source| ImageError::Decode { index, source })?;

        let (width, height) = fit_within(
            decoded.width(),
            decoded.height(),
            self.profile.max_dimension_px,
        );
        let resized = if (width, height) == (decoded.width(), decoded.height()) {
            decoded
        } else {
            decoded.resize_exact(width, height, FilterType::CatmullRom)
        };
        let rgb = resized.to_rgb8();

        let mut quality = self.profile.jpeg_quality.clamp(1, 100);
        let mut jpeg =
            encode_jpeg(&rgb, quality).map_err(|source| ImageError::Encode { index, source })?;

        // 超出体积上限时逐步降低质量，到下限为止
        if let Some(limit) = self.profile.max_size_bytes {
            while jpeg.len() > limit && quality > MIN_QUALITY {
                quality = quality.saturating_sub(QUALITY_STEP).max(MIN_QUALITY);
                debug!(
                    "第 {} 张图片 {} 字节超出上限 {}，以质量 {} 重新编码",
                    index + 1,
                    jpeg.len(),
                    limit,
                    quality
                );
                jpeg = encode_jpeg(&rgb, quality)
                    .map_err(|source| ImageError::Encode { index, source })?;
            }
        }

        let payload = match self.profile.encoding {
            ImageEncoding::Binary => ImagePayload::Binary(jpeg),
            ImageEncoding::DataUri => ImagePayload::DataUri(format!(
                "data:{};base64,{}",
                JPEG_MIME,
                BASE64.encode(&jpeg)
            )),
        };

        Ok(PreparedImage {
            index,
            mime_type: JPEG_MIME,
            width,
            height,
            payload,
        })
    }

    /// 并行处理全部图片，结果保持输入顺序
    ///
    /// 任意一张失败则整体失败，错误指向序号最小的失败图片。
    pub async fn prepare_all(&self, images: &[RawImage]) -> AppResult<Vec<PreparedImage>> {
        let started = std::time::Instant::now();

        let handles = images.iter().enumerate().map(|(index, raw)| {
            let preprocessor = *self;
            let bytes = raw.bytes.clone();
            tokio::task::spawn_blocking(move || preprocessor.prepare(index, &bytes))
        });

        let mut prepared = Vec::with_capacity(images.len());
        for (index, joined) in join_all(handles).await.into_iter().enumerate() {
            let image = joined.map_err(|e| ImageError::Worker {
                index,
                message: e.to_string(),
            })??;
            prepared.push(image);
        }

        info!(
            "🖼️ 图片预处理完成: {} 张，耗时 {} ms",
            prepared.len(),
            started.elapsed().as_millis()
        );
        Ok(prepared)
    }
}

/// 等比缩放到长边不超过 max，不放大，最小 1 像素
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    let longest = width.max(height);
    if longest <= max || longest == 0 {
        return (width.max(1), height.max(1));
    }

    let scale = f64::from(max) / f64::from(longest);
    let scaled = |v: u32| ((f64::from(v) * scale).round() as u32).clamp(1, max);
    (scaled(width), scaled(height))
}

fn encode_jpeg(rgb: &image::RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(rgb)?;
    Ok(buf.into_inner())
}
