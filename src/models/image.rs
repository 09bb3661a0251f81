use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// 调用方提交的原始图片
#[derive(Debug, Clone)]
pub struct RawImage {
    /// 文件名或其他标识，仅用于日志
    pub name: String,
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// 提供方期望的图片传输形式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// 二进制（由适配器按需转 base64 内联）
    Binary,
    /// data:image/jpeg;base64,... 字符串
    DataUri,
}

/// 图片预处理参数，由各提供方适配器决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProfile {
    /// 长边最大像素
    pub max_dimension_px: u32,
    /// JPEG 质量 (1-100)
    pub jpeg_quality: u8,
    /// 编码后字节上限，超出时逐步降低质量
    pub max_size_bytes: Option<usize>,
    pub encoding: ImageEncoding,
}

/// 压缩后的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    Binary(Vec<u8>),
    DataUri(String),
}

/// 预处理完成、可以直接发送的图片
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// 在本次请求中的序号（从 0 开始）
    pub index: usize,
    pub mime_type: &'static str,
    pub width: u32,
    pub height: u32,
    pub payload: ImagePayload,
}

impl PreparedImage {
    /// 纯 base64 数据（不带 data: 前缀）
    pub fn base64_data(&self) -> String {
        match &self.payload {
            ImagePayload::Binary(bytes) => BASE64.encode(bytes),
            ImagePayload::DataUri(uri) => uri
                .split_once(',')
                .map(|(_, data)| data.to_string())
                .unwrap_or_default(),
        }
    }

    /// data URI 形式
    pub fn data_uri(&self) -> String {
        match &self.payload {
            ImagePayload::Binary(bytes) => {
                format!("data:{};base64,{}", self.mime_type, BASE64.encode(bytes))
            }
            ImagePayload::DataUri(uri) => uri.clone(),
        }
    }
}
