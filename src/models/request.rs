use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;

/// 一次标注请求的载荷：提示词 + 编码后的图片
///
/// 对请求客户端而言是不透明的
#[derive(Debug, Clone)]
pub struct AnnotationRequest {
    pub instruction: String,
    pub mime_type: &'static str,
    pub image_base64: String,
}

impl AnnotationRequest {
    pub fn new(instruction: impl Into<String>, mime_type: &'static str, image_bytes: &[u8]) -> Self {
        Self {
            instruction: instruction.into(),
            mime_type,
            image_base64: BASE64_STANDARD.encode(image_bytes),
        }
    }

    /// `data:` URL 形式的图片
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.image_base64)
    }
}
