use crate::error::{AppError, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use validator::ValidationError;

static DATA_URL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^data:image/[a-zA-Z0-9.+\-]+;base64,(?P<payload>.+)$").unwrap()
});

fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// 必填字段：去除空白后不能为空
pub fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(validation_error("blank", "must not be blank"));
    }
    Ok(())
}

/// 图片来源：`data:image/*;base64,` 形式的内联图片，或 http(s) 地址
pub fn image_source(value: &str) -> std::result::Result<(), ValidationError> {
    if let Some(captures) = DATA_URL_REGEX.captures(value) {
        let payload = &captures["payload"];
        return match STANDARD.decode(payload) {
            Ok(bytes) if !bytes.is_empty() => Ok(()),
            _ => Err(validation_error("image_payload", "image data is not valid base64")),
        };
    }

    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(validation_error(
            "image_source",
            "must be a base64 image data URL or an http(s) URL",
        )),
    }
}

/// 按配置的上限检查字段长度（按字符计数）
pub fn ensure_max_length(field: &str, value: &str, max: usize) -> Result<()> {
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

/// 验证显示名称格式
pub fn validate_display_name(display_name: &str) -> Result<()> {
    if display_name.trim().is_empty() {
        return Err(AppError::validation("name must not be blank"));
    }

    if display_name.trim().chars().count() > 50 {
        return Err(AppError::validation("name must be at most 50 characters"));
    }

    Ok(())
}
