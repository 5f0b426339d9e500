//! 入站媒体处理
//!
//! 消息里的媒体只做两件事：限长下载校验、生成给模型看的文本标注。
//! 不做转码，超限或超时都走 MediaProcessing / Timeout 错误。

use std::time::Duration;

use crate::error::BotError;

/// 媒体大小与下载超时策略
#[derive(Clone, Debug)]
pub struct MediaPolicy {
    pub max_bytes: u64,
    pub fetch_timeout: Duration,
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self { max_bytes: 10 * 1024 * 1024, fetch_timeout: Duration::from_secs(30) }
    }
}

impl MediaPolicy {
    pub fn new(max_mb: f64, fetch_timeout: Duration) -> Self {
        Self { max_bytes: (max_mb * 1024.0 * 1024.0) as u64, fetch_timeout }
    }

    /// 校验已知大小是否超限
    pub fn check_size(&self, size: u64) -> Result<(), BotError> {
        if size > self.max_bytes {
            return Err(BotError::media(format!(
                "media of {size} bytes exceeds limit of {} bytes",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

/// 限长下载入站媒体（Twilio 媒体 URL 需要 basic auth）
#[derive(Clone)]
pub struct MediaFetcher {
    client: reqwest::Client,
    policy: MediaPolicy,
    auth: Option<(String, String)>,
}

impl MediaFetcher {
    pub fn new(client: reqwest::Client, policy: MediaPolicy) -> Self {
        Self { client, policy, auth: None }
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.auth = Some((user.into(), pass.into()));
        self
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, BotError> {
        let mut req = self.client.get(url).timeout(self.policy.fetch_timeout);
        if let Some((user, pass)) = &self.auth {
            req = req.basic_auth(user, Some(pass));
        }
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                BotError::timeout(format!("media download timed out: {url}"))
            } else {
                BotError::media(format!("media download failed: {e}"))
            }
        })?;

        if !resp.status().is_success() {
            return Err(BotError::media(format!(
                "media download returned status {}",
                resp.status()
            )));
        }
        // Content-Length 可信时提前拒绝，省掉整个下载
        if let Some(len) = resp.content_length() {
            self.policy.check_size(len)?;
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| BotError::media(format!("media download failed: {e}")))?;
        self.policy.check_size(bytes.len() as u64)?;
        Ok(bytes.to_vec())
    }
}

/// 把媒体引用折叠成模型可读的文本标注，附在用户消息末尾
pub fn media_annotation(media_urls: &[String]) -> Option<String> {
    if media_urls.is_empty() {
        return None;
    }
    let lines: Vec<String> = media_urls
        .iter()
        .map(|url| format!("[User attached media: {url}]"))
        .collect();
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn size_within_limit_passes() {
        let policy = MediaPolicy::new(10.0, Duration::from_secs(30));
        assert!(policy.check_size(10 * 1024 * 1024).is_ok());
    }

    #[test]
    fn oversize_media_is_rejected() {
        let policy = MediaPolicy::new(10.0, Duration::from_secs(30));
        let err = policy.check_size(10 * 1024 * 1024 + 1).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MediaProcessing);
    }

    #[test]
    fn annotation_lists_every_attachment() {
        let urls = vec!["https://example.com/a.jpg".to_string(), "https://example.com/b.ogg".to_string()];
        let note = media_annotation(&urls).unwrap();
        assert!(note.contains("a.jpg"));
        assert!(note.contains("b.ogg"));
        assert_eq!(note.lines().count(), 2);
    }

    #[test]
    fn no_media_means_no_annotation() {
        assert!(media_annotation(&[]).is_none());
    }
}
