//! 入站 SMS 收件箱
//!
//! 接各服务发来的短信验证码用：webhook 收到的短信存进有界收件箱
//! （只留最近 50 条），/sms/latest 取最新一条。纯内存，进程重启即清空。

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_INBOX_CAP: usize = 50;

/// 一条入站短信
#[derive(Clone, Debug, Serialize)]
pub struct SmsMessage {
    pub from: String,
    pub to: String,
    pub body: String,
    pub sid: String,
    pub received_at: DateTime<Utc>,
}

/// 有界收件箱：超出容量时淘汰最旧的
#[derive(Debug)]
pub struct SmsInbox {
    cap: usize,
    messages: Mutex<VecDeque<SmsMessage>>,
}

impl Default for SmsInbox {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAP)
    }
}

impl SmsInbox {
    pub fn new(cap: usize) -> Self {
        Self { cap, messages: Mutex::new(VecDeque::new()) }
    }

    pub fn push(
        &self,
        from: impl Into<String>,
        to: impl Into<String>,
        body: impl Into<String>,
        sid: impl Into<String>,
    ) {
        let mut messages = self.messages.lock().expect("sms inbox lock poisoned");
        messages.push_back(SmsMessage {
            from: from.into(),
            to: to.into(),
            body: body.into(),
            sid: sid.into(),
            received_at: Utc::now(),
        });
        while messages.len() > self.cap {
            messages.pop_front();
        }
    }

    pub fn latest(&self) -> Option<SmsMessage> {
        self.messages.lock().expect("sms inbox lock poisoned").back().cloned()
    }

    /// 当前保留的全部短信，旧的在前
    pub fn all(&self) -> Vec<SmsMessage> {
        self.messages.lock().expect("sms inbox lock poisoned").iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().expect("sms inbox lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_returns_most_recent_message() {
        let inbox = SmsInbox::new(50);
        assert!(inbox.latest().is_none());

        inbox.push("+111", "+900", "code 1234", "SM1");
        inbox.push("+222", "+900", "code 5678", "SM2");
        let latest = inbox.latest().unwrap();
        assert_eq!(latest.body, "code 5678");
        assert_eq!(latest.from, "+222");
        assert_eq!(latest.to, "+900");
    }

    #[test]
    fn inbox_evicts_oldest_beyond_capacity() {
        let inbox = SmsInbox::new(3);
        for i in 0..5 {
            inbox.push("+111", "+900", format!("msg {i}"), format!("SM{i}"));
        }
        assert_eq!(inbox.len(), 3);
        assert_eq!(inbox.latest().unwrap().body, "msg 4");
        // 最旧的两条已淘汰，留下的按接收顺序排列
        let bodies: Vec<String> = inbox.all().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["msg 2", "msg 3", "msg 4"]);
    }
}
