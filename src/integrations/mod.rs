//! 外部通道接入层

pub mod sms;
pub mod whatsapp;
