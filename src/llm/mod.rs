//! 模型层：客户端抽象与实现（Anthropic / Mock）

pub mod anthropic;
pub mod mock;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use mock::MockModelClient;
pub use traits::{ModelClient, ModelResponse, StopReason};
