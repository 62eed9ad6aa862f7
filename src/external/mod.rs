pub mod alipay;
pub mod gateway;
pub mod mailer;
pub mod wechat_pay;

pub use alipay::AlipayGateway;
pub use gateway::*;
pub use mailer::{EmailSender, HttpMailer};
pub use wechat_pay::WechatPayGateway;
