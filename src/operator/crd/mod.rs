pub mod commonwebui;

pub use commonwebui::{CommonWebUI, CommonWebUISpec, CommonWebUIStatus};
