//! Transport and rendering services plugged into the dispatcher.

pub mod email;
pub mod renderer;

pub use email::MailService;
pub use renderer::HtmlTableRenderer;
