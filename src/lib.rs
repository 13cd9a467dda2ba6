pub mod docx;
pub mod engine;
pub mod inventory;
pub mod placeholders;
pub mod progress;
pub mod rules;
pub mod template;
