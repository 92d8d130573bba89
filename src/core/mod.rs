pub mod conductor;
pub mod note;
pub mod sink;
pub mod song;
pub mod tone;
