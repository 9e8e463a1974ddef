pub mod attachment;
pub mod directory;
pub mod publish;
pub mod render;
pub mod status;
pub mod unpublish;
