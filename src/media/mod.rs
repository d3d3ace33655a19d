//! Image and video generation.

pub mod image;
pub mod video;

pub use image::{AspectRatio, GeneratedImage, ImageClient, ImageEditRequest, ImageRequest};
pub use video::{VideoAsset, VideoClient, VideoJob, VideoRequest};
