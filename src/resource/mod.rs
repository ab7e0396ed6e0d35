pub mod buffer;
pub mod depth_image;
pub mod image;
pub mod sampler;

pub use buffer::{Buffer, BufferConfig, BufferUsage, BufferView, HostAccess, MappedBuffer};
pub use depth_image::{DepthImage, DepthImageConfig, DepthImageUsage, DepthImageView};
pub use image::{Image, ImageConfig, ImageUsage, ImageView};
pub use sampler::{Sampler, SamplerKey};
