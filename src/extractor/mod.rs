pub mod links;
pub mod models;
pub mod ytdlp;

pub use links::{classify, extract, ClassifiedUrl, LinkKind};
pub use models::VideoInfo;
pub use ytdlp::{find_ytdlp, VideoExtractor};
